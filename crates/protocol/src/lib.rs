//! protoplug Protocol - Wire types shared by protobuf compiler plugins.
//!
//! This crate provides:
//! - [`CodeGeneratorRequest`] and [`CodeGeneratorResponse`] message types
//! - [`Features`] bitflags for the capabilities a plugin advertises
//! - [`Edition`] values for plugins that support editions
//! - Path normalization via [`normalize_path`] and [`normalize_proto_path`]
//!
//! # Wire Format
//!
//! Messages are protobuf-encoded with [prost](https://docs.rs/prost). A plugin
//! reads exactly one request from stdin and writes exactly one response to
//! stdout; there is no framing.
//!
//! # Example
//!
//! ```rust
//! use protoplug_protocol::{CodeGeneratorResponse, Features, File};
//!
//! let response = CodeGeneratorResponse {
//!     supported_features: Some(Features::PROTO3_OPTIONAL.bits()),
//!     file: vec![File::new("a.proto.txt", "A1\n")],
//!     ..Default::default()
//! };
//!
//! let bytes = response.to_bytes();
//! let decoded = CodeGeneratorResponse::from_bytes(&bytes).unwrap();
//! assert_eq!(decoded.file[0].name(), "a.proto.txt");
//! ```

mod features;
mod message;
mod path;

// Re-export main types at crate root
pub use features::{Edition, Features, UnknownFeatures};
pub use message::{
    CodeGeneratorRequest, CodeGeneratorResponse, EncodedDescriptors, File, ProtocolError, Version,
};
pub use path::{
    PROTO_EXTENSION, PathError, check_proto_path, normalize_path, normalize_proto_path,
};

/// Descriptor types carried inside requests.
pub use prost_types;
