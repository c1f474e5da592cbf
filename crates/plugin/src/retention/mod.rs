//! Source-retention option stripping.
//!
//! Options declared with `retention = RETENTION_SOURCE` are meant for code
//! generators only. Compilers send them in `source_file_descriptors`; a plugin
//! that hands descriptors on to a runtime (for example by embedding them in
//! generated code) must strip them first.
//!
//! Custom options are extensions, which prost's descriptor types drop on
//! decode. Work on the encoded descriptors ([`FileDescriptorTree::from_bytes`],
//! [`strip_encoded_file_descriptor`]) to keep them, and resolve their retention
//! with [`ExtensionRetention`] or any other [`RetentionResolver`].

mod extension;
mod strip;
mod tree;
mod trie;

pub use extension::ExtensionRetention;
pub use strip::{
    strip_encoded_file_descriptor, strip_file_descriptor_proto, strip_source_retention_options,
};
pub use tree::{
    ChildList, ChildSlot, DescriptorNode, FileDescriptorTree, NodeKind, OptionField, OptionSet,
    Record, Retention, RetentionResolver, TreeError,
};
