//! Wire messages exchanged between a protobuf compiler and a plugin.
//!
//! These mirror `google/protobuf/compiler/plugin.proto` field for field and are
//! serialized with [prost](https://docs.rs/prost). Descriptor payloads reuse the
//! `prost-types` definitions.

use prost::Message;
use prost_types::{FileDescriptorProto, GeneratedCodeInfo};
use thiserror::Error;

/// Error type for protocol operations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload was not a valid protobuf encoding of the expected message.
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// IO error while reading or writing a payload.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The version number of the protocol compiler.
#[derive(Clone, PartialEq, Message)]
pub struct Version {
    #[prost(int32, optional, tag = "1")]
    pub major: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub minor: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub patch: Option<i32>,
    /// A suffix for alpha, beta or rc release, e.g., "alpha-1", "rc2".
    /// Empty for mainline stable releases.
    #[prost(string, optional, tag = "4")]
    pub suffix: Option<String>,
}

/// An encoded request written by the compiler to the plugin's stdin.
#[derive(Clone, PartialEq, Message)]
pub struct CodeGeneratorRequest {
    /// The .proto files that were explicitly listed on the command line.
    #[prost(string, repeated, tag = "1")]
    pub file_to_generate: Vec<String>,

    /// The generator parameter passed on the command line.
    #[prost(string, optional, tag = "2")]
    pub parameter: Option<String>,

    /// Descriptors for every file in `file_to_generate` and everything they
    /// import, in topological order. Source-retention options are stripped.
    #[prost(message, repeated, tag = "15")]
    pub proto_file: Vec<FileDescriptorProto>,

    /// Descriptors for the files in `file_to_generate` with source-retention
    /// options left intact.
    #[prost(message, repeated, tag = "17")]
    pub source_file_descriptors: Vec<FileDescriptorProto>,

    /// The version number of the compiler.
    #[prost(message, optional, tag = "3")]
    pub compiler_version: Option<Version>,
}

/// The descriptor fields of a [`CodeGeneratorRequest`], left encoded.
///
/// Decoding a request payload a second time as this message keeps each
/// `FileDescriptorProto` byte for byte. prost's descriptor types drop
/// extension options, which custom options always are.
#[derive(Clone, PartialEq, Message)]
pub struct EncodedDescriptors {
    #[prost(bytes = "vec", repeated, tag = "15")]
    pub proto_file: Vec<Vec<u8>>,

    #[prost(bytes = "vec", repeated, tag = "17")]
    pub source_file_descriptors: Vec<Vec<u8>>,
}

/// The plugin's reply, written to stdout.
#[derive(Clone, PartialEq, Message)]
pub struct CodeGeneratorResponse {
    /// Set when the input files were unusable for this plugin. A plugin
    /// failure (as opposed to a problem with the input) exits non-zero instead.
    #[prost(string, optional, tag = "1")]
    pub error: Option<String>,

    /// Bitwise OR of [`crate::Features`] values.
    #[prost(uint64, optional, tag = "2")]
    pub supported_features: Option<u64>,

    /// Lowest [`crate::Edition`] the plugin supports.
    #[prost(int32, optional, tag = "3")]
    pub minimum_edition: Option<i32>,

    /// Highest [`crate::Edition`] the plugin supports.
    #[prost(int32, optional, tag = "4")]
    pub maximum_edition: Option<i32>,

    #[prost(message, repeated, tag = "15")]
    pub file: Vec<File>,
}

/// A single generated file, or a fragment appended to the previous one.
#[derive(Clone, PartialEq, Message)]
pub struct File {
    /// Path relative to the output directory. An empty name continues the
    /// previous file.
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,

    /// Name of an insertion point inside an already generated file.
    #[prost(string, optional, tag = "2")]
    pub insertion_point: Option<String>,

    #[prost(string, optional, tag = "15")]
    pub content: Option<String>,

    #[prost(message, optional, tag = "16")]
    pub generated_code_info: Option<GeneratedCodeInfo>,
}

impl CodeGeneratorRequest {
    /// Serialize this request to its wire encoding.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Deserialize a request from its wire encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode(bytes).map_err(Into::into)
    }
}

impl EncodedDescriptors {
    /// Read the descriptors of an encoded request.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode(bytes).map_err(Into::into)
    }
}

impl From<&CodeGeneratorRequest> for EncodedDescriptors {
    fn from(request: &CodeGeneratorRequest) -> Self {
        let encode = |files: &[FileDescriptorProto]| -> Vec<Vec<u8>> {
            files.iter().map(Message::encode_to_vec).collect()
        };
        Self {
            proto_file: encode(&request.proto_file),
            source_file_descriptors: encode(&request.source_file_descriptors),
        }
    }
}

impl CodeGeneratorResponse {
    /// Serialize this response to its wire encoding.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Deserialize a response from its wire encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode(bytes).map_err(Into::into)
    }

    /// Create a response that only carries an error message.
    #[must_use]
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

impl File {
    /// Create a file record with a name and full content.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Create a record that continues the previous file.
    #[must_use]
    pub fn continuation(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Create a record that inserts content at an insertion point of `name`.
    #[must_use]
    pub fn insertion(
        name: impl Into<String>,
        insertion_point: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            insertion_point: Some(insertion_point.into()),
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let request = CodeGeneratorRequest {
            file_to_generate: vec!["a.proto".to_string()],
            parameter: Some("paths=source_relative".to_string()),
            proto_file: vec![FileDescriptorProto {
                name: Some("a.proto".to_string()),
                ..Default::default()
            }],
            source_file_descriptors: Vec::new(),
            compiler_version: Some(Version {
                major: Some(5),
                minor: Some(27),
                patch: Some(0),
                suffix: None,
            }),
        };

        let decoded = CodeGeneratorRequest::from_bytes(&request.to_bytes()).unwrap();
        assert_eq!(request, decoded);
        assert_eq!(decoded.parameter(), "paths=source_relative");
    }

    #[test]
    fn test_request_decode_garbage() {
        // A lone field key with a truncated length-delimited value.
        let err = CodeGeneratorRequest::from_bytes(&[0x0a, 0x05, b'a']).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_encoded_descriptors_keep_unknown_fields() {
        let request = CodeGeneratorRequest {
            file_to_generate: vec!["a.proto".to_string()],
            proto_file: vec![FileDescriptorProto {
                name: Some("a.proto".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut bytes = request.to_bytes();
        // source_file_descriptors[0] = { name: "a.proto", options: { 50000: 1 } }
        let source = [
            0x0a, 0x07, b'a', b'.', b'p', b'r', b'o', b't', b'o', 0x42, 0x04, 0x80, 0xb5, 0x18,
            0x01,
        ];
        bytes.push(0x8a);
        bytes.push(0x01);
        bytes.push(source.len() as u8);
        bytes.extend_from_slice(&source);

        let decoded = CodeGeneratorRequest::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.source_file_descriptors[0].options, Some(Default::default()));

        let encoded = EncodedDescriptors::from_bytes(&bytes).unwrap();
        assert_eq!(encoded.proto_file, vec![request.proto_file[0].encode_to_vec()]);
        assert_eq!(encoded.source_file_descriptors, vec![source.to_vec()]);
        assert_eq!(EncodedDescriptors::from(&request).proto_file, encoded.proto_file);
    }

    #[test]
    fn test_response_error_helper() {
        let response = CodeGeneratorResponse::from_error("missing option");
        assert_eq!(response.error(), "missing option");
        assert!(response.file.is_empty());
    }

    #[test]
    fn test_file_constructors() {
        let file = File::new("a.txt", "hello");
        assert_eq!(file.name(), "a.txt");
        assert_eq!(file.insertion_point, None);

        let fragment = File::continuation("more");
        assert_eq!(fragment.name, None);
        assert_eq!(fragment.content(), "more");

        let insertion = File::insertion("a.txt", "imports", "use x;");
        assert_eq!(insertion.insertion_point(), "imports");
    }
}
