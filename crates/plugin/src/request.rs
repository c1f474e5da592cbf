//! Validated, read-only view over a `CodeGeneratorRequest`.

use crate::error::Error;
use crate::retention::{ExtensionRetention, FileDescriptorTree};
use crate::validate::validate_request;
use once_cell::sync::OnceCell;
use protoplug_protocol::prost_types::FileDescriptorProto;
use protoplug_protocol::{CodeGeneratorRequest, EncodedDescriptors, Version};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Which copy of a descriptor to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescriptorOptions {
    source_retention: bool,
}

impl DescriptorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return descriptors with source-retention options intact for files
    /// being generated. Requires a compiler that sends them.
    pub fn with_source_retention_options(mut self) -> Self {
        self.source_retention = true;
        self
    }

    pub fn source_retention_options(&self) -> bool {
        self.source_retention
    }
}

/// A request that has passed validation.
///
/// Descriptors are available decoded, as `prost-types` values, and encoded,
/// exactly as the compiler sent them. Only the encoded form keeps custom
/// (extension) options.
///
/// Lookup indices are built on first use and shared afterwards; a `Request`
/// can be read from many threads at once.
pub struct Request {
    inner: CodeGeneratorRequest,
    encoded: EncodedDescriptors,
    to_generate: OnceCell<HashSet<String>>,
    proto_file_index: OnceCell<HashMap<String, usize>>,
    source_file_index: OnceCell<HashMap<String, usize>>,
    retention: OnceCell<ExtensionRetention>,
}

impl Request {
    /// Validate `request` and wrap it.
    pub fn new(request: CodeGeneratorRequest) -> Result<Self, Error> {
        let encoded = EncodedDescriptors::from(&request);
        Self::with_encoded(request, encoded)
    }

    /// Decode and validate a request from its wire encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let request = CodeGeneratorRequest::from_bytes(bytes)?;
        Self::with_encoded(request, EncodedDescriptors::from_bytes(bytes)?)
    }

    fn with_encoded(request: CodeGeneratorRequest, encoded: EncodedDescriptors) -> Result<Self, Error> {
        validate_request(&request)?;
        Ok(Self {
            inner: request,
            encoded,
            to_generate: OnceCell::new(),
            proto_file_index: OnceCell::new(),
            source_file_index: OnceCell::new(),
            retention: OnceCell::new(),
        })
    }

    /// The generator parameter, or an empty string.
    pub fn parameter(&self) -> &str {
        self.inner.parameter()
    }

    /// Paths of the files to generate, in request order.
    pub fn files_to_generate(&self) -> &[String] {
        &self.inner.file_to_generate
    }

    pub fn is_file_to_generate(&self, path: &str) -> bool {
        self.to_generate
            .get_or_init(|| self.inner.file_to_generate.iter().cloned().collect())
            .contains(path)
    }

    /// Descriptors for the files to generate, in `files_to_generate` order.
    ///
    /// Custom options are not included; see
    /// [`Request::encoded_file_descriptors_to_generate`].
    pub fn file_descriptor_protos_to_generate(
        &self,
        options: DescriptorOptions,
    ) -> Result<Vec<&FileDescriptorProto>, Error> {
        let (descriptors, index) = self.descriptors(options)?;
        Ok(self
            .inner
            .file_to_generate
            .iter()
            .filter_map(|path| index.get(path).map(|&i| &descriptors[i]))
            .collect())
    }

    /// Every descriptor in the request, in topological order.
    ///
    /// With source retention requested, files being generated are replaced
    /// by their source-retention copies.
    pub fn all_file_descriptor_protos(
        &self,
        options: DescriptorOptions,
    ) -> Result<Vec<&FileDescriptorProto>, Error> {
        if !options.source_retention {
            return Ok(self.inner.proto_file.iter().collect());
        }
        let (sources, index) = self.descriptors(options)?;
        Ok(self
            .inner
            .proto_file
            .iter()
            .map(|file| match index.get(file.name()) {
                Some(&i) => &sources[i],
                None => file,
            })
            .collect())
    }

    /// Look up one descriptor by path.
    pub fn file_descriptor_proto(
        &self,
        path: &str,
        options: DescriptorOptions,
    ) -> Result<Option<&FileDescriptorProto>, Error> {
        let options = if self.is_file_to_generate(path) {
            options
        } else {
            // Only files to generate have source-retention copies.
            DescriptorOptions::default()
        };
        let (descriptors, index) = self.descriptors(options)?;
        Ok(index.get(path).map(|&i| &descriptors[i]))
    }

    /// Encoded descriptors for the files to generate, in `files_to_generate`
    /// order.
    pub fn encoded_file_descriptors_to_generate(
        &self,
        options: DescriptorOptions,
    ) -> Result<Vec<&[u8]>, Error> {
        let (encoded, index) = self.encoded_descriptors(options)?;
        Ok(self
            .inner
            .file_to_generate
            .iter()
            .filter_map(|path| index.get(path).map(|&i| encoded[i].as_slice()))
            .collect())
    }

    /// Look up one encoded descriptor by path, extension options intact.
    pub fn encoded_file_descriptor(
        &self,
        path: &str,
        options: DescriptorOptions,
    ) -> Result<Option<&[u8]>, Error> {
        let options = if self.is_file_to_generate(path) {
            options
        } else {
            DescriptorOptions::default()
        };
        let (encoded, index) = self.encoded_descriptors(options)?;
        Ok(index.get(path).map(|&i| encoded[i].as_slice()))
    }

    /// Option retention as declared by the extensions of every file in the
    /// request. Built on first use.
    pub fn extension_retention(&self) -> Result<&ExtensionRetention, Error> {
        self.retention.get_or_try_init(|| {
            let files = self.encoded.proto_file.iter().map(Vec::as_slice);
            Ok(ExtensionRetention::from_encoded_files(files)?)
        })
    }

    /// One file as a descriptor tree, its options tagged with
    /// [`Request::extension_retention`].
    pub fn file_descriptor_tree(
        &self,
        path: &str,
        options: DescriptorOptions,
    ) -> Result<Option<FileDescriptorTree>, Error> {
        let Some(bytes) = self.encoded_file_descriptor(path, options)? else {
            return Ok(None);
        };
        Ok(Some(FileDescriptorTree::from_bytes(bytes, self.extension_retention()?)?))
    }

    /// The compiler version, if the compiler reported one.
    pub fn compiler_version(&self) -> Option<CompilerVersion> {
        self.inner.compiler_version.as_ref().map(CompilerVersion::from)
    }

    /// The underlying request, without copying.
    pub fn code_generator_request(&self) -> &CodeGeneratorRequest {
        &self.inner
    }

    /// A copy of the underlying request.
    pub fn to_code_generator_request(&self) -> CodeGeneratorRequest {
        self.inner.clone()
    }

    fn descriptors(
        &self,
        options: DescriptorOptions,
    ) -> Result<(&[FileDescriptorProto], &HashMap<String, usize>), Error> {
        if !options.source_retention {
            let index = self
                .proto_file_index
                .get_or_init(|| index_by_name(&self.inner.proto_file));
            return Ok((self.inner.proto_file.as_slice(), index));
        }
        if self.inner.source_file_descriptors.is_empty() {
            return Err(Error::MissingSourceRetentionData);
        }
        let index = self
            .source_file_index
            .get_or_init(|| index_by_name(&self.inner.source_file_descriptors));
        Ok((self.inner.source_file_descriptors.as_slice(), index))
    }

    fn encoded_descriptors(
        &self,
        options: DescriptorOptions,
    ) -> Result<(&[Vec<u8>], &HashMap<String, usize>), Error> {
        let (_, index) = self.descriptors(options)?;
        let encoded = if options.source_retention {
            &self.encoded.source_file_descriptors
        } else {
            &self.encoded.proto_file
        };
        Ok((encoded.as_slice(), index))
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("file_to_generate", &self.inner.file_to_generate)
            .field("parameter", &self.inner.parameter())
            .field("proto_files", &self.inner.proto_file.len())
            .finish_non_exhaustive()
    }
}

fn index_by_name(files: &[FileDescriptorProto]) -> HashMap<String, usize> {
    files
        .iter()
        .enumerate()
        .map(|(i, file)| (file.name().to_string(), i))
        .collect()
}

/// Version of the compiler that invoked the plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CompilerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Pre-release suffix such as `rc2`; empty for stable releases.
    pub suffix: String,
}

impl From<&Version> for CompilerVersion {
    fn from(version: &Version) -> Self {
        // Components were checked to be non-negative during validation.
        let component = |value: i32| u32::try_from(value).unwrap_or_default();
        Self {
            major: component(version.major()),
            minor: component(version.minor()),
            patch: component(version.patch()),
            suffix: version.suffix().to_string(),
        }
    }
}

impl fmt::Display for CompilerVersion {
    /// Formats as `major.minor[.patch][-suffix]`.
    ///
    /// Releases before 4.x numbered as `major.minor` omit a zero patch.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.major <= 3 && self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)?;
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        }
        if !self.suffix.is_empty() {
            write!(f, "-{}", self.suffix)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;
    use std::sync::Arc;

    fn descriptor(name: &str, package: &str) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some(package.to_string()),
            ..Default::default()
        }
    }

    fn raw_request() -> CodeGeneratorRequest {
        CodeGeneratorRequest {
            file_to_generate: vec!["c.proto".to_string(), "a.proto".to_string()],
            parameter: Some("paths=source_relative".to_string()),
            proto_file: vec![
                descriptor("b.proto", "b"),
                descriptor("a.proto", "a"),
                descriptor("c.proto", "c"),
            ],
            source_file_descriptors: Vec::new(),
            compiler_version: None,
        }
    }

    fn with_sources() -> CodeGeneratorRequest {
        let mut raw = raw_request();
        raw.source_file_descriptors = vec![
            descriptor("a.proto", "a.source"),
            descriptor("c.proto", "c.source"),
        ];
        raw
    }

    #[test]
    fn test_new_validates() {
        let err = Request::new(CodeGeneratorRequest::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Request(RequestError::Empty {
                field: "proto_file"
            })
        ));
    }

    #[test]
    fn test_accessors() {
        let request = Request::new(raw_request()).unwrap();
        assert_eq!(request.parameter(), "paths=source_relative");
        assert_eq!(request.files_to_generate(), ["c.proto", "a.proto"]);
        assert!(request.is_file_to_generate("a.proto"));
        assert!(!request.is_file_to_generate("b.proto"));
        assert_eq!(request.code_generator_request(), &raw_request());
        assert_eq!(request.to_code_generator_request(), raw_request());
    }

    #[test]
    fn test_protos_to_generate_follow_request_order() {
        let request = Request::new(raw_request()).unwrap();
        let files = request
            .file_descriptor_protos_to_generate(DescriptorOptions::new())
            .unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["c.proto", "a.proto"]);
    }

    #[test]
    fn test_source_retention_substitution() {
        let request = Request::new(with_sources()).unwrap();
        let options = DescriptorOptions::new().with_source_retention_options();

        let all = request.all_file_descriptor_protos(options).unwrap();
        let packages: Vec<_> = all.iter().map(|f| f.package()).collect();
        assert_eq!(packages, ["b", "a.source", "c.source"]);

        let plain = request
            .all_file_descriptor_protos(DescriptorOptions::new())
            .unwrap();
        let packages: Vec<_> = plain.iter().map(|f| f.package()).collect();
        assert_eq!(packages, ["b", "a", "c"]);

        let lookup = request.file_descriptor_proto("c.proto", options).unwrap();
        assert_eq!(lookup.map(|f| f.package()), Some("c.source"));
        let lookup = request.file_descriptor_proto("b.proto", options).unwrap();
        assert_eq!(lookup.map(|f| f.package()), Some("b"));
        assert!(
            request
                .file_descriptor_proto("missing.proto", options)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_encoded_descriptors_follow_decoded() {
        use prost::Message;

        let request = Request::new(with_sources()).unwrap();
        let options = DescriptorOptions::new().with_source_retention_options();

        let encoded = request.encoded_file_descriptors_to_generate(options).unwrap();
        let decoded = request.file_descriptor_protos_to_generate(options).unwrap();
        let reencoded: Vec<_> = decoded.iter().map(|file| file.encode_to_vec()).collect();
        assert_eq!(encoded, reencoded);

        let b = request.encoded_file_descriptor("b.proto", options).unwrap();
        assert_eq!(b, Some(descriptor("b.proto", "b").encode_to_vec().as_slice()));
        assert!(request.extension_retention().unwrap().is_empty());

        let tree = request.file_descriptor_tree("a.proto", options).unwrap().unwrap();
        assert_eq!(tree.to_proto().unwrap(), descriptor("a.proto", "a.source"));
    }

    #[test]
    fn test_missing_source_retention_data() {
        let request = Request::new(raw_request()).unwrap();
        let options = DescriptorOptions::new().with_source_retention_options();
        assert!(matches!(
            request.file_descriptor_protos_to_generate(options),
            Err(Error::MissingSourceRetentionData)
        ));
        assert!(matches!(
            request.all_file_descriptor_protos(options),
            Err(Error::MissingSourceRetentionData)
        ));
        // Non-target files never need source retention data.
        assert!(request.file_descriptor_proto("b.proto", options).is_ok());
    }

    #[test]
    fn test_index_built_once_under_concurrency() {
        let request = Arc::new(Request::new(with_sources()).unwrap());
        let addresses: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let request = Arc::clone(&request);
                    scope.spawn(move || {
                        let (_, index) = request.descriptors(DescriptorOptions::new()).unwrap();
                        index as *const HashMap<String, usize> as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_compiler_version_display() {
        let version = |major, minor, patch, suffix: &str| CompilerVersion {
            major,
            minor,
            patch,
            suffix: suffix.to_string(),
        };
        assert_eq!(version(3, 21, 0, "").to_string(), "3.21");
        assert_eq!(version(3, 21, 12, "").to_string(), "3.21.12");
        assert_eq!(version(5, 27, 0, "").to_string(), "5.27.0");
        assert_eq!(version(4, 0, 0, "rc2").to_string(), "4.0.0-rc2");
    }

    #[test]
    fn test_compiler_version_from_request() {
        let mut raw = raw_request();
        raw.compiler_version = Some(Version {
            major: Some(5),
            minor: Some(26),
            patch: Some(1),
            suffix: Some("alpha-1".to_string()),
        });
        let request = Request::new(raw).unwrap();
        let version = request.compiler_version().unwrap();
        assert_eq!(version.to_string(), "5.26.1-alpha-1");

        assert!(Request::new(raw_request()).unwrap().compiler_version().is_none());
    }
}
