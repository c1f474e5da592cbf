//! Structural validation of requests and responses.
//!
//! Request validation is read-only and stops at the first violation.
//! Response validation normalizes in three passes:
//!
//! 1. Records without a name are merged into the preceding record.
//! 2. Names are normalized and duplicates removed ([`ValidationMode`] decides
//!    whether these are errors or warnings).
//! 3. Feature bits and edition bounds are checked.

use crate::error::{RequestError, ResponseError, ResponseIssue, Warning};
use protoplug_protocol::prost_types::FileDescriptorProto;
use protoplug_protocol::{
    CodeGeneratorRequest, CodeGeneratorResponse, Features, File, Version, check_proto_path,
    normalize_path,
};
use std::collections::HashSet;

/// How recoverable response issues are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Unnormalized or duplicate file names are errors.
    #[default]
    Strict,
    /// Unnormalized names are rewritten, later duplicates are dropped, and a
    /// warning is emitted for each.
    Lenient,
}

impl ValidationMode {
    fn report(
        self,
        issue: ResponseIssue,
        on_warning: &dyn Fn(&Warning),
    ) -> Result<(), ResponseError> {
        match self {
            Self::Strict => Err(ResponseError::Issue(issue)),
            Self::Lenient => {
                on_warning(&Warning::new(issue));
                Ok(())
            }
        }
    }
}

/// Field names used in error messages for one descriptor list.
struct DescriptorList {
    field: &'static str,
    name: &'static str,
    dependency: &'static str,
}

const PROTO_FILE: DescriptorList = DescriptorList {
    field: "proto_file",
    name: "proto_file.name",
    dependency: "proto_file.dependency",
};

const SOURCE_FILE_DESCRIPTORS: DescriptorList = DescriptorList {
    field: "source_file_descriptors",
    name: "source_file_descriptors.name",
    dependency: "source_file_descriptors.dependency",
};

/// Check a decoded request against the plugin contract.
pub fn validate_request(request: &CodeGeneratorRequest) -> Result<(), RequestError> {
    if request.proto_file.is_empty() {
        return Err(RequestError::Empty {
            field: "proto_file",
        });
    }
    if request.file_to_generate.is_empty() {
        return Err(RequestError::Empty {
            field: "file_to_generate",
        });
    }
    let to_generate = check_unique_paths("file_to_generate", &request.file_to_generate)?;

    check_descriptors(&PROTO_FILE, &request.proto_file, &request.file_to_generate)?;
    if !request.source_file_descriptors.is_empty() {
        let names = check_descriptors(
            &SOURCE_FILE_DESCRIPTORS,
            &request.source_file_descriptors,
            &request.file_to_generate,
        )?;
        // Exactly the files to generate, no more.
        if let Some(extra) = names.iter().find(|name| !to_generate.contains(*name)) {
            return Err(RequestError::UnexpectedDescriptor {
                field: SOURCE_FILE_DESCRIPTORS.field,
                path: extra.to_string(),
            });
        }
    }

    if let Some(version) = &request.compiler_version {
        check_version(version)?;
    }
    Ok(())
}

fn check_unique_paths<'a>(
    field: &'static str,
    paths: &'a [String],
) -> Result<HashSet<&'a str>, RequestError> {
    let mut seen = HashSet::with_capacity(paths.len());
    for path in paths {
        check_proto_path(path).map_err(|source| RequestError::InvalidPath { field, source })?;
        if !seen.insert(path.as_str()) {
            return Err(RequestError::DuplicatePath {
                field,
                path: path.clone(),
            });
        }
    }
    Ok(seen)
}

/// Validate one descriptor list and require it to cover `to_generate`.
///
/// Returns descriptor names in list order.
fn check_descriptors<'a>(
    list: &DescriptorList,
    descriptors: &'a [FileDescriptorProto],
    to_generate: &[String],
) -> Result<Vec<&'a str>, RequestError> {
    let mut names = Vec::with_capacity(descriptors.len());
    let mut seen = HashSet::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let name = descriptor.name();
        check_proto_path(name).map_err(|source| RequestError::InvalidPath {
            field: list.name,
            source,
        })?;
        check_unique_paths(list.dependency, &descriptor.dependency)?;
        if !seen.insert(name) {
            return Err(RequestError::DuplicatePath {
                field: list.field,
                path: name.to_string(),
            });
        }
        names.push(name);
    }
    if let Some(missing) = to_generate.iter().find(|path| !seen.contains(path.as_str())) {
        return Err(RequestError::MissingDescriptor {
            field: list.field,
            path: missing.clone(),
        });
    }
    Ok(names)
}

fn check_version(version: &Version) -> Result<(), RequestError> {
    for (component, value) in [
        ("major", version.major()),
        ("minor", version.minor()),
        ("patch", version.patch()),
    ] {
        if value < 0 {
            return Err(RequestError::NegativeVersion { component, value });
        }
    }
    Ok(())
}

/// Validate `response` and return its normalized form.
///
/// `on_warning` is only called in [`ValidationMode::Lenient`].
pub fn normalize_response(
    mut response: CodeGeneratorResponse,
    mode: ValidationMode,
    on_warning: &dyn Fn(&Warning),
) -> Result<CodeGeneratorResponse, ResponseError> {
    let merged = merge_continuations(std::mem::take(&mut response.file))?;
    response.file = reconcile_names(merged, mode, on_warning)?;
    check_features(&response)?;
    Ok(response)
}

/// Fold nameless records into the record before them.
fn merge_continuations(files: Vec<File>) -> Result<Vec<File>, ResponseError> {
    let mut files = files.into_iter();
    let Some(mut current) = files.next() else {
        return Ok(Vec::new());
    };
    if current.name().is_empty() {
        return Err(ResponseError::EmptyLeadingFileName);
    }

    let mut merged = Vec::with_capacity(files.len() + 1);
    for file in files {
        if !file.name().is_empty() {
            merged.push(std::mem::replace(&mut current, file));
            continue;
        }
        if !file.insertion_point().is_empty() {
            return Err(ResponseError::EmptyNameWithInsertionPoint);
        }
        if let Some(content) = file.content {
            current.content.get_or_insert_with(String::new).push_str(&content);
        }
    }
    merged.push(current);
    Ok(merged)
}

/// Normalize names and drop duplicates, keeping the first occurrence.
///
/// Insertion-point records may share a name with any other record.
fn reconcile_names(
    files: Vec<File>,
    mode: ValidationMode,
    on_warning: &dyn Fn(&Warning),
) -> Result<Vec<File>, ResponseError> {
    let mut names = HashSet::with_capacity(files.len());
    let mut reconciled = Vec::with_capacity(files.len());
    for mut file in files {
        let name = file.name().to_string();
        let normalized = normalize_path(&name).map_err(ResponseError::InvalidPath)?;
        if normalized != name {
            mode.report(
                ResponseIssue::UnnormalizedFileName {
                    name,
                    normalized: normalized.clone(),
                },
                on_warning,
            )?;
            file.name = Some(normalized.clone());
        }
        if file.insertion_point().is_empty() && names.contains(&normalized) {
            mode.report(
                ResponseIssue::DuplicateFileName { name: normalized },
                on_warning,
            )?;
            continue;
        }
        names.insert(normalized);
        reconciled.push(file);
    }
    Ok(reconciled)
}

fn check_features(response: &CodeGeneratorResponse) -> Result<(), ResponseError> {
    let features = Features::from_known_bits(response.supported_features())?;
    if !features.contains(Features::SUPPORTS_EDITIONS) {
        return Ok(());
    }
    let minimum = response.minimum_edition();
    let maximum = response.maximum_edition();
    if minimum == 0 {
        return Err(ResponseError::MissingMinimumEdition);
    }
    if maximum == 0 {
        return Err(ResponseError::MissingMaximumEdition);
    }
    if minimum > maximum {
        return Err(ResponseError::InvertedEditions { minimum, maximum });
    }
    Ok(())
}
