//! Path validation and normalization for descriptor and output file paths.
//!
//! Paths in the plugin protocol are relative, `/`-separated, and never step
//! outside of the directory they are resolved against. Normalization is purely
//! lexical and identical on every platform: both `/` and `\` separate elements.

use thiserror::Error;

/// Extension required on descriptor paths.
pub const PROTO_EXTENSION: &str = ".proto";

/// Why a path was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path was empty")]
    Empty,

    #[error("path {0:?} should be relative")]
    Absolute(String),

    #[error("path {0:?} should not jump context")]
    JumpsContext(String),

    /// The path is valid but not given in its canonical form.
    #[error("path {path:?} to be given as {normalized:?}")]
    Unnormalized { path: String, normalized: String },

    #[error("path {0:?} should have the .proto file extension")]
    NotProto(String),
}

/// Validate `path` and return its canonical form.
///
/// This does not require `path` to already be canonical; callers compare the
/// result against their input when that distinction matters.
pub fn normalize_path(path: &str) -> Result<String, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    let normalized = clean(path);
    if normalized.starts_with('/') {
        return Err(PathError::Absolute(normalized));
    }
    if normalized == ".." || normalized.starts_with("../") {
        return Err(PathError::JumpsContext(normalized));
    }
    Ok(normalized)
}

/// Like [`normalize_path`], additionally requiring the `.proto` extension.
pub fn normalize_proto_path(path: &str) -> Result<String, PathError> {
    let normalized = normalize_path(path)?;
    if !normalized.ends_with(PROTO_EXTENSION) {
        return Err(PathError::NotProto(normalized));
    }
    Ok(normalized)
}

/// Require `path` to be a valid descriptor path that is already canonical.
pub fn check_proto_path(path: &str) -> Result<(), PathError> {
    let normalized = normalize_path(path)?;
    if normalized != path {
        return Err(PathError::Unnormalized {
            path: path.to_string(),
            normalized,
        });
    }
    if !normalized.ends_with(PROTO_EXTENSION) {
        return Err(PathError::NotProto(normalized));
    }
    Ok(())
}

/// Lexically clean a path: collapse separators, `.` and `..` elements.
fn clean(path: &str) -> String {
    let rooted = path.starts_with(['/', '\\']);
    let mut elements: Vec<&str> = Vec::new();
    for element in path.split(['/', '\\']) {
        match element {
            "" | "." => {}
            ".." => {
                if elements.last().is_some_and(|last| *last != "..") {
                    elements.pop();
                } else if !rooted {
                    // `..` at the root stays at the root.
                    elements.push("..");
                }
            }
            _ => elements.push(element),
        }
    }
    let joined = elements.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_path_unchanged() {
        for path in ["a", "a/b", "a/b/c.proto", "foo.txt", "a/b.c/d"] {
            assert_eq!(normalize_path(path).unwrap(), path);
        }
    }

    #[test]
    fn test_clean_collapses_elements() {
        assert_eq!(normalize_path("a/../b").unwrap(), "b");
        assert_eq!(normalize_path("./a//b/").unwrap(), "a/b");
        assert_eq!(normalize_path("a/./b/../c").unwrap(), "a/c");
        assert_eq!(normalize_path("a\\b\\c.proto").unwrap(), "a/b/c.proto");
        assert_eq!(normalize_path("a/..").unwrap(), ".");
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(normalize_path(""), Err(PathError::Empty));
    }

    #[test]
    fn test_absolute_rejected() {
        assert_eq!(
            normalize_path("/a/b"),
            Err(PathError::Absolute("/a/b".to_string()))
        );
        assert_eq!(
            normalize_path("\\a"),
            Err(PathError::Absolute("/a".to_string()))
        );
        // Climbing above the root is still absolute.
        assert_eq!(
            normalize_path("/../a"),
            Err(PathError::Absolute("/a".to_string()))
        );
    }

    #[test]
    fn test_jumping_context_rejected() {
        assert_eq!(
            normalize_path("../a"),
            Err(PathError::JumpsContext("../a".to_string()))
        );
        assert_eq!(
            normalize_path("a/../../b"),
            Err(PathError::JumpsContext("../b".to_string()))
        );
        assert_eq!(
            normalize_path(".."),
            Err(PathError::JumpsContext("..".to_string()))
        );
    }

    #[test]
    fn test_dotdot_inside_name_is_fine() {
        assert_eq!(normalize_path("a/..b").unwrap(), "a/..b");
        assert_eq!(normalize_path("...").unwrap(), "...");
    }

    #[test]
    fn test_proto_extension() {
        assert_eq!(normalize_proto_path("a/./b.proto").unwrap(), "a/b.proto");
        assert_eq!(
            normalize_proto_path("a/b.txt"),
            Err(PathError::NotProto("a/b.txt".to_string()))
        );
    }

    #[test]
    fn test_check_proto_path() {
        assert!(check_proto_path("foo/bar.proto").is_ok());
        assert_eq!(
            check_proto_path("foo//bar.proto"),
            Err(PathError::Unnormalized {
                path: "foo//bar.proto".to_string(),
                normalized: "foo/bar.proto".to_string(),
            })
        );
        assert_eq!(
            check_proto_path("foo/bar"),
            Err(PathError::NotProto("foo/bar".to_string()))
        );
    }

    #[test]
    fn test_error_messages_quote_paths() {
        let err = normalize_path("../x").unwrap_err();
        assert_eq!(err.to_string(), "path \"../x\" should not jump context");
    }
}
