//! Error types for the plugin runtime.
//!
//! Validation fails fast with exactly one error. Recoverable response issues
//! ([`ResponseIssue`]) render either as a hard error or as a [`Warning`],
//! depending on the validation mode, from the same value.

use crate::retention::TreeError;
use protoplug_protocol::{PathError, ProtocolError, UnknownFeatures};
use std::fmt;
use std::process::ExitStatus;
use thiserror::Error;

/// Error type returned by [`crate::Handler`] implementations.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error for running a plugin.
#[derive(Debug, Error)]
pub enum Error {
    /// The compiler sent a request that violates the plugin contract.
    #[error("CodeGeneratorRequest: {0}")]
    Request(#[from] RequestError),

    /// The handler produced a response that violates the plugin contract.
    #[error("CodeGeneratorResponse: {0}")]
    Response(#[from] ResponseError),

    /// Reading, decoding or writing the wire payload failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The plugin was invoked with arguments it does not understand.
    #[error("{}", unknown_arguments_message(.0))]
    UnknownArguments(Vec<String>),

    /// The response was used after it had been finalized.
    #[error("CodeGeneratorResponse: already finalized")]
    AlreadyFinalized,

    /// Source-retention descriptors were requested but the compiler did not send them.
    #[error(
        "source_file_descriptors not set on CodeGeneratorRequest but source-retention options requested - you likely need to upgrade your protobuf compiler"
    )]
    MissingSourceRetentionData,

    /// An encoded descriptor in the request could not be read.
    #[error("CodeGeneratorRequest: {0}")]
    Descriptor(#[from] TreeError),

    /// A subprocess already reported its failure; only its exit code remains.
    #[error(transparent)]
    Exit(#[from] ExitError),

    /// Any other error returned by a handler.
    #[error("{0}")]
    Handler(HandlerError),
}

impl Error {
    /// Recover library errors and exit codes from a boxed handler error.
    ///
    /// An [`ExitError`] anywhere in the `source()` chain wins, so handlers may
    /// wrap it in their own error types.
    pub fn from_handler(error: HandlerError) -> Self {
        let error = match error.downcast::<Error>() {
            Ok(error) => return *error,
            Err(error) => error,
        };
        match exit_in_chain(&*error) {
            Some(exit) => Self::Exit(exit),
            None => Self::Handler(error),
        }
    }
}

fn exit_in_chain(error: &(dyn std::error::Error + 'static)) -> Option<ExitError> {
    let mut current = Some(error);
    while let Some(error) = current {
        if let Some(exit) = error.downcast_ref::<ExitError>() {
            return Some(*exit);
        }
        if let Some(Error::Exit(exit)) = error.downcast_ref::<Error>() {
            return Some(*exit);
        }
        current = error.source();
    }
    None
}

fn unknown_arguments_message(args: &[String]) -> String {
    match args {
        [arg] => format!("unknown argument: {arg}"),
        _ => format!("unknown arguments: {}", args.join(" ")),
    }
}

/// A violation found while validating a `CodeGeneratorRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("{field}: empty")]
    Empty { field: &'static str },

    #[error("{field}: {source}")]
    InvalidPath {
        field: &'static str,
        source: PathError,
    },

    #[error("{field}: duplicate path {path:?}")]
    DuplicatePath { field: &'static str, path: String },

    /// A `file_to_generate` entry has no descriptor in `field`.
    #[error("file_to_generate: path {path:?} is not contained within {field}")]
    MissingDescriptor { field: &'static str, path: String },

    /// A descriptor in `field` is not listed in `file_to_generate`.
    #[error("{field}: path {path:?} is not contained within file_to_generate")]
    UnexpectedDescriptor { field: &'static str, path: String },

    #[error("compiler_version: {component}: negative: {value}")]
    NegativeVersion { component: &'static str, value: i32 },
}

/// A violation found while building or validating a `CodeGeneratorResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// The first file record continues a file that does not exist.
    #[error("file: first value had no name set")]
    EmptyLeadingFileName,

    #[error("file: empty name with non-empty insertion point")]
    EmptyNameWithInsertionPoint,

    #[error("file: name: empty")]
    EmptyFileName,

    #[error("file: {0}")]
    InvalidPath(PathError),

    /// A recoverable issue reported as an error in strict mode.
    #[error("file: {0}")]
    Issue(ResponseIssue),

    #[error("supported_features: {0}")]
    UnknownFeatures(#[from] UnknownFeatures),

    #[error("supported_features: FEATURE_SUPPORTS_EDITIONS specified but no minimum_edition set")]
    MissingMinimumEdition,

    #[error("supported_features: FEATURE_SUPPORTS_EDITIONS specified but no maximum_edition set")]
    MissingMaximumEdition,

    #[error("minimum_edition {minimum} is greater than maximum_edition {maximum}")]
    InvertedEditions { minimum: i32, maximum: i32 },
}

/// A response file problem that lenient validation can repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseIssue {
    /// The name is valid but not canonical; lenient mode rewrites it.
    UnnormalizedFileName { name: String, normalized: String },
    /// A second file with this name; lenient mode keeps the first one.
    DuplicateFileName { name: String },
}

impl ResponseIssue {
    fn render(&self, f: &mut fmt::Formatter<'_>, as_warning: bool) -> fmt::Result {
        match self {
            Self::UnnormalizedFileName { name, normalized } => {
                write!(
                    f,
                    "path {name:?} is not equal to {normalized:?}, and therefore does not conform to the Protobuf generation specification. \
                     The path must be non-empty, relative, use \"/\" instead of \"\\\" as the path separator, and not use \".\" or \"..\" as part of the path."
                )?;
                if as_warning {
                    f.write_str(
                        " Generation will continue without error here, but please raise an issue with the maintainer of the plugin.",
                    )?;
                }
            }
            Self::DuplicateFileName { name } => {
                write!(f, "duplicate generated file name {name:?}.")?;
                if as_warning {
                    f.write_str(
                        " Generation will continue without error here and drop the second occurrence of this file, \
                         but please raise an issue with the maintainer of the plugin.",
                    )?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ResponseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, false)
    }
}

impl std::error::Error for ResponseIssue {}

/// A non-fatal [`ResponseIssue`] delivered to the warning handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    issue: ResponseIssue,
}

impl Warning {
    pub fn new(issue: ResponseIssue) -> Self {
        Self { issue }
    }

    pub fn issue(&self) -> &ResponseIssue {
        &self.issue
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.issue.render(f, true)
    }
}

/// An exit code from a subprocess whose output was already forwarded.
///
/// Returning this from a handler makes the plugin exit with the same code
/// without printing anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("exit status {code}")]
pub struct ExitError {
    code: i32,
}

impl ExitError {
    pub fn new(code: i32) -> Self {
        Self { code }
    }

    /// Wrap a failed subprocess status. Returns `None` for success.
    pub fn from_status(status: ExitStatus) -> Option<Self> {
        if status.success() {
            return None;
        }
        // Killed by a signal: no code to forward.
        Some(Self::new(status.code().unwrap_or(1)))
    }

    pub fn code(&self) -> i32 {
        self.code
    }
}
