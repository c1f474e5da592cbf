//! protoplug - Runtime for writing protobuf compiler plugins.
//!
//! A plugin is a [`Handler`] that reads a validated [`Request`] and fills in a
//! [`ResponseWriter`]. [`main`] takes care of everything around it:
//!
//! - `--version` handling and rejection of other arguments
//! - reading and validating the `CodeGeneratorRequest` from stdin
//! - normalizing and validating the `CodeGeneratorResponse`
//! - writing the response to stdout and mapping failures to exit codes
//! - cancelling the handler on SIGINT or SIGTERM
//!
//! [`run`] is the same lifecycle against an explicit [`Env`], for tests and
//! embedding.
//!
//! # Configuration
//!
//! [`main`] reads `PROTOPLUG_LOG_LEVEL` and `PROTOPLUG_LENIENT` from the
//! environment (see [`Config`]). Logs are written to stderr.

mod config;
mod env;
mod error;
mod handler;
mod request;
mod response;
pub mod retention;
mod run;
mod validate;

pub use config::{Config, ENV_PREFIX};
pub use env::{Env, ErrorStream, HandlerEnv};
pub use error::{
    Error, ExitError, HandlerError, RequestError, ResponseError, ResponseIssue, Warning,
};
pub use handler::{Handler, HandlerContext};
pub use request::{CompilerVersion, DescriptorOptions, Request};
pub use response::{ResponseWriter, WarningHandler};
pub use run::{RunOptions, main, run};
pub use validate::{ValidationMode, normalize_response, validate_request};

pub use protoplug_protocol as protocol;
pub use tokio_util::sync::CancellationToken;
