//! The process environment a plugin runs in.

use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{Stdin, Stdout};

/// A shared, line-oriented diagnostics stream.
#[derive(Clone)]
pub struct ErrorStream {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl ErrorStream {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// The process's standard error.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Discard everything.
    pub fn sink() -> Self {
        Self::new(io::sink())
    }

    /// Write `line` followed by a newline, then flush.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")?;
        writer.flush()
    }
}

impl fmt::Debug for ErrorStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorStream").finish_non_exhaustive()
    }
}

/// Arguments, environment and standard streams for one plugin run.
///
/// `args` excludes the program name.
#[derive(Debug)]
pub struct Env<R, W> {
    pub args: Vec<String>,
    pub environ: Vec<(String, String)>,
    pub stdin: R,
    pub stdout: W,
    pub stderr: ErrorStream,
}

impl Env<Stdin, Stdout> {
    /// Capture the current process's arguments, environment and streams.
    pub fn from_process() -> Self {
        Self {
            args: std::env::args_os()
                .skip(1)
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            environ: std::env::vars_os()
                .map(|(key, value)| {
                    (
                        key.to_string_lossy().into_owned(),
                        value.to_string_lossy().into_owned(),
                    )
                })
                .collect(),
            stdin: tokio::io::stdin(),
            stdout: tokio::io::stdout(),
            stderr: ErrorStream::stderr(),
        }
    }
}

/// The part of [`Env`] a handler may use.
///
/// Standard input and output belong to the wire protocol and are withheld.
#[derive(Debug, Clone)]
pub struct HandlerEnv {
    environ: Vec<(String, String)>,
    stderr: ErrorStream,
}

impl HandlerEnv {
    pub fn new(environ: Vec<(String, String)>, stderr: ErrorStream) -> Self {
        Self { environ, stderr }
    }

    pub fn environ(&self) -> &[(String, String)] {
        &self.environ
    }

    /// Look up an environment variable; the last definition wins.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.environ
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn stderr(&self) -> &ErrorStream {
        &self.stderr
    }
}
