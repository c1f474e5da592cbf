//! The plugin lifecycle: arguments, stdin, handler, stdout, exit code.

use crate::config::Config;
use crate::env::{Env, ErrorStream, HandlerEnv};
use crate::error::{Error, Warning};
use crate::handler::{Handler, HandlerContext};
use crate::request::Request;
use crate::response::{ResponseWriter, WarningHandler};
use crate::validate::ValidationMode;
use protoplug_protocol::ProtocolError;
use std::fmt;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt as log_fmt, prelude::*};

const VERSION_FLAG: &str = "--version";

/// Options for [`run`] and [`main`].
#[derive(Clone, Default)]
pub struct RunOptions {
    version: Option<String>,
    warning_handler: Option<WarningHandler>,
    mode: ValidationMode,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print `version` and exit when invoked with `--version`.
    ///
    /// Without a version, `--version` is an unknown argument.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into()).filter(|v| !v.is_empty());
        self
    }

    /// Receive response warnings instead of having them printed to stderr.
    pub fn with_warning_handler(
        mut self,
        handler: impl Fn(&Warning) + Send + Sync + 'static,
    ) -> Self {
        self.warning_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_validation_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for [`ValidationMode::Lenient`].
    pub fn with_lenient_validation(self) -> Self {
        self.with_validation_mode(ValidationMode::Lenient)
    }

    /// Apply environment configuration. It can relax validation, never
    /// tighten it.
    pub fn with_config(self, config: &Config) -> Self {
        match config.validation_mode() {
            ValidationMode::Lenient => self.with_lenient_validation(),
            ValidationMode::Strict => self,
        }
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("version", &self.version)
            .field("warning_handler", &self.warning_handler.is_some())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Run one plugin invocation against `env`.
///
/// Reads a request from `env.stdin` until EOF, validates it, invokes
/// `handler`, validates the response and writes it to `env.stdout`.
/// `cancellation` is passed through to the handler.
pub async fn run<H, R, W>(
    env: Env<R, W>,
    handler: &H,
    options: &RunOptions,
    cancellation: CancellationToken,
) -> Result<(), Error>
where
    H: Handler,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Env {
        args,
        environ,
        mut stdin,
        mut stdout,
        stderr,
    } = env;

    if let Some(version) = version_requested(&args, options.version.as_deref())? {
        write_all(&mut stdout, format!("{version}\n").as_bytes()).await?;
        return Ok(());
    }

    let mut input = Vec::new();
    stdin
        .read_to_end(&mut input)
        .await
        .map_err(ProtocolError::from)?;
    let request = Request::from_bytes(&input)?;
    tracing::debug!(
        files_to_generate = request.files_to_generate().len(),
        proto_files = request.code_generator_request().proto_file.len(),
        parameter = request.parameter(),
        "Received CodeGeneratorRequest"
    );

    let on_warning = options
        .warning_handler
        .clone()
        .unwrap_or_else(|| print_warnings(stderr.clone()));
    let response = ResponseWriter::new(options.mode, on_warning);
    let ctx = HandlerContext::new(cancellation, HandlerEnv::new(environ, stderr));

    handler
        .handle(ctx, response.clone(), Arc::new(request))
        .await
        .map_err(Error::from_handler)?;

    let response = response.finalize()?;
    tracing::debug!(
        files = response.file.len(),
        has_error = response.error.is_some(),
        "Writing CodeGeneratorResponse"
    );
    write_all(&mut stdout, &response.to_bytes()).await
}

/// `Some(version)` for a lone `--version` when a version is configured.
fn version_requested<'a>(args: &[String], version: Option<&'a str>) -> Result<Option<&'a str>, Error> {
    match (args, version) {
        ([], _) => Ok(None),
        ([flag], Some(version)) if flag == VERSION_FLAG => Ok(Some(version)),
        _ => Err(Error::UnknownArguments(args.to_vec())),
    }
}

async fn write_all<W: AsyncWrite + Unpin>(stdout: &mut W, bytes: &[u8]) -> Result<(), Error> {
    stdout.write_all(bytes).await.map_err(ProtocolError::from)?;
    stdout.flush().await.map_err(ProtocolError::from)?;
    Ok(())
}

fn print_warnings(stderr: ErrorStream) -> WarningHandler {
    Arc::new(move |warning: &Warning| {
        if let Err(error) = stderr.write_line(&format!("Warning: {warning}")) {
            tracing::debug!(%error, "Failed to write warning");
        }
    })
}

/// Run `handler` as the current process and return its exit code.
///
/// Intended to be the whole body of a plugin's `main`:
///
/// ```no_run
/// use protoplug::{HandlerContext, HandlerError, Request, ResponseWriter, RunOptions};
/// use std::process::ExitCode;
/// use std::sync::Arc;
///
/// async fn generate(
///     _ctx: HandlerContext,
///     response: ResponseWriter,
///     request: Arc<Request>,
/// ) -> Result<(), HandlerError> {
///     for path in request.files_to_generate() {
///         response.add_file(format!("{path}.txt"), "")?;
///     }
///     Ok(())
/// }
///
/// fn main() -> ExitCode {
///     protoplug::main(generate, RunOptions::new().with_version("0.1.0"))
/// }
/// ```
pub fn main<H: Handler>(handler: H, options: RunOptions) -> ExitCode {
    let stderr = ErrorStream::stderr();
    let config = match Config::load() {
        Ok(config) => config,
        Err(error) => return report(&stderr, &format!("invalid configuration: {error}")),
    };
    if let Err(error) = init_logging(&config.log_level) {
        return report(&stderr, &format!("failed to initialize logging: {error}"));
    }
    let options = options.with_config(&config);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => return report(&stderr, &format!("failed to start runtime: {error}")),
    };

    let result = runtime.block_on(async {
        let cancellation = CancellationToken::new();
        let listener = tokio::spawn(cancel_on_interrupt(cancellation.clone()));
        let result = run(Env::from_process(), &handler, &options, cancellation).await;
        listener.abort();
        result
    });
    ExitCode::from(exit_status(result, &stderr))
}

fn exit_status(result: Result<(), Error>, stderr: &ErrorStream) -> u8 {
    match result {
        Ok(()) => 0,
        // The subprocess already printed whatever it had to say.
        Err(Error::Exit(exit)) => u8::try_from(exit.code()).unwrap_or(1),
        Err(error) => {
            let message = error.to_string();
            if !message.is_empty() {
                let _ = stderr.write_line(&message);
            }
            1
        }
    }
}

fn report(stderr: &ErrorStream, message: &str) -> ExitCode {
    // Nowhere left to report a failing stderr.
    let _ = stderr.write_line(message);
    ExitCode::FAILURE
}

fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    // stdout carries the response; logs go to stderr.
    tracing_subscriber::registry()
        .with(log_fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init()?;

    Ok(())
}

async fn cancel_on_interrupt(cancellation: CancellationToken) {
    match interrupt().await {
        Ok(signal) => {
            tracing::info!(signal, "Received interrupt, cancelling handler");
            cancellation.cancel();
        }
        Err(error) => tracing::warn!(%error, "Failed to listen for interrupt signals"),
    }
}

#[cfg(unix)]
async fn interrupt() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn interrupt() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}
