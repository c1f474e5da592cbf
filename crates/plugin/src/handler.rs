//! The user-supplied generation step.

use crate::env::HandlerEnv;
use crate::error::HandlerError;
use crate::request::Request;
use crate::response::ResponseWriter;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-run context handed to a [`Handler`].
#[derive(Debug, Clone)]
pub struct HandlerContext {
    cancellation: CancellationToken,
    env: HandlerEnv,
}

impl HandlerContext {
    pub fn new(cancellation: CancellationToken, env: HandlerEnv) -> Self {
        Self { cancellation, env }
    }

    /// Cancelled when the process receives an interrupt or terminate signal.
    ///
    /// Handlers doing long work should check it or `select!` on
    /// [`CancellationToken::cancelled`].
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn env(&self) -> &HandlerEnv {
        &self.env
    }
}

/// Produces a response for a validated request.
///
/// Implemented for any `Fn(HandlerContext, ResponseWriter, Arc<Request>)`
/// returning a future, so async functions and closures can be used directly.
/// Returning [`crate::ExitError`] exits with that code and no message.
pub trait Handler {
    fn handle(
        &self,
        ctx: HandlerContext,
        response: ResponseWriter,
        request: Arc<Request>,
    ) -> impl Future<Output = Result<(), HandlerError>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(HandlerContext, ResponseWriter, Arc<Request>) -> Fut,
    Fut: Future<Output = Result<(), HandlerError>>,
{
    fn handle(
        &self,
        ctx: HandlerContext,
        response: ResponseWriter,
        request: Arc<Request>,
    ) -> impl Future<Output = Result<(), HandlerError>> {
        self(ctx, response, request)
    }
}
