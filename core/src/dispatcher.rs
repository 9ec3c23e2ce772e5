//! Command routing.
//!
//! Maps `init`, `generate` and `shutdown` onto the model controller and
//! turns every outcome into a [`Reply`]. Nothing below the dispatcher can
//! crash it: errors become error replies and panics are caught at the top.

use crate::controller::{panic_message, ModelController};
use crate::protocol::{CommandEnvelope, CommandResponse, Reply, SynthesisRequest};
use crate::shutdown::ShutdownSignal;
use crate::{ChatterboxError, Result};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Delay between acknowledging `shutdown` and stopping the server.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Init,
    Generate,
    Shutdown,
}

impl Command {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "init" => Some(Command::Init),
            "generate" => Some(Command::Generate),
            "shutdown" => Some(Command::Shutdown),
            _ => None,
        }
    }
}

pub struct CommandDispatcher {
    controller: Arc<ModelController>,
    shutdown: ShutdownSignal,
    grace: Duration,
}

impl CommandDispatcher {
    pub fn new(controller: Arc<ModelController>, shutdown: ShutdownSignal) -> Self {
        Self {
            controller,
            shutdown,
            grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn controller(&self) -> &Arc<ModelController> {
        &self.controller
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Liveness payload.
    pub fn health(&self) -> CommandResponse {
        CommandResponse::success("Server is running")
    }

    /// Parse a raw request body and dispatch it.
    pub async fn dispatch_bytes(&self, body: &[u8]) -> Reply {
        match CommandEnvelope::from_slice(body) {
            Ok(envelope) => self.dispatch(envelope).await,
            Err(e) => reply_for_error(&e),
        }
    }

    /// Dispatch one command. Never panics and never returns an error.
    pub async fn dispatch(&self, envelope: CommandEnvelope) -> Reply {
        match AssertUnwindSafe(self.route(envelope)).catch_unwind().await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => reply_for_error(&e),
            Err(payload) => {
                let err = ChatterboxError::Internal(panic_message(&*payload));
                reply_for_error(&err)
            }
        }
    }

    async fn route(&self, envelope: CommandEnvelope) -> Result<Reply> {
        let Some(name) = envelope.command else {
            return Err(ChatterboxError::UnknownCommand("<missing>".to_string()));
        };
        match Command::parse(&name) {
            Some(Command::Init) => self.handle_init().await,
            Some(Command::Generate) => self.handle_generate(&envelope.parameters).await,
            Some(Command::Shutdown) => Ok(self.handle_shutdown()),
            None => Err(ChatterboxError::UnknownCommand(name)),
        }
    }

    async fn handle_init(&self) -> Result<Reply> {
        let device = self.controller.initialize().await?;
        Ok(Reply::ok(CommandResponse::initialized(&device)))
    }

    async fn handle_generate(&self, parameters: &serde_json::Value) -> Result<Reply> {
        if !self.controller.is_initialized().await {
            return Err(ChatterboxError::NotInitialized);
        }
        let request = SynthesisRequest::from_parameters(parameters)?;
        let result = self.controller.generate_speech(&request).await?;
        Ok(Reply::ok(result.into()))
    }

    fn handle_shutdown(&self) -> Reply {
        info!(target: "dispatcher", grace_ms = self.grace.as_millis() as u64, "Shutdown requested");
        self.shutdown.schedule(self.grace);
        Reply::ok(CommandResponse::success("Server shutting down"))
    }
}

fn reply_for_error(err: &ChatterboxError) -> Reply {
    if err.is_validation() {
        warn!(target: "dispatcher", error = %err, "Rejected command");
    } else {
        error!(target: "dispatcher", error = %err, "Error handling command");
    }
    let mut reply = Reply::from_error(err);
    if let ChatterboxError::SynthesisFailed { .. } = err {
        reply.body.message = Some(format!("Generation failed: {}", err));
    }
    reply
}
