// Chatterbox Core Library
// Command/session lifecycle for a local text-to-speech server

pub mod backend;
pub mod controller;
pub mod device;
pub mod dispatcher;
pub mod fallback;
pub mod protocol;
pub mod shutdown;

// Export core types
pub use backend::{
    Availability, BackendError, Capabilities, FallbackKind, SynthesisBackend, SynthesisJob,
    TuningParams, TuningValues,
};
pub use controller::{ModelController, ModelSession};
pub use device::{DeviceDescriptor, DeviceKind, HostPlatform};
pub use dispatcher::{Command, CommandDispatcher, DEFAULT_SHUTDOWN_GRACE};
pub use fallback::{FallbackClip, FallbackError, FallbackSynthesizer};
pub use protocol::{
    CommandEnvelope, CommandResponse, Reply, ReplyCode, ResponseStatus, SynthesisRequest,
    SynthesisResult,
};
pub use shutdown::ShutdownSignal;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatterboxError {
    #[error("Model not initialized")]
    NotInitialized,

    #[error("Missing required parameters: text and output_path")]
    MissingParameters,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid request body: {0}")]
    InvalidRequest(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Failed to initialize model: {0}")]
    InitializationFailed(String),

    #[error("Speech generation failed: {original}, fallback also failed: {fallback}")]
    SynthesisFailed { original: String, fallback: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl ChatterboxError {
    /// Validation errors are reported before anything is attempted.
    /// A body that is not a command envelope at all is not one of them.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChatterboxError::NotInitialized
                | ChatterboxError::MissingParameters
                | ChatterboxError::InvalidParameters(_)
                | ChatterboxError::UnknownCommand(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChatterboxError>;
