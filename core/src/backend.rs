use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors a synthesis backend may report.
///
/// Every variant is masked by the fallback synthesizer; [`BackendError::fallback_kind`]
/// decides how the mask is reported to the caller.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("synthesis backend not installed: {0}")]
    NotInstalled(String),

    #[error("voice model not found: {0}")]
    ModelNotFound(String),

    #[error("invalid synthesis parameters: {0}")]
    InvalidParameters(String),

    #[error("synthesis engine failed: {0}")]
    EngineFailed(String),

    #[error("synthesis timed out after {0} ms")]
    Timeout(u64),

    #[error("synthesis engine crashed: {0}")]
    Crashed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a masked backend error is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackKind {
    /// The backend cannot run at all on this host.
    Unavailable,
    /// The backend ran and failed for this request.
    Failed,
}

impl BackendError {
    pub fn fallback_kind(&self) -> FallbackKind {
        match self {
            BackendError::NotInstalled(_) | BackendError::ModelNotFound(_) => {
                FallbackKind::Unavailable
            }
            BackendError::InvalidParameters(_)
            | BackendError::EngineFailed(_)
            | BackendError::Timeout(_)
            | BackendError::Crashed(_)
            | BackendError::Io(_) => FallbackKind::Failed,
        }
    }
}

/// Result of probing a backend at initialization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Availability {
    Ready { engine: String },
    Unavailable { reason: String },
}

impl Availability {
    pub fn is_ready(&self) -> bool {
        matches!(self, Availability::Ready { .. })
    }
}

/// Generation tuning values as supplied by the caller.
///
/// Values are advisory and passed through without range checks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TuningParams {
    pub exaggeration: f32,
    pub cfg_weight: f32,
    pub temperature: f32,
    pub repetition_penalty: f32,
    pub min_p: f32,
    pub top_p: f32,
}

impl Default for TuningParams {
    fn default() -> Self {
        Self {
            exaggeration: 0.5,
            cfg_weight: 0.5,
            temperature: 0.8,
            repetition_penalty: 1.2,
            min_p: 0.05,
            top_p: 1.0,
        }
    }
}

/// What a backend is able to honour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub voice_prompt: bool,
    pub exaggeration: bool,
    pub cfg_weight: bool,
    pub temperature: bool,
    pub repetition_penalty: bool,
    pub min_p: bool,
    pub top_p: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            voice_prompt: true,
            exaggeration: true,
            cfg_weight: true,
            temperature: true,
            repetition_penalty: true,
            min_p: true,
            top_p: true,
        }
    }
}

/// Tuning values restricted to a backend's capabilities.
/// `None` marks a parameter the backend does not support.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TuningValues {
    pub exaggeration: Option<f32>,
    pub cfg_weight: Option<f32>,
    pub temperature: Option<f32>,
    pub repetition_penalty: Option<f32>,
    pub min_p: Option<f32>,
    pub top_p: Option<f32>,
}

impl TuningParams {
    pub fn restrict_to(&self, caps: &Capabilities) -> TuningValues {
        let keep = |supported: bool, value: f32| supported.then_some(value);
        TuningValues {
            exaggeration: keep(caps.exaggeration, self.exaggeration),
            cfg_weight: keep(caps.cfg_weight, self.cfg_weight),
            temperature: keep(caps.temperature, self.temperature),
            repetition_penalty: keep(caps.repetition_penalty, self.repetition_penalty),
            min_p: keep(caps.min_p, self.min_p),
            top_p: keep(caps.top_p, self.top_p),
        }
    }
}

/// A single unit of work handed to a backend.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisJob {
    pub text: String,
    pub output_path: PathBuf,
    pub voice_prompt: Option<PathBuf>,
    pub tuning: TuningValues,
}

/// The seam to a speech-synthesis engine.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Short engine family name, e.g. "command-line"
    fn name(&self) -> String;

    /// Probe whether the engine can run here. `Err` means the probe itself failed.
    async fn availability(&self) -> Result<Availability, BackendError>;

    fn capabilities(&self) -> Capabilities;

    /// Synthesize `job.text` into a file at `job.output_path`.
    async fn synthesize(&self, job: &SynthesisJob) -> Result<(), BackendError>;
}
