//! Model lifecycle: backend detection, lazy initialization and
//! synthesis dispatch with fallback.
//!
//! The controller owns the single [`ModelSession`]. A session exists only
//! after a successful [`ModelController::initialize`]; its presence is what
//! "initialized" means. Initialization holds the session write lock for the
//! whole check-then-act sequence, so concurrent `init` commands run detection
//! once and observe the same descriptor.
//!
//! Synthesis never fails hard while the fallback synthesizer can still write
//! the requested file: backend errors are logged, masked and reported as a
//! success carrying an explanatory message.

use crate::backend::{Availability, BackendError, FallbackKind, SynthesisBackend, SynthesisJob};
use crate::device::{DeviceDescriptor, HostPlatform};
use crate::fallback::FallbackSynthesizer;
use crate::protocol::{ResponseStatus, SynthesisRequest, SynthesisResult};
use crate::{ChatterboxError, Result};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// The initialized-model record.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSession {
    pub backend_name: String,
    pub backend_available: bool,
    /// Why the backend cannot be used, when it cannot
    pub unavailable_reason: Option<String>,
    pub device: DeviceDescriptor,
}

pub struct ModelController {
    backend: Arc<dyn SynthesisBackend>,
    fallback: FallbackSynthesizer,
    platform: HostPlatform,
    session: RwLock<Option<ModelSession>>,
}

impl ModelController {
    pub fn new(backend: Arc<dyn SynthesisBackend>) -> Self {
        Self {
            backend,
            fallback: FallbackSynthesizer::default(),
            platform: HostPlatform::detect(),
            session: RwLock::new(None),
        }
    }

    pub fn with_platform(mut self, platform: HostPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackSynthesizer) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn platform(&self) -> &HostPlatform {
        &self.platform
    }

    pub async fn is_initialized(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn session(&self) -> Option<ModelSession> {
        self.session.read().await.clone()
    }

    pub async fn device(&self) -> Option<DeviceDescriptor> {
        self.session.read().await.as_ref().map(|s| s.device.clone())
    }

    /// Detect the backend and host, creating the session on first success.
    ///
    /// Idempotent: once a session exists its descriptor is returned as-is.
    /// Detection failures leave no session behind.
    pub async fn initialize(&self) -> Result<DeviceDescriptor> {
        let mut slot = self.session.write().await;
        if let Some(session) = slot.as_ref() {
            debug!(target: "controller", "Model already initialized");
            return Ok(session.device.clone());
        }

        let availability = self.probe_backend().await.map_err(|e| {
            error!(target: "controller", error = %e, "Error initializing model");
            ChatterboxError::InitializationFailed(e.to_string())
        })?;

        let session = match availability {
            Availability::Ready { engine } => ModelSession {
                backend_name: engine,
                backend_available: true,
                unavailable_reason: None,
                device: self.platform.describe(true),
            },
            Availability::Unavailable { reason } => {
                warn!(target: "controller", backend = %self.backend.name(), reason = %reason, "Synthesis backend not available; using fallback mode");
                ModelSession {
                    backend_name: self.backend.name(),
                    backend_available: false,
                    unavailable_reason: Some(reason),
                    device: self.platform.describe(false),
                }
            }
        };

        info!(
            target: "controller",
            backend = %session.backend_name,
            device = %session.device.device_name,
            "Initializing TTS"
        );

        let device = session.device.clone();
        *slot = Some(session);
        Ok(device)
    }

    /// Synthesize `request` into its output file.
    pub async fn generate_speech(&self, request: &SynthesisRequest) -> Result<SynthesisResult> {
        let session = self.session().await.ok_or(ChatterboxError::NotInitialized)?;
        let started = Instant::now();
        let output_path = PathBuf::from(&request.output_path);

        let masked = if session.backend_available {
            let job = self.build_job(request, &output_path);
            match self.run_backend(job).await {
                Ok(()) => None,
                Err(e) => Some(e),
            }
        } else {
            let reason = session
                .unavailable_reason
                .clone()
                .unwrap_or_else(|| "no engine detected".to_string());
            Some(BackendError::NotInstalled(reason))
        };

        let message = match masked {
            None => {
                info!(target: "controller", backend = %session.backend_name, path = %request.output_path, "Speech generated");
                None
            }
            Some(original) => {
                warn!(target: "controller", error = %original, "Backend synthesis unavailable or failed; using fallback audio");
                if let Err(fallback_err) = self.fallback.synthesize(&request.text, &output_path).await {
                    error!(target: "controller", error = %original, fallback_error = %fallback_err, "Error generating speech");
                    return Err(ChatterboxError::SynthesisFailed {
                        original: original.to_string(),
                        fallback: fallback_err.to_string(),
                    });
                }
                Some(fallback_message(&original))
            }
        };

        Ok(SynthesisResult {
            status: ResponseStatus::Success,
            output_path: Some(request.output_path.clone()),
            duration: Some(started.elapsed().as_secs_f64()),
            message,
        })
    }

    fn build_job(&self, request: &SynthesisRequest, output_path: &Path) -> SynthesisJob {
        let caps = self.backend.capabilities();
        let voice_prompt = request
            .audio_prompt_path
            .as_deref()
            .map(PathBuf::from)
            .filter(|p| {
                if !p.exists() {
                    warn!(target: "controller", path = %p.display(), "Voice reference not found; ignoring");
                    return false;
                }
                if !caps.voice_prompt {
                    debug!(target: "controller", "Backend does not accept voice references; ignoring");
                    return false;
                }
                true
            });

        SynthesisJob {
            text: request.text.clone(),
            output_path: output_path.to_path_buf(),
            voice_prompt,
            tuning: request.tuning.restrict_to(&caps),
        }
    }

    /// Probe on its own task so a panicking driver fails init like any other error.
    async fn probe_backend(&self) -> std::result::Result<Availability, BackendError> {
        let backend = Arc::clone(&self.backend);
        let handle = tokio::spawn(async move { backend.availability().await });
        match handle.await {
            Ok(res) => res,
            Err(join_err) => Err(BackendError::Crashed(panic_text(join_err))),
        }
    }

    /// Run the backend on its own task so a panic surfaces as an error.
    async fn run_backend(&self, job: SynthesisJob) -> std::result::Result<(), BackendError> {
        let backend = Arc::clone(&self.backend);
        let handle = tokio::spawn(async move { backend.synthesize(&job).await });
        match handle.await {
            Ok(res) => res,
            Err(join_err) => Err(BackendError::Crashed(panic_text(join_err))),
        }
    }
}

fn fallback_message(err: &BackendError) -> String {
    match err.fallback_kind() {
        FallbackKind::Unavailable => {
            format!("Generated fallback audio (synthesis backend not available: {})", err)
        }
        FallbackKind::Failed => format!("Generated fallback audio (error: {})", err),
    }
}

fn panic_text(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    panic_message(&*err.into_panic())
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
