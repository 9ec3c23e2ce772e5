//! Text-to-Speech backend driving local CLI engines
//!
//! Implements [`SynthesisBackend`] on top of command-line engines:
//! - Prefer Piper (higher quality, requires voice model)
//! - Fallback to espeak-ng (widely available)
//! - If neither present, reports the backend as unavailable
//!
//! Tuning support:
//! - Piper: temperature → `--noise_scale`, exaggeration → `--noise_w`
//! - espeak-ng: none
//!
//! Engines write to a staging file next to the requested output, which is
//! renamed into place only after a clean exit. A timed-out engine is killed.
//!
//! Env overrides:
//! - PIPER_BIN, PIPER_VOICE, PIPER_VOICE_DIR
//! - ESPEAK_BIN
//! - TTS_VOICE, TTS_TIMEOUT_MS

use async_trait::async_trait;
use chatterbox_core::{
    Availability, BackendError, Capabilities, SynthesisBackend, SynthesisJob, TuningValues,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub timeout_ms: u64,
    pub piper_bin: Option<PathBuf>,
    pub piper_voice: Option<PathBuf>,
    pub piper_voice_dir: Option<PathBuf>,
    pub espeak_bin: Option<PathBuf>,
    /// Piper voice name (looked up in `piper_voice_dir`) or espeak voice code
    pub voice: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let timeout_ms = std::env::var("TTS_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(20_000);

        let piper_bin = get_from_env_or_path("PIPER_BIN", "piper");
        let piper_voice = std::env::var("PIPER_VOICE").ok().map(PathBuf::from);
        let piper_voice_dir = std::env::var("PIPER_VOICE_DIR").ok().map(PathBuf::from);
        let espeak_bin =
            get_from_env_or_path("ESPEAK_BIN", "espeak-ng").or_else(|| get_from_path("espeak"));
        let voice = std::env::var("TTS_VOICE").ok().filter(|v| !v.is_empty());

        Self {
            timeout_ms,
            piper_bin,
            piper_voice,
            piper_voice_dir,
            espeak_bin,
            voice,
        }
    }
}

impl EngineConfig {
    /// A config that finds no engine; useful as a base for explicit setups.
    pub fn empty() -> Self {
        Self {
            timeout_ms: 20_000,
            piper_bin: None,
            piper_voice: None,
            piper_voice_dir: None,
            espeak_bin: None,
            voice: None,
        }
    }
}

pub fn get_from_env_or_path(env_key: &str, default_bin: &str) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_key) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Some(pb);
        }
    }
    get_from_path(default_bin)
}

pub fn get_from_path(bin: &str) -> Option<PathBuf> {
    // If a path-like string is provided, respect it directly
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return if p.exists() { Some(p) } else { None };
    }

    // Search PATH portably
    if let Some(paths_os) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths_os) {
            let candidate = dir.join(bin);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Engine chosen for a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Engine {
    Piper { bin: PathBuf, voice: PathBuf },
    Espeak { bin: PathBuf },
}

impl Engine {
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Piper { .. } => "piper",
            Engine::Espeak { .. } => "espeak-ng",
        }
    }
}

pub struct CommandLineBackend {
    cfg: EngineConfig,
}

impl CommandLineBackend {
    pub fn new(cfg: Option<EngineConfig>) -> Self {
        let cfg = cfg.unwrap_or_default();
        // Log detected engines once
        if let Some(ref p) = cfg.piper_bin {
            info!(target: "tts", bin = ?p, "Detected Piper binary");
        }
        if let Some(ref e) = cfg.espeak_bin {
            info!(target: "tts", bin = ?e, "Detected espeak-ng binary");
        }
        Self { cfg }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Pick the best usable engine, or explain why none is.
    pub fn select_engine(&self) -> Result<Engine, String> {
        let mut piper_problem = None;
        if let Some(bin) = &self.cfg.piper_bin {
            match resolve_piper_voice_path(&self.cfg) {
                Some(voice) => {
                    return Ok(Engine::Piper {
                        bin: bin.clone(),
                        voice,
                    })
                }
                None => {
                    piper_problem =
                        Some("Piper voice not found; set PIPER_VOICE or TTS_VOICE".to_string())
                }
            }
        }
        if let Some(bin) = &self.cfg.espeak_bin {
            return Ok(Engine::Espeak { bin: bin.clone() });
        }
        Err(piper_problem
            .unwrap_or_else(|| "no local TTS engine found (piper, espeak-ng)".to_string()))
    }
}

#[async_trait]
impl SynthesisBackend for CommandLineBackend {
    fn name(&self) -> String {
        "command-line".to_string()
    }

    async fn availability(&self) -> Result<Availability, BackendError> {
        Ok(match self.select_engine() {
            Ok(engine) => Availability::Ready {
                engine: engine.name().to_string(),
            },
            Err(reason) => Availability::Unavailable { reason },
        })
    }

    fn capabilities(&self) -> Capabilities {
        match self.select_engine() {
            Ok(Engine::Piper { .. }) => Capabilities {
                temperature: true,
                exaggeration: true,
                ..Default::default()
            },
            _ => Capabilities::default(),
        }
    }

    async fn synthesize(&self, job: &SynthesisJob) -> Result<(), BackendError> {
        let engine = self.select_engine().map_err(|reason| {
            if self.cfg.piper_bin.is_some() {
                BackendError::ModelNotFound(reason)
            } else {
                BackendError::NotInstalled(reason)
            }
        })?;

        let staged = StagedOutput::new(&job.output_path);
        let run = async {
            match &engine {
                Engine::Piper { bin, voice } => {
                    synth_with_piper(bin, voice, &job.tuning, &job.text, staged.path()).await
                }
                Engine::Espeak { bin } => {
                    synth_with_espeak(bin, self.cfg.voice.as_deref(), &job.text, staged.path())
                        .await
                }
            }
        };

        // Dropping `run` on timeout drops the child, which kills it
        let outcome = timeout(Duration::from_millis(self.cfg.timeout_ms), run).await;
        match outcome {
            Ok(res) => {
                res?;
                staged.commit()
            }
            Err(_) => {
                warn!(target: "tts", engine = engine.name(), timeout_ms = self.cfg.timeout_ms, "Engine timed out; killed");
                Err(BackendError::Timeout(self.cfg.timeout_ms))
            }
        }
    }
}

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Engine output path that only becomes the real output on `commit`.
/// Removed on drop otherwise.
struct StagedOutput {
    staging: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedOutput {
    fn new(target: &Path) -> Self {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "speech".to_string());
        let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
        let staging =
            target.with_file_name(format!(".{}.{}-{}.wav", name, std::process::id(), seq));
        Self {
            staging,
            target: target.to_path_buf(),
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.staging
    }

    fn commit(mut self) -> Result<(), BackendError> {
        std::fs::rename(&self.staging, &self.target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.staging);
        }
    }
}

fn resolve_piper_voice_path(cfg: &EngineConfig) -> Option<PathBuf> {
    if let Some(v) = &cfg.piper_voice {
        return Some(v.clone());
    }
    let voice = cfg.voice.as_deref().unwrap_or("");
    if voice.is_empty() {
        return None;
    }
    let vh = PathBuf::from(voice);
    if vh.exists() {
        return Some(vh);
    }
    if let Some(dir) = &cfg.piper_voice_dir {
        let candidate = dir.join(voice);
        if candidate.exists() {
            return Some(candidate);
        }
        for ext in ["onnx", "onnx.gz", "pt", "pth"].iter() {
            let c = dir.join(format!("{}.{}", voice, ext));
            if c.exists() {
                return Some(c);
            }
        }
    }
    None
}

async fn synth_with_piper(
    piper: &Path,
    voice_path: &Path,
    tuning: &TuningValues,
    text: &str,
    out_wav: &Path,
) -> Result<(), BackendError> {
    let mut cmd = Command::new(piper);
    cmd.arg("-m").arg(voice_path);
    cmd.arg("-f").arg(out_wav);
    if let Some(t) = tuning.temperature {
        cmd.arg("--noise_scale").arg(format!("{:.3}", t));
    }
    if let Some(e) = tuning.exaggeration {
        cmd.arg("--noise_w").arg(format!("{:.3}", e));
    }
    run_engine(cmd, text, "Piper").await?;
    ensure_written(out_wav, "Piper")
}

async fn synth_with_espeak(
    espeak: &Path,
    voice: Option<&str>,
    text: &str,
    out_wav: &Path,
) -> Result<(), BackendError> {
    let mut cmd = Command::new(espeak);
    if let Some(v) = voice {
        cmd.arg("-v").arg(v);
    }
    cmd.arg("-w").arg(out_wav);
    // Text never goes on the command line, where a leading '-' reads as an option
    cmd.arg("--stdin");
    run_engine(cmd, text, "espeak-ng").await?;
    ensure_written(out_wav, "espeak-ng")
}

/// Spawn `cmd`, feed `text` on stdin and wait for a clean exit.
async fn run_engine(mut cmd: Command, text: &str, engine: &str) -> Result<(), BackendError> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(target: "tts", command = ?cmd, "Running {}", engine);
    let mut child = cmd.spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        match stdin.write_all(text.as_bytes()).await {
            Ok(()) => {}
            // Engine exited without reading; its status says why
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(e) => return Err(e.into()),
        }
    }
    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(BackendError::EngineFailed(format!(
            "{} failed: {}",
            engine,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

fn ensure_written(out_wav: &Path, engine: &str) -> Result<(), BackendError> {
    if out_wav.exists() {
        Ok(())
    } else {
        Err(BackendError::EngineFailed(format!(
            "{} exited cleanly but wrote no audio to {}",
            engine,
            out_wav.display()
        )))
    }
}
