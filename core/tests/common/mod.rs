//! Shared fakes for core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chatterbox_core::{Availability, BackendError, Capabilities, SynthesisBackend, SynthesisJob};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// How the fake behaves when asked to synthesize
#[derive(Clone, Debug)]
pub enum Behavior {
    /// Write a tiny WAV at the output path
    Succeed,
    EngineError(String),
    ModelMissing(String),
    Panic(String),
}

pub struct FakeBackend {
    pub availability: Result<Availability, String>,
    /// Panic with this message instead of answering the probe
    pub probe_panic: Option<String>,
    pub capabilities: Capabilities,
    pub behavior: Behavior,
    pub probes: AtomicUsize,
    pub jobs: Mutex<Vec<SynthesisJob>>,
}

impl FakeBackend {
    pub fn ready(behavior: Behavior) -> Self {
        Self {
            availability: Ok(Availability::Ready {
                engine: "fake-engine".to_string(),
            }),
            probe_panic: None,
            capabilities: Capabilities::all(),
            behavior,
            probes: AtomicUsize::new(0),
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            availability: Ok(Availability::Unavailable {
                reason: reason.to_string(),
            }),
            ..Self::ready(Behavior::Succeed)
        }
    }

    pub fn broken_probe(message: &str) -> Self {
        Self {
            availability: Err(message.to_string()),
            ..Self::ready(Behavior::Succeed)
        }
    }

    pub fn panicking_probe(message: &str) -> Self {
        Self {
            probe_panic: Some(message.to_string()),
            ..Self::ready(Behavior::Succeed)
        }
    }

    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.capabilities = caps;
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn jobs(&self) -> Vec<SynthesisJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SynthesisBackend for FakeBackend {
    fn name(&self) -> String {
        "fake".to_string()
    }

    async fn availability(&self) -> Result<Availability, BackendError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        // Give concurrent initializers a chance to interleave
        tokio::task::yield_now().await;
        if let Some(m) = &self.probe_panic {
            panic!("{}", m);
        }
        self.availability
            .clone()
            .map_err(|m| BackendError::Io(std::io::Error::new(std::io::ErrorKind::Other, m)))
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn synthesize(&self, job: &SynthesisJob) -> Result<(), BackendError> {
        self.jobs.lock().unwrap().push(job.clone());
        match &self.behavior {
            Behavior::Succeed => {
                let spec = hound::WavSpec {
                    channels: 1,
                    sample_rate: 16_000,
                    bits_per_sample: 16,
                    sample_format: hound::SampleFormat::Int,
                };
                let mut writer = hound::WavWriter::create(&job.output_path, spec)
                    .map_err(|e| BackendError::EngineFailed(e.to_string()))?;
                for _ in 0..1600 {
                    writer
                        .write_sample(0i16)
                        .map_err(|e| BackendError::EngineFailed(e.to_string()))?;
                }
                writer
                    .finalize()
                    .map_err(|e| BackendError::EngineFailed(e.to_string()))?;
                Ok(())
            }
            Behavior::EngineError(m) => Err(BackendError::EngineFailed(m.clone())),
            Behavior::ModelMissing(m) => Err(BackendError::ModelNotFound(m.clone())),
            Behavior::Panic(m) => panic!("{}", m),
        }
    }
}

/// Duration in seconds of a WAV file on disk
pub fn wav_seconds(path: &std::path::Path) -> f64 {
    let reader = hound::WavReader::open(path).expect("readable wav");
    reader.duration() as f64 / reader.spec().sample_rate as f64
}
