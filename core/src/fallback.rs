//! Deterministic placeholder audio.
//!
//! Used whenever the synthesis backend is missing or fails, so that every
//! successful request still leaves a readable WAV file behind. The clip is a
//! base tone plus a quieter tone at 1.5x the base frequency, lasting 50 ms per
//! character of input and capped at 10 seconds.

use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::task;
use tracing::info;

pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;

#[derive(Error, Debug)]
pub enum FallbackError {
    #[error("failed to write WAV: {0}")]
    Wav(#[from] hound::Error),

    #[error("fallback task failed: {0}")]
    Join(String),
}

/// Summary of a written placeholder clip.
#[derive(Clone, Debug, PartialEq)]
pub struct FallbackClip {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub samples: usize,
    pub seconds: f64,
}

#[derive(Clone, Debug)]
pub struct FallbackSynthesizer {
    pub sample_rate: u32,
    pub base_frequency: f64,
    pub seconds_per_char: f64,
    pub max_seconds: f64,
}

impl Default for FallbackSynthesizer {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            base_frequency: 440.0,
            seconds_per_char: 0.05,
            max_seconds: 10.0,
        }
    }
}

impl FallbackSynthesizer {
    /// Clip length in seconds for `text`.
    pub fn duration_for(&self, text: &str) -> f64 {
        let chars = text.chars().count() as f64;
        (chars * self.seconds_per_char).min(self.max_seconds)
    }

    /// Render the waveform as samples in [-1.0, 1.0].
    pub fn render(&self, text: &str) -> Vec<f32> {
        let seconds = self.duration_for(text);
        let n = (self.sample_rate as f64 * seconds) as usize;
        // Sample times span [0, seconds] inclusive
        let step = if n > 1 { seconds / (n - 1) as f64 } else { 0.0 };
        let base = self.base_frequency;
        let upper = base * 1.5;

        (0..n)
            .map(|i| {
                let t = i as f64 * step;
                let s = 0.3 * (2.0 * PI * base * t).sin() + 0.1 * (2.0 * PI * upper * t).sin();
                s as f32
            })
            .collect()
    }

    /// Write the clip for `text` to `path` as 16-bit mono PCM.
    pub fn write_wav(&self, text: &str, path: &Path) -> Result<FallbackClip, FallbackError> {
        let samples = self.render(text);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)?;
        for &s in &samples {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(v)?;
        }
        writer.finalize()?;

        info!(target: "fallback", path = %path.display(), samples = samples.len(), "Created fallback audio file");

        Ok(FallbackClip {
            path: path.to_path_buf(),
            sample_rate: self.sample_rate,
            samples: samples.len(),
            seconds: samples.len() as f64 / self.sample_rate as f64,
        })
    }

    /// Same as [`write_wav`](Self::write_wav), on a blocking thread.
    pub async fn synthesize(&self, text: &str, path: &Path) -> Result<FallbackClip, FallbackError> {
        let this = self.clone();
        let text = text.to_string();
        let path = path.to_path_buf();
        task::spawn_blocking(move || this.write_wav(&text, &path))
            .await
            .map_err(|e| FallbackError::Join(e.to_string()))?
    }
}
