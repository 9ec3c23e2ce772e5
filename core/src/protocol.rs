//! Wire types for the command channel.

use crate::backend::TuningParams;
use crate::device::DeviceDescriptor;
use crate::{ChatterboxError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Inbound `{command, parameters}` body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

impl CommandEnvelope {
    pub fn new(command: impl Into<String>, parameters: Value) -> Self {
        Self {
            command: Some(command.into()),
            parameters,
        }
    }

    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| ChatterboxError::InvalidRequest(e.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Transport-neutral outcome class of a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyCode {
    Ok,
    BadRequest,
    InternalError,
}

impl ReplyCode {
    pub fn as_u16(self) -> u16 {
        match self {
            ReplyCode::Ok => 200,
            ReplyCode::BadRequest => 400,
            ReplyCode::InternalError => 500,
        }
    }
}

/// Body of every reply. Absent fields are omitted on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<crate::device::DeviceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            device: None,
            device_name: None,
            output_path: None,
            duration: None,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            ..Self::success(message)
        }
    }

    pub fn initialized(device: &DeviceDescriptor) -> Self {
        Self {
            device: Some(device.device),
            device_name: Some(device.device_name.clone()),
            ..Self::success("Model initialized successfully")
        }
    }
}

/// A response body plus the code the transport should report.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub code: ReplyCode,
    pub body: CommandResponse,
}

impl Reply {
    pub fn ok(body: CommandResponse) -> Self {
        Self {
            code: ReplyCode::Ok,
            body,
        }
    }

    pub fn from_error(err: &ChatterboxError) -> Self {
        let code = if err.is_validation() {
            ReplyCode::BadRequest
        } else {
            ReplyCode::InternalError
        };
        Self {
            code,
            body: CommandResponse::error(err.to_string()),
        }
    }
}

/// Parameters of a `generate` command.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub output_path: String,
    pub audio_prompt_path: Option<String>,
    pub tuning: TuningParams,
}

#[derive(Deserialize, Default)]
struct GenerateParams {
    text: Option<String>,
    output_path: Option<String>,
    audio_prompt_path: Option<String>,
    // Tuning values are advisory; anything non-numeric is replaced by its default
    exaggeration: Option<Value>,
    cfg_weight: Option<Value>,
    temperature: Option<Value>,
    repetition_penalty: Option<Value>,
    min_p: Option<Value>,
    top_p: Option<Value>,
}

fn tuning_value(name: &str, value: Option<&Value>, default: f32) -> f32 {
    match value {
        None | Some(Value::Null) => default,
        Some(v) => match v.as_f64() {
            Some(x) => x as f32,
            None => {
                warn!(target: "protocol", parameter = name, value = %v, "Ignoring non-numeric tuning value");
                default
            }
        },
    }
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, output_path: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            output_path: output_path.into(),
            audio_prompt_path: None,
            tuning: TuningParams::default(),
        }
    }

    pub fn with_audio_prompt(mut self, path: impl Into<String>) -> Self {
        self.audio_prompt_path = Some(path.into());
        self
    }

    pub fn with_tuning(mut self, tuning: TuningParams) -> Self {
        self.tuning = tuning;
        self
    }

    /// Parse `generate` parameters, applying defaults for tuning values.
    pub fn from_parameters(parameters: &Value) -> Result<Self> {
        let params: GenerateParams = match parameters {
            Value::Null => GenerateParams::default(),
            other => GenerateParams::deserialize(other)
                .map_err(|e| ChatterboxError::InvalidParameters(e.to_string()))?,
        };

        let text = params.text.filter(|t| !t.is_empty());
        let output_path = params.output_path.filter(|p| !p.is_empty());
        let (text, output_path) = match (text, output_path) {
            (Some(t), Some(p)) => (t, p),
            _ => return Err(ChatterboxError::MissingParameters),
        };

        let defaults = TuningParams::default();
        let tuning = TuningParams {
            exaggeration: tuning_value(
                "exaggeration",
                params.exaggeration.as_ref(),
                defaults.exaggeration,
            ),
            cfg_weight: tuning_value("cfg_weight", params.cfg_weight.as_ref(), defaults.cfg_weight),
            temperature: tuning_value(
                "temperature",
                params.temperature.as_ref(),
                defaults.temperature,
            ),
            repetition_penalty: tuning_value(
                "repetition_penalty",
                params.repetition_penalty.as_ref(),
                defaults.repetition_penalty,
            ),
            min_p: tuning_value("min_p", params.min_p.as_ref(), defaults.min_p),
            top_p: tuning_value("top_p", params.top_p.as_ref(), defaults.top_p),
        };

        Ok(Self {
            text,
            output_path,
            audio_prompt_path: params.audio_prompt_path.filter(|p| !p.is_empty()),
            tuning,
        })
    }
}

/// Outcome of one synthesis request.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisResult {
    pub status: ResponseStatus,
    pub output_path: Option<String>,
    /// Wall-clock seconds from request receipt to file-write completion
    pub duration: Option<f64>,
    pub message: Option<String>,
}

impl From<SynthesisResult> for CommandResponse {
    fn from(result: SynthesisResult) -> Self {
        Self {
            status: result.status,
            device: None,
            device_name: None,
            output_path: result.output_path,
            duration: result.duration,
            message: result.message,
        }
    }
}
