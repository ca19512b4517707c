//! Serializable common API types.
//!
//! Matches completion API standards used by many platforms.

use serde::{Deserialize, Serialize};

/// Upper bound on prompt length, in characters.
const MAX_PROMPT_CHARS: usize = 4096;

/// Inclusive bounds on the `max_tokens` field.
const MAX_TOKENS_RANGE: (usize, usize) = (1, 2048);

/// Inclusive bounds on the `temperature` field.
const TEMPERATURE_RANGE: (f32, f32) = (0.0, 1.0);

/// Inclusive bounds on the `n` field.
const N_RANGE: (usize, usize) = (1, 5);

/// Maximum number of stop sequences, and maximum characters per sequence.
const STOP_LIMITS: (usize, usize) = (4, 50);

fn default_n() -> usize {
    1
}

/// One completion request. `stream`, `n`, and `stop` are accepted by
/// validation but the service neither streams, produces more than one choice,
/// nor applies caller stop sequences.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    /// Defaults to the service's configured maximum length when omitted.
    pub max_tokens: Option<usize>,
    /// Defaults to the service's configured temperature when omitted.
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_n")]
    pub n: usize,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
}

impl CompletionRequest {
    /// Check all field ranges, returning a per-field message on violation.
    pub fn validate(&self) -> Result<(), String> {
        let prompt_chars = self.prompt.chars().count();
        if prompt_chars < 1 {
            return Err("prompt must not be empty".to_string());
        }
        if prompt_chars > MAX_PROMPT_CHARS {
            return Err(format!(
                "prompt must be at most {MAX_PROMPT_CHARS} characters"
            ));
        }

        if let Some(max_tokens) = self.max_tokens {
            let (min, max) = MAX_TOKENS_RANGE;
            if max_tokens < min || max_tokens > max {
                return Err(format!("max_tokens must be between {min} and {max}"));
            }
        }

        if let Some(temperature) = self.temperature {
            let (min, max) = TEMPERATURE_RANGE;
            if !(min..=max).contains(&temperature) {
                return Err(format!("temperature must be between {min} and {max}"));
            }
        }

        let (min, max) = N_RANGE;
        if self.n < min || self.n > max {
            return Err(format!("n must be between {min} and {max}"));
        }

        if let Some(stop) = &self.stop {
            let (max_sequences, max_chars) = STOP_LIMITS;
            if stop.len() > max_sequences {
                return Err(format!("at most {max_sequences} stop sequences allowed"));
            }
            if stop.iter().any(|s| s.chars().count() > max_chars) {
                return Err(format!("stop sequences must be <= {max_chars} characters"));
            }
        }

        Ok(())
    }
}

/// Why a completion stopped.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: CompletionUsage,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompletionChoice {
    pub text: String,
    pub index: usize,
    pub finish_reason: FinishReason,
}

/// Token accounting; `total_tokens` is always the exact sum of the other two.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompletionUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

/// Model information metadata.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}

/// Service health snapshot.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub model: String,
    pub device: String,
}
