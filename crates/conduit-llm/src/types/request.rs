use conduit_config::GenerationDefaults;
use serde::{Deserialize, Serialize};

use super::message::Prompt;

/// Parameters controlling text generation
///
/// Unset fields fall back to the provider's configured defaults, then to
/// the dialect's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Repetition penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,
    /// Frequency penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// Presence penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl GenerationParams {
    /// Fill every unset field from `fallback`
    #[must_use]
    pub fn or(self, fallback: &Self) -> Self {
        Self {
            temperature: self.temperature.or(fallback.temperature),
            top_p: self.top_p.or(fallback.top_p),
            max_tokens: self.max_tokens.or(fallback.max_tokens),
            repetition_penalty: self.repetition_penalty.or(fallback.repetition_penalty),
            frequency_penalty: self.frequency_penalty.or(fallback.frequency_penalty),
            presence_penalty: self.presence_penalty.or(fallback.presence_penalty),
            stop: self.stop.or_else(|| fallback.stop.clone()),
        }
    }
}

impl From<&GenerationDefaults> for GenerationParams {
    fn from(defaults: &GenerationDefaults) -> Self {
        Self {
            temperature: defaults.temperature,
            top_p: defaults.top_p,
            max_tokens: defaults.max_tokens,
            repetition_penalty: defaults.repetition_penalty,
            frequency_penalty: defaults.frequency_penalty,
            presence_penalty: defaults.presence_penalty,
            stop: defaults.stop.clone(),
        }
    }
}

/// A single completion call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Conversation and tool declarations
    pub prompt: Prompt,
    /// Caller-supplied generation parameters
    #[serde(default)]
    pub params: GenerationParams,
    /// Whether to use the provider's streaming endpoint
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    /// Blocking request with default parameters
    pub fn new(model: impl Into<String>, prompt: Prompt) -> Self {
        Self {
            model: model.into(),
            prompt,
            params: GenerationParams::default(),
            stream: false,
        }
    }

    /// Use the streaming endpoint
    #[must_use]
    pub const fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Override generation parameters
    #[must_use]
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}
