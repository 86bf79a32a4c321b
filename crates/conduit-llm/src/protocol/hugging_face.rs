//! HuggingFace text-generation inference wire format types

use serde::{Deserialize, Serialize};

// -- Request types --

/// Text-generation request body
#[derive(Debug, Clone, Serialize)]
pub struct HfRequest {
    /// Prompt rendered through the model's chat template
    pub inputs: String,
    /// Generation parameters
    pub parameters: HfParameters,
    /// Present and `true` only on streaming calls
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

/// Generation parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HfParameters {
    /// New-token budget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Repetition penalty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,
    /// Frequency penalty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Whether the prompt is echoed back in `generated_text`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_full_text: Option<bool>,
}

// -- Response types --

/// Blocking response
///
/// Hosted inference returns a single-element array; a self-hosted server
/// may return the bare object. Errors arrive as `{"error": "..."}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HfResponse {
    /// Array of generations
    Batch(Vec<HfGeneration>),
    /// Single generation
    Single(HfGeneration),
    /// Error body
    Error(HfError),
}

/// One generation
#[derive(Debug, Clone, Deserialize)]
pub struct HfGeneration {
    /// Generated text
    pub generated_text: String,
    /// Generation details, when requested
    #[serde(default)]
    pub details: Option<HfDetails>,
}

/// Generation details
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HfDetails {
    /// Number of generated tokens
    #[serde(default)]
    pub generated_tokens: u32,
}

/// Error body
#[derive(Debug, Clone, Deserialize)]
pub struct HfError {
    /// Error message
    pub error: String,
}

// -- Streaming types --

/// One `data:` frame of a streamed response
#[derive(Debug, Clone, Deserialize)]
pub struct HfStreamFrame {
    /// Token produced by this step
    #[serde(default)]
    pub token: Option<HfToken>,
    /// Full text, set only on the final frame
    #[serde(default)]
    pub generated_text: Option<String>,
    /// Generation details on the final frame
    #[serde(default)]
    pub details: Option<HfDetails>,
    /// Error reported mid-stream
    #[serde(default)]
    pub error: Option<String>,
}

/// Streamed token
#[derive(Debug, Clone, Deserialize)]
pub struct HfToken {
    /// Token text
    #[serde(default)]
    pub text: String,
    /// Control token carrying no content
    #[serde(default)]
    pub special: bool,
}
