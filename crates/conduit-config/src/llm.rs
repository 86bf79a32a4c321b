use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Top-level LLM configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// LLM provider configurations keyed by name
    #[serde(default)]
    pub providers: IndexMap<String, LlmProviderConfig>,
}

/// Configuration for a single LLM provider
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmProviderConfig {
    /// Provider protocol type
    #[serde(rename = "type")]
    pub provider_type: LlmProviderType,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override (required for `hugging_face`)
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Model allow-list configuration
    #[serde(default)]
    pub models: ModelConfig,
    /// Default generation parameters applied to every call
    #[serde(default)]
    pub defaults: GenerationDefaults,
    /// Context window used to derive the new-token budget
    #[serde(default)]
    pub token_limit: Option<u32>,
    /// Identity tag reported to the audit collaborator
    #[serde(default)]
    pub audit_tag: Option<String>,
    /// Total request timeout, also the idle limit between streamed reads (e.g. "60s")
    #[serde(default)]
    pub timeout: Option<String>,
    /// Connection establishment timeout (e.g. "10s")
    #[serde(default)]
    pub connect_timeout: Option<String>,
}

/// Supported LLM provider protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderType {
    /// Google Generative Language API
    Gemini,
    /// HuggingFace text-generation inference endpoint
    HuggingFace,
}

/// Model allow-list configuration for a provider
///
/// Patterns are globs (`gemini-1.5-*`). A non-empty `include` list replaces
/// the provider's built-in allow-list.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Allow models matching these globs
    #[serde(default)]
    pub include: Vec<String>,
    /// Reject models matching these globs
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Generation parameters configured per provider
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationDefaults {
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default)]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Repetition penalty
    #[serde(default)]
    pub repetition_penalty: Option<f64>,
    /// Frequency penalty
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
    /// Presence penalty
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    /// Stop sequences
    #[serde(default)]
    pub stop: Option<Vec<String>>,
}
