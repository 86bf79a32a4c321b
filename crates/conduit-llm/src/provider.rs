//! Provider dialects and their resolved configuration

use std::time::Duration;

use conduit_config::{LlmProviderConfig, LlmProviderType};
use secrecy::SecretString;
use url::Url;

use crate::decode::{ChunkDecoder, GeminiDecoder, HuggingFaceDecoder};
use crate::dialect::{self, ModelFilter, RequestPayload};
use crate::error::LlmError;
use crate::extract::ResponseExtractor;
use crate::types::{CompletionRequest, GenerationParams};

/// Default Google Generative Language API base URL
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire dialect spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Google Generative Language API
    Gemini,
    /// HuggingFace text-generation inference
    HuggingFace,
}

impl Dialect {
    /// Models accepted when the provider configures no `models.include`
    pub const fn builtin_models(self) -> &'static [&'static str] {
        match self {
            Self::Gemini => dialect::gemini::BUILTIN_MODELS,
            Self::HuggingFace => dialect::hugging_face::BUILTIN_MODELS,
        }
    }

    /// Stable name used in logs and metric attributes
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::HuggingFace => "hugging_face",
        }
    }
}

impl From<LlmProviderType> for Dialect {
    fn from(provider_type: LlmProviderType) -> Self {
        match provider_type {
            LlmProviderType::Gemini => Self::Gemini,
            LlmProviderType::HuggingFace => Self::HuggingFace,
        }
    }
}

/// Resolved, read-only configuration for one provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Configured provider name
    pub name: String,
    /// Wire dialect
    pub dialect: Dialect,
    /// Endpoint base (Gemini) or full endpoint URL (HuggingFace)
    pub base_url: Url,
    /// Credential: query key for Gemini, bearer token for HuggingFace
    pub api_key: Option<SecretString>,
    /// Model allow-list
    pub models: ModelFilter,
    /// Generation parameters applied under caller-supplied ones
    pub defaults: GenerationParams,
    /// Context window used for the new-token budget
    pub token_limit: u32,
    /// Identity reported with every audit record
    pub audit_tag: String,
    /// Whole-call limit for blocking calls, idle limit between streamed reads
    pub timeout: Duration,
    /// Connection establishment limit
    pub connect_timeout: Duration,
}

impl ProviderConfig {
    /// Resolve a provider from its configuration table
    pub fn from_config(name: &str, config: &LlmProviderConfig) -> Result<Self, LlmError> {
        let dialect = Dialect::from(config.provider_type);
        let invalid = |message: String| LlmError::InvalidConfig {
            provider: name.to_owned(),
            message,
        };

        let base_url = match (&config.base_url, dialect) {
            (Some(url), _) => url.clone(),
            (None, Dialect::Gemini) => {
                Url::parse(GEMINI_BASE_URL).map_err(|e| invalid(format!("invalid default base URL: {e}")))?
            }
            (None, Dialect::HuggingFace) => return Err(invalid("base_url is required".to_owned())),
        };

        let parse_duration = |field: &str, value: Option<&String>, default: Duration| {
            value.map_or(Ok(default), |value| {
                duration_str::parse(value).map_err(|e| invalid(format!("invalid {field} '{value}': {e}")))
            })
        };

        Ok(Self {
            name: name.to_owned(),
            dialect,
            base_url,
            api_key: config.api_key.clone(),
            models: ModelFilter::new(dialect.builtin_models(), &config.models),
            defaults: GenerationParams::from(&config.defaults),
            token_limit: config.token_limit.unwrap_or(dialect::hugging_face::DEFAULT_TOKEN_LIMIT),
            audit_tag: config.audit_tag.clone().unwrap_or_else(|| name.to_owned()),
            timeout: parse_duration("timeout", config.timeout.as_ref(), DEFAULT_TIMEOUT)?,
            connect_timeout: parse_duration(
                "connect_timeout",
                config.connect_timeout.as_ref(),
                DEFAULT_CONNECT_TIMEOUT,
            )?,
        })
    }

    /// Build the provider-native body for `request`
    ///
    /// Fails with `UnsupportedModel` when the model is not allowed.
    pub fn build_payload(&self, request: &CompletionRequest, streaming: bool) -> Result<RequestPayload, LlmError> {
        if !self.models.allows(&request.model) {
            return Err(LlmError::UnsupportedModel {
                provider: self.name.clone(),
                model: request.model.clone(),
            });
        }

        let params = request.params.clone().or(&self.defaults);

        let payload = match self.dialect {
            Dialect::Gemini => dialect::gemini::build(&request.prompt, &params),
            Dialect::HuggingFace => {
                dialect::hugging_face::build(&request.model, &request.prompt, &params, self.token_limit, streaming)
            }
        };

        payload.map_err(|source| LlmError::InvalidPayload {
            provider: self.name.clone(),
            source,
        })
    }

    /// Fresh chunk decoder for one streamed call
    pub fn decoder(&self) -> ChunkDecoder {
        match self.dialect {
            Dialect::Gemini => ChunkDecoder::Gemini(GeminiDecoder::default()),
            Dialect::HuggingFace => ChunkDecoder::HuggingFace(HuggingFaceDecoder::default()),
        }
    }

    /// Fresh response extractor for one call
    pub fn extractor(&self) -> ResponseExtractor {
        ResponseExtractor::new(&self.name, self.dialect)
    }

    /// Endpoint for `model`; credentials are attached by the transport
    pub fn endpoint(&self, model: &str, streaming: bool) -> Result<Url, LlmError> {
        match self.dialect {
            Dialect::Gemini => {
                let method = if streaming { "streamGenerateContent" } else { "generateContent" };
                let base = self.base_url.as_str().trim_end_matches('/');

                Url::parse(&format!("{base}/models/{model}:{method}")).map_err(|e| LlmError::InvalidConfig {
                    provider: self.name.clone(),
                    message: format!("cannot build endpoint for model '{model}': {e}"),
                })
            }
            Dialect::HuggingFace => Ok(self.base_url.clone()),
        }
    }
}
