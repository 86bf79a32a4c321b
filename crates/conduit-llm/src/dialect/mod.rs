//! Translation of provider-agnostic prompts into provider-native bodies

pub mod gemini;
pub mod hugging_face;

use std::sync::LazyLock;

use bytes::Bytes;
use conduit_config::ModelConfig;
use tiktoken_rs::{CoreBPE, o200k_base};

/// Serialized provider-native request body
#[derive(Debug, Clone)]
pub struct RequestPayload {
    /// JSON body
    pub body: Bytes,
    /// Estimated prompt size in tokens
    pub prompt_tokens: u32,
}

impl RequestPayload {
    pub(crate) fn to_json<T: serde::Serialize>(body: &T, prompt_tokens: u32) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(body)?;

        Ok(Self {
            body: Bytes::from(body),
            prompt_tokens,
        })
    }
}

/// Model allow-list for one provider
///
/// Entries are exact names or glob patterns.
#[derive(Debug, Clone)]
pub struct ModelFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl ModelFilter {
    /// Built-in list, replaced by configured includes and narrowed by excludes
    pub fn new(builtin: &[&str], config: &ModelConfig) -> Self {
        let include = if config.include.is_empty() {
            builtin.iter().map(|&name| name.to_owned()).collect()
        } else {
            config.include.clone()
        };

        Self {
            include,
            exclude: config.exclude.clone(),
        }
    }

    /// Whether `model` may be sent to this provider
    pub fn allows(&self, model: &str) -> bool {
        let matches = |pattern: &String| pattern == model || fast_glob::glob_match(pattern, model);

        self.include.iter().any(matches) && !self.exclude.iter().any(matches)
    }
}

static TOKENIZER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| o200k_base().ok());

/// Estimate the token count of `text`
///
/// Falls back to four bytes per token when the tokenizer is unavailable.
pub fn estimate_tokens(text: &str) -> u32 {
    let count = TOKENIZER
        .as_ref()
        .map_or_else(|| text.len().div_ceil(4), |bpe| bpe.encode_with_special_tokens(text).len());

    u32::try_from(count).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(include: &[&str], exclude: &[&str]) -> ModelConfig {
        ModelConfig {
            include: include.iter().map(|s| (*s).to_owned()).collect(),
            exclude: exclude.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    #[test]
    fn builtin_list_matches_exact_and_glob() {
        let filter = ModelFilter::new(&["gemini-pro", "gemini-1.5-*"], &config(&[], &[]));

        assert!(filter.allows("gemini-pro"));
        assert!(filter.allows("gemini-1.5-flash"));
        assert!(!filter.allows("gemini-pro-vision"));
        assert!(!filter.allows("gpt-4o"));
    }

    #[test]
    fn configured_include_replaces_builtin() {
        let filter = ModelFilter::new(&["gemini-pro"], &config(&["gemini-2.0-*"], &[]));

        assert!(filter.allows("gemini-2.0-flash"));
        assert!(!filter.allows("gemini-pro"));
    }

    #[test]
    fn exclude_narrows_the_list() {
        let filter = ModelFilter::new(
            &["Llama2-*-chat-hf", "Llama2-chat-hf"],
            &config(&[], &["Llama2-70b-*"]),
        );

        assert!(filter.allows("Llama2-13b-chat-hf"));
        assert!(!filter.allows("Llama2-70b-chat-hf"));
    }

    struct Unrepresentable;

    impl serde::Serialize for Unrepresentable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("value has no JSON form"))
        }
    }

    #[test]
    fn serialization_failure_is_returned() {
        let err = RequestPayload::to_json(&Unrepresentable, 3).unwrap_err();

        assert!(err.to_string().contains("value has no JSON form"));
    }

    #[test]
    fn token_estimate_is_nonzero_for_text() {
        assert_eq!(estimate_tokens(""), 0);
        assert!(estimate_tokens("The quick brown fox jumps over the lazy dog") > 0);
    }
}
