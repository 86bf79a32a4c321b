use std::fmt;

use thiserror::Error;

/// Stage of a completion call, carried by errors raised during it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Call accepted, nothing sent yet
    Idle,
    /// Provider-native request body built
    PayloadBuilt,
    /// Reading a streamed response body
    Streaming,
    /// Waiting on a single blocking response
    Blocking,
    /// Parsing a frame or full body into a fragment
    Extracting,
    /// Folding fragments into the call result
    Accumulating,
    /// Result produced
    Finalized,
}

impl CallPhase {
    /// Stable lowercase name used in logs and metric attributes
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PayloadBuilt => "payload_built",
            Self::Streaming => "streaming",
            Self::Blocking => "blocking",
            Self::Extracting => "extracting",
            Self::Accumulating => "accumulating",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during a completion call
#[derive(Debug, Error)]
pub enum LlmError {
    /// Model is not on the provider's allow-list
    #[error("{provider}: model not supported: {model}")]
    UnsupportedModel { provider: String, model: String },

    /// Named provider does not exist in configuration
    #[error("provider not found: {provider}")]
    ProviderNotFound { provider: String },

    /// Provider configuration cannot be used
    #[error("{provider}: invalid provider configuration: {message}")]
    InvalidConfig { provider: String, message: String },

    /// Upstream call failed: non-2xx status, connection failure, or timeout
    #[error("{provider}: completion failed while {phase}{}: {message}", status_suffix(.status))]
    CompletionFailed {
        provider: String,
        phase: CallPhase,
        status: Option<u16>,
        message: String,
    },

    /// Streamed body ended before the provider's end-of-stream marker
    #[error("{provider}: stream truncated after {received_bytes} bytes")]
    TruncatedStream { provider: String, received_bytes: u64 },

    /// A frame that must be JSON failed to parse
    #[error("{provider}: malformed frame {frame:?}: {source}")]
    MalformedFrame {
        provider: String,
        frame: String,
        #[source]
        source: serde_json::Error,
    },

    /// Provider-native request body could not be serialized
    #[error("{provider}: failed to serialize request body: {source}")]
    InvalidPayload {
        provider: String,
        #[source]
        source: serde_json::Error,
    },

    /// Tool-call accumulation used out of order
    #[error("invalid accumulator state: {0}")]
    InvalidState(&'static str),
}

impl LlmError {
    /// Whether a caller may reasonably retry the call
    ///
    /// Nothing is retried internally.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::CompletionFailed { .. } | Self::TruncatedStream { .. })
    }

    /// Short machine-readable kind for audit records and metrics
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedModel { .. } => "unsupported_model",
            Self::ProviderNotFound { .. } => "provider_not_found",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::CompletionFailed { .. } => "completion_failed",
            Self::TruncatedStream { .. } => "truncated_stream",
            Self::MalformedFrame { .. } => "malformed_frame",
            Self::InvalidPayload { .. } => "invalid_payload",
            Self::InvalidState(_) => "invalid_state",
        }
    }

    /// Upstream HTTP status, when the provider answered with one
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::CompletionFailed { status, .. } => *status,
            _ => None,
        }
    }

    pub(crate) fn malformed(provider: &str, frame: &str, source: serde_json::Error) -> Self {
        const MAX_FRAME: usize = 200;

        let frame = match frame.char_indices().nth(MAX_FRAME) {
            Some((end, _)) => format!("{}...", &frame[..end]),
            None => frame.to_owned(),
        };

        Self::MalformedFrame {
            provider: provider.to_owned(),
            frame,
            source,
        }
    }
}

#[allow(clippy::ref_option)]
fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_failed_display_includes_status() {
        let err = LlmError::CompletionFailed {
            provider: "gemini".to_owned(),
            phase: CallPhase::Blocking,
            status: Some(503),
            message: "overloaded".to_owned(),
        };

        assert_eq!(
            err.to_string(),
            "gemini: completion failed while blocking (status 503): overloaded"
        );
        assert_eq!(err.status(), Some(503));
        assert!(err.is_retryable());
    }

    #[test]
    fn unsupported_model_is_not_retryable() {
        let err = LlmError::UnsupportedModel {
            provider: "tgi".to_owned(),
            model: "gpt-4".to_owned(),
        };

        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "unsupported_model");
    }

    #[test]
    fn invalid_payload_is_not_retryable() {
        let source = serde_json::from_str::<serde_json::Value>("[").unwrap_err();
        let err = LlmError::InvalidPayload {
            provider: "gemini".to_owned(),
            source,
        };

        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "invalid_payload");
        assert!(err.to_string().starts_with("gemini: failed to serialize request body"));
    }

    #[test]
    fn malformed_frame_truncates_long_input() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let frame = "x".repeat(500);

        let LlmError::MalformedFrame { frame, .. } = LlmError::malformed("gemini", &frame, source) else {
            panic!("expected MalformedFrame");
        };

        assert_eq!(frame.len(), 203);
        assert!(frame.ends_with("..."));
    }
}
