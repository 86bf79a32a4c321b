//! Pulling completion fragments out of parsed provider responses

mod gemini;
mod hugging_face;

use crate::error::LlmError;
use crate::provider::Dialect;
use crate::types::{CompletionFragment, Usage};

/// What one frame or body contributed to the call
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Extracted {
    /// Content fragment, if the frame carried one
    pub fragment: Option<CompletionFragment>,
    /// Token counts, if the frame reported them
    pub usage: Option<Usage>,
    /// Frame marks the end of the stream
    pub terminal: bool,
}

/// Kind of output a call is producing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputKind {
    /// Plain text
    #[default]
    Text,
    /// A tool invocation; latched once seen
    ToolCall,
}

/// Per-call response extractor
///
/// Holds the output-kind latch: once a function call is seen, every later
/// fragment of the call is a tool-call fragment.
#[derive(Debug)]
pub struct ResponseExtractor {
    provider: String,
    dialect: Dialect,
    kind: OutputKind,
}

impl ResponseExtractor {
    pub fn new(provider: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            provider: provider.into(),
            dialect,
            kind: OutputKind::Text,
        }
    }

    /// Kind of output seen so far
    pub const fn kind(&self) -> OutputKind {
        self.kind
    }

    /// Extract from one decoded stream frame
    pub fn extract_frame(&mut self, frame: &str) -> Result<Extracted, LlmError> {
        match self.dialect {
            Dialect::Gemini => gemini::extract(&self.provider, frame.as_bytes(), &mut self.kind),
            Dialect::HuggingFace => hugging_face::extract_frame(&self.provider, frame),
        }
    }

    /// Extract from a complete non-streaming body
    pub fn extract_full(&mut self, body: &[u8]) -> Result<Extracted, LlmError> {
        match self.dialect {
            Dialect::Gemini => gemini::extract(&self.provider, body, &mut self.kind),
            Dialect::HuggingFace => hugging_face::extract_full(&self.provider, body),
        }
    }
}

fn parse<'a, T: serde::Deserialize<'a>>(provider: &str, input: &'a [u8]) -> Result<T, LlmError> {
    serde_json::from_slice(input).map_err(|e| LlmError::malformed(provider, &String::from_utf8_lossy(input), e))
}
