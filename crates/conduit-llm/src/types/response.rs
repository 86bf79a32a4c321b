use serde::Serialize;

use crate::accumulate::ToolInvocation;

/// One piece of output pulled from a frame or a full response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionFragment {
    /// Plain text
    Text(String),
    /// Part of a tool invocation
    ToolCall(ToolCallPart),
}

/// Partial tool invocation carried by a single frame
///
/// The name and the arguments may arrive in separate frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallPart {
    /// Tool name, when this frame carries it
    pub name: Option<String>,
    /// Argument name/value pairs in wire order
    pub arguments: Vec<(String, serde_json::Value)>,
}

/// Token counts reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Generated tokens
    pub completion_tokens: u32,
}

impl Usage {
    /// Keep the larger of each count
    ///
    /// Streaming providers report running totals, so the latest report
    /// never decreases.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens.max(other.prompt_tokens),
            completion_tokens: self.completion_tokens.max(other.completion_tokens),
        }
    }
}

/// Final outcome of a completion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    /// Accumulated text
    Text(String),
    /// A single finalized tool invocation
    ToolInvocation(ToolInvocation),
}

impl CompletionResult {
    /// Text, if the call produced text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::ToolInvocation(_) => None,
        }
    }

    /// Tool invocation, if the call produced one
    pub const fn as_tool_invocation(&self) -> Option<&ToolInvocation> {
        match self {
            Self::Text(_) => None,
            Self::ToolInvocation(invocation) => Some(invocation),
        }
    }
}

/// Item yielded by a streaming completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionUpdate {
    /// Newly generated text
    Text(String),
    /// Terminal item carrying the call result
    Finished(CompletionResult),
}
