//! Multi-provider completion gateway for Conduit
//!
//! Speaks the Gemini and HuggingFace text-generation dialects behind one
//! request/response model. Streamed bodies are decoded incrementally,
//! text is surfaced as it arrives, and streamed tool calls are folded into
//! a single invocation.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod accumulate;
pub mod audit;
pub mod decode;
pub mod dialect;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod protocol;
pub mod provider;
pub mod transport;
pub mod types;

pub use accumulate::{ToolCallAccumulator, ToolInvocation};
pub use audit::{AuditOutcome, AuditRecord, AuditSink, ChannelAuditSink, TracingAuditSink};
pub use error::{CallPhase, LlmError};
pub use gateway::{CompletionStream, Gateway};
pub use provider::{Dialect, ProviderConfig};
pub use types::{
    CompletionRequest, CompletionResult, CompletionUpdate, GenerationParams, Message, Prompt, Role, ToolDeclaration,
    Usage,
};
