//! Provider-agnostic request and result types
//!
//! Callers describe a completion with these; each dialect translates them
//! into its own wire format.

pub mod message;
pub mod request;
pub mod response;
pub mod tool;

pub use message::{Message, Prompt, Role};
pub use request::{CompletionRequest, GenerationParams};
pub use response::{CompletionFragment, CompletionResult, CompletionUpdate, ToolCallPart, Usage};
pub use tool::ToolDeclaration;
