use super::{Extracted, OutputKind, parse};
use crate::error::{CallPhase, LlmError};
use crate::protocol::gemini::{GeminiFunctionCall, GeminiResponse};
use crate::types::{CompletionFragment, ToolCallPart, Usage};

/// Extract from a full body or one streamed array element; both share a shape
pub fn extract(provider: &str, input: &[u8], kind: &mut OutputKind) -> Result<Extracted, LlmError> {
    let response: GeminiResponse = parse(provider, input)?;

    if let Some(error) = response.error {
        return Err(LlmError::CompletionFailed {
            provider: provider.to_owned(),
            phase: CallPhase::Extracting,
            status: error.code,
            message: match error.status {
                Some(status) => format!("{status}: {}", error.message),
                None => error.message,
            },
        });
    }

    let usage = response.usage_metadata.map(|meta| Usage {
        prompt_tokens: meta.prompt_token_count,
        completion_tokens: meta.candidates_token_count,
    });

    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    // A function call anywhere in the content outranks leading text
    let part = match parts.iter().position(|part| part.function_call.is_some()) {
        Some(index) => parts.into_iter().nth(index),
        None => parts.into_iter().next(),
    };

    let Some(part) = part else {
        return Ok(Extracted {
            usage,
            ..Extracted::default()
        });
    };

    if part.function_call.is_some() {
        *kind = OutputKind::ToolCall;
    }

    let fragment = match *kind {
        OutputKind::ToolCall => Some(CompletionFragment::ToolCall(
            part.function_call.map(tool_call_part).unwrap_or_default(),
        )),
        OutputKind::Text => part.text.filter(|text| !text.is_empty()).map(CompletionFragment::Text),
    };

    Ok(Extracted {
        fragment,
        usage,
        terminal: false,
    })
}

fn tool_call_part(call: GeminiFunctionCall) -> ToolCallPart {
    ToolCallPart {
        name: call.name.filter(|name| !name.is_empty()),
        arguments: call.args.into_iter().collect(),
    }
}
