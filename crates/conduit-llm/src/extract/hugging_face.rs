use super::{Extracted, parse};
use crate::error::{CallPhase, LlmError};
use crate::protocol::hugging_face::{HfResponse, HfStreamFrame};
use crate::types::{CompletionFragment, Usage};

/// Extract from one `data:` frame
///
/// Special-token frames carry no content. A frame with `generated_text`
/// is the last one the server sends.
pub fn extract_frame(provider: &str, frame: &str) -> Result<Extracted, LlmError> {
    let frame: HfStreamFrame = parse(provider, frame.as_bytes())?;

    if let Some(message) = frame.error {
        return Err(failed(provider, message));
    }

    let fragment = frame
        .token
        .filter(|token| !token.special && !token.text.is_empty())
        .map(|token| CompletionFragment::Text(token.text));

    Ok(Extracted {
        fragment,
        usage: frame.details.map(|details| Usage {
            prompt_tokens: 0,
            completion_tokens: details.generated_tokens,
        }),
        terminal: frame.generated_text.is_some(),
    })
}

/// Extract `generated_text` from a blocking response
pub fn extract_full(provider: &str, body: &[u8]) -> Result<Extracted, LlmError> {
    let generation = match parse(provider, body)? {
        HfResponse::Batch(generations) => generations.into_iter().next(),
        HfResponse::Single(generation) => Some(generation),
        HfResponse::Error(error) => return Err(failed(provider, error.error)),
    };

    let Some(generation) = generation else {
        return Ok(Extracted::default());
    };

    let usage = generation.details.map(|details| Usage {
        prompt_tokens: 0,
        completion_tokens: details.generated_tokens,
    });
    let text = generation.generated_text;

    Ok(Extracted {
        fragment: (!text.is_empty()).then_some(CompletionFragment::Text(text)),
        usage,
        terminal: true,
    })
}

fn failed(provider: &str, message: String) -> LlmError {
    LlmError::CompletionFailed {
        provider: provider.to_owned(),
        phase: CallPhase::Extracting,
        status: None,
        message,
    }
}
