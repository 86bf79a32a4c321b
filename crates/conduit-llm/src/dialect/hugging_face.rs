//! HuggingFace text-generation request builder
//!
//! Text-generation endpoints take a single prompt string, so messages are
//! rendered through the chat template of the model family.

use std::fmt::Write;

use super::{RequestPayload, estimate_tokens};
use crate::protocol::hugging_face::{HfParameters, HfRequest};
use crate::types::{GenerationParams, Prompt, Role, ToolDeclaration};

/// Models accepted when the provider configures no `models.include`
pub const BUILTIN_MODELS: &[&str] = &[
    "StableBeluga2",
    "Upstage-Llama-2-*-instruct-v2",
    "Llama2-*-chat-hf",
    "Llama2-chat-hf",
    "mistralai/Mixtral-8x7B-Instruct-v0.1",
    "mistralai/Mistral-7B-Instruct-v0.2",
];

/// Context window used when the provider configures no `token_limit`
pub const DEFAULT_TOKEN_LIMIT: u32 = 4000;

/// Parameters every request carries unless overridden
fn dialect_defaults() -> GenerationParams {
    GenerationParams {
        temperature: Some(0.7),
        repetition_penalty: Some(1.1),
        ..Default::default()
    }
}

/// Prompt layout for a model family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTemplate {
    /// `[INST]` turns with a `<<SYS>>` block
    Llama2,
    /// `[INST]` turns, system text folded into the first user turn
    Mistral,
    /// `### System:` / `### User:` / `### Assistant:` sections
    Orca,
}

impl ChatTemplate {
    /// Pick the template from the model name
    pub fn for_model(model: &str) -> Self {
        let model = model.to_ascii_lowercase();

        if model.contains("mistral") || model.contains("mixtral") {
            Self::Mistral
        } else if model.contains("beluga") || model.contains("upstage") {
            Self::Orca
        } else {
            Self::Llama2
        }
    }

    /// Render the conversation into a single prompt string
    pub fn render(self, prompt: &Prompt) -> String {
        let system = system_section(prompt);

        match self {
            Self::Llama2 => render_llama2(prompt, system),
            Self::Mistral => render_mistral(prompt, system),
            Self::Orca => render_orca(prompt, system.as_deref()),
        }
    }
}

/// Build the request body
///
/// `params` is the caller and provider configuration merged; dialect
/// defaults and the new-token budget fill whatever it leaves unset.
pub fn build(
    model: &str,
    prompt: &Prompt,
    params: &GenerationParams,
    token_limit: u32,
    streaming: bool,
) -> Result<RequestPayload, serde_json::Error> {
    let inputs = ChatTemplate::for_model(model).render(prompt);
    let prompt_tokens = estimate_tokens(&inputs);

    let budget = GenerationParams {
        max_tokens: Some(token_limit.saturating_sub(prompt_tokens).max(1)),
        ..dialect_defaults()
    };
    let params = params.clone().or(&budget);

    let request = HfRequest {
        inputs,
        parameters: HfParameters {
            max_new_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            repetition_penalty: params.repetition_penalty,
            frequency_penalty: params.frequency_penalty,
            stop: params.stop,
            return_full_text: Some(false),
        },
        stream: streaming,
    };

    RequestPayload::to_json(&request, prompt_tokens)
}

fn system_section(prompt: &Prompt) -> Option<String> {
    let tools = (!prompt.tools.is_empty()).then(|| tools_block(&prompt.tools));

    match (prompt.system_text(), tools) {
        (Some(system), Some(tools)) => Some(format!("{system}\n\n{tools}")),
        (system, tools) => system.or(tools),
    }
}

fn tools_block(tools: &[ToolDeclaration]) -> String {
    let mut block = String::from(
        "In this environment you have access to a set of tools you can use to answer the user's question.\n<tools>\n",
    );

    for tool in tools {
        let _ = writeln!(block, "<tool_description>");
        let _ = writeln!(block, "<tool_name>{}</tool_name>", tool.name);
        let _ = writeln!(block, "<description>{}</description>", tool.description);
        if let Some(parameters) = &tool.parameters {
            let _ = writeln!(block, "<parameters>{parameters}</parameters>");
        }
        let _ = writeln!(block, "</tool_description>");
    }

    block.push_str("</tools>");
    block
}

fn render_llama2(prompt: &Prompt, mut system: Option<String>) -> String {
    let mut out = String::from("<s>");

    for message in prompt.turns() {
        match message.role {
            Role::User => {
                out.push_str("[INST] ");
                if let Some(system) = system.take() {
                    let _ = write!(out, "<<SYS>>\n{system}\n<</SYS>>\n\n");
                }
                let _ = write!(out, "{} [/INST]", message.content.trim());
            }
            Role::Assistant => {
                let _ = write!(out, " {} </s><s>", message.content.trim());
            }
            Role::System => {}
        }
    }

    if let Some(system) = system {
        let _ = write!(out, "[INST] <<SYS>>\n{system}\n<</SYS>>\n\n [/INST]");
    }

    out
}

fn render_mistral(prompt: &Prompt, mut system: Option<String>) -> String {
    let mut out = String::from("<s>");

    for message in prompt.turns() {
        match message.role {
            Role::User => {
                out.push_str("[INST] ");
                if let Some(system) = system.take() {
                    let _ = write!(out, "{system}\n\n");
                }
                let _ = write!(out, "{} [/INST]", message.content.trim());
            }
            Role::Assistant => {
                let _ = write!(out, "{}</s>", message.content.trim());
            }
            Role::System => {}
        }
    }

    if let Some(system) = system {
        let _ = write!(out, "[INST] {system} [/INST]");
    }

    out
}

fn render_orca(prompt: &Prompt, system: Option<&str>) -> String {
    let mut out = String::new();

    if let Some(system) = system {
        let _ = write!(out, "### System:\n{system}\n\n");
    }

    for message in prompt.turns() {
        let header = match message.role {
            Role::User => "### User:",
            Role::Assistant => "### Assistant:",
            Role::System => continue,
        };
        let _ = write!(out, "{header}\n{}\n\n", message.content.trim());
    }

    out.push_str("### Assistant:\n");
    out
}
