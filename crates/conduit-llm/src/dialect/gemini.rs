//! Gemini `generateContent` request builder

use super::{RequestPayload, estimate_tokens};
use crate::protocol::gemini::{
    GeminiContent, GeminiFunctionDeclaration, GeminiGenerationConfig, GeminiPart, GeminiRequest, GeminiTool,
};
use crate::types::{GenerationParams, Prompt, Role};

/// Models accepted when the provider configures no `models.include`
pub const BUILTIN_MODELS: &[&str] = &["gemini-pro", "gemini-1.0-pro*", "gemini-1.5-*"];

/// Build the request body
///
/// Gemini has no dialect defaults, so `params` is sent as given.
pub fn build(prompt: &Prompt, params: &GenerationParams) -> Result<RequestPayload, serde_json::Error> {
    let system_instruction = prompt.system_text().map(|text| GeminiContent {
        role: None,
        parts: vec![text_part(text)],
    });

    let contents = prompt
        .turns()
        .map(|message| GeminiContent {
            role: Some(if message.role == Role::Assistant { "model" } else { "user" }.to_owned()),
            parts: vec![text_part(message.content.clone())],
        })
        .collect();

    let generation_config = GeminiGenerationConfig {
        temperature: params.temperature,
        top_p: params.top_p,
        max_output_tokens: params.max_tokens,
        stop_sequences: params.stop.clone(),
        presence_penalty: params.presence_penalty,
        frequency_penalty: params.frequency_penalty,
    };

    let tools = (!prompt.tools.is_empty()).then(|| {
        vec![GeminiTool {
            function_declarations: prompt
                .tools
                .iter()
                .map(|tool| GeminiFunctionDeclaration {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                })
                .collect(),
        }]
    });

    let request = GeminiRequest {
        contents,
        system_instruction,
        generation_config: (generation_config != GeminiGenerationConfig::default()).then_some(generation_config),
        tools,
    };

    let prompt_tokens = prompt.messages.iter().map(|m| estimate_tokens(&m.content)).sum();

    RequestPayload::to_json(&request, prompt_tokens)
}

fn text_part(text: String) -> GeminiPart {
    GeminiPart {
        text: Some(text),
        function_call: None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{Message, ToolDeclaration};

    fn body(payload: &RequestPayload) -> String {
        String::from_utf8(payload.body.to_vec()).unwrap()
    }

    #[test]
    fn plain_prompt_has_no_optional_fields() {
        let prompt = Prompt::new(vec![Message::user("Hello")]);
        let payload = build(&prompt, &GenerationParams::default()).unwrap();

        insta::assert_snapshot!(body(&payload), @r#"{"contents":[{"role":"user","parts":[{"text":"Hello"}]}]}"#);
        assert!(payload.prompt_tokens > 0);
    }

    #[test]
    fn system_and_roles_map_to_gemini_shape() {
        let prompt = Prompt::new(vec![
            Message::system("Be brief."),
            Message::user("Hi"),
            Message::assistant("Hello!"),
            Message::user("Bye"),
        ]);
        let params = GenerationParams {
            temperature: Some(0.5),
            max_tokens: Some(100),
            ..Default::default()
        };

        let payload = build(&prompt, &params).unwrap();

        insta::assert_snapshot!(body(&payload), @r#"{"contents":[{"role":"user","parts":[{"text":"Hi"}]},{"role":"model","parts":[{"text":"Hello!"}]},{"role":"user","parts":[{"text":"Bye"}]}],"systemInstruction":{"parts":[{"text":"Be brief."}]},"generationConfig":{"temperature":0.5,"maxOutputTokens":100}}"#);
    }

    #[test]
    fn tools_become_function_declarations() {
        let prompt = Prompt::new(vec![Message::user("Find cats")]).with_tools(vec![ToolDeclaration {
            name: "search".to_owned(),
            description: "Search the web".to_owned(),
            parameters: Some(json!({"type": "object"})),
        }]);

        let payload = build(&prompt, &GenerationParams::default()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload.body).unwrap();

        assert_eq!(
            value["tools"],
            json!([{"functionDeclarations": [{
                "name": "search",
                "description": "Search the web",
                "parameters": {"type": "object"}
            }]}])
        );
    }
}
