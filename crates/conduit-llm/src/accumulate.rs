//! Folding streamed tool-call fragments into one invocation

use std::borrow::Cow;
use std::fmt::Write;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;

use crate::error::LlmError;
use crate::types::ToolCallPart;

/// Tool invocation being assembled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolInvocationBuffer {
    tool_name: Option<String>,
    tool_id: Option<String>,
    parameters: IndexMap<String, Value>,
}

impl ToolInvocationBuffer {
    fn fold(&mut self, part: ToolCallPart) {
        if self.tool_name.is_none()
            && let Some(name) = part.name
        {
            self.tool_id = Some(name.clone());
            self.tool_name = Some(name);
        }

        // A repeated argument name keeps its original position
        for (name, value) in part.arguments {
            self.parameters.insert(name, value);
        }
    }
}

/// Complete tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Tool to call
    pub tool_name: String,
    /// Invocation identifier; providers without ids reuse the name
    pub tool_id: String,
    /// Arguments in first-seen order, as sent by the provider
    pub parameters: Vec<(String, Value)>,
}

impl ToolInvocation {
    /// Argument value by name
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }

    /// Argument as text: strings verbatim, other values as compact JSON
    pub fn parameter(&self, name: &str) -> Option<Cow<'_, str>> {
        self.argument(name).map(argument_text)
    }

    /// Render as tagged markup
    ///
    /// `<invoke><tool_name>..</tool_name><tool_id>..</tool_id><parameters><arg>value</arg></parameters></invoke>`
    pub fn to_markup(&self) -> String {
        let mut out = String::from("<invoke>");
        let _ = write!(
            out,
            "<tool_name>{}</tool_name><tool_id>{}</tool_id><parameters>",
            escape(&self.tool_name),
            escape(&self.tool_id)
        );
        for (name, value) in &self.parameters {
            let _ = write!(
                out,
                "<{name}>{}</{name}>",
                escape(&argument_text(value)),
                name = escape(name)
            );
        }
        out.push_str("</parameters></invoke>");
        out
    }

    /// Render as a JSON object with arguments in first-seen order
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for ToolInvocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ToolInvocation", 3)?;
        state.serialize_field("tool_name", &self.tool_name)?;
        state.serialize_field("tool_id", &self.tool_id)?;
        state.serialize_field("arguments", &Arguments(&self.parameters))?;
        state.end()
    }
}

struct Arguments<'a>(&'a [(String, Value)]);

impl Serialize for Arguments<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, value)| (name, value)))
    }
}

fn argument_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(text) => Cow::Borrowed(text),
        other => Cow::Owned(other.to_string()),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Per-call tool-call accumulator
///
/// Open until finalized; afterwards the invocation is fixed and further
/// folds or finalizations fail.
#[derive(Debug)]
pub enum ToolCallAccumulator {
    /// Accepting fragments
    Open(ToolInvocationBuffer),
    /// Invocation produced
    Finalized(ToolInvocation),
}

impl Default for ToolCallAccumulator {
    fn default() -> Self {
        Self::Open(ToolInvocationBuffer::default())
    }
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the buffer
    pub fn fold(&mut self, part: ToolCallPart) -> Result<(), LlmError> {
        match self {
            Self::Open(buffer) => {
                buffer.fold(part);
                Ok(())
            }
            Self::Finalized(_) => Err(LlmError::InvalidState("fold after finalization")),
        }
    }

    /// Convert the buffer into an immutable invocation
    pub fn finalize(&mut self) -> Result<ToolInvocation, LlmError> {
        let Self::Open(buffer) = self else {
            return Err(LlmError::InvalidState("already finalized"));
        };

        let Some(tool_name) = buffer.tool_name.take() else {
            return Err(LlmError::InvalidState("tool call never received a name"));
        };

        let invocation = ToolInvocation {
            tool_id: buffer.tool_id.take().unwrap_or_else(|| tool_name.clone()),
            tool_name,
            parameters: std::mem::take(&mut buffer.parameters).into_iter().collect(),
        };
        *self = Self::Finalized(invocation.clone());

        Ok(invocation)
    }
}
