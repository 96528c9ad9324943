//! Conversation log entries shared by both session modes.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// The function part of a chat tool call, as emitted by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    pub arguments: String,
}

/// A tool call attached to an assistant message in the chat wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn intent(&self) -> ToolCallIntent {
        ToolCallIntent {
            id: Some(self.id.clone()),
            tool_name: self.function.name.clone(),
            raw_arguments: self.function.arguments.clone(),
        }
    }
}

/// A single message in the turn-based conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Some OpenAI-compatible backends send `"tool_calls": null` on plain replies.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ToolCall>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ToolCall>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// An assistant message carrying tool calls and optional text.
    pub fn assistant_with_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// A tool-role message answering the call identified by `result.call_id`.
    pub fn tool(result: ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: Some(result.text),
            tool_calls: Vec::new(),
            tool_call_id: result.call_id,
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// True when the message carries text other than whitespace.
    pub fn has_content(&self) -> bool {
        self.content
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }
}

/// A model's request to run one tool, independent of session mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallIntent {
    /// Correlation id; realtime items may not carry one.
    pub id: Option<String>,
    pub tool_name: String,
    pub raw_arguments: String,
}

/// The text produced by dispatching one [`ToolCallIntent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub call_id: Option<String>,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::from_str::<Role>("\"tool\"").unwrap(), Role::Tool);
        assert_eq!(format!("{}", Role::System), "system");
    }

    #[test]
    fn test_assistant_message_from_backend() {
        let raw = json!({
            "role": "assistant",
            "content": null,
            "refusal": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "setLights", "arguments": "{\"leftColor\":\"RED\"}"}
            }]
        });

        let message: Message = serde_json::from_value(raw).unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert!(!message.has_content());
        assert!(message.has_tool_calls());

        let intent = message.tool_calls[0].intent();
        assert_eq!(intent.id.as_deref(), Some("call_1"));
        assert_eq!(intent.tool_name, "setLights");
        assert_eq!(intent.raw_arguments, "{\"leftColor\":\"RED\"}");
    }

    #[test]
    fn test_assistant_message_with_null_tool_calls() {
        let raw = json!({"role": "assistant", "content": "Done", "tool_calls": null});

        let message: Message = serde_json::from_value(raw).unwrap();
        assert!(!message.has_tool_calls());
        assert_eq!(message.content.as_deref(), Some("Done"));

        let missing: Message =
            serde_json::from_value(json!({"role": "assistant", "content": "Done"})).unwrap();
        assert_eq!(missing, message);
    }

    #[test]
    fn test_tool_message_wire_shape() {
        let message = Message::tool(ToolResult {
            call_id: Some("call_9".into()),
            text: "undefined".into(),
        });

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({"role": "tool", "content": "undefined", "tool_call_id": "call_9"})
        );
    }

    #[test]
    fn test_has_content_ignores_whitespace() {
        assert!(!Message::assistant("   ").has_content());
        assert!(Message::assistant("Done").has_content());
        assert!(!Message::assistant_with_calls(None, vec![]).has_content());
    }
}
