//! Session/Log Projections
//!
//! Read-only views over a session log, recomputed on every call. The exact
//! labels and strings are what front-ends display.

use crate::message::{Message, Role};
use crate::realtime::{Direction, EventEntry};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewEntry {
    pub label: String,
    pub content: String,
}

impl ViewEntry {
    fn new(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            content: content.into(),
        }
    }
}

fn tool_call_text(name: &str, arguments: &str) -> String {
    format!("{} with arguments: {}", name, arguments)
}

// --- Turn-based ---

/// User messages, and assistant messages with text but no tool calls.
pub fn chat_conversation(history: &[Message]) -> Vec<ViewEntry> {
    history
        .iter()
        .filter(|m| match m.role {
            Role::User => true,
            Role::Assistant => m.has_content() && !m.has_tool_calls(),
            Role::System | Role::Tool => false,
        })
        .map(|m| ViewEntry::new(m.role.to_string(), m.content.clone().unwrap_or_default()))
        .collect()
}

/// One entry per tool call, across all messages.
pub fn chat_tool_calls(history: &[Message]) -> Vec<ViewEntry> {
    history
        .iter()
        .flat_map(|m| m.tool_calls.iter())
        .map(|c| ViewEntry::new("Tool call", tool_call_text(&c.function.name, &c.function.arguments)))
        .collect()
}

/// System and tool messages.
pub fn chat_tool_results(history: &[Message]) -> Vec<ViewEntry> {
    history
        .iter()
        .filter(|m| !matches!(m.role, Role::User | Role::Assistant))
        .map(|m| ViewEntry::new(m.role.to_string(), m.content.clone().unwrap_or_default()))
        .collect()
}

/// The whole exchange minus the system prompt, with tool calls spelled out.
pub fn chat_timeline(history: &[Message]) -> Vec<ViewEntry> {
    let mut entries = Vec::new();
    for m in history.iter().filter(|m| m.role != Role::System) {
        if m.role != Role::Assistant || !m.has_tool_calls() {
            entries.push(ViewEntry::new(
                m.role.to_string(),
                m.content.clone().unwrap_or_default(),
            ));
            continue;
        }
        if m.has_content() {
            entries.push(ViewEntry::new("assistant", m.content.clone().unwrap_or_default()));
        }
        for call in &m.tool_calls {
            entries.push(ViewEntry::new(
                "assistant",
                format!(
                    "Tool call: {}",
                    tool_call_text(&call.function.name, &call.function.arguments)
                ),
            ));
        }
    }
    entries
}

// --- Realtime ---

fn inbound<'a>(events: &'a [EventEntry], kind: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    events
        .iter()
        .filter(move |e| e.direction == Direction::Inbound && e.kind() == kind)
        .map(|e| &e.event)
}

fn response_items<'a>(events: &'a [EventEntry]) -> impl Iterator<Item = &'a Value> + 'a {
    inbound(events, "response.done").flat_map(|e| {
        e.pointer("/response/output")
            .and_then(Value::as_array)
            .map(|items| items.iter())
            .into_iter()
            .flatten()
    })
}

fn item_text(item: &Value) -> String {
    item.get("content")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| {
                    p.get("transcript")
                        .or_else(|| p.get("text"))
                        .and_then(Value::as_str)
                })
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

/// Completed user transcriptions and assistant message output, in log order.
pub fn realtime_conversation(events: &[EventEntry]) -> Vec<ViewEntry> {
    let mut entries = Vec::new();
    for entry in events.iter().filter(|e| e.direction == Direction::Inbound) {
        match entry.kind() {
            "conversation.item.input_audio_transcription.completed" => {
                if let Some(text) = entry.event.get("transcript").and_then(Value::as_str) {
                    if !text.trim().is_empty() {
                        entries.push(ViewEntry::new("user", text.trim()));
                    }
                }
            }
            "response.done" => {
                let items = entry
                    .event
                    .pointer("/response/output")
                    .and_then(Value::as_array);
                for item in items.into_iter().flatten() {
                    if item.get("type").and_then(Value::as_str) == Some("message") {
                        let text = item_text(item);
                        if !text.trim().is_empty() {
                            entries.push(ViewEntry::new("assistant", text));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    entries
}

/// Function-call items from completed responses.
pub fn realtime_tool_calls(events: &[EventEntry]) -> Vec<ViewEntry> {
    response_items(events)
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("function_call"))
        .map(|item| {
            let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
            let arguments = item.get("arguments").and_then(Value::as_str).unwrap_or_default();
            ViewEntry::new("Tool call", tool_call_text(name, arguments))
        })
        .collect()
}

/// Streams and items that carry what the user said or the assistant answered.
const AUTHORED_PREFIXES: &[&str] = &[
    "conversation.item.input_audio_transcription.",
    "response.audio_transcript.",
    "response.output_audio_transcript.",
    "response.text.",
    "response.output_text.",
];

fn is_authored(entry: &EventEntry) -> bool {
    let kind = entry.kind();
    if kind == "response.done" || AUTHORED_PREFIXES.iter().any(|p| kind.starts_with(p)) {
        return true;
    }
    // Messages injected into the conversation by the client.
    kind == "conversation.item.create"
        && entry.event.pointer("/item/type").and_then(Value::as_str) == Some("message")
        && matches!(
            entry.event.pointer("/item/role").and_then(Value::as_str),
            Some("user" | "assistant")
        )
}

/// Every logged event that is neither user nor assistant content.
///
/// Tool outputs are labelled `tool` and show the output text. Anything else
/// is labelled `event` and shown by its type, plus the message for errors.
pub fn realtime_tool_results(events: &[EventEntry]) -> Vec<ViewEntry> {
    events
        .iter()
        .filter(|e| !is_authored(e))
        .map(|e| {
            let item = e.event.get("item");
            if item.and_then(|i| i.get("type")).and_then(Value::as_str) == Some("function_call_output") {
                let output = item
                    .and_then(|i| i.get("output"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                return ViewEntry::new("tool", output);
            }
            match e.event.pointer("/error/message").and_then(Value::as_str) {
                Some(message) => ViewEntry::new("event", format!("{}: {}", e.kind(), message)),
                None => ViewEntry::new("event", e.kind()),
            }
        })
        .collect()
}
