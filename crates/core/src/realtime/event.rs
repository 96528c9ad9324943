//! Realtime protocol events.
//!
//! Inbound events are decoded only as far as the state machine needs; the
//! full JSON is kept in the session log for the projections.

use crate::message::ToolCallIntent;
use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the model backend.
    Inbound,
    /// Sent by this client.
    Outbound,
}

/// One entry of the realtime event log.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEntry {
    pub direction: Direction,
    pub event: Value,
    pub timestamp: DateTime<Local>,
}

impl EventEntry {
    pub fn inbound(event: Value) -> Self {
        Self::new(Direction::Inbound, event)
    }

    pub fn outbound(event: Value) -> Self {
        Self::new(Direction::Outbound, event)
    }

    fn new(direction: Direction, event: Value) -> Self {
        Self {
            direction,
            event,
            timestamp: Local::now(),
        }
    }

    /// The event's `type` discriminator, or `""` when missing.
    pub fn kind(&self) -> &str {
        self.event.get("type").and_then(Value::as_str).unwrap_or("")
    }
}

/// Inbound events the session reacts to. Everything else is `Other`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "output_audio_buffer.started")]
    OutputAudioStarted,
    #[serde(rename = "output_audio_buffer.stopped")]
    OutputAudioStopped,
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Response,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum OutputItem {
    #[serde(rename = "function_call")]
    FunctionCall {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        call_id: Option<String>,
        /// Left empty when missing so the call still gets an error result.
        #[serde(default)]
        name: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(other)]
    Other,
}

impl Response {
    /// Tool-call intents in output order. The call id falls back to the item id.
    pub fn function_calls(&self) -> Vec<ToolCallIntent> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::FunctionCall {
                    id,
                    call_id,
                    name,
                    arguments,
                } => Some(ToolCallIntent {
                    id: call_id.clone().or_else(|| id.clone()),
                    tool_name: name.clone(),
                    raw_arguments: arguments.clone(),
                }),
                OutputItem::Other => None,
            })
            .collect()
    }
}

// --- Outbound builders ---

pub fn session_update(instructions: &str, voice: &str, tools: Vec<Value>) -> Value {
    json!({
        "type": "session.update",
        "session": {
            "instructions": instructions,
            "voice": voice,
            "tools": tools,
            "tool_choice": "auto",
        }
    })
}

pub fn function_call_output(call_id: Option<&str>, output: &str) -> Value {
    let mut item = json!({
        "type": "function_call_output",
        "output": output,
    });
    if let Some(call_id) = call_id {
        item["call_id"] = json!(call_id);
    }
    json!({
        "type": "conversation.item.create",
        "item": item,
    })
}

pub fn response_create() -> Value {
    json!({ "type": "response.create" })
}
