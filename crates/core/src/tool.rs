//! Tool Registry
//!
//! A read-only table of the tools the model may call. Each entry pairs a
//! [`ToolSpec`] (name, description, parameter schema and required order) with
//! the handler that turns positional arguments into an actuator call.
//!
//! The registry renders two schema projections: one for the turn-based chat
//! API and one for the realtime session, which leaves out tools that would
//! produce audible output of their own.

use crate::actuator::{Actuator, ToolValue};
use crate::dispatch::{ToolArgs, ToolError};
use futures::future::BoxFuture;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Integer,
    Boolean,
}

impl ParamKind {
    fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    /// Allowed values, rendered as a JSON schema `enum`.
    pub allowed: Option<Vec<String>>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            allowed: None,
        }
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    fn schema(&self) -> Value {
        let mut schema = json!({
            "type": self.kind.as_str(),
            "description": self.description,
        });
        if let Some(allowed) = &self.allowed {
            schema["enum"] = json!(allowed);
        }
        schema
    }
}

/// Static description of one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// Declared parameters, in declaration order.
    pub parameters: Vec<ParamSpec>,
    /// Names of required parameters; also the positional argument order.
    pub required: Vec<String>,
    /// Whether the tool makes the robot produce sound, which would talk over
    /// the agent's own voice in a realtime session.
    pub audible: bool,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            required: Vec::new(),
            audible: false,
        }
    }

    /// Adds a required parameter; required order follows call order.
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.required.push(param.name.clone());
        self.parameters.push(param);
        self
    }

    pub fn audible(mut self) -> Self {
        self.audible = true;
        self
    }

    fn properties(&self) -> Map<String, Value> {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.schema()))
            .collect()
    }

    /// Schema for the chat completions `tools` list.
    pub fn chat_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": self.properties(),
                    "required": self.required,
                    "additionalProperties": false,
                },
                "strict": true,
            }
        })
    }

    /// Schema for the realtime `session.update` tools list.
    pub fn realtime_schema(&self) -> Value {
        json!({
            "type": "function",
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "strict": true,
                "properties": self.properties(),
                "required": self.required,
            }
        })
    }
}

/// Executes one tool against the actuator with already-extracted arguments.
pub type ToolHandler = Arc<
    dyn Fn(Arc<dyn Actuator>, ToolArgs) -> BoxFuture<'static, Result<ToolValue, ToolError>>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub struct RegisteredTool {
    pub spec: ToolSpec,
    handler: ToolHandler,
}

impl RegisteredTool {
    pub fn new<F>(spec: ToolSpec, handler: F) -> Self
    where
        F: Fn(Arc<dyn Actuator>, ToolArgs) -> BoxFuture<'static, Result<ToolValue, ToolError>>
            + Send
            + Sync
            + 'static,
    {
        debug_assert!(
            spec.required
                .iter()
                .all(|r| spec.parameters.iter().any(|p| &p.name == r)),
            "required parameters must be declared"
        );
        Self {
            spec,
            handler: Arc::new(handler),
        }
    }

    pub(crate) fn invoke(
        &self,
        actuator: Arc<dyn Actuator>,
        args: ToolArgs,
    ) -> BoxFuture<'static, Result<ToolValue, ToolError>> {
        (self.handler)(actuator, args)
    }
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Immutable collection of tools, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    /// Builds a registry. Later duplicates of a name are ignored.
    pub fn new(tools: Vec<RegisteredTool>) -> Self {
        let mut unique: Vec<RegisteredTool> = Vec::with_capacity(tools.len());
        for tool in tools {
            if unique.iter().any(|t| t.spec.name == tool.spec.name) {
                tracing::warn!(tool = %tool.spec.name, "Duplicate tool name ignored");
                continue;
            }
            unique.push(tool);
        }
        Self { tools: unique }
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.spec.name == name)
    }

    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter().map(|t| &t.spec)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool schemas for the turn-based mode, one per registered tool.
    pub fn list_for_turn_based(&self) -> Vec<Value> {
        self.specs().map(ToolSpec::chat_schema).collect()
    }

    /// Tool schemas for the realtime mode; audible tools are left out.
    pub fn list_for_realtime(&self) -> Vec<Value> {
        self.specs()
            .filter(|s| !s.audible)
            .map(ToolSpec::realtime_schema)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn noop(_: Arc<dyn Actuator>, _: ToolArgs) -> BoxFuture<'static, Result<ToolValue, ToolError>> {
        async { Ok(ToolValue::Unit) }.boxed()
    }

    fn sample_registry() -> ToolRegistry {
        ToolRegistry::new(vec![
            RegisteredTool::new(
                ToolSpec::new("setLights", "Set the lights.")
                    .param(
                        ParamSpec::new("leftColor", ParamKind::String, "Color for left light")
                            .one_of(["BLACK", "RED"]),
                    )
                    .param(ParamSpec::new("rightColor", ParamKind::String, "Color for right light")),
                noop,
            ),
            RegisteredTool::new(ToolSpec::new("speak", "Speak a text.").audible(), noop),
            RegisteredTool::new(ToolSpec::new("getDistance", "Read the sensor."), noop),
        ])
    }

    #[test]
    fn test_chat_projection_is_strict() {
        let tools = sample_registry().list_for_turn_based();
        assert_eq!(tools.len(), 3);

        let lights = &tools[0];
        assert_eq!(lights["type"], "function");
        assert_eq!(lights["function"]["name"], "setLights");
        assert_eq!(lights["function"]["strict"], true);
        assert_eq!(lights["function"]["parameters"]["type"], "object");
        assert_eq!(lights["function"]["parameters"]["additionalProperties"], false);
        assert_eq!(
            lights["function"]["parameters"]["required"],
            json!(["leftColor", "rightColor"])
        );
        assert_eq!(
            lights["function"]["parameters"]["properties"]["leftColor"]["enum"],
            json!(["BLACK", "RED"])
        );
        assert!(
            lights["function"]["parameters"]["properties"]["rightColor"]
                .get("enum")
                .is_none()
        );
    }

    #[test]
    fn test_realtime_projection_excludes_audible_tools() {
        let tools = sample_registry().list_for_realtime();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["setLights", "getDistance"]);

        let distance = &tools[1];
        assert_eq!(distance["type"], "function");
        assert_eq!(distance["parameters"]["strict"], true);
        assert_eq!(distance["parameters"]["required"], json!([]));
        assert_eq!(distance["parameters"]["properties"], json!({}));
        assert!(distance.get("function").is_none());
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let registry = ToolRegistry::new(vec![
            RegisteredTool::new(ToolSpec::new("a", "first"), noop),
            RegisteredTool::new(ToolSpec::new("a", "second"), noop),
        ]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().spec.description, "first");
        assert!(registry.get("b").is_none());
    }
}
