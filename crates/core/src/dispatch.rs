//! Tool Dispatcher
//!
//! Resolves a tool call against the [`ToolRegistry`], extracts the arguments
//! in the tool's required order and runs the handler. Every failure on the
//! way is folded into the result text, so callers always get a string back.

use crate::actuator::{Actuator, ActuatorError};
use crate::message::{ToolCallIntent, ToolResult};
use crate::tool::ToolRegistry;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reasons a tool call can fail. Never leaves the dispatcher as an error.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool is not registered")]
    UnknownTool,
    #[error("{0}")]
    MalformedArguments(#[source] serde_json::Error),
    #[error("invalid value for argument '{name}': {source}")]
    InvalidArgument {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{name} must be between {min} and {max}")]
    OutOfRange { name: String, min: f64, max: f64 },
    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}

/// Positional arguments extracted from a call, in required order.
///
/// Keys the model left out are kept as `None` rather than rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: Vec<(String, Option<Value>)>,
}

impl ToolArgs {
    /// Looks up each name of `order` in the parsed arguments. Anything that is
    /// not a JSON object yields all-absent arguments.
    pub fn extract(parsed: &Value, order: &[String]) -> Self {
        let values = order
            .iter()
            .map(|name| (name.clone(), parsed.get(name).cloned()))
            .collect();
        Self { values }
    }

    /// Raw positional values.
    pub fn values(&self) -> Vec<Option<&Value>> {
        self.values.iter().map(|(_, v)| v.as_ref()).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Decodes the argument at `index` into `T`; absent stays `None`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, ToolError> {
        match self.values.get(index) {
            Some((name, Some(value))) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| ToolError::InvalidArgument {
                    name: name.clone(),
                    source,
                }),
            _ => Ok(None),
        }
    }

    /// Like [`ToolArgs::get`] for numbers, rejecting present values outside `[min, max]`.
    pub fn get_in_range(&self, index: usize, min: f64, max: f64) -> Result<Option<f64>, ToolError> {
        let value: Option<f64> = self.get(index)?;
        match value {
            Some(v) if !(min..=max).contains(&v) => Err(ToolError::OutOfRange {
                name: self.values[index].0.clone(),
                min,
                max,
            }),
            other => Ok(other),
        }
    }
}

/// Formats the result text for a failed call.
pub fn error_text(tool_name: &str, error: &ToolError) -> String {
    format!("Error calling function \"{}\": {}", tool_name, error)
}

/// Runs tool calls against one actuator using one registry.
///
/// Cloning is cheap; both modes share the same dispatcher logic.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    actuator: Arc<dyn Actuator>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, actuator: Arc<dyn Actuator>) -> Self {
        Self { registry, actuator }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Runs `tool_name` with the JSON `raw_arguments` and returns the result text.
    ///
    /// The actuator is invoked at most once, and not at all when the tool is
    /// unknown or the arguments do not parse.
    pub async fn dispatch(&self, tool_name: &str, raw_arguments: &str) -> String {
        match self.try_dispatch(tool_name, raw_arguments).await {
            Ok(text) => {
                debug!(tool = %tool_name, result = %text, "Tool call succeeded");
                text
            }
            Err(e) => {
                warn!(tool = %tool_name, error = %e, "Tool call failed");
                error_text(tool_name, &e)
            }
        }
    }

    /// Dispatches an intent and correlates the result with its call id.
    pub async fn dispatch_intent(&self, intent: &ToolCallIntent) -> ToolResult {
        let text = self.dispatch(&intent.tool_name, &intent.raw_arguments).await;
        ToolResult {
            call_id: intent.id.clone(),
            text,
        }
    }

    async fn try_dispatch(&self, tool_name: &str, raw_arguments: &str) -> Result<String, ToolError> {
        let tool = self.registry.get(tool_name).ok_or(ToolError::UnknownTool)?;
        let parsed: Value =
            serde_json::from_str(raw_arguments).map_err(ToolError::MalformedArguments)?;
        let args = ToolArgs::extract(&parsed, &tool.spec.required);
        debug!(tool = %tool_name, args = ?args.values(), "Invoking tool");
        let value = tool.invoke(self.actuator.clone(), args).await?;
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{LightColor, MockActuator, ToolValue};
    use crate::robot_tools;
    use crate::tool::{ParamKind, ParamSpec, RegisteredTool, ToolSpec};
    use futures::FutureExt;
    use mockall::predicate::eq;
    use serde_json::json;
    use std::sync::Mutex;

    fn dispatcher(actuator: MockActuator) -> Dispatcher {
        Dispatcher::new(robot_tools::registry(), Arc::new(actuator))
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_without_actuator_call() {
        // No expectations: any actuator call would panic.
        let d = dispatcher(MockActuator::new());

        let text = d.dispatch("launchRocket", "{}").await;
        assert!(text.starts_with("Error calling function \"launchRocket\":"));
        assert_eq!(text, "Error calling function \"launchRocket\": tool is not registered");
    }

    #[tokio::test]
    async fn test_malformed_json_is_reported_without_actuator_call() {
        let d = dispatcher(MockActuator::new());

        for raw in ["", "{", "{leftColor: RED}", "{\"leftColor\": }"] {
            let text = d.dispatch("setLights", raw).await;
            assert!(
                text.starts_with("Error calling function \"setLights\": "),
                "unexpected result for {raw:?}: {text}"
            );
        }
    }

    #[tokio::test]
    async fn test_arguments_follow_required_order_and_ignore_extras() {
        let mut actuator = MockActuator::new();
        actuator
            .expect_set_motors()
            .with(eq(Some(1.0)), eq(Some(2.0)))
            .times(1)
            .returning(|_, _| Ok(()));
        let d = dispatcher(actuator);

        let text = d
            .dispatch("setMotors", r#"{"rightSpeed": 2, "c": 3, "leftSpeed": 1}"#)
            .await;
        assert_eq!(text, "undefined");
    }

    #[tokio::test]
    async fn test_generic_positional_extraction() {
        let seen: Arc<Mutex<Vec<Vec<Option<Value>>>>> = Arc::default();
        let recorder = seen.clone();
        let registry = ToolRegistry::new(vec![RegisteredTool::new(
            ToolSpec::new("pair", "Takes a then b.")
                .param(ParamSpec::new("a", ParamKind::Number, "first"))
                .param(ParamSpec::new("b", ParamKind::Number, "second")),
            move |_, args: ToolArgs| {
                let recorder = recorder.clone();
                async move {
                    let values = args.values().into_iter().map(|v| v.cloned()).collect();
                    recorder.lock().unwrap().push(values);
                    Ok(ToolValue::Number(3.0))
                }
                .boxed()
            },
        )]);
        let d = Dispatcher::new(Arc::new(registry), Arc::new(MockActuator::new()));

        assert_eq!(d.dispatch("pair", r#"{"a": 1, "b": 2, "c": 3}"#).await, "3");
        assert_eq!(d.dispatch("pair", r#"{"b": 2}"#).await, "3");
        assert_eq!(d.dispatch("pair", "[1, 2]").await, "3");

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], vec![Some(json!(1)), Some(json!(2))]);
        assert_eq!(seen[1], vec![None, Some(json!(2))]);
        assert_eq!(seen[2], vec![None, None]);
    }

    #[tokio::test]
    async fn test_missing_arguments_pass_through_as_absent() {
        let mut actuator = MockActuator::new();
        actuator
            .expect_set_lights()
            .with(eq(Some(LightColor::Red)), eq(None))
            .times(1)
            .returning(|_, _| Ok(()));
        let d = dispatcher(actuator);

        assert_eq!(d.dispatch("setLights", r#"{"leftColor": "RED"}"#).await, "undefined");
    }

    #[tokio::test]
    async fn test_actuator_failure_becomes_result_text() {
        let mut actuator = MockActuator::new();
        actuator
            .expect_get_distance()
            .times(1)
            .returning(|| Err(ActuatorError::Rejected("Distance sensor is not connected".into())));
        let d = dispatcher(actuator);

        assert_eq!(
            d.dispatch("getDistance", "{}").await,
            "Error calling function \"getDistance\": Distance sensor is not connected"
        );
    }

    #[tokio::test]
    async fn test_return_values_are_stringified() {
        let mut actuator = MockActuator::new();
        actuator.expect_get_distance().returning(|| Ok(42.0));
        actuator
            .expect_get_devices()
            .returning(|| Ok(vec!["Lights".into(), "Motors".into()]));
        let d = dispatcher(actuator);

        assert_eq!(d.dispatch("getDistance", "{}").await, "42");
        assert_eq!(d.dispatch("getDevices", "{}").await, "Lights,Motors");
    }

    #[tokio::test]
    async fn test_invalid_argument_type_is_reported() {
        let d = dispatcher(MockActuator::new());

        let text = d.dispatch("setLights", r#"{"leftColor": "PURPLE", "rightColor": "RED"}"#).await;
        assert!(text.starts_with(
            "Error calling function \"setLights\": invalid value for argument 'leftColor':"
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_speed_is_reported() {
        let d = dispatcher(MockActuator::new());

        let text = d.dispatch("setMotors", r#"{"leftSpeed": 150, "rightSpeed": 0}"#).await;
        assert_eq!(
            text,
            "Error calling function \"setMotors\": leftSpeed must be between -100 and 100"
        );
    }

    #[tokio::test]
    async fn test_dispatch_intent_keeps_call_id() {
        let mut actuator = MockActuator::new();
        actuator.expect_set_head().with(eq(Some(-20.0))).returning(|_| Ok(()));
        let d = dispatcher(actuator);

        let result = d
            .dispatch_intent(&ToolCallIntent {
                id: Some("call_7".into()),
                tool_name: "setHead".into(),
                raw_arguments: r#"{"position": -20}"#.into(),
            })
            .await;
        assert_eq!(result.call_id.as_deref(), Some("call_7"));
        assert_eq!(result.text, "undefined");
    }
}
