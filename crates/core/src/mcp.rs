//! Robot MCP Service
//!
//! Exposes the robot's capabilities as Model Context Protocol tools, so any
//! MCP client (an IDE assistant, a desktop chat app) can drive the robot
//! without going through the agent's own conversation loops.

use crate::actuator::{Actuator, LightColor, ToolValue};
use crate::dispatch::ToolError;
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

const MIN_LEVEL: f64 = -100.0;
const MAX_LEVEL: f64 = 100.0;

// --- Tool Arguments ---

#[derive(Deserialize, JsonSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SetLightsArgs {
    #[schemars(description = "Color for left light")]
    pub left_color: LightColor,
    #[schemars(description = "Color for right light")]
    pub right_color: LightColor,
}

#[derive(Deserialize, JsonSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SetMotorsArgs {
    /// Speed of left motor, from -100 (full backwards) to 100 (full forwards).
    pub left_speed: f64,
    /// Speed of right motor, from -100 (full backwards) to 100 (full forwards).
    pub right_speed: f64,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SetHeadArgs {
    /// Position, from -100 (fully to the right) to 100 (fully to the left).
    pub position: f64,
}

#[derive(Deserialize, JsonSchema, Debug)]
pub struct SpeakArgs {
    /// Text to speak, English and alphanumerical characters only.
    pub text: String,
}

fn check_level(name: &str, value: f64) -> Result<(), String> {
    if (MIN_LEVEL..=MAX_LEVEL).contains(&value) {
        return Ok(());
    }
    Err(ToolError::OutOfRange {
        name: name.to_string(),
        min: MIN_LEVEL,
        max: MAX_LEVEL,
    }
    .to_string())
}

// --- Service ---

/// MCP server over a shared actuator.
pub struct RobotMcpService {
    actuator: Arc<dyn Actuator>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for RobotMcpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some("Controls a lego robot: lights, motors, head, speaker and distance sensor.".into()),
            ..Default::default()
        }
    }
}

#[tool_router]
impl RobotMcpService {
    pub fn new(actuator: Arc<dyn Actuator>) -> Self {
        Self {
            actuator,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "setLights",
        description = "Set the color of the left and right light (or turn it off by setting it to BLACK)."
    )]
    pub async fn set_lights(&self, args: Parameters<SetLightsArgs>) -> Result<String, String> {
        info!(args = ?args.0, "Executing tool 'setLights'");
        let SetLightsArgs {
            left_color,
            right_color,
        } = args.0;
        self.actuator
            .set_lights(Some(left_color), Some(right_color))
            .await
            .map_err(|e| e.to_string())?;
        Ok(format!(
            "Set left light to {} and right light to {}",
            left_color, right_color
        ))
    }

    #[tool(
        name = "setMotors",
        description = "Set the speed of the left and right motor (or turn it off by setting it to 0)."
    )]
    pub async fn set_motors(&self, args: Parameters<SetMotorsArgs>) -> Result<String, String> {
        info!(args = ?args.0, "Executing tool 'setMotors'");
        let SetMotorsArgs {
            left_speed,
            right_speed,
        } = args.0;
        check_level("leftSpeed", left_speed)?;
        check_level("rightSpeed", right_speed)?;
        self.actuator
            .set_motors(Some(left_speed), Some(right_speed))
            .await
            .map_err(|e| e.to_string())?;
        Ok(format!(
            "Set left motor speed to {} and right motor speed to {}",
            left_speed, right_speed
        ))
    }

    #[tool(name = "setHead", description = "Set the position of the head.")]
    pub async fn set_head(&self, args: Parameters<SetHeadArgs>) -> Result<String, String> {
        info!(args = ?args.0, "Executing tool 'setHead'");
        let position = args.0.position;
        check_level("position", position)?;
        self.actuator
            .set_head(Some(position))
            .await
            .map_err(|e| e.to_string())?;
        Ok(format!("Set head position to {}", position))
    }

    #[tool(name = "speak", description = "Speak a text via the speaker of the robot.")]
    pub async fn speak(&self, args: Parameters<SpeakArgs>) -> Result<String, String> {
        info!("Executing tool 'speak'");
        self.actuator
            .speak(Some(args.0.text))
            .await
            .map_err(|e| e.to_string())?;
        Ok("Speaking".to_string())
    }

    #[tool(
        name = "getDistance",
        description = "Get the distance which is detected by the distance sensor, value in centimeters."
    )]
    pub async fn get_distance(&self) -> Result<String, String> {
        info!("Executing tool 'getDistance'");
        let distance = self
            .actuator
            .get_distance()
            .await
            .map_err(|e| e.to_string())?;
        Ok(ToolValue::Number(distance).to_string())
    }

    #[tool(
        name = "getDevices",
        description = "Get the list of connected devices on the robot."
    )]
    pub async fn get_devices(&self) -> Result<String, String> {
        info!("Executing tool 'getDevices'");
        let devices = self
            .actuator
            .get_devices()
            .await
            .map_err(|e| e.to_string())?;
        Ok(ToolValue::List(devices).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{ActuatorError, MockActuator};
    use mockall::predicate::eq;

    fn service(actuator: MockActuator) -> RobotMcpService {
        RobotMcpService::new(Arc::new(actuator))
    }

    #[test]
    fn test_router_lists_every_robot_tool() {
        let mut names: Vec<String> = service(MockActuator::new())
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["getDevices", "getDistance", "setHead", "setLights", "setMotors", "speak"]
        );
    }

    #[tokio::test]
    async fn test_set_lights_reports_colors() {
        let mut actuator = MockActuator::new();
        actuator
            .expect_set_lights()
            .with(eq(Some(LightColor::Green)), eq(Some(LightColor::Black)))
            .times(1)
            .returning(|_, _| Ok(()));

        let result = service(actuator)
            .set_lights(Parameters(SetLightsArgs {
                left_color: LightColor::Green,
                right_color: LightColor::Black,
            }))
            .await;
        assert_eq!(
            result,
            Ok("Set left light to GREEN and right light to BLACK".to_string())
        );
    }

    #[tokio::test]
    async fn test_set_motors_rejects_out_of_range() {
        // No expectations: the actuator must not be reached.
        let result = service(MockActuator::new())
            .set_motors(Parameters(SetMotorsArgs {
                left_speed: 10.0,
                right_speed: -101.0,
            }))
            .await;
        assert_eq!(
            result,
            Err("rightSpeed must be between -100 and 100".to_string())
        );
    }

    #[tokio::test]
    async fn test_set_motors_and_head_report_values() {
        let mut actuator = MockActuator::new();
        actuator
            .expect_set_motors()
            .with(eq(Some(-50.0)), eq(Some(50.0)))
            .returning(|_, _| Ok(()));
        actuator
            .expect_set_head()
            .with(eq(Some(100.0)))
            .returning(|_| Ok(()));
        let service = service(actuator);

        let motors = service
            .set_motors(Parameters(SetMotorsArgs {
                left_speed: -50.0,
                right_speed: 50.0,
            }))
            .await;
        assert_eq!(
            motors,
            Ok("Set left motor speed to -50 and right motor speed to 50".to_string())
        );

        let head = service
            .set_head(Parameters(SetHeadArgs { position: 100.0 }))
            .await;
        assert_eq!(head, Ok("Set head position to 100".to_string()));
    }

    #[tokio::test]
    async fn test_sensor_reads_and_failures() {
        let mut actuator = MockActuator::new();
        actuator.expect_get_distance().returning(|| Ok(17.5));
        actuator
            .expect_get_devices()
            .returning(|| Err(ActuatorError::Rejected("Robot is busy".into())));
        actuator.expect_speak().returning(|_| Ok(()));
        let service = service(actuator);

        assert_eq!(service.get_distance().await, Ok("17.5".to_string()));
        assert_eq!(service.get_devices().await, Err("Robot is busy".to_string()));
        assert_eq!(
            service
                .speak(Parameters(SpeakArgs {
                    text: "hello".into()
                }))
                .await,
            Ok("Speaking".to_string())
        );
    }
}
