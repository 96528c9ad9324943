//! Actuator Capability Interface
//!
//! The robot is driven through the [`Actuator`] trait: one asynchronous
//! capability per registered tool. Arguments arrive positionally and may be
//! absent, since the dispatcher passes missing JSON keys through untouched.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Colors supported by the robot's left and right lights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LightColor {
    Black,
    Red,
    Green,
    Amber,
    Orange,
    Yellow,
}

impl LightColor {
    pub const ALL: [LightColor; 6] = [
        LightColor::Black,
        LightColor::Red,
        LightColor::Green,
        LightColor::Amber,
        LightColor::Orange,
        LightColor::Yellow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LightColor::Black => "BLACK",
            LightColor::Red => "RED",
            LightColor::Green => "GREEN",
            LightColor::Amber => "AMBER",
            LightColor::Orange => "ORANGE",
            LightColor::Yellow => "YELLOW",
        }
    }
}

impl fmt::Display for LightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value returned by a capability call.
///
/// Every actuator operation returns one of these shapes; the dispatcher
/// stringifies it into the tool result text.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolValue {
    /// The capability completed without a value.
    Unit,
    Number(f64),
    Text(String),
    List(Vec<String>),
}

/// Text used when a capability returns no value.
pub const NULL_MARKER: &str = "undefined";

impl fmt::Display for ToolValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolValue::Unit => f.write_str(NULL_MARKER),
            ToolValue::Number(n) => write!(f, "{}", n),
            ToolValue::Text(s) => f.write_str(s),
            ToolValue::List(items) => f.write_str(&items.join(",")),
        }
    }
}

/// Failure reported by the actuator while executing a capability.
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    /// The robot received the command but refused it.
    #[error("{0}")]
    Rejected(String),
    /// The robot could not be reached or answered with garbage.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Asynchronous capabilities offered by the robot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Sets the color of both lights; `BLACK` turns a light off.
    async fn set_lights(
        &self,
        left_color: Option<LightColor>,
        right_color: Option<LightColor>,
    ) -> Result<(), ActuatorError>;

    /// Sets both motor speeds, from -100 (full backwards) to 100 (full forwards).
    async fn set_motors(
        &self,
        left_speed: Option<f64>,
        right_speed: Option<f64>,
    ) -> Result<(), ActuatorError>;

    /// Moves the head, from -100 (fully right) to 100 (fully left).
    async fn set_head(&self, position: Option<f64>) -> Result<(), ActuatorError>;

    /// Speaks a text through the robot's speaker.
    async fn speak(&self, text: Option<String>) -> Result<(), ActuatorError>;

    /// Reads the distance sensor, in centimeters.
    async fn get_distance(&self) -> Result<f64, ActuatorError>;

    /// Lists the devices connected to the robot.
    async fn get_devices(&self) -> Result<Vec<String>, ActuatorError>;
}
