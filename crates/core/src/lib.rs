//! Core of the robot agent: the tool registry and dispatcher that turn model
//! tool calls into actuator commands, plus the two conversation modes that
//! drive them.

pub mod actuator;
pub mod conversation;
pub mod dispatch;
pub mod llm_client;
pub mod mcp;
pub mod message;
pub mod projection;
pub mod realtime;
pub mod robot_tools;
pub mod tool;

pub use actuator::{Actuator, ActuatorError, LightColor, ToolValue};
pub use dispatch::{Dispatcher, ToolError};
pub use tool::ToolRegistry;
