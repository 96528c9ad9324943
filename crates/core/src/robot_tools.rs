//! The robot's tool table.
//!
//! Built once per process and shared read-only by every session.

use crate::actuator::{Actuator, LightColor, ToolValue};
use crate::dispatch::{ToolArgs, ToolError};
use crate::tool::{ParamKind, ParamSpec, RegisteredTool, ToolRegistry, ToolSpec};
use futures::{FutureExt, future::BoxFuture};
use std::sync::{Arc, LazyLock};

const SPEED_RANGE: (f64, f64) = (-100.0, 100.0);

static REGISTRY: LazyLock<Arc<ToolRegistry>> = LazyLock::new(|| Arc::new(build()));

/// Returns the process-wide robot tool registry.
pub fn registry() -> Arc<ToolRegistry> {
    REGISTRY.clone()
}

fn color_param(name: &str, description: &str) -> ParamSpec {
    ParamSpec::new(name, ParamKind::String, description)
        .one_of(LightColor::ALL.iter().map(LightColor::as_str))
}

fn build() -> ToolRegistry {
    ToolRegistry::new(vec![
        RegisteredTool::new(
            ToolSpec::new(
                "setLights",
                "Set the color of the left and right light (or turn it off by setting it to BLACK).",
            )
            .param(color_param("leftColor", "Color for left light"))
            .param(color_param("rightColor", "Color for right light")),
            set_lights,
        ),
        RegisteredTool::new(
            ToolSpec::new(
                "setMotors",
                "Set the speed of the left and right motor (or turn it off by setting it to 0).",
            )
            .param(ParamSpec::new(
                "leftSpeed",
                ParamKind::Number,
                "Speed of left motor, from -100 (full backwards) to 100 (full forwards).",
            ))
            .param(ParamSpec::new(
                "rightSpeed",
                ParamKind::Number,
                "Speed of right motor, from -100 (full backwards) to 100 (full forwards).",
            )),
            set_motors,
        ),
        RegisteredTool::new(
            ToolSpec::new("setHead", "Set the position of the head.").param(ParamSpec::new(
                "position",
                ParamKind::Number,
                "Position, from -100 (fully to the right) to 100 (fully to the left).",
            )),
            set_head,
        ),
        RegisteredTool::new(
            ToolSpec::new("speak", "Speak a text via the speaker of the robot.")
                .param(ParamSpec::new(
                    "text",
                    ParamKind::String,
                    "Text to speak. The text has to be in English, no other language is supported. \
                     Special signs like apostrophe or so are not supported, only alphanumerical characters.",
                ))
                .audible(),
            speak,
        ),
        RegisteredTool::new(
            ToolSpec::new(
                "getDistance",
                "Get the distance which is detected by the distance sensor, value in centimeters.",
            ),
            get_distance,
        ),
        RegisteredTool::new(
            ToolSpec::new("getDevices", "Get the list of connected devices on the robot."),
            get_devices,
        ),
    ])
}

type HandlerFuture = BoxFuture<'static, Result<ToolValue, ToolError>>;

fn set_lights(actuator: Arc<dyn Actuator>, args: ToolArgs) -> HandlerFuture {
    async move {
        let left: Option<LightColor> = args.get(0)?;
        let right: Option<LightColor> = args.get(1)?;
        actuator.set_lights(left, right).await?;
        Ok(ToolValue::Unit)
    }
    .boxed()
}

fn set_motors(actuator: Arc<dyn Actuator>, args: ToolArgs) -> HandlerFuture {
    async move {
        let (min, max) = SPEED_RANGE;
        let left = args.get_in_range(0, min, max)?;
        let right = args.get_in_range(1, min, max)?;
        actuator.set_motors(left, right).await?;
        Ok(ToolValue::Unit)
    }
    .boxed()
}

fn set_head(actuator: Arc<dyn Actuator>, args: ToolArgs) -> HandlerFuture {
    async move {
        let (min, max) = SPEED_RANGE;
        let position = args.get_in_range(0, min, max)?;
        actuator.set_head(position).await?;
        Ok(ToolValue::Unit)
    }
    .boxed()
}

fn speak(actuator: Arc<dyn Actuator>, args: ToolArgs) -> HandlerFuture {
    async move {
        let text: Option<String> = args.get(0)?;
        actuator.speak(text).await?;
        Ok(ToolValue::Unit)
    }
    .boxed()
}

fn get_distance(actuator: Arc<dyn Actuator>, _args: ToolArgs) -> HandlerFuture {
    async move { Ok(ToolValue::Number(actuator.get_distance().await?)) }.boxed()
}

fn get_devices(actuator: Arc<dyn Actuator>, _args: ToolArgs) -> HandlerFuture {
    async move { Ok(ToolValue::List(actuator.get_devices().await?)) }.boxed()
}
