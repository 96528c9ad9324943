//! HTTP client for the robot's control server.
//!
//! Implements [`Actuator`] over the robot's JSON endpoints and keeps the
//! motors alive: the robot stops its motors when it has not heard a motor
//! command for a few seconds, so non-zero speeds are re-sent periodically.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Response};
use robot_agent_core::actuator::{Actuator, ActuatorError, LightColor};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often non-zero motor speeds are re-sent.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(2);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

type MotorSpeeds = (Option<f64>, Option<f64>);

#[derive(Serialize)]
struct LightsBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    left_color: Option<LightColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    right_color: Option<LightColor>,
}

#[derive(Serialize)]
struct MotorsBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    left_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    right_speed: Option<f64>,
}

#[derive(Serialize)]
struct HeadBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<f64>,
}

#[derive(Serialize)]
struct SpeakBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Deserialize)]
struct DistanceReply {
    distance: f64,
}

#[derive(Deserialize)]
struct ErrorReply {
    error: Option<String>,
}

struct Endpoint {
    http: Client,
    base_url: String,
}

impl Endpoint {
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ActuatorError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        let response = check(response).await?;
        let body = response
            .json::<T>()
            .await
            .with_context(|| format!("GET {url} returned an unexpected body"))?;
        Ok(body)
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ActuatorError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;
        check(response).await?;
        Ok(())
    }

    async fn post_motors(&self, (left_speed, right_speed): MotorSpeeds) -> Result<(), ActuatorError> {
        self.post(
            "/set_motors",
            &MotorsBody {
                left_speed,
                right_speed,
            },
        )
        .await
    }
}

/// Maps a non-2xx reply to the robot's own error message.
async fn check(response: Response) -> Result<Response, ActuatorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorReply>(&body)
        .ok()
        .and_then(|reply| reply.error)
        .unwrap_or_else(|| "Unknown error".to_string());
    debug!(%status, %message, "Robot rejected command");
    Err(ActuatorError::Rejected(message))
}

fn is_moving((left, right): MotorSpeeds) -> bool {
    left.is_some_and(|v| v != 0.0) || right.is_some_and(|v| v != 0.0)
}

/// Robot actuator over HTTP. Dropping the client stops its watchdog.
pub struct RobotClient {
    endpoint: Arc<Endpoint>,
    speeds: watch::Sender<MotorSpeeds>,
    watchdog: JoinHandle<()>,
}

impl RobotClient {
    /// Connects to the robot at `base_url` (e.g. `http://192.168.0.10:5000`).
    /// Must be called from within a tokio runtime.
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_watchdog_interval(base_url, WATCHDOG_INTERVAL)
    }

    pub fn with_watchdog_interval(base_url: impl Into<String>, period: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        let endpoint = Arc::new(Endpoint {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        });
        let (speeds, watched) = watch::channel((None, None));
        let watchdog = tokio::spawn(motor_watchdog(endpoint.clone(), watched, period));
        info!(base_url = %endpoint.base_url, "Robot client ready");
        Ok(Self {
            endpoint,
            speeds,
            watchdog,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.endpoint.base_url
    }

    /// Stops the motor watchdog. Safe to call more than once.
    pub fn shutdown(&self) {
        if !self.watchdog.is_finished() {
            self.watchdog.abort();
            debug!("Motor watchdog stopped");
        }
    }
}

impl Drop for RobotClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn motor_watchdog(endpoint: Arc<Endpoint>, speeds: watch::Receiver<MotorSpeeds>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let current = *speeds.borrow();
        if !is_moving(current) {
            continue;
        }
        debug!(?current, "Re-sending motor speeds");
        // Best effort: the next tick retries.
        if let Err(e) = endpoint.post_motors(current).await {
            warn!(error = %e, "Motor keep-alive failed");
        }
    }
}

#[async_trait]
impl Actuator for RobotClient {
    async fn set_lights(
        &self,
        left_color: Option<LightColor>,
        right_color: Option<LightColor>,
    ) -> Result<(), ActuatorError> {
        self.endpoint
            .post(
                "/set_lights",
                &LightsBody {
                    left_color,
                    right_color,
                },
            )
            .await
    }

    async fn set_motors(
        &self,
        left_speed: Option<f64>,
        right_speed: Option<f64>,
    ) -> Result<(), ActuatorError> {
        self.speeds.send_replace((left_speed, right_speed));
        self.endpoint.post_motors((left_speed, right_speed)).await
    }

    async fn set_head(&self, position: Option<f64>) -> Result<(), ActuatorError> {
        self.endpoint.post("/set_head", &HeadBody { position }).await
    }

    async fn speak(&self, text: Option<String>) -> Result<(), ActuatorError> {
        self.endpoint.post("/speak", &SpeakBody { text }).await
    }

    async fn get_distance(&self) -> Result<f64, ActuatorError> {
        let reply: DistanceReply = self.endpoint.get("/get_distance").await?;
        Ok(reply.distance)
    }

    async fn get_devices(&self) -> Result<Vec<String>, ActuatorError> {
        self.endpoint.get("/list_devices").await
    }
}
