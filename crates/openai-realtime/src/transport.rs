//! Realtime transport over the OpenAI Realtime WebSocket API.

use crate::audio::{self, AudioSink, AudioSource};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use robot_agent_core::realtime::{EventChannel, RealtimeTransport, TransportError};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

pub const DEFAULT_URL: &str = "wss://api.openai.com/v1/realtime";
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

const CLOSE_GRACE: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub api_key: SecretString,
    pub model: String,
    pub url: String,
}

impl ConnectConfig {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            url: DEFAULT_URL.to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}?model={}", self.url, self.model)
    }
}

/// Tracks whether the current response is producing audio.
#[derive(Debug, Default)]
struct PlaybackState {
    speaking: Option<String>,
}

impl PlaybackState {
    /// Turns one backend event into what the session should see. Audio deltas
    /// go to `playback` and never reach the session.
    fn translate(&mut self, event: Value, playback: &mut Vec<Vec<u8>>) -> Vec<Value> {
        let kind = event.get("type").and_then(Value::as_str).unwrap_or_default();
        let response_id = event
            .get("response_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match kind {
            "response.audio.delta" | "response.output_audio.delta" => {
                match event.get("delta").and_then(Value::as_str).map(audio::decode_pcm16) {
                    Some(Ok(pcm)) => playback.push(pcm),
                    Some(Err(e)) => warn!(error = %e, "Dropping undecodable audio delta"),
                    None => warn!("Audio delta without payload"),
                }
                if self.speaking.is_some() {
                    return Vec::new();
                }
                self.speaking = Some(response_id.clone());
                vec![json!({"type": "output_audio_buffer.started", "response_id": response_id})]
            }
            "response.audio.done" | "response.output_audio.done" => self.finish().into_iter().collect(),
            "response.done" => {
                // A cancelled response may never send audio.done.
                let mut out: Vec<Value> = self.finish().into_iter().collect();
                out.push(event);
                out
            }
            _ => vec![event],
        }
    }

    fn finish(&mut self) -> Option<Value> {
        let response_id = self.speaking.take()?;
        Some(json!({"type": "output_audio_buffer.stopped", "response_id": response_id}))
    }
}

/// Realtime transport that streams local audio to the backend and plays its
/// audio through an [`AudioSink`], all over one WebSocket.
pub struct WebSocketTransport {
    config: ConnectConfig,
    source: Option<Box<dyn AudioSource>>,
    sink: Option<Box<dyn AudioSink>>,
    remote: Option<EventChannel>,
    ws: Option<WsStream>,
    shutdown: Option<oneshot::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Without a `source` no microphone audio is sent.
    pub fn new(
        config: ConnectConfig,
        source: Option<Box<dyn AudioSource>>,
        sink: Box<dyn AudioSink>,
    ) -> Self {
        Self {
            config,
            source,
            sink: Some(sink),
            remote: None,
            ws: None,
            shutdown: None,
            tasks: Vec::new(),
        }
    }
}

#[async_trait]
impl RealtimeTransport for WebSocketTransport {
    async fn acquire_local_audio(&mut self) -> Result<(), TransportError> {
        match self.source.as_mut() {
            Some(source) => {
                source.start().await.map_err(TransportError::MediaAcquisition)?;
                info!("Local audio acquired");
            }
            None => info!("No audio input, microphone streaming disabled"),
        }
        Ok(())
    }

    async fn open_event_channel(&mut self) -> Result<EventChannel, TransportError> {
        if self.remote.is_some() {
            return Err(TransportError::ChannelSetup(anyhow!("event channel already open")));
        }
        let (session, remote) = EventChannel::pair();
        self.remote = Some(remote);
        Ok(session)
    }

    async fn handshake(&mut self) -> Result<(), TransportError> {
        let ws = connect(&self.config).await.map_err(TransportError::Handshake)?;
        info!(model = %self.config.model, "Connected to OpenAI Realtime API");
        self.ws = Some(ws);
        Ok(())
    }

    async fn attach_remote_audio(&mut self) -> Result<(), TransportError> {
        let (Some(ws), Some(remote), Some(sink)) = (self.ws.take(), self.remote.take(), self.sink.take())
        else {
            return Err(TransportError::RemoteAudio(anyhow!(
                "handshake has not completed"
            )));
        };

        let (mic_tx, mic_rx) = mpsc::channel(16);
        if let Some(source) = self.source.take() {
            self.tasks.push(tokio::spawn(pump_microphone(source, mic_tx)));
        }
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown = Some(shutdown_tx);
        self.tasks
            .push(tokio::spawn(relay(ws, remote, sink, mic_rx, shutdown_rx)));
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut ws) = self.ws.take() {
            let _ = ws.close(None).await;
        }
        self.remote = None;
        for mut task in self.tasks.drain(..) {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
        debug!("WebSocket transport closed");
    }
}

async fn connect(config: &ConnectConfig) -> anyhow::Result<WsStream> {
    let mut request = config.endpoint().into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", config.api_key.expose_secret()).parse()?,
    );
    request
        .headers_mut()
        .insert("OpenAI-Beta", "realtime=v1".parse()?);

    let (ws, _) = connect_async(request)
        .await
        .context("Failed to connect to OpenAI Realtime WebSocket")?;
    Ok(ws)
}

async fn pump_microphone(mut source: Box<dyn AudioSource>, mic_tx: mpsc::Sender<Vec<u8>>) {
    loop {
        match source.read_chunk().await {
            Ok(Some(chunk)) => {
                if mic_tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!("Audio input ended");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Audio input failed");
                break;
            }
        }
    }
}

/// Moves events between the session and the WebSocket until either side
/// closes or shutdown is requested.
async fn relay(
    ws: WsStream,
    remote: EventChannel,
    mut sink: Box<dyn AudioSink>,
    mut mic_rx: mpsc::Receiver<Vec<u8>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let EventChannel {
        outbound: to_session,
        inbound: mut from_session,
    } = remote;
    let mut playback = PlaybackState::default();
    let mut mic_open = true;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = ws_tx.send(WsMessage::Close(None)).await;
                break;
            }
            outbound = from_session.recv() => {
                let Some(text) = outbound else {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                };
                if let Err(e) = ws_tx.send(WsMessage::Text(text.into())).await {
                    warn!(error = %e, "Failed to send event to the backend");
                    break;
                }
            }
            chunk = mic_rx.recv(), if mic_open => {
                let Some(chunk) = chunk else {
                    mic_open = false;
                    continue;
                };
                let append = json!({
                    "type": "input_audio_buffer.append",
                    "audio": audio::encode_pcm16(&chunk),
                });
                if let Err(e) = ws_tx.send(WsMessage::Text(append.to_string().into())).await {
                    warn!(error = %e, "Failed to stream audio to the backend");
                    break;
                }
            }
            inbound = ws_rx.next() => {
                let text = match inbound {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(?frame, "Backend closed the connection");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    None => break,
                };
                let event: Value = match serde_json::from_str(text.as_str()) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Backend sent non-JSON text");
                        continue;
                    }
                };
                let mut pcm = Vec::new();
                for event in playback.translate(event, &mut pcm) {
                    if to_session.send(event.to_string()).is_err() {
                        debug!("Session gone, dropping inbound event");
                    }
                }
                for chunk in pcm {
                    if let Err(e) = sink.play(&chunk).await {
                        warn!(error = %e, "Audio playback failed");
                    }
                }
            }
        }
    }
    debug!("Realtime relay finished");
}
