//! The transport a realtime session is negotiated over.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// A failed negotiation step.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to acquire local audio: {0:#}")]
    MediaAcquisition(anyhow::Error),
    #[error("failed to open event channel: {0:#}")]
    ChannelSetup(anyhow::Error),
    #[error("handshake with the model backend failed: {0:#}")]
    Handshake(anyhow::Error),
    #[error("failed to attach remote audio: {0:#}")]
    RemoteAudio(anyhow::Error),
}

/// Both directions of the event channel, as JSON text frames.
#[derive(Debug)]
pub struct EventChannel {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

impl EventChannel {
    /// Creates a connected pair: the session half and the transport half.
    pub fn pair() -> (EventChannel, EventChannel) {
        let (to_remote, from_session) = mpsc::unbounded_channel();
        let (to_session, from_remote) = mpsc::unbounded_channel();
        (
            EventChannel {
                outbound: to_remote,
                inbound: from_remote,
            },
            EventChannel {
                outbound: to_session,
                inbound: from_session,
            },
        )
    }
}

/// Negotiation steps of a bidirectional realtime transport, called in order
/// by the session: local audio, event channel, handshake, remote audio.
#[async_trait]
pub trait RealtimeTransport: Send {
    /// Acquires the local audio source and sets up the outbound media track.
    async fn acquire_local_audio(&mut self) -> Result<(), TransportError>;

    /// Opens the dedicated event channel and returns the session's half.
    async fn open_event_channel(&mut self) -> Result<EventChannel, TransportError>;

    /// Performs the offer/answer exchange with the model backend.
    async fn handshake(&mut self) -> Result<(), TransportError>;

    /// Routes the backend's audio to local playback.
    async fn attach_remote_audio(&mut self) -> Result<(), TransportError>;

    /// Stops outbound media and tears the connection down. Must be idempotent.
    async fn close(&mut self);
}
