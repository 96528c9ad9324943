//! Realtime Session State Machine
//!
//! Negotiates the transport, answers the backend's `session.created` with the
//! session configuration, tracks whether the agent is speaking, and runs the
//! function calls of each completed response through the shared dispatcher.

use super::event::{self, EventEntry, Response, ServerEvent};
use super::transport::{RealtimeTransport, TransportError};
use crate::conversation::DEFAULT_INSTRUCTIONS;
use crate::dispatch::Dispatcher;
use crate::message::ToolResult;
use crate::projection::{self, ViewEntry};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Who holds the floor while connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Listening,
    Speaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected(TurnState),
}

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("cannot start a session while {0:?}")]
    InvalidState(SessionState),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Values sent to the backend in `session.update`.
#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    pub instructions: String,
    pub voice: String,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            voice: "alloy".to_string(),
        }
    }
}

/// Progress of a dispatch batch, reported back to the session that started it.
#[derive(Debug)]
enum DispatchOutcome {
    Output(ToolResult),
    /// Every call of the batch has finished.
    Settled,
}

enum Input {
    Server(Option<String>),
    Dispatch(DispatchOutcome),
}

pub struct RealtimeSession<T: RealtimeTransport> {
    transport: T,
    dispatcher: Dispatcher,
    settings: RealtimeSettings,
    state: SessionState,
    outbound: Option<mpsc::UnboundedSender<String>>,
    inbound: Option<mpsc::UnboundedReceiver<String>>,
    outcome_tx: Option<mpsc::UnboundedSender<DispatchOutcome>>,
    outcome_rx: Option<mpsc::UnboundedReceiver<DispatchOutcome>>,
    batches_in_flight: usize,
    events: Vec<EventEntry>,
}

impl<T: RealtimeTransport> RealtimeSession<T> {
    pub fn new(transport: T, dispatcher: Dispatcher, settings: RealtimeSettings) -> Self {
        Self {
            transport,
            dispatcher,
            settings,
            state: SessionState::Disconnected,
            outbound: None,
            inbound: None,
            outcome_tx: None,
            outcome_rx: None,
            batches_in_flight: 0,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The turn sub-state, present only while connected.
    pub fn turn(&self) -> Option<TurnState> {
        match self.state {
            SessionState::Connected(turn) => Some(turn),
            _ => None,
        }
    }

    /// Inbound and outbound events of the current session, oldest first.
    pub fn events(&self) -> &[EventEntry] {
        &self.events
    }

    /// Whether tool calls of this session are still waiting to be reported.
    pub fn is_dispatching(&self) -> bool {
        self.batches_in_flight > 0
    }

    /// Negotiates the transport. On failure the session stays `Connecting`
    /// until [`RealtimeSession::stop_session`] is called.
    pub async fn start_session(&mut self) -> Result<(), RealtimeError> {
        if self.state != SessionState::Disconnected {
            return Err(RealtimeError::InvalidState(self.state));
        }
        self.state = SessionState::Connecting;
        self.events.clear();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        self.outcome_tx = Some(outcome_tx);
        self.outcome_rx = Some(outcome_rx);
        info!("Starting realtime session");

        if let Err(e) = self.negotiate().await {
            error!(error = %e, "Realtime negotiation failed");
            return Err(e.into());
        }
        info!("Transport negotiated, awaiting session.created");
        Ok(())
    }

    async fn negotiate(&mut self) -> Result<(), TransportError> {
        self.transport.acquire_local_audio().await?;
        let channel = self.transport.open_event_channel().await?;
        self.outbound = Some(channel.outbound);
        self.inbound = Some(channel.inbound);
        self.transport.handshake().await?;
        self.transport.attach_remote_audio().await
    }

    /// Tears the session down from any state. Calling it while disconnected
    /// does nothing. In-flight tool calls keep running; their outputs are
    /// dropped.
    pub async fn stop_session(&mut self) {
        if self.state == SessionState::Disconnected {
            debug!("stop_session while disconnected");
            return;
        }
        self.outbound = None;
        self.inbound = None;
        self.outcome_tx = None;
        self.outcome_rx = None;
        if self.batches_in_flight > 0 {
            info!(batches = self.batches_in_flight, "Abandoning outputs of running tool calls");
            self.batches_in_flight = 0;
        }
        self.transport.close().await;
        self.state = SessionState::Disconnected;
        info!("Realtime session stopped");
    }

    /// Sends an event if the channel is open; otherwise drops it silently.
    /// An `event_id` is added when the event has none.
    pub fn send_client_event(&mut self, mut event: Value) {
        let Some(outbound) = &self.outbound else {
            debug!(kind = ?event.get("type"), "Event channel closed, dropping outbound event");
            return;
        };
        if let Some(fields) = event.as_object_mut() {
            fields
                .entry("event_id")
                .or_insert_with(|| json!(Uuid::new_v4().to_string()));
        }
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound event");
                return;
            }
        };
        if outbound.send(text).is_err() {
            debug!("Transport gone, dropping outbound event");
            return;
        }
        self.events.push(EventEntry::outbound(event));
    }

    /// Waits for the next inbound event or tool-call outcome and handles it.
    /// Returns `false` once the backend has closed the event channel or the
    /// session is stopped.
    ///
    /// Cancel safe: nothing is consumed unless the call completes, so it can
    /// race a shutdown signal in `tokio::select!`.
    pub async fn step(&mut self) -> bool {
        let input = {
            let Some(inbound) = self.inbound.as_mut() else {
                return false;
            };
            match self.outcome_rx.as_mut() {
                Some(outcomes) => tokio::select! {
                    raw = inbound.recv() => Input::Server(raw),
                    Some(outcome) = outcomes.recv() => Input::Dispatch(outcome),
                },
                None => Input::Server(inbound.recv().await),
            }
        };

        match input {
            Input::Server(Some(raw)) => self.handle_server_event(&raw),
            Input::Server(None) => {
                info!("Event channel closed by the backend");
                return false;
            }
            Input::Dispatch(outcome) => self.on_dispatch_outcome(outcome),
        }
        true
    }

    /// Processes events until the channel closes or `shutdown` resolves.
    /// Running tool calls never hold up `shutdown`.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                open = self.step() => if !open {
                    break;
                },
            }
        }
    }

    /// Logs one inbound event and reacts to it. Malformed and unknown events
    /// are logged and otherwise ignored. Function calls are started here and
    /// report back through [`RealtimeSession::step`].
    pub fn handle_server_event(&mut self, raw: &str) {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Ignoring non-JSON event");
                return;
            }
        };
        self.events.push(EventEntry::inbound(value.clone()));

        let server_event = match ServerEvent::deserialize(&value) {
            Ok(server_event) => server_event,
            Err(e) => {
                warn!(error = %e, kind = ?value.get("type"), "Ignoring malformed event");
                return;
            }
        };

        match server_event {
            ServerEvent::SessionCreated => self.on_session_created(),
            ServerEvent::OutputAudioStarted => self.set_turn(TurnState::Speaking),
            ServerEvent::OutputAudioStopped => self.set_turn(TurnState::Listening),
            ServerEvent::ResponseDone { response } => self.on_response_done(response),
            ServerEvent::Other => {
                debug!(kind = ?value.get("type"), "Unhandled event");
            }
        }
    }

    fn on_session_created(&mut self) {
        if self.state != SessionState::Connecting {
            warn!(state = ?self.state, "Unexpected session.created");
            return;
        }
        let update = event::session_update(
            &self.settings.instructions,
            &self.settings.voice,
            self.dispatcher.registry().list_for_realtime(),
        );
        self.send_client_event(update);
        self.state = SessionState::Connected(TurnState::Listening);
        info!(voice = %self.settings.voice, "Realtime session configured");
    }

    fn set_turn(&mut self, turn: TurnState) {
        if let SessionState::Connected(current) = self.state {
            if current != turn {
                debug!(?turn, "Turn changed");
            }
            self.state = SessionState::Connected(turn);
        }
    }

    /// Runs the response's function calls concurrently on a separate task.
    fn on_response_done(&mut self, response: Response) {
        let intents = response.function_calls();
        if intents.is_empty() {
            return;
        }
        let Some(outcomes) = self.outcome_tx.clone() else {
            debug!(calls = intents.len(), "Session stopped, not dispatching");
            return;
        };
        info!(calls = intents.len(), "Dispatching function calls");
        self.batches_in_flight += 1;

        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let mut pending: FuturesUnordered<_> = intents
                .into_iter()
                .map(|intent| {
                    let dispatcher = dispatcher.clone();
                    async move { dispatcher.dispatch_intent(&intent).await }
                })
                .collect();

            // Sends fail once the session has stopped; the calls still finish.
            while let Some(result) = pending.next().await {
                let _ = outcomes.send(DispatchOutcome::Output(result));
            }
            let _ = outcomes.send(DispatchOutcome::Settled);
        });
    }

    fn on_dispatch_outcome(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Output(result) => {
                self.send_client_event(event::function_call_output(
                    result.call_id.as_deref(),
                    &result.text,
                ));
            }
            DispatchOutcome::Settled => {
                self.batches_in_flight = self.batches_in_flight.saturating_sub(1);
                // Re-arm the model only after every call has settled.
                self.send_client_event(event::response_create());
            }
        }
    }

    pub fn conversation_view(&self) -> Vec<ViewEntry> {
        projection::realtime_conversation(&self.events)
    }

    pub fn tool_call_view(&self) -> Vec<ViewEntry> {
        projection::realtime_tool_calls(&self.events)
    }

    pub fn tool_result_view(&self) -> Vec<ViewEntry> {
        projection::realtime_tool_results(&self.events)
    }
}
