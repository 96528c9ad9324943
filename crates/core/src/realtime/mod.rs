//! Realtime Session
//!
//! The speech-to-speech mode of the agent:
//!
//! - `event`: protocol events and the session event log.
//! - `transport`: the negotiation steps a transport must provide.
//! - `session`: the connection state machine and function-call handling.

pub mod event;
pub mod session;
pub mod transport;

pub use event::{Direction, EventEntry};
pub use session::{RealtimeError, RealtimeSession, RealtimeSettings, SessionState, TurnState};
pub use transport::{EventChannel, RealtimeTransport, TransportError};
