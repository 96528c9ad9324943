//! OpenAI Realtime API transport for the robot agent's voice mode.

pub mod audio;
pub mod transport;

pub use audio::{AudioSink, AudioSource, FileSink, FileSource, NullSink};
pub use transport::{ConnectConfig, DEFAULT_MODEL, WebSocketTransport};
