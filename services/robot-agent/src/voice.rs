//! Voice mode over the realtime API.

use crate::config::Config;
use crate::display::ViewCursor;
use anyhow::{Context, Result};
use openai_realtime::{
    AudioSink, AudioSource, ConnectConfig, FileSink, FileSource, NullSink, WebSocketTransport,
};
use robot_agent_core::dispatch::Dispatcher;
use robot_agent_core::realtime::{RealtimeSession, RealtimeSettings, RealtimeTransport};
use std::future::Future;
use std::path::PathBuf;
use tokio::io::AsyncWrite;
use tracing::{info, warn};

/// Raw PCM16 mono 24 kHz files standing in for microphone and speaker.
#[derive(Debug, Clone, Default)]
pub struct VoiceOptions {
    pub audio_in: Option<PathBuf>,
    pub audio_out: Option<PathBuf>,
}

/// Runs a voice session against the OpenAI realtime backend until `shutdown`
/// resolves or the backend hangs up.
pub async fn run_voice<W: AsyncWrite + Unpin>(
    config: &Config,
    dispatcher: Dispatcher,
    options: VoiceOptions,
    shutdown: impl Future<Output = ()>,
    output: W,
) -> Result<()> {
    let api_key = config.realtime_api_key()?.clone();
    let source = options
        .audio_in
        .map(|path| Box::new(FileSource::new(path)) as Box<dyn AudioSource>);
    let sink: Box<dyn AudioSink> = match options.audio_out {
        Some(path) => Box::new(FileSink::create(path).await?),
        None => Box::new(NullSink),
    };

    let transport = WebSocketTransport::new(
        ConnectConfig::new(api_key, config.realtime_model.clone()),
        source,
        sink,
    );
    let mut session = RealtimeSession::new(
        transport,
        dispatcher,
        RealtimeSettings {
            instructions: config.system_prompt.clone(),
            voice: config.realtime_voice.clone(),
        },
    );
    drive(&mut session, shutdown, output).await
}

/// Starts `session`, prints view updates as events arrive and always stops
/// the session before returning. Running tool calls never delay `shutdown`.
pub async fn drive<T, W>(
    session: &mut RealtimeSession<T>,
    shutdown: impl Future<Output = ()>,
    mut output: W,
) -> Result<()>
where
    T: RealtimeTransport,
    W: AsyncWrite + Unpin,
{
    if let Err(e) = session.start_session().await {
        session.stop_session().await;
        return Err(e).context("Failed to start voice session");
    }
    info!("Voice session negotiated, press Ctrl+C to stop");

    tokio::pin!(shutdown);
    let mut cursor = ViewCursor::default();
    let result = loop {
        let open = tokio::select! {
            _ = &mut shutdown => break Ok(()),
            open = session.step() => open,
        };
        if !open {
            warn!("Realtime backend closed the session");
            break Ok(());
        }
        if let Err(e) = cursor
            .write_new(
                &mut output,
                &session.conversation_view(),
                &session.tool_call_view(),
                &session.tool_result_view(),
            )
            .await
        {
            break Err(e).context("Failed to print session output");
        }
    };

    session.stop_session().await;
    result
}
