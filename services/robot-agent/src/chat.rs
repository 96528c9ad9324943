//! Interactive turn-based mode.

use crate::display::ViewCursor;
use anyhow::Result;
use robot_agent_core::conversation::ChatSession;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

const PROMPT: &[u8] = b"> ";

/// Reads instructions line by line until `exit` or end of input, printing
/// what each turn added to the session views.
pub async fn run_chat<R, W>(session: &mut ChatSession, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut cursor = ViewCursor::starting_after(
        session.conversation_view().len(),
        session.tool_call_view().len(),
        session.tool_result_view().len(),
    );
    let mut lines = input.lines();
    info!("Chat started, type 'exit' to quit");

    loop {
        output.write_all(PROMPT).await?;
        output.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line == "exit" {
            break;
        }
        if line.is_empty() {
            continue;
        }

        if let Err(e) = session.submit_user_turn(line).await {
            error!(error = ?e, "Turn failed");
            output
                .write_all(format!("Error: {:#}\n", e).as_bytes())
                .await?;
        }
        cursor
            .write_new(
                &mut output,
                &session.conversation_view(),
                &session.tool_call_view(),
                &session.tool_result_view(),
            )
            .await?;
    }

    info!("Chat ended");
    Ok(())
}
