//! Incremental printing of session views.

use robot_agent_core::projection::ViewEntry;
use tokio::io::{self, AsyncWrite, AsyncWriteExt};

/// Remembers how many entries of each view were already printed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ViewCursor {
    conversation: usize,
    tool_calls: usize,
    tool_results: usize,
}

impl ViewCursor {
    /// A cursor that treats the first entries of each view as already shown.
    pub fn starting_after(conversation: usize, tool_calls: usize, tool_results: usize) -> Self {
        Self {
            conversation,
            tool_calls,
            tool_results,
        }
    }

    /// Writes the entries added since the last call, tool traffic first.
    pub async fn write_new<W: AsyncWrite + Unpin>(
        &mut self,
        out: &mut W,
        conversation: &[ViewEntry],
        tool_calls: &[ViewEntry],
        tool_results: &[ViewEntry],
    ) -> io::Result<()> {
        write_tail(out, tool_calls, &mut self.tool_calls).await?;
        write_tail(out, tool_results, &mut self.tool_results).await?;
        write_tail(out, conversation, &mut self.conversation).await?;
        out.flush().await
    }
}

async fn write_tail<W: AsyncWrite + Unpin>(
    out: &mut W,
    entries: &[ViewEntry],
    shown: &mut usize,
) -> io::Result<()> {
    for entry in entries.iter().skip(*shown) {
        out.write_all(format!("[{}] {}\n", entry.label, entry.content).as_bytes())
            .await?;
    }
    *shown = entries.len();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, content: &str) -> ViewEntry {
        ViewEntry {
            label: label.into(),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn test_only_new_entries_are_written() {
        let mut cursor = ViewCursor::starting_after(0, 0, 1);
        let mut out = Vec::new();
        let conversation = vec![entry("user", "hi")];
        let results = vec![entry("system", "rules"), entry("tool", "undefined")];

        cursor
            .write_new(&mut out, &conversation, &[], &results)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[tool] undefined\n[user] hi\n");

        let mut again = Vec::new();
        cursor
            .write_new(&mut again, &conversation, &[], &results)
            .await
            .unwrap();
        assert!(again.is_empty());
    }
}
