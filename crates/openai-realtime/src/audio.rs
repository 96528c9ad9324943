//! PCM16 audio plumbing for the realtime transport.
//!
//! The realtime API exchanges mono 16-bit little-endian PCM at 24 kHz,
//! base64-encoded inside JSON events.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const SAMPLE_RATE: u32 = 24_000;

/// 100 ms of mono PCM16 at [`SAMPLE_RATE`].
pub const CHUNK_BYTES: usize = (SAMPLE_RATE as usize / 10) * 2;

pub fn encode_pcm16(pcm: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(pcm)
}

pub fn decode_pcm16(fragment: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(fragment)
        .context("audio delta is not valid base64")
}

/// How long `bytes` of PCM16 take to play back.
pub fn duration_of(bytes: usize) -> Duration {
    Duration::from_secs_f64(bytes as f64 / 2.0 / SAMPLE_RATE as f64)
}

/// A local audio input, e.g. a microphone.
#[async_trait]
pub trait AudioSource: Send {
    /// Opens the device. Called once before the first read.
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next chunk of PCM16, or `None` when the input has ended.
    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// A local audio output, e.g. a speaker.
#[async_trait]
pub trait AudioSink: Send {
    async fn play(&mut self, pcm: &[u8]) -> Result<()>;
}

/// Streams a raw PCM16 file at real-time pace, as a microphone would.
pub struct FileSource {
    path: PathBuf,
    file: Option<File>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }
}

#[async_trait]
impl AudioSource for FileSource {
    async fn start(&mut self) -> Result<()> {
        let file = File::open(&self.path)
            .await
            .with_context(|| format!("cannot open audio input {}", self.path.display()))?;
        self.file = Some(file);
        Ok(())
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let file = self.file.as_mut().context("audio input not started")?;
        let mut chunk = vec![0u8; CHUNK_BYTES];
        let mut filled = 0;
        while filled < CHUNK_BYTES {
            let n = file.read(&mut chunk[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        // Whole samples only; a dangling odd byte ends the stream.
        chunk.truncate(filled - filled % 2);
        if chunk.is_empty() {
            return Ok(None);
        }
        tokio::time::sleep(duration_of(chunk.len())).await;
        Ok(Some(chunk))
    }
}

/// Appends received audio to a raw PCM16 file.
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)
            .await
            .with_context(|| format!("cannot create audio output {}", path.display()))?;
        Ok(Self { file })
    }
}

#[async_trait]
impl AudioSink for FileSink {
    async fn play(&mut self, pcm: &[u8]) -> Result<()> {
        self.file.write_all(pcm).await?;
        self.file.flush().await?;
        Ok(())
    }
}

/// Discards received audio.
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&mut self, _pcm: &[u8]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_pcm() {
        let pcm = [0x01, 0x00, 0xff, 0x7f];
        let encoded = encode_pcm16(&pcm);
        assert_eq!(encoded, "AQD/fw==");
        assert_eq!(decode_pcm16(&encoded).unwrap(), pcm);
        assert!(decode_pcm16("not base64!").is_err());
    }

    #[test]
    fn test_chunk_is_a_tenth_of_a_second() {
        assert_eq!(CHUNK_BYTES, 4800);
        assert_eq!(duration_of(CHUNK_BYTES), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_file_source_and_sink() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pcm");
        let output = dir.path().join("out.pcm");
        // 1.5 chunks plus a dangling byte.
        let data: Vec<u8> = (0..(CHUNK_BYTES + CHUNK_BYTES / 2 + 1)).map(|i| i as u8).collect();
        tokio::fs::write(&input, &data).await.unwrap();

        let mut source = FileSource::new(&input);
        assert!(source.read_chunk().await.is_err());
        source.start().await.unwrap();
        let mut sink = FileSink::create(&output).await.unwrap();
        let mut sizes = Vec::new();
        while let Some(chunk) = source.read_chunk().await.unwrap() {
            sizes.push(chunk.len());
            sink.play(&chunk).await.unwrap();
        }

        assert_eq!(sizes, vec![CHUNK_BYTES, CHUNK_BYTES / 2]);
        let written = tokio::fs::read(&output).await.unwrap();
        assert_eq!(written, data[..CHUNK_BYTES + CHUNK_BYTES / 2]);
    }

    #[tokio::test]
    async fn test_trailing_odd_byte_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("odd.pcm");
        tokio::fs::write(&input, vec![7u8; CHUNK_BYTES + 1]).await.unwrap();

        let mut source = FileSource::new(&input);
        source.start().await.unwrap();

        assert_eq!(source.read_chunk().await.unwrap().map(|c| c.len()), Some(CHUNK_BYTES));
        assert_eq!(source.read_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_input_fails_to_start() {
        let mut source = FileSource::new("/definitely/not/here.pcm");
        let err = source.start().await.unwrap_err();
        assert!(err.to_string().contains("cannot open audio input"));
    }
}
