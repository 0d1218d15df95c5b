//! Newline-delimited message framing.
//!
//! One frame is one line: a JSON object followed by `\n`. A trailing `\r` is
//! stripped and blank lines are skipped. The reader buffers partial reads
//! until a full line is available, so frame boundaries do not depend on how
//! the underlying stream splits its bytes.

use std::io;

use futures::Stream;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Frame delimiter.
const DELIMITER: u8 = b'\n';

/// Conditions reported by the framer.
#[derive(Debug, Error)]
pub enum FrameError {
    /// A line exceeded the configured limit. It is skipped; the stream stays usable.
    #[error("Frame exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// The stream ended in the middle of a frame.
    #[error("Stream closed with {bytes} bytes of an unterminated frame")]
    Truncated { bytes: usize },

    /// The underlying stream failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// An outbound message could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FrameError {
    /// Whether the stream can no longer be read after this error.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::TooLarge { .. })
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Splits an inbound byte stream into frames.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    max_frame_bytes: usize,
    /// Skipping the remainder of an oversized line.
    discarding: bool,
    finished: bool,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::new(),
            max_frame_bytes,
            discarding: false,
            finished: false,
        }
    }

    /// Read the next frame.
    ///
    /// Returns `None` once the stream has ended cleanly or after a terminal
    /// error has been reported.
    pub async fn next_frame(&mut self) -> Option<Result<Vec<u8>, FrameError>> {
        if self.finished {
            return None;
        }

        loop {
            let available = match self.inner.fill_buf().await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(FrameError::Io(e)));
                }
            };

            if available.is_empty() {
                self.finished = true;
                let pending = std::mem::take(&mut self.buf);
                if self.discarding || is_blank(&pending) {
                    return None;
                }
                return Some(Err(FrameError::Truncated {
                    bytes: pending.len(),
                }));
            }

            let newline = available.iter().position(|&b| b == DELIMITER);
            let chunk_len = newline.unwrap_or(available.len());
            let consumed = newline.map_or(chunk_len, |pos| pos + 1);

            let overflow = !self.discarding && self.buf.len() + chunk_len > self.max_frame_bytes;
            if !self.discarding && !overflow {
                self.buf.extend_from_slice(&available[..chunk_len]);
            }
            self.inner.consume(consumed);

            if overflow {
                self.buf.clear();
                // Skip the rest of the line unless it already ended here.
                self.discarding = newline.is_none();
                return Some(Err(FrameError::TooLarge {
                    limit: self.max_frame_bytes,
                }));
            }

            if newline.is_none() {
                continue;
            }

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let mut frame = std::mem::take(&mut self.buf);
            if frame.last() == Some(&b'\r') {
                frame.pop();
            }
            if is_blank(&frame) {
                continue;
            }
            return Some(Ok(frame));
        }
    }

    /// Turn the reader into a lazy stream of frames.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<u8>, FrameError>> {
        futures::stream::unfold(self, |mut reader| async move {
            reader.next_frame().await.map(|item| (item, reader))
        })
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

// ============================================================================
// Writer
// ============================================================================

/// Writes one message per line and flushes after each.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    /// Encode and write a single message as one frame.
    ///
    /// Compact JSON never contains a raw newline, so the delimiter is unambiguous.
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), FrameError> {
        let mut bytes = serde_json::to_vec(message)?;
        bytes.push(DELIMITER);
        self.inner.write_all(&bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the write side.
    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
