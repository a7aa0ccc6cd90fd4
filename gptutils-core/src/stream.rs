// gptutils-core/src/stream.rs

//! Decoder for `text/event-stream` chat-completion bodies.
//!
//! The body is read one newline-terminated record at a time. Each record is
//! trimmed and then classified:
//!
//! * blank line → skipped
//! * `data: [DONE]` → clean end, nothing more is read
//! * `data: <json>` → parsed as a [`StreamChunk`]; a non-empty delta of the
//!   first choice is handed to the caller's handler before the next read
//! * anything else (`:` comments, `event:`, `id:`, `retry:`) → ignored
//!
//! Records that fail to parse are dropped. End of input without the sentinel
//! is also a clean end. A handler error stops decoding and is returned as is.

use crate::errors::{BoxError, ChatError, TransportError};
use crate::models::chat::{FinishReason, StreamChunk, Usage};
use futures_util::TryStreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::io::StreamReader;
use tracing::{debug, trace};

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "data: [DONE]";

/// What a finished stream looked like.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSummary {
    /// Number of handler invocations.
    pub fragments: usize,
    /// `true` if the `[DONE]` sentinel was seen, `false` if the body just ended.
    pub completed: bool,
    /// Last finish reason reported by any chunk.
    pub finish_reason: Option<FinishReason>,
    /// Token usage from the trailing usage chunk, when the server sent one.
    pub usage: Option<Usage>,
}

#[derive(Debug, PartialEq)]
enum LineKind<'a> {
    Skip,
    Done,
    Data(&'a str),
}

fn classify(line: &str) -> LineKind<'_> {
    if line.is_empty() {
        return LineKind::Skip;
    }
    if line == DONE_SENTINEL {
        return LineKind::Done;
    }
    match line.strip_prefix(DATA_PREFIX) {
        Some(data) => LineKind::Data(data),
        None => LineKind::Skip,
    }
}

/// Decodes an event stream from `reader`, calling `handler` once per
/// non-empty text delta, in order.
pub async fn decode_stream<R, F, E>(mut reader: R, mut handler: F) -> Result<StreamSummary, ChatError>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(&str) -> Result<(), E>,
    E: Into<BoxError>,
{
    let mut summary = StreamSummary::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(TransportError::Read)?;

        if read == 0 {
            debug!(fragments = summary.fragments, "Stream ended without [DONE] sentinel.");
            break;
        }
        if buf.last() != Some(&b'\n') {
            debug!(bytes = read, "Discarding unterminated trailing record.");
            break;
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(text) => text.trim(),
            Err(e) => {
                debug!(error = %e, "Skipping non UTF-8 stream record.");
                continue;
            }
        };
        trace!(line = %line, "Stream record");

        let data = match classify(line) {
            LineKind::Skip => continue,
            LineKind::Done => {
                summary.completed = true;
                debug!(fragments = summary.fragments, "Received [DONE] sentinel.");
                break;
            }
            LineKind::Data(data) => data,
        };

        let chunk: StreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, data = %data, "Skipping malformed stream chunk.");
                continue;
            }
        };

        if let Some(reason) = chunk.choices.first().and_then(|c| c.finish_reason.clone()) {
            summary.finish_reason = Some(reason);
        }
        if let Some(usage) = chunk.usage {
            summary.usage = Some(usage);
        }

        if let Some(text) = chunk.delta_text() {
            handler(text).map_err(|e| ChatError::Handler(e.into()))?;
            summary.fragments += 1;
        }
    }

    Ok(summary)
}

/// Decodes the body of a streaming HTTP response. The response is consumed,
/// so the connection is released when this returns, whatever the outcome.
pub async fn decode_response<F, E>(
    response: reqwest::Response,
    handler: F,
) -> Result<StreamSummary, ChatError>
where
    F: FnMut(&str) -> Result<(), E>,
    E: Into<BoxError>,
{
    let body = response
        .bytes_stream()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
    let reader = StreamReader::new(Box::pin(body));
    decode_stream(reader, handler).await
}
