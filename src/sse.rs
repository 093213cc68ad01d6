//! Server-Sent Events (SSE) processing for streamed chat completions.
//!
//! This module turns the raw byte stream of an HTTP response into a stream of
//! reply [`Chunk`]s, handling SSE framing, buffering, the `[DONE]` sentinel
//! and in-band error objects.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_EVENTS};
use crate::types::{ChatCompletionChunk, Chunk};
use crate::{Error, Result};

/// Sentinel data payload that ends an OpenAI-style stream.
const DONE_SENTINEL: &str = "[DONE]";

/// What a single SSE frame turned out to be.
#[derive(Debug)]
enum Frame {
    /// A reply chunk or an error to surface.
    Item(Result<Chunk>),
    /// A comment, keep-alive, or frame without data.
    Skip,
    /// The end-of-stream sentinel.
    Done,
}

/// Process a stream of bytes into a stream of reply chunks.
///
/// The returned stream ends at the `[DONE]` sentinel or when the byte stream
/// ends, whichever comes first.  Transport errors and malformed frames are
/// yielded as `Err` items; the caller decides whether to keep reading.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<Chunk>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + Send + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    stream::unfold(
        (stream, String::new(), Vec::new(), false),
        move |(mut stream, mut buffer, mut pending, done)| async move {
            if done {
                return None;
            }
            loop {
                // First check if we have a complete frame in the buffer
                if let Some((frame, remaining)) = extract_frame(&buffer) {
                    buffer = remaining;
                    match frame {
                        Frame::Item(item) => {
                            if item.is_err() {
                                STREAM_ERRORS.click();
                            }
                            return Some((item, (stream, buffer, pending, false)));
                        }
                        Frame::Skip => continue,
                        Frame::Done => return None,
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        pending.extend_from_slice(&bytes);
                        match take_utf8(&mut pending) {
                            Ok(text) => {
                                buffer.push_str(&text);
                                if buffer.contains('\r') {
                                    buffer = buffer.replace("\r\n", "\n");
                                }
                            }
                            Err(e) => {
                                STREAM_ERRORS.click();
                                return Some((Err(e), (stream, buffer, Vec::new(), true)));
                            }
                        }
                    }
                    Some(Err(e)) => {
                        STREAM_ERRORS.click();
                        return Some((Err(e), (stream, buffer, pending, false)));
                    }
                    None => {
                        if !pending.is_empty() {
                            STREAM_ERRORS.click();
                            let err = Error::encoding("stream ended inside a UTF-8 sequence", None);
                            return Some((Err(err), (stream, String::new(), Vec::new(), true)));
                        }
                        // End of stream; a final frame may lack its blank line.
                        if buffer.trim().is_empty() {
                            return None;
                        }
                        buffer.push_str("\n\n");
                        return match extract_frame(&buffer) {
                            Some((Frame::Item(item), _)) => {
                                Some((item, (stream, String::new(), Vec::new(), true)))
                            }
                            _ => None,
                        };
                    }
                }
            }
        },
    )
}

/// Decode the longest valid UTF-8 prefix of `pending`, leaving an incomplete
/// trailing sequence in place for the next read.
fn take_utf8(pending: &mut Vec<u8>) -> Result<String> {
    let valid = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(e) => {
            return Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            ));
        }
    };
    let rest = pending.split_off(valid);
    let text = String::from_utf8(std::mem::replace(pending, rest))
        .map_err(|e| Error::encoding(format!("Invalid UTF-8 in stream: {e}"), Some(Box::new(e))))?;
    Ok(text)
}

/// Extract a complete SSE frame from a buffer string.
///
/// Frames are delimited by a blank line.  Only `data:` lines matter; multiple
/// data lines are joined with newlines, and lines starting with `:` are
/// comments.
fn extract_frame(buffer: &str) -> Option<(Frame, String)> {
    let (frame_text, rest) = buffer.split_once("\n\n")?;
    let rest = rest.to_string();

    let mut data: Option<String> = None;
    for line in frame_text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    let Some(data) = data else {
        return Some((Frame::Skip, rest));
    };
    let data = data.trim();
    if data.is_empty() {
        return Some((Frame::Skip, rest));
    }
    if data == DONE_SENTINEL {
        return Some((Frame::Done, rest));
    }

    STREAM_EVENTS.click();
    Some((Frame::Item(parse_data(data)), rest))
}

/// Parse the JSON payload of a data frame.
fn parse_data(data: &str) -> Result<Chunk> {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
    }

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
        return Err(Error::api(
            500,
            envelope
                .error
                .error_type
                .or_else(|| Some("stream_error".to_string())),
            envelope
                .error
                .message
                .unwrap_or_else(|| data.to_string()),
            None,
        ));
    }

    serde_json::from_str::<ChatCompletionChunk>(data)
        .map(Chunk::from)
        .map_err(|e| {
            Error::serialization(
                format!("Failed to parse chunk JSON: {e}"),
                Some(Box::new(e)),
            )
        })
}
