//! Server-sent event framing shared by the streaming backends.

use futures_util::{Stream, StreamExt};
use memchr::memchr;
use tracing::warn;

use super::ProviderError;
use crate::core::chat_stream::ChunkSink;

/// What a backend made of one `data:` payload.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseEvent {
    Text(String),
    Skip,
    Done,
}

/// Splits a byte stream into trimmed lines, tolerating lines that span
/// network chunks.
#[derive(Default)]
pub(crate) struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete line, if one is buffered. Lines that are not valid
    /// UTF-8 are logged and skipped.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        loop {
            let newline_pos = memchr(b'\n', &self.buffer)?;
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            match std::str::from_utf8(&line[..newline_pos]) {
                Ok(s) => return Some(s.trim().to_string()),
                Err(e) => warn!("Invalid UTF-8 in stream: {e}"),
            }
        }
    }
}

pub(crate) fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Pump an SSE body through `parse`, forwarding text into `sink`.
///
/// Returns the concatenated text once the backend reports the end of the
/// stream or the body ends.
pub(crate) async fn drive_sse<S, B, F>(
    body: S,
    sink: &ChunkSink,
    mut parse: F,
) -> Result<String, ProviderError>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
    F: FnMut(&str) -> Result<SseEvent, ProviderError>,
{
    let mut body = std::pin::pin!(body);
    let mut lines = SseLineBuffer::default();
    let mut text = String::new();
    let mut finished = false;

    loop {
        match body.next().await {
            Some(chunk) => lines.push(chunk.map_err(ProviderError::Transport)?.as_ref()),
            None => {
                // Flush a final line that arrived without its newline.
                lines.push(b"\n");
                finished = true;
            }
        }

        while let Some(line) = lines.next_line() {
            let Some(payload) = extract_data_payload(&line) else {
                continue;
            };
            match parse(payload)? {
                SseEvent::Text(delta) => {
                    text.push_str(&delta);
                    sink.send(delta)
                        .await
                        .map_err(|_| ProviderError::Cancelled)?;
                }
                SseEvent::Skip => {}
                SseEvent::Done => return Ok(text),
            }
        }

        if finished {
            return Ok(text);
        }
    }
}

/// Read a failed response body and turn it into an API error.
pub(crate) async fn api_error(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    warn!(%status, "provider returned an error status");
    ProviderError::Api(format_api_error(&error_text))
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Render a provider error body for display in the transcript.
pub(crate) fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            return match extract_error_summary(&json_value).filter(|s| !s.is_empty()) {
                Some(summary) => format!("API Error: {summary}\n```json\n{pretty_json}\n```"),
                None => format!("API Error:\n```json\n{pretty_json}\n```"),
            };
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{trimmed}\n```")
    } else {
        format!("API Error:\n```\n{trimmed}\n```")
    }
}
