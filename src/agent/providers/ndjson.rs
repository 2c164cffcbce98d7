//! Line framing for newline-delimited JSON event streams.

use log::warn;

use crate::agent::message::StreamEvent;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid UTF-8 in event stream")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("undecodable event line: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes a single line. Blank lines yield `Ok(None)`.
pub fn decode_line(line: &str) -> Result<Option<StreamEvent>, DecodeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

/// Buffers raw bytes until a full line is available.
///
/// Lines that fail to decode are logged and dropped so one malformed record
/// never ends the stream.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of bytes and returns every event completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = decode_logged(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        decode_logged(rest)
    }
}

fn decode_logged(line: Vec<u8>) -> Option<StreamEvent> {
    let decoded = String::from_utf8(line)
        .map_err(DecodeError::from)
        .and_then(|text| decode_line(&text));
    match decoded {
        Ok(event) => event,
        Err(err) => {
            warn!("Skipping event: {}", err);
            None
        }
    }
}
