//! Line-level decoding of `data:` event streams.
//!
//! Both the upstream LLM streams and the bridge wire format are newline delimited
//! `data: <payload>` lines terminated by a `[DONE]` sentinel. This module only
//! deals with framing; interpreting payloads is left to the callers.

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// The payload of a `data: ` line, prefix stripped
    Data(String),
    /// A line whose whole payload is the `[DONE]` sentinel
    Done,
}

/// Accumulates raw bytes and yields one event per complete `data: ` line.
///
/// The trailing incomplete line is held back until more bytes arrive, and lines are
/// only decoded as UTF-8 once complete, so a multi-byte character split across two
/// chunks decodes the same as if it arrived in one piece.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush whatever is left once the stream has ended
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest).into_iter().collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

fn decode_line(raw: &[u8]) -> Option<SseEvent> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim_end_matches('\r'),
        Err(e) => {
            tracing::warn!("Skipping stream line with invalid UTF-8: {}", e);
            return None;
        }
    };

    let payload = line.strip_prefix(DATA_PREFIX)?;
    if payload.trim() == DONE_SENTINEL {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(payload.to_string()))
    }
}

/// Format a payload as a single `data: ` frame followed by a blank line
pub fn encode_data(payload: &str) -> String {
    format!("{}{}\n\n", DATA_PREFIX, payload)
}

pub fn encode_done() -> String {
    encode_data(DONE_SENTINEL)
}
