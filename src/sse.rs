//! Incremental decoder for the completion event stream.
//!
//! The relay passes the provider's `text/event-stream` body through untouched,
//! so the client sees frames like
//! `data: {"choices":[{"delta":{"content":"He"}}]}` followed by a final
//! `data: [DONE]`. Reads can end anywhere, including in the middle of a line or
//! of a multi-byte character, so the decoder keeps the trailing partial line as
//! raw bytes and only decodes lines once their `\n` has arrived.
//!
//! Each line is parsed on its own. A JSON object that is split over two lines
//! is not reassembled: both halves fail to parse and are dropped.

use serde::Deserialize;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

// Response structure for streaming chunks. Everything is optional so that
// role-only or usage-only frames parse cleanly and yield no text.
#[derive(Deserialize, Debug, Default)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug, Default)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize, Debug, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Turns raw body chunks into assistant text deltas.
#[derive(Debug, Default)]
pub struct DeltaDecoder {
    carry: Vec<u8>,
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one read of the body and returns the deltas of every line it
    /// completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let mut deltas = Vec::new();
        let mut consumed = 0;
        // `\n` never occurs inside a multi-byte UTF-8 sequence, so splitting on
        // the raw byte is safe.
        while let Some(offset) = self.carry[consumed..].iter().position(|b| *b == b'\n') {
            let line_end = consumed + offset;
            let line = String::from_utf8_lossy(&self.carry[consumed..line_end]);
            if let Some(delta) = parse_line(&line) {
                deltas.push(delta);
            }
            consumed = line_end + 1;
        }
        self.carry.drain(..consumed);
        deltas
    }

    /// Number of buffered bytes that do not yet form a complete line.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// Ends the stream. An unterminated trailing line is discarded; its length
    /// is returned so the caller can log it.
    pub fn finish(&mut self) -> usize {
        let dropped = self.carry.len();
        if dropped > 0 {
            log::debug!("Discarding {} bytes of unterminated stream data", dropped);
        }
        self.carry.clear();
        dropped
    }
}

/// Extracts the text delta from a single event-stream line, if it carries one.
pub fn parse_line(raw: &str) -> Option<String> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload == DONE_SENTINEL {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty()),
        Err(e) => {
            log::debug!("Skipping unparseable stream line ({}): {}", e, payload);
            None
        }
    }
}
