// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Stream chunk type and event-line framing
//!
//! Streaming responses arrive either as raw text bytes or as a
//! line-oriented event stream (`data: ` prefix, JSON payload with a nested
//! text delta, `[DONE]` sentinel). A line may span several network reads,
//! and so may a single multibyte character, so both decoders buffer raw
//! bytes: the event decoder only parses once a full terminator has been
//! observed, and the raw-text decoder only emits up to the last complete
//! character, retaining any incomplete suffix for the next read.

use std::pin::Pin;

use futures::Stream;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

/// Incremental text fragment from a streaming invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub text: String,
}

impl StreamChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// The boxed chunk stream returned by streaming invocations
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Prefix of an event line
pub const EVENT_PREFIX: &str = "data: ";

/// Sentinel payload marking the end of an event stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded event from a framed stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A text increment
    Delta(String),
    /// The end-of-stream sentinel
    Done,
}

/// Incremental decoder for event-line framed streams
#[derive(Debug, Default)]
pub struct EventLineDecoder {
    buffer: Vec<u8>,
}

impl EventLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read; returns every event completed by it.
    ///
    /// Only lines ending in `\n` are processed; the remainder stays
    /// buffered as bytes until the terminator arrives, so a multibyte
    /// character split across reads is reassembled before decoding.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);

            if let Some(event) = parse_event_line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    /// Unconsumed partial line, if any
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

/// Incremental UTF-8 decoder for unframed byte streams
///
/// Emits the longest valid prefix of the bytes seen so far; an incomplete
/// trailing character sequence is retained and completed by the next read.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    carry: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read; returns every character completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);

        match std::str::from_utf8(&self.carry) {
            Ok(text) => {
                let text = text.to_string();
                self.carry.clear();
                text
            }
            Err(err) if err.error_len().is_none() => {
                // Incomplete trailing sequence, keep it for the next read.
                let valid = err.valid_up_to();
                let text = String::from_utf8_lossy(&self.carry[..valid]).into_owned();
                self.carry.drain(..valid);
                text
            }
            Err(_) => {
                // Genuinely invalid bytes, replace them and move on.
                let text = String::from_utf8_lossy(&self.carry).into_owned();
                self.carry.clear();
                text
            }
        }
    }

    /// Flush whatever is still buffered at end of stream.
    pub fn finish(&mut self) -> String {
        if self.carry.is_empty() {
            return String::new();
        }
        let text = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        text
    }
}

/// Parse one complete event line. Non-event lines and keep-alives yield
/// nothing.
fn parse_event_line(line: &str) -> Option<StreamEvent> {
    let payload = line.strip_prefix(EVENT_PREFIX).or_else(|| {
        // Some servers omit the space after the colon.
        line.strip_prefix("data:")
    })?;
    let payload = payload.trim();

    if payload.is_empty() {
        return None;
    }
    if payload == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => extract_delta(&value).map(StreamEvent::Delta),
        Err(err) => {
            debug!(%err, "skipping unparseable event payload");
            None
        }
    }
}

/// Pull the nested text delta out of an event payload.
///
/// Recognized shapes, in order: OpenAI-style `choices[0].delta.content`,
/// Gemini-style `candidates[0].content.parts[0].text`, and the proxy's flat
/// `{text}` / `{delta}` envelopes.
pub fn extract_delta(value: &Value) -> Option<String> {
    if let Some(content) = value["choices"][0]["delta"]["content"].as_str() {
        return Some(content.to_string());
    }
    if let Some(text) = value["candidates"][0]["content"]["parts"][0]["text"].as_str() {
        return Some(text.to_string());
    }
    if let Some(text) = value["text"].as_str() {
        return Some(text.to_string());
    }
    if let Some(delta) = value["delta"].as_str() {
        return Some(delta.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_complete_event_line() {
        let mut decoder = EventLineDecoder::new();
        let events = decoder.push(b"data: {\"text\":\"hello\"}\n");
        assert_eq!(events, vec![StreamEvent::Delta("hello".to_string())]);
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn test_terminator_exactly_on_read_boundary() {
        let mut decoder = EventLineDecoder::new();
        // First read ends exactly at the newline; the second read must not
        // produce a duplicate or split event.
        let events = decoder.push(b"data: {\"text\":\"one\"}\n");
        assert_eq!(events.len(), 1);
        let events = decoder.push(b"data: {\"text\":\"two\"}\n");
        assert_eq!(events, vec![StreamEvent::Delta("two".to_string())]);
    }

    #[test]
    fn test_partial_line_is_retained_across_reads() {
        let mut decoder = EventLineDecoder::new();
        let events = decoder.push(b"data: {\"te");
        assert!(events.is_empty());
        assert_eq!(decoder.pending(), &b"data: {\"te"[..]);

        let events = decoder.push(b"xt\":\"joined\"}\nda");
        assert_eq!(events, vec![StreamEvent::Delta("joined".to_string())]);
        assert_eq!(decoder.pending(), &b"da"[..]);
    }

    #[test]
    fn test_multibyte_character_split_across_reads() {
        let mut decoder = EventLineDecoder::new();
        let line = "data: {\"text\":\"中文\"}\n".as_bytes();
        // Byte 16 falls inside the three-byte encoding of 中.
        let events = decoder.push(&line[..16]);
        assert!(events.is_empty());

        let events = decoder.push(&line[16..]);
        assert_eq!(events, vec![StreamEvent::Delta("中文".to_string())]);
    }

    #[test]
    fn test_multiple_events_in_one_read() {
        let mut decoder = EventLineDecoder::new();
        let events = decoder.push(b"data: {\"text\":\"a\"}\ndata: {\"text\":\"b\"}\ndata: [DONE]\n");
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("a".to_string()),
                StreamEvent::Delta("b".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn test_crlf_terminators() {
        let mut decoder = EventLineDecoder::new();
        let events = decoder.push(b"data: {\"text\":\"crlf\"}\r\n");
        assert_eq!(events, vec![StreamEvent::Delta("crlf".to_string())]);
    }

    #[test]
    fn test_blank_and_comment_lines_are_ignored() {
        let mut decoder = EventLineDecoder::new();
        let events = decoder.push(b"\n: keep-alive\n\ndata: [DONE]\n");
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[test]
    fn test_openai_delta_shape() {
        let mut decoder = EventLineDecoder::new();
        let events = decoder
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"tok\"},\"index\":0}]}\n");
        assert_eq!(events, vec![StreamEvent::Delta("tok".to_string())]);
    }

    #[test]
    fn test_gemini_delta_shape() {
        let line = br#"data: {"candidates":[{"content":{"parts":[{"text":"chunk"}]}}]}
"#;
        let mut decoder = EventLineDecoder::new();
        let events = decoder.push(line);
        assert_eq!(events, vec![StreamEvent::Delta("chunk".to_string())]);
    }

    #[test]
    fn test_unparseable_payload_is_skipped() {
        let mut decoder = EventLineDecoder::new();
        let events = decoder.push(b"data: {not json\ndata: {\"text\":\"ok\"}\n");
        assert_eq!(events, vec![StreamEvent::Delta("ok".to_string())]);
    }

    #[test]
    fn test_utf8_decoder_reassembles_split_character() {
        let mut decoder = Utf8StreamDecoder::new();
        let bytes = "中文内容".as_bytes();

        // First read ends one byte into the encoding of 内.
        let first = decoder.push(&bytes[..7]);
        assert_eq!(first, "中文");

        let second = decoder.push(&bytes[7..]);
        assert_eq!(second, "内容");
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_utf8_decoder_passes_ascii_through() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.push(b"plain text"), "plain text");
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_utf8_decoder_finish_flushes_truncated_tail() {
        let mut decoder = Utf8StreamDecoder::new();
        let bytes = "末".as_bytes();
        assert_eq!(decoder.push(&bytes[..2]), "");
        // The stream ended mid-character; the tail is surfaced lossily
        // rather than dropped.
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_utf8_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8StreamDecoder::new();
        let text = decoder.push(b"ok\xFF\xFEok");
        assert!(text.starts_with("ok"));
        assert!(text.ends_with("ok"));
        assert!(text.contains('\u{FFFD}'));
    }
}
