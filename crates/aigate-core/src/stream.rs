//! Re-chunking of the backend's SSE byte stream into OpenAI chunk objects.

use std::pin::Pin;

use aigate_contracts::{
    BackendStreamFrame, ChatCompletionChunk, ChatRole, ChunkChoice, ChunkDelta,
};
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::{
    ByteStream,
    ids::{short_token, unix_now},
};

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Chunk(ChatCompletionChunk),
    Done,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamItem> + Send>>;

/// Splits an incremental byte sequence into blank-line separated frames.
///
/// Delimiters are ASCII, so a frame boundary never falls inside a UTF-8
/// sequence; partial characters stay buffered until their tail arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    // Bytes before this offset hold no frame boundary.
    scanned: usize,
}

impl FrameDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some((end, delimiter_len)) = find_delimiter(&self.buffer, self.scanned) {
            let raw: Vec<u8> = self.buffer.drain(..end + delimiter_len).collect();
            self.scanned = 0;
            if let Some(frame) = frame_text(&raw[..end]) {
                frames.push(frame);
            }
        }
        // A trailing "\n" or "\n\r" may still open a delimiter.
        self.scanned = self.buffer.len().saturating_sub(2);
        frames
    }

    /// Returns whatever is left once the upstream has closed.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        let rest = std::mem::take(&mut self.buffer);
        frame_text(&rest)
    }
}

fn find_delimiter(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    buffer.iter().enumerate().skip(from).find_map(|(index, byte)| {
        if *byte != b'\n' {
            return None;
        }
        match &buffer[index + 1..] {
            [b'\n', ..] => Some((index, 2)),
            [b'\r', b'\n', ..] => Some((index, 3)),
            _ => None,
        }
    })
}

fn frame_text(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    Done,
    Payload(BackendStreamFrame),
    Malformed(String),
    Ignored,
}

pub fn parse_frame(frame: &str) -> FrameEvent {
    let data = frame
        .lines()
        .filter_map(|line| line.trim_end_matches('\r').strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect::<Vec<_>>()
        .join("\n");
    if data.trim().is_empty() {
        return FrameEvent::Ignored;
    }
    if data.trim() == DONE_SENTINEL {
        return FrameEvent::Done;
    }
    match serde_json::from_str::<BackendStreamFrame>(&data) {
        Ok(payload) => FrameEvent::Payload(payload),
        Err(error) => FrameEvent::Malformed(error.to_string()),
    }
}

/// Fields shared by every chunk of one response.
#[derive(Debug, Clone)]
pub struct ChunkFactory {
    id: String,
    created: i64,
    model: String,
    system_fingerprint: String,
}

impl ChunkFactory {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            created: unix_now(),
            model: model.into(),
            system_fingerprint: format!("fp_{}", short_token()),
        }
    }

    pub fn opening(&self, index: u32) -> ChatCompletionChunk {
        self.chunk(
            index,
            ChunkDelta {
                role: Some(ChatRole::Assistant),
                content: Some(String::new()),
                refusal: Some(None),
            },
            None,
        )
    }

    pub fn content(&self, index: u32, text: String) -> ChatCompletionChunk {
        self.chunk(index, ChunkDelta { content: Some(text), ..ChunkDelta::default() }, None)
    }

    pub fn closing(&self, index: u32) -> ChatCompletionChunk {
        self.chunk(index, ChunkDelta::default(), Some("stop".to_string()))
    }

    fn chunk(
        &self,
        index: u32,
        delta: ChunkDelta,
        finish_reason: Option<String>,
    ) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            service_tier: "default".to_string(),
            system_fingerprint: self.system_fingerprint.clone(),
            choices: vec![ChunkChoice { index, delta, logprobs: None, finish_reason }],
        }
    }
}

struct FrameOutcome {
    content: Option<String>,
    stop: bool,
}

fn handle_frame(frame: &str) -> FrameOutcome {
    match parse_frame(frame) {
        FrameEvent::Done => FrameOutcome { content: None, stop: true },
        FrameEvent::Ignored => FrameOutcome { content: None, stop: false },
        FrameEvent::Malformed(error) => {
            warn!(event = "stream.frame.malformed", error = %error, "skipping unparseable frame");
            FrameOutcome { content: None, stop: false }
        }
        FrameEvent::Payload(payload) => FrameOutcome {
            content: payload.response.filter(|text| !text.is_empty()),
            stop: payload.usage.is_some(),
        },
    }
}

/// Turns the backend's frames into an opening chunk, one chunk per non-empty
/// `response`, a closing `stop` chunk and the terminal sentinel.
///
/// A `[DONE]` frame or a frame carrying `usage` ends reading. Upstream read
/// errors end reading too; the closing chunk and sentinel are still emitted.
pub fn rechunk(upstream: ByteStream, model: impl Into<String>) -> ChunkStream {
    let factory = ChunkFactory::new(model);
    Box::pin(async_stream::stream! {
        let mut upstream = upstream;
        let mut decoder = FrameDecoder::default();
        // Single-choice stream.
        let index = 0;
        let mut stopped = false;

        yield StreamItem::Chunk(factory.opening(index));

        'read: while let Some(next) = upstream.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(error) => {
                    warn!(event = "stream.upstream.failed", error = %error, "closing stream early");
                    stopped = true;
                    break 'read;
                }
            };
            for frame in decoder.push(&bytes) {
                let outcome = handle_frame(&frame);
                if let Some(text) = outcome.content {
                    yield StreamItem::Chunk(factory.content(index, text));
                }
                if outcome.stop {
                    stopped = true;
                    break 'read;
                }
            }
        }

        if !stopped && let Some(frame) = decoder.finish() {
            debug!(event = "stream.trailing_frame", "flushing undelimited frame");
            if let Some(text) = handle_frame(&frame).content {
                yield StreamItem::Chunk(factory.content(index, text));
            }
        }

        yield StreamItem::Chunk(factory.closing(index));
        yield StreamItem::Done;
    })
}
