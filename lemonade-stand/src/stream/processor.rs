// Moderation stream processor
//
// Consumes the upstream SSE body of one turn and yields the growing
// response text one character at a time. Every parsed event updates the
// metrics before the blocking policy sees it. A block ends the turn at
// once and discards everything accumulated.
//
// The stream is pull-driven: the next upstream line is read only after
// all characters of the previous event were taken by the caller, so
// dropping the stream stops reads and metric updates together.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};

use super::policy::BlockingPolicy;
use super::types::{BlockDecision, Pacing, StreamOutcome, StreamUpdate, TurnError};
use crate::event::{DetectionEvent, Direction};
use crate::metrics::MetricsAggregator;

/// Upstream response body as a fallible byte stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TurnError>> + Send>>;

/// Per-turn moderation over an SSE body.
///
/// Cheap to clone; one instance is shared by every turn and each call to
/// `process` runs an independent state machine.
#[derive(Clone)]
pub struct ModerationProcessor {
    policy: Arc<dyn BlockingPolicy>,
    metrics: Arc<MetricsAggregator>,
    pacing: Pacing,
}

impl ModerationProcessor {
    pub fn new(
        policy: Arc<dyn BlockingPolicy>,
        metrics: Arc<MetricsAggregator>,
        pacing: Pacing,
    ) -> Self {
        Self {
            policy,
            metrics,
            pacing,
        }
    }

    /// Drive one turn. Yields zero or more `Partial` updates followed by
    /// exactly one `Finished`.
    ///
    /// Log lines emitted while processing are attributed to the span that
    /// is current when this is called.
    pub fn process<S>(&self, input: S) -> impl Stream<Item = StreamUpdate> + Send + 'static
    where
        S: Stream<Item = Result<Bytes, TurnError>> + Send + 'static,
    {
        let run = Run::new(self.clone(), Box::pin(input));
        stream::unfold(Some(run), |run| async move {
            let mut run = run?;
            match run.step().await {
                StreamUpdate::Partial(text) => Some((StreamUpdate::Partial(text), Some(run))),
                finished => Some((finished, None)),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Line framing
// ---------------------------------------------------------------------------

/// Longest SSE line accepted before the turn fails (1 MiB).
pub(crate) const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits raw body chunks into lines. Works on bytes so a multi-byte
/// character split across chunks is reassembled before decoding.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
    /// Prefix of `buf` already searched for a newline.
    scanned: usize,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line without its terminator (`\n` or `\r\n`).
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') else {
            self.scanned = self.buf.len();
            return None;
        };
        let pos = self.scanned + offset;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        self.scanned = 0;
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Bytes buffered after the last complete line.
    pub(crate) fn partial_len(&self) -> usize {
        self.buf.len()
    }

    /// Whatever is left after the body ended without a final newline.
    pub(crate) fn take_rest(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

// ---------------------------------------------------------------------------
// Per-turn state
// ---------------------------------------------------------------------------

enum Keystroke {
    Char(char),
    LineBreak,
}

enum Line {
    Text(String),
    End,
    Failed(TurnError),
}

struct Run {
    processor: ModerationProcessor,
    input: ByteStream,
    input_done: bool,
    lines: LineBuffer,
    /// Characters of already-accepted events not yet handed out.
    pending: VecDeque<Keystroke>,
    text: String,
    span: tracing::Span,
}

impl Run {
    fn new(processor: ModerationProcessor, input: ByteStream) -> Self {
        Self {
            processor,
            input,
            input_done: false,
            lines: LineBuffer::default(),
            pending: VecDeque::new(),
            text: String::new(),
            span: tracing::Span::current(),
        }
    }

    async fn step(&mut self) -> StreamUpdate {
        loop {
            if let Some(key) = self.pending.pop_front() {
                match key {
                    Keystroke::Char(c) => {
                        let pacing = self.processor.pacing;
                        if !pacing.is_disabled() {
                            tokio::time::sleep(pacing.delay()).await;
                        }
                        self.text.push(c);
                    }
                    Keystroke::LineBreak => self.text.push('\n'),
                }
                return StreamUpdate::Partial(self.text.clone());
            }

            match self.next_line().await {
                Line::Text(line) => {
                    if let Some(outcome) = self.handle_line(&line) {
                        return StreamUpdate::Finished(outcome);
                    }
                }
                Line::End => return StreamUpdate::Finished(self.finish()),
                Line::Failed(err) => return StreamUpdate::Finished(StreamOutcome::Failed(err)),
            }
        }
    }

    async fn next_line(&mut self) -> Line {
        loop {
            if let Some(line) = self.lines.next_line() {
                return Line::Text(line);
            }
            if self.lines.partial_len() > MAX_LINE_BYTES {
                let buffered = self.lines.partial_len();
                self.span.in_scope(|| {
                    tracing::warn!(buffered, limit = MAX_LINE_BYTES, "upstream line too long")
                });
                return Line::Failed(TurnError::Stream(format!(
                    "line exceeds {MAX_LINE_BYTES} bytes"
                )));
            }
            if self.input_done {
                return match self.lines.take_rest() {
                    Some(rest) => Line::Text(rest),
                    None => Line::End,
                };
            }
            match self.input.next().await {
                Some(Ok(chunk)) => self.lines.push(&chunk),
                Some(Err(err)) => return Line::Failed(err),
                None => self.input_done = true,
            }
        }
    }

    /// Returns the outcome when this line ends the turn.
    fn handle_line(&mut self, line: &str) -> Option<StreamOutcome> {
        let span = self.span.clone();
        let _enter = span.enter();

        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(payload) = line.strip_prefix("data:") else {
            tracing::debug!(line, "ignoring non-data SSE line");
            return None;
        };
        let payload = payload.trim_start();
        if payload == "[DONE]" {
            return Some(self.finish());
        }

        let event = match DetectionEvent::parse(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed event");
                return None;
            }
        };

        for direction in Direction::ALL {
            for group in event.detections.for_direction(direction) {
                self.processor
                    .metrics
                    .record_detections(&group.results, direction);
            }
        }

        if let BlockDecision::Block(reason) = self.processor.policy.evaluate(&event) {
            tracing::info!(reason = %reason, "response blocked");
            self.text.clear();
            self.pending.clear();
            return Some(StreamOutcome::Suppressed { reason });
        }

        for choice in &event.choices {
            let content = choice.content();
            if content.is_empty() {
                continue;
            }
            self.pending.extend(content.chars().map(Keystroke::Char));
            self.pending.push_back(Keystroke::LineBreak);
        }
        None
    }

    fn finish(&mut self) -> StreamOutcome {
        if self.text.is_empty() {
            StreamOutcome::Empty
        } else {
            StreamOutcome::Completed(std::mem::take(&mut self.text))
        }
    }
}
