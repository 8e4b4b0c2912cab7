//! Typed event stream over a provider's raw chunks
//!
//! Runs every chunk through a [`ThinkingProcessor`], assembles tool-call
//! deltas, and honours the caller's cancellation token.

use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;

use futures_util::{Stream, StreamExt, stream};
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::provider::ChunkStream;
use crate::thinking::ThinkingProcessor;
use crate::types::{FinishReason, StreamChunk, StreamEvent, ThinkingToken, ToolCall, Usage};

/// Events of one routed streaming call
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, RelayError>> + Send>>;

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

struct State {
    chunks: ChunkStream,
    processor: ThinkingProcessor,
    cancel: CancellationToken,
    calls: BTreeMap<u32, PartialCall>,
    finish: Option<FinishReason>,
    usage: Option<Usage>,
    pending: VecDeque<Result<StreamEvent, RelayError>>,
    done: bool,
}

impl State {
    fn tokens(&mut self, tokens: Vec<ThinkingToken>) {
        self.pending.extend(tokens.into_iter().map(|t| Ok(StreamEvent::Token(t))));
    }

    fn apply(&mut self, chunk: StreamChunk) {
        match chunk {
            StreamChunk::Content(text) => {
                let tokens = self.processor.push(&text);
                self.tokens(tokens);
            }
            StreamChunk::Reasoning(text) => {
                let tokens = self.processor.push_reasoning(&text);
                self.tokens(tokens);
            }
            StreamChunk::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                let call = self.calls.entry(index).or_default();
                if id.is_some() {
                    call.id = id;
                }
                if name.is_some() {
                    call.name = name;
                }
                if let Some(fragment) = arguments {
                    call.arguments.push_str(&fragment);
                }
            }
            StreamChunk::Finish(reason) => self.finish = Some(reason),
            StreamChunk::Usage(usage) => self.usage = Some(usage),
        }
    }

    /// Release the upstream connection and stop producing events
    fn close(&mut self) {
        self.chunks = Box::pin(stream::empty());
        self.done = true;
    }

    /// Flush buffered text, assembled tool calls and the final event
    fn flush(&mut self) {
        let tokens = self.processor.finish();
        self.tokens(tokens);

        let mut emitted = false;
        for (index, call) in std::mem::take(&mut self.calls) {
            let Some(name) = call.name else {
                tracing::debug!(index, "dropping tool call delta without a function name");
                continue;
            };
            let id = call.id.unwrap_or_else(|| format!("call_{index}"));
            self.pending
                .push_back(Ok(StreamEvent::ToolCall(ToolCall::new(id, name, call.arguments))));
            emitted = true;
        }

        let finish_reason = if emitted {
            FinishReason::ToolCall
        } else {
            self.finish.unwrap_or(FinishReason::Stop)
        };
        self.pending.push_back(Ok(StreamEvent::Finished {
            finish_reason,
            usage: self.usage,
        }));
    }
}

/// Turn raw chunks into typed events
///
/// Cancelling `cancel` drops the upstream stream, which closes its socket,
/// and yields a single [`RelayError::Cancelled`]. An upstream error is
/// yielded once, after any withheld text, and ends the stream.
pub fn event_stream(chunks: ChunkStream, processor: ThinkingProcessor, cancel: CancellationToken) -> EventStream {
    let state = State {
        chunks,
        processor,
        cancel,
        calls: BTreeMap::new(),
        finish: None,
        usage: None,
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.done {
                return None;
            }

            let polled = tokio::select! {
                biased;
                () = state.cancel.cancelled() => None,
                next = state.chunks.next() => Some(next),
            };

            match polled {
                None => {
                    tracing::debug!("stream cancelled by caller");
                    state.close();
                    return Some((Err(RelayError::Cancelled), state));
                }
                Some(Some(Ok(chunk))) => state.apply(chunk),
                Some(Some(Err(e))) => {
                    // Text already received is delivered ahead of the error
                    let tokens = state.processor.finish();
                    state.tokens(tokens);
                    state.close();
                    state.pending.push_back(Err(e.into()));
                }
                Some(None) => {
                    state.done = true;
                    state.flush();
                }
            }
        }
    }))
}
