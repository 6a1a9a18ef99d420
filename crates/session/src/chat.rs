use std::sync::Arc;

use core_types::{Message, MessageId, QueryRequest, RagTransport, StreamFrame, TransportError};
use futures::StreamExt;
use i18n::I18n;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::decoder::{LineDecoder, parse_frame};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatPhase {
    #[default]
    Idle,
    Sending,
    Streaming,
    /// Idle after a transport failure; accepts new sends.
    Failed,
}

impl ChatPhase {
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub messages: Vec<Message>,
    pub phase: ChatPhase,
}

impl ChatState {
    pub fn is_loading(&self) -> bool {
        self.phase.is_busy()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input, or a response was already in flight.
    Ignored,
    Completed,
    Failed,
}

/// Owns the message log of one conversation and drives a single streamed
/// answer at a time into it.
pub struct ChatSession {
    transport: Arc<dyn RagTransport>,
    i18n: I18n,
    state: watch::Sender<ChatState>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn RagTransport>, i18n: I18n) -> Self {
        Self {
            transport,
            i18n,
            state: watch::Sender::new(ChatState::default()),
        }
    }

    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    /// Drops the whole log. Frames still arriving for a cleared placeholder
    /// are discarded.
    pub fn clear_messages(&self) {
        self.state.send_modify(|state| state.messages.clear());
        debug!("chat log cleared");
    }

    pub async fn send_message(&self, content: &str) -> SendOutcome {
        if content.trim().is_empty() {
            return SendOutcome::Ignored;
        }

        let placeholder = Message::placeholder();
        let placeholder_id = placeholder.id;
        let mut history = Vec::new();
        let started = self.state.send_if_modified(|state| {
            if state.is_loading() {
                return false;
            }
            history = state
                .messages
                .iter()
                .map(Message::to_history_turn)
                .collect();
            state.messages.push(Message::user(content));
            state.messages.push(placeholder);
            state.phase = ChatPhase::Sending;
            true
        });
        if !started {
            debug!("send ignored while a response is in flight");
            return SendOutcome::Ignored;
        }
        let _loading = LoadingGuard { state: &self.state };

        let request = QueryRequest {
            question: content.to_string(),
            conversation_history: history,
        };
        let mut stream = match self.transport.query_stream(request).await {
            Ok(stream) => stream,
            Err(err) => {
                self.fail(err);
                return SendOutcome::Failed;
            }
        };
        self.state.send_modify(|state| state.phase = ChatPhase::Streaming);

        let mut decoder = LineDecoder::new();
        let mut answer = String::new();
        let mut frames = 0_usize;
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    self.fail(err);
                    return SendOutcome::Failed;
                }
            };
            for line in decoder.push(&chunk) {
                frames += self.apply_line(placeholder_id, line, &mut answer);
            }
        }
        if let Some(line) = decoder.finish() {
            frames += self.apply_line(placeholder_id, line, &mut answer);
        }

        self.state.send_modify(|state| state.phase = ChatPhase::Idle);
        info!(
            message_id = %placeholder_id,
            frames,
            answer_chars = answer.chars().count(),
            "response stream drained"
        );
        SendOutcome::Completed
    }

    /// Applies one complete line to the placeholder; returns 1 if it held a
    /// usable frame.
    fn apply_line(&self, placeholder_id: MessageId, line: Vec<u8>, answer: &mut String) -> usize {
        match parse_frame(line) {
            Ok(StreamFrame::Sources(sources)) => {
                self.update_message(placeholder_id, |message| message.sources = Some(sources));
                1
            }
            Ok(StreamFrame::Token(token)) => {
                answer.push_str(&token);
                let text = answer.clone();
                self.update_message(placeholder_id, |message| message.text = text);
                1
            }
            Err(err) => {
                warn!(error = %err, "discarding malformed stream frame");
                0
            }
        }
    }

    fn update_message(&self, id: MessageId, update: impl FnOnce(&mut Message)) {
        self.state.send_if_modified(|state| {
            match state.messages.iter_mut().rev().find(|message| message.id == id) {
                Some(message) => {
                    update(message);
                    true
                }
                None => false,
            }
        });
    }

    fn fail(&self, err: TransportError) {
        error!(error = %err, "chat request failed");
        let text = self.i18n.t("chat.error").to_string();
        self.state.send_modify(|state| {
            state.messages.push(Message::error(text));
            state.phase = ChatPhase::Failed;
        });
    }
}

/// Returns the session to idle on every exit from `send_message`, including
/// the future being dropped mid-stream.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<ChatState>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if state.phase.is_busy() {
                state.phase = ChatPhase::Idle;
                true
            } else {
                false
            }
        });
    }
}
