//! Bounded on-screen transcript.
//!
//! Holds at most `max_messages` messages, evicting the oldest first.
//! Consecutive assistant deltas grow a single message until the response
//! completes.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Who a transcript line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    System,
    User,
    Assistant,
}

/// One line of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

#[derive(Debug, Clone)]
pub struct Transcript {
    messages: VecDeque<Message>,
    max_messages: usize,
    /// An assistant response is streaming into the last message.
    coalescing: bool,
    revision: u64,
}

impl Transcript {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            max_messages: max_messages.max(1),
            coalescing: false,
            revision: 0,
        }
    }

    /// Append a system notice.
    pub fn push_system(&mut self, text: &str) {
        self.push(MessageKind::System, text);
    }

    pub fn push_user(&mut self, text: &str) {
        self.push(MessageKind::User, text);
    }

    /// Add an assistant delta, extending the open response when there is one.
    ///
    /// A delta that arrives after a system or user message starts a new
    /// assistant message even if the response has not completed.
    pub fn push_assistant_delta(&mut self, delta: &str) {
        if delta.trim().is_empty() {
            return;
        }
        if self.coalescing {
            if let Some(last) = self.messages.back_mut() {
                if last.kind == MessageKind::Assistant {
                    last.text.push_str(delta);
                    last.timestamp = Utc::now();
                    self.revision += 1;
                    return;
                }
            }
        }
        self.push(MessageKind::Assistant, delta);
        self.coalescing = true;
    }

    /// The current assistant response is complete; the next delta starts a new message.
    pub fn complete_assistant_message(&mut self) {
        self.coalescing = false;
    }

    pub fn clear(&mut self) {
        if !self.messages.is_empty() {
            self.revision += 1;
        }
        self.messages.clear();
        self.coalescing = false;
    }

    pub fn messages(&self) -> impl ExactSizeIterator<Item = &Message> {
        self.messages.iter()
    }

    /// Snapshot of all retained messages, oldest first.
    pub fn to_vec(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Count of visible changes so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn push(&mut self, kind: MessageKind, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if kind != MessageKind::Assistant {
            self.coalescing = false;
        }
        self.messages.push_back(Message {
            text: text.to_owned(),
            timestamp: Utc::now(),
            kind,
        });
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
        self.revision += 1;
    }
}
