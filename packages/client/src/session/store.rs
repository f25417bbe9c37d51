//! Ordered in-memory conversation log.

use std::collections::VecDeque;

use tokio::sync::watch;

use crate::domain::Message;

/// Append-only message log with change notification
///
/// Readers get a shared reference and can only take snapshots or subscribe;
/// appending and resetting need the owner's `&mut`.
#[derive(Debug)]
pub struct MessageStore {
    messages: VecDeque<Message>,
    capacity: Option<usize>,
    revision: watch::Sender<u64>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Store that keeps at most `capacity` messages, evicting the oldest.
    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        let (revision, _rx) = watch::channel(0);
        Self {
            messages: VecDeque::new(),
            capacity: capacity.map(|c| c.max(1)),
            revision,
        }
    }

    pub fn append(&mut self, message: Message) {
        if let Some(capacity) = self.capacity {
            while self.messages.len() >= capacity {
                self.messages.pop_front();
            }
        }
        self.messages.push_back(message);
        self.bump();
    }

    /// Full ordered copy of the log
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Start a fresh log (used on conversation switch)
    pub fn reset(&mut self) {
        if self.messages.is_empty() {
            return;
        }
        self.messages.clear();
        self.bump();
    }

    /// Receiver whose value increases on every change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}
