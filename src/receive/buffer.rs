use std::any::Any;
use std::collections::VecDeque;

/// Messages of one selective actor that were not consumed yet, with a cursor.
///
/// Messages keep their relative order. The cursor only skips over messages
/// that cannot be handled right now; `reset` moves it back to the front so
/// skipped messages are looked at again.
pub struct MessageBuffer {
    messages: VecDeque<Box<dyn Any>>,
    cursor: usize,
}

impl MessageBuffer {
    /// An empty buffer with the cursor at the start
    pub fn new() -> Self {
        MessageBuffer {
            messages: VecDeque::new(),
            cursor: 0,
        }
    }

    /// Append a newly delivered message
    pub fn push_back(&mut self, message: Box<dyn Any>) {
        self.messages.push_back(message);
    }

    /// The message under the cursor
    pub fn current(&self) -> Option<&dyn Any> {
        self.messages.get(self.cursor).map(|message| &**message)
    }

    /// Take the message under the cursor out of the buffer.
    /// The cursor then points at the message that followed it.
    ///
    /// # Panics
    ///
    /// If the cursor is past the end.
    pub fn remove(&mut self) -> Box<dyn Any> {
        match self.messages.remove(self.cursor) {
            Some(message) => message,
            None => panic!(
                "message buffer cursor {} out of bounds ({} buffered)",
                self.cursor,
                self.messages.len()
            ),
        }
    }

    /// Skip the message under the cursor
    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    /// Move the cursor back to the oldest message
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Number of buffered messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        MessageBuffer::new()
    }
}
