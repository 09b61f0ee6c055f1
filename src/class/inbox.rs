use std::any::Any;
use std::collections::VecDeque;

/// FIFO mailbox of one actor
pub struct Inbox {
    queue: VecDeque<Box<dyn Any>>,
}

impl Inbox {
    pub fn new(capacity: usize) -> Self {
        Inbox {
            queue: VecDeque::with_capacity(capacity),
        }
    }

    pub fn put(&mut self, message: Box<dyn Any>) {
        self.queue.push_back(message);
    }

    /// Take the oldest message
    pub fn take(&mut self) -> Option<Box<dyn Any>> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop all queued messages, returning them so they can be dropped
    /// outside of any runtime borrow
    pub fn drain(&mut self) -> Vec<Box<dyn Any>> {
        self.queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_messages_in_put_order() {
        let mut inbox = Inbox::new(2);
        for i in 0..5u32 {
            inbox.put(Box::new(i));
        }
        assert_eq!(inbox.len(), 5);
        let seen: Vec<u32> = ::std::iter::from_fn(|| inbox.take())
            .map(|m| *m.downcast::<u32>().unwrap())
            .collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert!(inbox.is_empty());
    }
}
