//! Single-fire replies to database lookups.
//!
//! A lookup hands the database a [`DbReply`] and keeps the matching
//! [`DbReceiver`]. The reply is consumed by [`DbReply::send`], so a database
//! cannot answer twice. A reply dropped without an answer reads as "no data".

use futures::channel::oneshot;

/// Sending half of a database lookup.
#[derive(Debug)]
pub struct DbReply<T> {
    sender: oneshot::Sender<Option<T>>,
}

/// Receiving half of a database lookup.
#[derive(Debug)]
pub struct DbReceiver<T> {
    receiver: oneshot::Receiver<Option<T>>,
}

/// State of a lookup as seen by its requester.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplyState<T> {
    Pending,
    Ready(Option<T>),
}

impl<T> DbReply<T> {
    /// Creates a connected reply/receiver pair.
    pub fn channel() -> (DbReply<T>, DbReceiver<T>) {
        let (sender, receiver) = oneshot::channel();
        (DbReply { sender }, DbReceiver { receiver })
    }

    /// Answers the lookup. The requester may be gone already, for instance
    /// when the connection closed in the meantime; the answer is then dropped.
    pub fn send(self, value: Option<T>) {
        if self.sender.send(value).is_err() {
            log::trace!("database reply dropped, requester gone");
        }
    }
}

impl<T> DbReceiver<T> {
    /// Takes the answer if the database produced one.
    pub fn try_take(&mut self) -> ReplyState<T> {
        match self.receiver.try_recv() {
            Ok(Some(value)) => ReplyState::Ready(value),
            Ok(None) => ReplyState::Pending,
            Err(oneshot::Canceled) => ReplyState::Ready(None),
        }
    }
}
