#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! A lossy multi-producer single-consumer ring channel.
//!
//! The channel is bounded but never exerts backpressure: when the buffer is full, sending a new
//! item evicts the oldest buffered item. Producers can therefore never be slowed down by a slow
//! consumer. Items may be lost; consumers must not assume every item is observed.

use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fmt,
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::Notify;

/// Creates a lossy ring channel that holds at most `capacity` items.
pub fn channel<T>(capacity: NonZeroUsize) -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        capacity: capacity.get(),
        state: Mutex::new(State {
            buffer: VecDeque::with_capacity(capacity.get()),
            receiver_alive: true,
        }),
        senders: AtomicUsize::new(1),
        notify: Notify::new(),
    });

    let tx = Sender {
        shared: shared.clone(),
    };
    let rx = Receiver { shared };
    (tx, rx)
}

pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

/// Indicates that the receiver has been dropped. The rejected item is returned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SendError<T>(pub T);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TryRecvError {
    Empty,
    Closed,
}

struct Shared<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    senders: AtomicUsize,
    notify: Notify,
}

struct State<T> {
    buffer: VecDeque<T>,
    receiver_alive: bool,
}

// === impl Sender ===

impl<T> Sender<T> {
    /// Enqueues an item without waiting.
    ///
    /// If the buffer is full, the oldest buffered item is evicted and returned so the caller may
    /// account for the loss.
    pub fn send(&self, item: T) -> Result<Option<T>, SendError<T>> {
        let evicted = {
            let mut state = self.shared.state.lock();
            if !state.receiver_alive {
                return Err(SendError(item));
            }

            let evicted = if state.buffer.len() == self.shared.capacity {
                state.buffer.pop_front()
            } else {
                None
            };
            state.buffer.push_back(item);
            evicted
        };

        self.shared.notify.notify_one();
        Ok(evicted)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_closed(&self) -> bool {
        !self.shared.state.lock().receiver_alive
    }
}

// NB Clone cannot be derived because `T` doesn't have to implement Clone.
impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::AcqRel);
        Sender {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            // The last sender is gone; wake the receiver so it can observe the closure.
            self.shared.notify.notify_one();
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}

// === impl Receiver ===

impl<T> Receiver<T> {
    /// Waits for the next item.
    ///
    /// Returns `None` only once every sender has been dropped and the buffer is drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.try_recv() {
                Ok(item) => return Some(item),
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => {}
            }

            self.shared.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        let mut state = self.shared.state.lock();
        if let Some(item) = state.buffer.pop_front() {
            return Ok(item);
        }
        if self.shared.senders.load(Ordering::Acquire) == 0 {
            return Err(TryRecvError::Closed);
        }
        Err(TryRecvError::Empty)
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.receiver_alive = false;
        state.buffer.clear();
    }
}

// NB: the buffer is not printed since `T` need not implement `Debug`.
impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("capacity", &self.shared.capacity)
            .field("len", &self.len())
            .finish()
    }
}

// === impl SendError ===

impl<T> SendError<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("receiver dropped")
    }
}

impl<T: fmt::Debug> std::error::Error for SendError<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let (tx, mut rx) = channel(cap(4));
        for i in 0..3 {
            assert_eq!(tx.send(i), Ok(None));
        }
        assert_eq!(rx.recv().await, Some(0));
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let (tx, mut rx) = channel(cap(3));
        assert_eq!(tx.send(1), Ok(None));
        assert_eq!(tx.send(2), Ok(None));
        assert_eq!(tx.send(3), Ok(None));
        // The buffer is full, so the oldest item is evicted to admit the newest.
        assert_eq!(tx.send(4), Ok(Some(1)));
        assert_eq!(rx.len(), 3);

        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
        assert_eq!(rx.recv().await, Some(4));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn recv_waits_for_send() {
        let (tx, mut rx) = channel(cap(1));
        let task = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        tx.send("hello").unwrap();
        let item = time::timeout(time::Duration::from_secs(1), task)
            .await
            .expect("receiver must be woken")
            .unwrap();
        assert_eq!(item, Some("hello"));
    }

    #[tokio::test]
    async fn closes_when_senders_dropped() {
        let (tx, mut rx) = channel(cap(2));
        let tx2 = tx.clone();
        tx.send(1).unwrap();
        drop(tx);
        tx2.send(2).unwrap();
        drop(tx2);

        // Buffered items are still delivered before the closure is observed.
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(
            time::timeout(time::Duration::from_secs(1), rx.recv()).await,
            Ok(None)
        );
    }

    #[test]
    fn send_fails_without_receiver() {
        let (tx, rx) = channel(cap(2));
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(tx.send(7), Err(SendError(7)));
    }
}
