//! Lossless event relay between native callbacks and consumers
//!
//! The input end is written from whatever thread the native layer uses to
//! fire callbacks. It never blocks and never refuses an event, however far
//! behind the consumer is: undelivered events sit in an unbounded queue.
//!
//! Dropping every [`RelayInput`] closes the relay. Events already queued are
//! still handed out, and only then does the [`EventStream`] report the end
//! of the stream.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::debug;

use crate::events::Event;

/// Create a relay for one registration epoch
pub fn relay(epoch: u64) -> (RelayInput, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        RelayInput { tx, epoch },
        EventStream {
            rx: Arc::new(Mutex::new(rx)),
            epoch,
        },
    )
}

/// Write-only end of a relay
#[derive(Debug, Clone)]
pub struct RelayInput {
    tx: UnboundedSender<Event>,
    epoch: u64,
}

impl RelayInput {
    /// Push an event without blocking
    ///
    /// Returns `false` if every consumer handle has been dropped, in which
    /// case nobody can observe the event anyway.
    pub fn push(&self, event: Event) -> bool {
        if self.tx.send(event).is_err() {
            debug!(epoch = self.epoch, "relay has no consumer, event discarded");
            return false;
        }
        true
    }

    /// Epoch this relay belongs to
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Read-only end of a relay
///
/// Clones share the same underlying queue: each event is observed by exactly
/// one reader.
#[derive(Debug, Clone)]
pub struct EventStream {
    rx: Arc<Mutex<UnboundedReceiver<Event>>>,
    epoch: u64,
}

impl EventStream {
    /// Wait for the next event; `None` once the relay is closed and drained
    pub async fn recv(&self) -> Option<Event> {
        self.rx.lock().await.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv)
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async runtime.
    pub fn blocking_recv(&self) -> Option<Event> {
        self.rx.blocking_lock().blocking_recv()
    }

    /// Take the next event if one is queued
    ///
    /// Reports `Empty` while another reader holds the stream, even if the
    /// relay has closed in the meantime; only a reader that gets the lock
    /// can observe `Disconnected`.
    pub fn try_recv(&self) -> Result<Event, TryRecvError> {
        match self.rx.try_lock() {
            Ok(mut rx) => rx.try_recv(),
            Err(_) => Err(TryRecvError::Empty),
        }
    }

    /// Epoch this stream belongs to
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Blocking iteration until the relay closes
impl Iterator for EventStream {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        self.blocking_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_lossless_before_any_read() {
        for n in [0usize, 1, 17, 10_000] {
            let (input, output) = relay(0);
            for _ in 0..n {
                assert!(input.push(Event));
            }
            drop(input);

            assert_eq!(output.count(), n);
        }
    }

    #[test]
    fn test_drains_buffered_events_before_close() {
        let (input, output) = relay(3);
        input.push(Event);
        input.push(Event);
        drop(input);

        assert_eq!(output.try_recv(), Ok(Event));
        assert_eq!(output.try_recv(), Ok(Event));
        assert_eq!(output.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn test_open_relay_reports_empty() {
        let (_input, output) = relay(0);
        assert_eq!(output.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_contended_stream_reports_empty() {
        let (input, output) = relay(0);
        let other = output.clone();
        drop(input);

        // Stands in for a reader parked in `recv`.
        let held = output.rx.try_lock().unwrap();
        assert_eq!(other.try_recv(), Err(TryRecvError::Empty));

        drop(held);
        assert_eq!(other.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn test_producer_never_blocks_on_slow_consumer() {
        let (input, output) = relay(0);

        let producer = thread::spawn(move || {
            for _ in 0..5_000 {
                input.push(Event);
            }
        });
        // The producer finishes even though nothing has been read yet.
        producer.join().unwrap();

        thread::sleep(Duration::from_millis(10));
        assert_eq!(output.count(), 5_000);
    }

    #[test]
    fn test_clones_share_queue() {
        let (input, output) = relay(1);
        let other = output.clone();
        input.push(Event);
        input.push(Event);
        drop(input);

        assert_eq!(output.blocking_recv(), Some(Event));
        assert_eq!(other.blocking_recv(), Some(Event));
        assert_eq!(output.blocking_recv(), None);
        assert_eq!(other.epoch(), 1);
    }

    #[test]
    fn test_push_without_consumer() {
        let (input, output) = relay(0);
        drop(output);
        assert!(!input.push(Event));
    }

    #[tokio::test]
    async fn test_async_recv_from_foreign_thread() {
        let (input, output) = relay(0);

        thread::spawn(move || {
            for _ in 0..3 {
                input.push(Event);
            }
        });

        let mut seen = 0;
        while output.recv().await.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 3);
    }
}
