//! Bounded hand-off between a fetch loop and its consumer
//!
//! A thin wrapper over a tokio mpsc channel that fixes the two shutdown
//! hazards of a plain bounded push: a full queue must not stall
//! cancellation, and the end-of-partition marker must not hang when the
//! consumer has already gone away.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tributary_core::MessageEnvelope;

/// One item on the hand-off queue.
#[derive(Debug)]
pub enum Delivery {
    /// A record with its provenance
    Envelope(MessageEnvelope),
    /// End of this partition's stream, pushed exactly once per loop run
    EndOfPartition,
}

/// Why a push did not deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// Cancellation was requested while waiting for capacity
    Cancelled,
    /// The receiver was dropped
    Closed,
}

/// Create a hand-off queue holding at most `capacity` deliveries.
pub fn handoff(capacity: usize) -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (HandoffSender { tx }, HandoffReceiver { rx })
}

pub struct HandoffSender {
    tx: mpsc::Sender<Delivery>,
}

impl HandoffSender {
    /// Push one envelope, waiting for capacity.
    ///
    /// Waiting races capacity against `cancel`, so a full queue plus a
    /// cancellation request cannot deadlock shutdown.
    pub async fn send(
        &self,
        envelope: MessageEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), PushError> {
        tokio::select! {
            permit = self.tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(Delivery::Envelope(envelope));
                    Ok(())
                }
                Err(_) => Err(PushError::Closed),
            },
            _ = cancel.cancelled() => Err(PushError::Cancelled),
        }
    }

    /// Push the end-of-partition marker.
    ///
    /// Waits for capacity but not for cancellation: the marker goes out
    /// even during shutdown. `reserve` fails as soon as the receiver
    /// drops, which unblocks this immediately; that case returns
    /// normally since no one is left to observe the marker.
    pub async fn send_end(&self) {
        if let Ok(permit) = self.tx.reserve().await {
            permit.send(Delivery::EndOfPartition);
        }
    }
}

pub struct HandoffReceiver {
    rx: mpsc::Receiver<Delivery>,
}

impl HandoffReceiver {
    /// Next delivery, or `None` once the fetch loop dropped its sender
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tributary_core::Record;

    fn envelope(offset: u64) -> MessageEnvelope {
        let record = Record::new(offset, 1000, None, Bytes::from("payload"));
        MessageEnvelope::new(record, "127.0.0.1", "events", 0)
    }

    #[tokio::test]
    async fn test_delivers_in_order() {
        let (tx, mut rx) = handoff(4);
        let cancel = CancellationToken::new();

        tx.send(envelope(1), &cancel).await.unwrap();
        tx.send(envelope(2), &cancel).await.unwrap();
        tx.send_end().await;

        match rx.recv().await.unwrap() {
            Delivery::Envelope(e) => assert_eq!(e.offset(), 1),
            other => panic!("unexpected {:?}", other),
        }
        match rx.recv().await.unwrap() {
            Delivery::Envelope(e) => assert_eq!(e.offset(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(rx.recv().await, Some(Delivery::EndOfPartition)));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_full_queue() {
        let (tx, _rx) = handoff(1);
        let cancel = CancellationToken::new();

        tx.send(envelope(1), &cancel).await.unwrap();

        let blocked = tokio::spawn({
            let cancel = cancel.clone();
            async move { tx.send(envelope(2), &cancel).await }
        });

        // give the push time to park on the full queue
        tokio::task::yield_now().await;
        cancel.cancel();

        assert_eq!(blocked.await.unwrap(), Err(PushError::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_receiver_fails_send() {
        let (tx, rx) = handoff(1);
        drop(rx);

        let cancel = CancellationToken::new();
        assert_eq!(tx.send(envelope(1), &cancel).await, Err(PushError::Closed));
    }

    #[tokio::test]
    async fn test_end_marker_does_not_hang_without_receiver() {
        let (tx, rx) = handoff(1);
        drop(rx);

        // returns immediately instead of waiting for capacity forever
        tx.send_end().await;
    }

    #[tokio::test]
    async fn test_end_marker_waits_for_capacity() {
        let (tx, mut rx) = handoff(1);
        let cancel = CancellationToken::new();
        tx.send(envelope(1), &cancel).await.unwrap();

        let sender = tokio::spawn(async move {
            tx.send_end().await;
        });

        // marker arrives after the envelope is drained
        assert!(matches!(rx.recv().await, Some(Delivery::Envelope(_))));
        assert!(matches!(rx.recv().await, Some(Delivery::EndOfPartition)));
        sender.await.unwrap();
    }
}
