use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};

use parking_lot::Mutex;
use revdb_core::ChangeEvent;

enum Subscriber {
    Unbounded(Sender<ChangeEvent>),
    Bounded(SyncSender<ChangeEvent>),
}

impl Subscriber {
    /// False once the subscriber should be dropped.
    fn deliver(&self, event: ChangeEvent) -> bool {
        match self {
            Self::Unbounded(tx) => tx.send(event).is_ok(),
            Self::Bounded(tx) => match tx.try_send(event) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("change subscriber fell behind, disconnecting it");
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
        }
    }
}

/// Fan-out of committed change events, in commit order.
pub struct ChangeFeed {
    subscribers: Mutex<Vec<Subscriber>>,
    history: Mutex<VecDeque<ChangeEvent>>,
    max_history: usize,
}

impl ChangeFeed {
    pub fn new(max_history: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            history: Mutex::new(VecDeque::new()),
            max_history,
        }
    }

    /// Receive every event published after this call.
    ///
    /// The channel is unbounded: a receiver that is kept alive but never
    /// drained holds every event published since. Use `subscribe_bounded`
    /// when the consumer may stall.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(Subscriber::Unbounded(tx));
        rx
    }

    /// Like `subscribe`, but buffers at most `capacity` undelivered events.
    /// Publishing never blocks: a subscriber whose buffer is full is
    /// disconnected, and its receiver reports `Disconnected` once drained.
    pub fn subscribe_bounded(&self, capacity: usize) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::sync_channel(capacity);
        self.subscribers.lock().push(Subscriber::Bounded(tx));
        rx
    }

    pub fn publish(&self, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        {
            let mut history = self.history.lock();
            for event in &events {
                history.push_back(event.clone());
            }
            while history.len() > self.max_history {
                history.pop_front();
            }
        }

        let mut subscribers = self.subscribers.lock();
        // Drop subscribers whose receiver has gone away.
        subscribers.retain(|sub| events.iter().all(|e| sub.deliver(e.clone())));
    }

    pub fn recent(&self) -> Vec<ChangeEvent> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(doc: &str) -> ChangeEvent {
        ChangeEvent {
            doc_id: doc.into(),
            prev_winner: None,
            new_winner: None,
        }
    }

    #[test]
    fn delivers_in_order_and_trims_history() {
        let feed = ChangeFeed::new(2);
        let rx = feed.subscribe();
        feed.publish(vec![event("a"), event("b")]);
        feed.publish(vec![event("c")]);

        let got: Vec<String> = rx.try_iter().map(|e| e.doc_id).collect();
        assert_eq!(got, vec!["a", "b", "c"]);

        let recent: Vec<String> = feed.recent().into_iter().map(|e| e.doc_id).collect();
        assert_eq!(recent, vec!["b", "c"]);
    }

    #[test]
    fn drops_closed_subscribers() {
        let feed = ChangeFeed::new(10);
        let rx = feed.subscribe();
        drop(rx);
        let _kept = feed.subscribe();
        feed.publish(vec![event("a")]);
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[test]
    fn bounded_subscriber_is_cut_off_when_full() {
        let feed = ChangeFeed::new(10);
        let slow = feed.subscribe_bounded(2);
        let fast = feed.subscribe();

        feed.publish(vec![event("a"), event("b")]);
        feed.publish(vec![event("c")]);
        assert_eq!(feed.subscriber_count(), 1);

        let got: Vec<String> = slow.try_iter().map(|e| e.doc_id).collect();
        assert_eq!(got, vec!["a", "b"]);
        assert!(matches!(slow.try_recv(), Err(mpsc::TryRecvError::Disconnected)));
        assert_eq!(fast.try_iter().count(), 3);
    }

    #[test]
    fn bounded_subscriber_keeps_up_when_drained() {
        let feed = ChangeFeed::new(10);
        let rx = feed.subscribe_bounded(1);
        for doc in ["a", "b", "c"] {
            feed.publish(vec![event(doc)]);
            assert_eq!(rx.try_recv().unwrap().doc_id, doc);
        }
        assert_eq!(feed.subscriber_count(), 1);
    }
}
