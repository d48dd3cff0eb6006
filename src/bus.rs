//! The decision bus: an unbounded, in-memory fan-out from the pipeline to
//! streaming consumers (the out-of-scope SSE surface subscribes here).
//!
//! Grounded in `runtime/bootstrap.py: DecisionBus`, a "naive pub-sub" over a
//! set of per-subscriber `asyncio.Queue`s; reimplemented here with `flume`
//! channels in the style `event_bus::ChannelSink` uses to stream events to
//! external consumers. Each subscriber gets its own unbounded queue, so a
//! slow subscriber only backs up its own queue — never another's.

use std::sync::Mutex;

use crate::models::DecisionMessage;

#[derive(Default)]
pub struct DecisionBus {
    subscribers: Mutex<Vec<flume::Sender<DecisionMessage>>>,
}

impl DecisionBus {
    pub fn new() -> Self {
        DecisionBus::default()
    }

    /// Register a new subscriber. The returned receiver observes every
    /// message published from this point on, in publish order.
    pub fn subscribe(&self) -> flume::Receiver<DecisionMessage> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Fan out one message to every live subscriber. A subscriber whose
    /// receiver has been dropped is pruned on this call rather than
    /// tracked separately — `flume::Sender::send` fails exactly when the
    /// paired receiver is gone.
    pub fn publish(&self, message: DecisionMessage) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(action: &str) -> DecisionMessage {
        DecisionMessage {
            decision_id: "d1".into(),
            event_id: "e1".into(),
            action: action.into(),
            reason: "r".into(),
            categories: vec![],
            upgrade: false,
            needs_ocr: false,
            confidence: 1.0,
            url: None,
            title: None,
            ts: 0,
            child_id: "c1".into(),
            headline_agent: None,
            manual_flagged: false,
            manual_action: None,
            original_action: action.into(),
        }
    }

    #[test]
    fn every_subscriber_sees_every_message_in_order() {
        let bus = DecisionBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.publish(message("allow"));
        bus.publish(message("block"));

        let seen1: Vec<_> = [rx1.try_recv().unwrap(), rx1.try_recv().unwrap()]
            .iter()
            .map(|m| m.action.clone())
            .collect();
        let seen2: Vec<_> = [rx2.try_recv().unwrap(), rx2.try_recv().unwrap()]
            .iter()
            .map(|m| m.action.clone())
            .collect();
        assert_eq!(seen1, vec!["allow".to_string(), "block".to_string()]);
        assert_eq!(seen2, seen1);
    }

    #[test]
    fn dropped_subscriber_is_pruned_on_next_publish() {
        let bus = DecisionBus::new();
        let rx = bus.subscribe();
        drop(rx);
        assert_eq!(bus.subscriber_count(), 1);
        bus.publish(message("allow"));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
