//! Subscriber registry for one realtime channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use common::AccountKey;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::RealtimeEvent;

/// Which audience a registry serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Receives every event.
    Operator,
    /// Receives untagged events, and tagged events only for the matching account.
    Customer,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Operator => "operator",
            Channel::Customer => "customer",
        }
    }
}

struct Subscriber {
    account_key: Option<AccountKey>,
    tx: mpsc::Sender<Arc<RealtimeEvent>>,
}

/// The set of live subscribers of one channel.
///
/// Each subscriber owns a bounded queue. Broadcasting never waits: a full
/// queue drops the event for that subscriber, and a closed queue (the
/// connection went away) removes the subscriber.
pub struct Registry {
    channel: Channel,
    buffer: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
}

impl Registry {
    pub fn new(channel: Channel, buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            channel,
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_count(&self, count: usize) {
        metrics::gauge!("realtime_subscribers", "channel" => self.channel.as_str())
            .set(count as f64);
    }

    /// Adds a subscriber. Dropping the returned [`Subscription`] removes it.
    ///
    /// `account_key` is the identity presented by a customer connection; it
    /// is ignored on the operator channel.
    pub fn subscribe(self: &Arc<Self>, account_key: Option<AccountKey>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        let count = {
            let mut subscribers = self.lock();
            subscribers.insert(id, Subscriber { account_key, tx });
            subscribers.len()
        };
        self.record_count(count);
        tracing::debug!(channel = self.channel.as_str(), subscriber = id, "subscribed");

        Subscription {
            id,
            registry: Arc::clone(self),
            rx,
        }
    }

    /// Removes a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: u64) {
        let (removed, count) = {
            let mut subscribers = self.lock();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };
        if removed {
            self.record_count(count);
            tracing::debug!(channel = self.channel.as_str(), subscriber = id, "unsubscribed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn admits(&self, subscriber: &Subscriber, event: &RealtimeEvent) -> bool {
        match (self.channel, &event.account_key) {
            (Channel::Operator, _) | (Channel::Customer, None) => true,
            (Channel::Customer, Some(owner)) => subscriber.account_key.as_ref() == Some(owner),
        }
    }

    /// Delivers `event` to every admitted subscriber and returns how many got it.
    pub fn broadcast(&self, event: RealtimeEvent) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0;
        let mut closed = Vec::new();

        let count = {
            let mut subscribers = self.lock();
            for (id, subscriber) in subscribers.iter() {
                if !self.admits(subscriber, &event) {
                    continue;
                }
                match subscriber.tx.try_send(Arc::clone(&event)) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::debug!(
                            channel = self.channel.as_str(),
                            subscriber = id,
                            event = event.name,
                            "subscriber lagging, event dropped"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
            for id in &closed {
                subscribers.remove(id);
            }
            subscribers.len()
        };

        if !closed.is_empty() {
            self.record_count(count);
            tracing::debug!(
                channel = self.channel.as_str(),
                pruned = closed.len(),
                "pruned closed subscribers"
            );
        }
        delivered
    }
}

/// A live subscription. Unsubscribes on drop.
pub struct Subscription {
    id: u64,
    registry: Arc<Registry>,
    rx: mpsc::Receiver<Arc<RealtimeEvent>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next event. Returns `None` once the subscription was removed.
    pub async fn recv(&mut self) -> Option<Arc<RealtimeEvent>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FOODS_CHANGED, ORDERS_CHANGED};

    fn key(raw: &str) -> AccountKey {
        AccountKey::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn operator_channel_receives_everything() {
        let registry = Registry::new(Channel::Operator, 8);
        let mut sub = registry.subscribe(None);

        let event = RealtimeEvent::new(ORDERS_CHANGED, "x").tagged(key("a@klu.ac.in"));
        assert_eq!(registry.broadcast(event), 1);
        assert_eq!(sub.recv().await.unwrap().name, ORDERS_CHANGED);
    }

    #[tokio::test]
    async fn customer_channel_filters_tagged_events() {
        let registry = Registry::new(Channel::Customer, 8);
        let mut owner = registry.subscribe(Some(key("a@klu.ac.in")));
        let mut other = registry.subscribe(Some(key("b@klu.ac.in")));
        let mut anonymous = registry.subscribe(None);

        let tagged = RealtimeEvent::new(ORDERS_CHANGED, "mine").tagged(key("A@KLU.ac.in"));
        assert_eq!(registry.broadcast(tagged), 1);
        assert_eq!(registry.broadcast(RealtimeEvent::new(FOODS_CHANGED, "all")), 3);

        assert_eq!(owner.recv().await.unwrap().name, ORDERS_CHANGED);
        assert_eq!(owner.recv().await.unwrap().name, FOODS_CHANGED);
        assert_eq!(other.recv().await.unwrap().name, FOODS_CHANGED);
        assert_eq!(anonymous.recv().await.unwrap().name, FOODS_CHANGED);
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let registry = Registry::new(Channel::Operator, 8);
        let sub = registry.subscribe(None);
        let _other = registry.subscribe(None);
        assert_eq!(registry.subscriber_count(), 2);

        drop(sub);
        assert_eq!(registry.subscriber_count(), 1);
        assert_eq!(registry.broadcast(RealtimeEvent::new(FOODS_CHANGED, 1)), 1);
    }

    #[tokio::test]
    async fn full_queue_drops_event_but_keeps_subscriber() {
        let registry = Registry::new(Channel::Operator, 1);
        let mut sub = registry.subscribe(None);

        assert_eq!(registry.broadcast(RealtimeEvent::new(FOODS_CHANGED, 1)), 1);
        assert_eq!(registry.broadcast(RealtimeEvent::new(FOODS_CHANGED, 2)), 0);
        assert_eq!(registry.subscriber_count(), 1);

        assert_eq!(sub.recv().await.unwrap().data, serde_json::json!(1));
        assert_eq!(registry.broadcast(RealtimeEvent::new(FOODS_CHANGED, 3)), 1);
        assert_eq!(sub.recv().await.unwrap().data, serde_json::json!(3));
    }

    #[test]
    fn unsubscribing_unknown_id_is_harmless() {
        let registry = Registry::new(Channel::Customer, 4);
        registry.unsubscribe(42);
        assert_eq!(registry.subscriber_count(), 0);
    }
}
