use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::event::Topic;

/// Handle identifying one live connection
pub type SubscriberId = String;

/// Serialized message shared by every recipient of a broadcast
pub type Payload = Arc<str>;

/// Default per-subscriber queue depth
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Outbound side of one live connection
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    sender: mpsc::Sender<Payload>,
    live: Arc<AtomicBool>,
}

impl Subscriber {
    #[must_use]
    pub fn new(id: SubscriberId, sender: mpsc::Sender<Payload>) -> Self {
        Self {
            id,
            sender,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Queue a payload without waiting. A full queue counts as a failed
    /// delivery so one stalled reader cannot hold up the rest.
    pub fn try_deliver(&self, payload: Payload) -> Result<(), DeliveryError> {
        if !self.is_live() {
            return Err(DeliveryError::Gone);
        }
        self.sender.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

struct Connection {
    subscriber: Subscriber,
    topics: HashSet<Topic>,
}

/// Live set of subscribers, partitioned by topic
///
/// Cloning is cheap and every clone sees the same set.
#[derive(Clone)]
pub struct SubscriberRegistry {
    /// topic -> subscribers
    topics: Arc<DashMap<Topic, Vec<Subscriber>>>,

    /// subscriber id -> connection, for cleanup and topic changes
    connections: Arc<DashMap<SubscriberId, Connection>>,

    channel_capacity: usize,
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Registry whose `connect` hands out queues of `channel_capacity` messages
    #[must_use]
    pub fn with_capacity(channel_capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            connections: Arc::new(DashMap::new()),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Open a new subscriber on `topics` and return the receiving end of its queue
    pub fn connect(
        &self,
        topics: impl IntoIterator<Item = Topic>,
    ) -> (SubscriberId, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let id: SubscriberId = nanoid::nanoid!();
        self.register(Subscriber::new(id.clone(), tx), topics);
        (id, rx)
    }

    /// Add a subscriber to the live set. Registering an already known id
    /// only adds the topics it was missing. A subscriber that was
    /// unregistered stays dead and is ignored.
    pub fn register(&self, subscriber: Subscriber, topics: impl IntoIterator<Item = Topic>) {
        if !subscriber.is_live() {
            debug!(subscriber_id = %subscriber.id, "Register of unregistered subscriber ignored");
            return;
        }

        let requested: HashSet<Topic> = topics.into_iter().collect();

        let (subscriber, added) = {
            let mut connection = self
                .connections
                .entry(subscriber.id.clone())
                .or_insert_with(|| Connection {
                    subscriber,
                    topics: HashSet::new(),
                });
            let added: Vec<Topic> = requested
                .into_iter()
                .filter(|topic| connection.topics.insert(*topic))
                .collect();
            (connection.subscriber.clone(), added)
        };

        for topic in &added {
            let mut subscribers = self.topics.entry(*topic).or_default();
            if !subscribers.iter().any(|s| s.id == subscriber.id) {
                subscribers.push(subscriber.clone());
            }
        }

        // lost a race with unregister
        if !subscriber.is_live() {
            self.connections
                .remove_if(&subscriber.id, |_, connection| !connection.subscriber.is_live());
            for topic in &added {
                self.remove_from_topic(*topic, &subscriber.id);
            }
            return;
        }

        info!(
            subscriber_id = %subscriber.id,
            topics = ?added,
            "Subscriber registered"
        );
    }

    /// Remove a subscriber from every topic. Unknown ids are ignored.
    pub fn unregister(&self, subscriber_id: &str) {
        let Some((_, connection)) = self.connections.remove(subscriber_id) else {
            debug!(subscriber_id = %subscriber_id, "Unregister of unknown subscriber ignored");
            return;
        };

        connection.subscriber.live.store(false, Ordering::Release);

        for topic in &connection.topics {
            self.remove_from_topic(*topic, subscriber_id);
        }

        info!(subscriber_id = %subscriber_id, "Subscriber unregistered");
    }

    /// Unregister every subscriber, closing their queues. Returns how many
    /// were connected.
    pub fn disconnect_all(&self) -> usize {
        let ids: Vec<SubscriberId> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for subscriber_id in &ids {
            self.unregister(subscriber_id);
        }
        ids.len()
    }

    /// Add a topic to a registered subscriber. Returns false if the id is
    /// unknown or the subscriber was dropped meanwhile.
    pub fn subscribe_topic(&self, subscriber_id: &str, topic: Topic) -> bool {
        let subscriber = match self.connections.get_mut(subscriber_id) {
            Some(mut connection) => {
                if !connection.topics.insert(topic) {
                    return true;
                }
                connection.subscriber.clone()
            }
            None => return false,
        };

        {
            let mut subscribers = self.topics.entry(topic).or_default();
            if !subscribers.iter().any(|s| s.id == subscriber.id) {
                subscribers.push(subscriber.clone());
            }
        }
        if !subscriber.is_live() {
            self.remove_from_topic(topic, subscriber_id);
            return false;
        }
        true
    }

    /// Drop one topic from a registered subscriber. Returns false if the id is unknown.
    pub fn unsubscribe_topic(&self, subscriber_id: &str, topic: Topic) -> bool {
        match self.connections.get_mut(subscriber_id) {
            Some(mut connection) => {
                connection.topics.remove(&topic);
            }
            None => return false,
        }
        self.remove_from_topic(topic, subscriber_id);
        true
    }

    fn remove_from_topic(&self, topic: Topic, subscriber_id: &str) {
        let now_empty = match self.topics.get_mut(&topic) {
            Some(mut subscribers) => {
                subscribers.retain(|s| s.id != subscriber_id);
                subscribers.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.topics.remove_if(&topic, |_, subscribers| subscribers.is_empty());
            debug!(topic = %topic, "Topic has no more subscribers");
        }
    }

    /// Run `deliver` once per live subscriber of `topic`.
    ///
    /// Works on a snapshot taken up front, so no map guard is held while
    /// `deliver` runs. Subscribers whose delivery fails are unregistered.
    /// Returns the number of successful deliveries.
    pub fn for_each_live<F>(&self, topic: Topic, mut deliver: F) -> usize
    where
        F: FnMut(&Subscriber) -> Result<(), DeliveryError>,
    {
        let snapshot: Vec<Subscriber> = self
            .topics
            .get(&topic)
            .map(|subscribers| subscribers.value().clone())
            .unwrap_or_default();

        let mut delivered = 0;
        let mut failed = Vec::new();

        for subscriber in &snapshot {
            // unregistered since the snapshot was taken
            if !subscriber.is_live() {
                continue;
            }
            match deliver(subscriber) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(
                        topic = %topic,
                        subscriber_id = %subscriber.id,
                        error = %err,
                        "Delivery failed, dropping subscriber"
                    );
                    failed.push(subscriber.id.clone());
                }
            }
        }

        for subscriber_id in failed {
            self.unregister(&subscriber_id);
        }

        delivered
    }

    /// Queue `payload` for every live subscriber of `topic`
    pub fn broadcast(&self, topic: Topic, payload: Payload) -> usize {
        self.for_each_live(topic, |subscriber| subscriber.try_deliver(payload.clone()))
    }

    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics
            .get(&topic)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    /// Number of topics with at least one subscriber
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_registered(&self, subscriber_id: &str) -> bool {
        self.connections.contains_key(subscriber_id)
    }

    /// Topics a subscriber currently listens on
    #[must_use]
    pub fn topics_of(&self, subscriber_id: &str) -> Vec<Topic> {
        self.connections
            .get(subscriber_id)
            .map(|connection| connection.topics.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("connections", &self.connections.len())
            .field("topics", &self.topics.len())
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn payload(text: &str) -> Payload {
        Arc::from(text)
    }

    #[tokio::test]
    async fn test_connect_and_broadcast() {
        let registry = SubscriberRegistry::new();
        let (_id, mut rx) = registry.connect([Topic::Chapters]);

        assert_eq!(registry.subscriber_count(Topic::Chapters), 1);
        assert_eq!(registry.connection_count(), 1);

        let sent = registry.broadcast(Topic::Chapters, payload("hello"));
        assert_eq!(sent, 1);

        let received = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(&*received, "hello");
    }

    #[tokio::test]
    async fn test_broadcast_only_reaches_topic() {
        let registry = SubscriberRegistry::new();
        let (_c, mut chapters_rx) = registry.connect([Topic::Chapters]);
        let (_m, mut marines_rx) = registry.connect([Topic::Marines]);

        assert_eq!(registry.broadcast(Topic::Marines, payload("m")), 1);

        assert_eq!(&*marines_rx.recv().await.unwrap(), "m");
        assert!(chapters_rx.try_recv().is_err());
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let subscriber = Subscriber::new("conn1".to_string(), tx);

        registry.register(subscriber.clone(), [Topic::Chapters]);
        registry.register(subscriber.clone(), [Topic::Chapters]);
        registry.register(subscriber, [Topic::Chapters, Topic::Marines]);

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.subscriber_count(Topic::Chapters), 1);
        assert_eq!(registry.subscriber_count(Topic::Marines), 1);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = SubscriberRegistry::new();
        registry.unregister("missing");

        let (id, _rx) = registry.connect([Topic::Persons]);
        registry.unregister(&id);
        registry.unregister(&id);

        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.subscriber_count(Topic::Persons), 0);
        assert_eq!(registry.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_removed_without_affecting_others() {
        let registry = SubscriberRegistry::new();
        let (_a, rx_a) = registry.connect([Topic::Chapters]);
        let (_b, mut rx_b) = registry.connect([Topic::Chapters]);

        drop(rx_a);

        let sent = registry.broadcast(Topic::Chapters, payload("x"));
        assert_eq!(sent, 1);
        assert_eq!(registry.subscriber_count(Topic::Chapters), 1);
        assert_eq!(&*rx_b.recv().await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_full_queue_drops_slow_subscriber() {
        let registry = SubscriberRegistry::with_capacity(1);
        let (slow, _slow_rx) = registry.connect([Topic::Marines]);
        let (_fast, mut fast_rx) = registry.connect([Topic::Marines]);

        assert_eq!(registry.broadcast(Topic::Marines, payload("1")), 2);
        assert_eq!(&*fast_rx.recv().await.unwrap(), "1");

        // slow never drained its queue
        assert_eq!(registry.broadcast(Topic::Marines, payload("2")), 1);
        assert!(!registry.is_registered(&slow));
        assert_eq!(&*fast_rx.recv().await.unwrap(), "2");
    }

    #[tokio::test]
    async fn test_unregister_during_broadcast() {
        let registry = SubscriberRegistry::new();
        let (first, mut rx_first) = registry.connect([Topic::Chapters]);
        let (second, mut rx_second) = registry.connect([Topic::Chapters]);

        let mut seen = Vec::new();
        let sent = registry.for_each_live(Topic::Chapters, |subscriber| {
            seen.push(subscriber.id().to_string());
            // whoever goes first removes the other
            let other = if subscriber.id() == first { &second } else { &first };
            registry.unregister(other);
            subscriber.try_deliver(payload("only-one"))
        });

        assert_eq!(sent, 1);
        assert_eq!(seen.len(), 1);
        assert_eq!(registry.connection_count(), 1);

        let got_first = rx_first.try_recv().is_ok();
        let got_second = rx_second.try_recv().is_ok();
        assert!(got_first ^ got_second);

        // the removed subscriber gets nothing further
        registry.broadcast(Topic::Chapters, payload("later"));
        if got_first {
            assert!(rx_second.try_recv().is_err());
        } else {
            assert!(rx_first.try_recv().is_err());
        }
    }

    #[test]
    fn test_subscribe_and_unsubscribe_topic() {
        let registry = SubscriberRegistry::new();
        let (id, _rx) = registry.connect([Topic::Chapters]);

        assert!(registry.subscribe_topic(&id, Topic::Persons));
        assert!(registry.subscribe_topic(&id, Topic::Persons));
        assert_eq!(registry.subscriber_count(Topic::Persons), 1);

        assert!(registry.unsubscribe_topic(&id, Topic::Chapters));
        assert_eq!(registry.subscriber_count(Topic::Chapters), 0);
        assert_eq!(registry.topics_of(&id), vec![Topic::Persons]);

        assert!(!registry.subscribe_topic("missing", Topic::Marines));
        assert!(!registry.unsubscribe_topic("missing", Topic::Marines));
    }

    #[tokio::test]
    async fn test_concurrent_connect_and_broadcast() {
        let registry = SubscriberRegistry::new();
        let mut handles = Vec::new();

        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let (id, _rx) = registry.connect([Topic::Marines]);
                registry.broadcast(Topic::Marines, Arc::from("tick"));
                registry.unregister(&id);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.subscriber_count(Topic::Marines), 0);
    }

    #[test]
    fn test_register_after_unregister_stays_dead() {
        let registry = SubscriberRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let subscriber = Subscriber::new("conn1".to_string(), tx);

        registry.register(subscriber.clone(), [Topic::Chapters]);
        registry.unregister("conn1");
        registry.register(subscriber, [Topic::Chapters, Topic::Marines]);

        assert!(!registry.is_registered("conn1"));
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.subscriber_count(Topic::Chapters), 0);
        assert_eq!(registry.topic_count(), 0);
    }

    #[test]
    fn test_subscribe_topic_on_dropped_subscriber_fails() {
        let registry = SubscriberRegistry::new();
        let (id, rx) = registry.connect([Topic::Chapters]);
        drop(rx);

        // the failed delivery unregisters it
        assert_eq!(registry.broadcast(Topic::Chapters, payload("x")), 0);
        assert!(!registry.subscribe_topic(&id, Topic::Persons));
        assert_eq!(registry.subscriber_count(Topic::Persons), 0);
    }

    #[tokio::test]
    async fn test_disconnect_all_closes_queues() {
        let registry = SubscriberRegistry::new();
        let (_a, mut rx_a) = registry.connect([Topic::Chapters]);
        let (_b, mut rx_b) = registry.connect([Topic::Marines, Topic::Persons]);

        assert_eq!(registry.disconnect_all(), 2);
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.topic_count(), 0);
        assert!(rx_a.recv().await.is_none());
        assert!(rx_b.recv().await.is_none());
    }
}
