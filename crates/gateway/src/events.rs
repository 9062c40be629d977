//! Event bus: fans inbound happenings out to every subscribed API session.
//!
//! Each session owns a bounded queue (default 256) rather than sharing one
//! broadcast channel — that's what lets a slow consumer be penalized (its
//! own oldest events dropped) without holding up, or even touching, any
//! other session's delivery.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use i3g_domain::trace::TraceEvent;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Notify;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    TellReceived { from_mud: String, from_user: String, to_user: String, message: String },
    EmotetoReceived { from_mud: String, from_user: String, to_user: String, message: String },
    ChannelMessage { channel: String, from_mud: String, from_user: String, message: String },
    ChannelEmote { channel: String, from_mud: String, from_user: String, message: String },
    ChannelTargetedEmote {
        channel: String,
        from_mud: String,
        from_user: String,
        to_user: String,
        message: String,
    },
    MudOnline { mud_name: String },
    MudOffline { mud_name: String },
    ChannelJoined { channel: String, mud_name: String },
    ChannelLeft { channel: String, mud_name: String },
    ErrorOccurred { code: String, message: String },
    GatewayReconnected { router_name: String },
    /// Synthetic summary injected in place of events this session's queue
    /// couldn't hold. `count` is the cumulative total since the session
    /// was first marked a slow consumer, not just this overflow.
    EventsDropped { count: u64 },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::TellReceived { .. } => "tell_received",
            Event::EmotetoReceived { .. } => "emoteto_received",
            Event::ChannelMessage { .. } => "channel_message",
            Event::ChannelEmote { .. } => "channel_emote",
            Event::ChannelTargetedEmote { .. } => "channel_targeted_emote",
            Event::MudOnline { .. } => "mud_online",
            Event::MudOffline { .. } => "mud_offline",
            Event::ChannelJoined { .. } => "channel_joined",
            Event::ChannelLeft { .. } => "channel_left",
            Event::ErrorOccurred { .. } => "error_occurred",
            Event::GatewayReconnected { .. } => "gateway_reconnected",
            Event::EventsDropped { .. } => "events_dropped",
        }
    }

    fn is_dropped_summary(&self) -> bool {
        matches!(self, Event::EventsDropped { .. })
    }
}

/// One session's subscription: which event kinds it wants, and its
/// bounded backlog of events not yet drained by its connection task.
pub struct SessionQueue {
    session_id: String,
    capacity: usize,
    subscribed: RwLock<HashSet<String>>,
    queue: Mutex<VecDeque<Event>>,
    dropped: AtomicU64,
    slow_consumer: AtomicBool,
    pub notify: Arc<Notify>,
}

impl SessionQueue {
    fn new(session_id: String, capacity: usize) -> Self {
        Self {
            session_id,
            capacity,
            subscribed: RwLock::new(HashSet::new()),
            queue: Mutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
            slow_consumer: AtomicBool::new(false),
            notify: Arc::new(Notify::new()),
        }
    }

    fn wants(&self, kind: &str) -> bool {
        let subscribed = self.subscribed.read();
        subscribed.contains("*") || subscribed.contains(kind)
    }

    fn push(&self, event: Event) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            self.slow_consumer.store(true, Ordering::Relaxed);
            TraceEvent::SlowConsumer {
                session_id: self.session_id.clone(),
                events_dropped: total as usize,
            }
            .emit();

            if let Some(pos) = queue.iter().rposition(Event::is_dropped_summary) {
                queue.remove(pos);
            } else {
                queue.pop_front();
            }
            queue.push_back(Event::EventsDropped { count: total });
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }

    /// Drain every currently queued event, in order, for the connection
    /// writer task to forward to the transport.
    pub fn drain(&self) -> Vec<Event> {
        self.queue.lock().drain(..).collect()
    }

    pub fn is_slow_consumer(&self) -> bool {
        self.slow_consumer.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Fan-out hub for every connected session's subscription. One instance
/// shared across the whole gateway.
#[derive(Default)]
pub struct EventBus {
    sessions: RwLock<std::collections::HashMap<String, Arc<SessionQueue>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-fetch) a session's queue and add `event_types` to
    /// its subscription. `"*"` subscribes to everything.
    pub fn subscribe(&self, session_id: &str, event_types: &[String]) -> Arc<SessionQueue> {
        let queue = {
            let mut sessions = self.sessions.write();
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(SessionQueue::new(session_id.to_string(), DEFAULT_QUEUE_CAPACITY)))
                .clone()
        };
        queue.subscribed.write().extend(event_types.iter().cloned());
        queue
    }

    pub fn unsubscribe(&self, session_id: &str, event_types: &[String]) {
        if let Some(queue) = self.sessions.read().get(session_id) {
            let mut subscribed = queue.subscribed.write();
            for kind in event_types {
                subscribed.remove(kind);
            }
        }
    }

    /// Drop a session's queue entirely — called when its connection
    /// closes or its session expires.
    pub fn remove_session(&self, session_id: &str) {
        self.sessions.write().remove(session_id);
    }

    /// Fan `event` out to every session subscribed to its kind.
    pub fn publish(&self, event: Event) {
        let kind = event.kind();
        let sessions = self.sessions.read();
        for queue in sessions.values() {
            if queue.wants(kind) {
                queue.push(event.clone());
            }
        }
    }

    pub fn queue_for(&self, session_id: &str) -> Option<Arc<SessionQueue>> {
        self.sessions.read().get(session_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tell() -> Event {
        Event::TellReceived {
            from_mud: "OtherMUD".into(),
            from_user: "bob".into(),
            to_user: "alice".into(),
            message: "hi".into(),
        }
    }

    #[test]
    fn subscribed_session_receives_matching_event() {
        let bus = EventBus::new();
        bus.subscribe("s1", &["tell_received".to_string()]);
        bus.publish(tell());
        let drained = bus.queue_for("s1").unwrap().drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].kind(), "tell_received");
    }

    #[test]
    fn unsubscribed_kind_is_not_delivered() {
        let bus = EventBus::new();
        bus.subscribe("s1", &["mud_online".to_string()]);
        bus.publish(tell());
        assert!(bus.queue_for("s1").unwrap().drain().is_empty());
    }

    #[test]
    fn wildcard_subscription_receives_everything() {
        let bus = EventBus::new();
        bus.subscribe("s1", &["*".to_string()]);
        bus.publish(tell());
        bus.publish(Event::MudOnline { mud_name: "OtherMUD".into() });
        assert_eq!(bus.queue_for("s1").unwrap().drain().len(), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        bus.subscribe("s1", &["tell_received".to_string()]);
        bus.unsubscribe("s1", &["tell_received".to_string()]);
        bus.publish(tell());
        assert!(bus.queue_for("s1").unwrap().drain().is_empty());
    }

    #[test]
    fn overflow_drops_oldest_and_marks_slow_consumer() {
        let queue = SessionQueue::new("s1".into(), 4);
        queue.subscribed.write().insert("tell_received".into());
        for _ in 0..6 {
            queue.push(tell());
        }
        let drained = queue.drain();
        assert!(queue.is_slow_consumer());
        assert!(queue.dropped_count() >= 2);
        assert!(drained.iter().any(Event::is_dropped_summary));
        assert!(drained.len() <= 4);
    }

    #[test]
    fn removed_session_stops_receiving() {
        let bus = EventBus::new();
        bus.subscribe("s1", &["*".to_string()]);
        bus.remove_session("s1");
        bus.publish(tell());
        assert!(bus.queue_for("s1").is_none());
    }
}
