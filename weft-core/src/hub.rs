//! WebSocket Hub: connection lifecycle, heartbeat, per-message
//! dispatch, and event/stats push — transport-agnostic. The concrete
//! WebSocket library (axum's `extract::ws`) lives in the server crate; this
//! module owns the fixed behavior: heartbeat cadence, message grammar,
//! fan-out.

use crate::event::Event;
use crate::subscription::{ConnectionId, Filter, SubscriptionRegistry, Topic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// What the Hub needs from a live connection; the server crate's WebSocket
/// adapter implements this over the real split sender.
pub trait ConnectionSink: Send + Sync {
    fn send_bytes(&self, bytes: Arc<Vec<u8>>);
    fn send_ping(&self);
    fn close(&self, code: u16, reason: &str);
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    Subscribe {
        topic: String,
        #[serde(default)]
        filter: Option<Filter>,
    },
    Unsubscribe {
        topic: String,
    },
    Ping,
}

#[derive(Serialize, Debug)]
#[serde(tag = "type")]
pub enum OutboundMessage<'a> {
    #[serde(rename = "ack")]
    Ack {
        #[serde(skip_serializing_if = "Option::is_none")]
        subscribed: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        unsubscribed: Option<&'a str>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "error")]
    Error { error: String, timestamp: DateTime<Utc> },
    #[serde(rename = "pong")]
    Pong { timestamp: DateTime<Utc> },
    #[serde(rename = "event")]
    Event {
        topic: &'a str,
        event: &'a str,
        data: &'a Event,
        timestamp: DateTime<Utc>,
        #[serde(rename = "projectId")]
        project_id: &'a str,
    },
    #[serde(rename = "stats")]
    Stats {
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
        #[serde(rename = "projectId")]
        project_id: &'a str,
    },
}

struct ConnectionMeta {
    connected_at: DateTime<Utc>,
    is_alive: bool,
    sink: Arc<dyn ConnectionSink>,
}

pub struct Hub {
    connections: RwLock<HashMap<ConnectionId, ConnectionMeta>>,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl Hub {
    pub fn new(subscriptions: Arc<SubscriptionRegistry>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            subscriptions,
        }
    }

    pub fn register(&self, conn_id: ConnectionId, sink: Arc<dyn ConnectionSink>) {
        self.connections.write().expect("hub lock poisoned").insert(
            conn_id,
            ConnectionMeta { connected_at: Utc::now(), is_alive: true, sink },
        );
    }

    pub fn remove(&self, conn_id: &str) {
        self.connections.write().expect("hub lock poisoned").remove(conn_id);
        self.subscriptions.unsubscribe_all(conn_id);
    }

    pub fn mark_alive(&self, conn_id: &str) {
        if let Some(meta) = self.connections.write().expect("hub lock poisoned").get_mut(conn_id) {
            meta.is_alive = true;
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().expect("hub lock poisoned").len()
    }

    /// Parses one inbound frame and applies it, returning the bytes to send
    /// back on the same connection.
    pub fn handle_inbound(&self, conn_id: &str, raw: &str) -> Vec<u8> {
        let now = Utc::now();
        let parsed: Result<InboundMessage, _> = serde_json::from_str(raw);
        let reply = match parsed {
            Ok(InboundMessage::Subscribe { topic, filter }) => match Topic::parse(&topic) {
                Some(t) => {
                    self.subscriptions.subscribe(conn_id, t, filter);
                    OutboundMessage::Ack { subscribed: Some(topic.as_str()), unsubscribed: None, timestamp: now }
                }
                None => OutboundMessage::Error { error: format!("Unknown topic: {topic}"), timestamp: now },
            },
            Ok(InboundMessage::Unsubscribe { topic }) => match Topic::parse(&topic) {
                Some(t) => match self.subscriptions.unsubscribe(conn_id, t) {
                    Ok(()) => OutboundMessage::Ack { subscribed: None, unsubscribed: Some(topic.as_str()), timestamp: now },
                    Err(_) => OutboundMessage::Error { error: format!("Not subscribed to topic: {topic}"), timestamp: now },
                },
                None => OutboundMessage::Error { error: format!("Unknown topic: {topic}"), timestamp: now },
            },
            Ok(InboundMessage::Ping) => OutboundMessage::Pong { timestamp: now },
            Err(_) => {
                // Grammar didn't match any known shape at all; try to
                // recover the raw `type` field for the error message.
                let raw_type = serde_json::from_str::<serde_json::Value>(raw)
                    .ok()
                    .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
                    .unwrap_or_else(|| "unknown".to_string());
                OutboundMessage::Error { error: format!("Unknown message type: {raw_type}"), timestamp: now }
            }
        };
        serde_json::to_vec(&reply).expect("outbound message serializes infallibly")
    }

    /// Encodes once, fans out to every matching connection.
    pub fn dispatch_event(&self, event: &Event) {
        let matched = self.subscriptions.fanout(event);
        if matched.is_empty() {
            return;
        }
        let frame = OutboundMessage::Event {
            topic: event.topic(),
            event: event.kind(),
            data: event,
            timestamp: event.timestamp,
            project_id: &event.project_id,
        };
        let bytes = Arc::new(serde_json::to_vec(&frame).expect("event frame serializes infallibly"));
        let connections = self.connections.read().expect("hub lock poisoned");
        for conn_id in matched {
            if let Some(meta) = connections.get(&conn_id) {
                meta.sink.send_bytes(bytes.clone());
            }
        }
    }

    pub fn push_stats(&self, project_id: &str, snapshot: serde_json::Value) {
        let subscribers = self.subscriptions.stats_subscribers();
        if subscribers.is_empty() {
            return;
        }
        let frame = OutboundMessage::Stats { data: snapshot, timestamp: Utc::now(), project_id };
        let bytes = Arc::new(serde_json::to_vec(&frame).expect("stats frame serializes infallibly"));
        let connections = self.connections.read().expect("hub lock poisoned");
        for conn_id in subscribers {
            if let Some(meta) = connections.get(&conn_id) {
                meta.sink.send_bytes(bytes.clone());
            }
        }
    }

    /// Every 30s: terminate connections that missed the previous ping,
    /// ping everyone else and clear their `is_alive` flag.
    pub fn heartbeat_tick(&self) {
        let mut dead = Vec::new();
        {
            let mut connections = self.connections.write().expect("hub lock poisoned");
            for (conn_id, meta) in connections.iter_mut() {
                if !meta.is_alive {
                    dead.push(conn_id.clone());
                } else {
                    meta.is_alive = false;
                    meta.sink.send_ping();
                }
            }
        }
        for conn_id in dead {
            debug!(conn_id = %conn_id, "heartbeat timeout, terminating connection");
            if let Some(meta) = self.connections.write().expect("hub lock poisoned").remove(&conn_id) {
                meta.sink.close(1001, "heartbeat timeout");
            }
            self.subscriptions.unsubscribe_all(&conn_id);
        }
    }

    pub fn shutdown(&self) {
        let ids: Vec<ConnectionId> = self.connections.read().expect("hub lock poisoned").keys().cloned().collect();
        for conn_id in ids {
            if let Some(meta) = self.connections.write().expect("hub lock poisoned").remove(&conn_id) {
                meta.sink.close(1001, "Server shutting down");
            }
            self.subscriptions.unsubscribe_all(&conn_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPayload;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Vec<u8>>>,
        pings: Mutex<usize>,
        closed: Mutex<Option<(u16, String)>>,
    }

    impl ConnectionSink for RecordingSink {
        fn send_bytes(&self, bytes: Arc<Vec<u8>>) {
            self.sent.lock().unwrap().push((*bytes).clone());
        }
        fn send_ping(&self) {
            *self.pings.lock().unwrap() += 1;
        }
        fn close(&self, code: u16, reason: &str) {
            *self.closed.lock().unwrap() = Some((code, reason.to_string()));
        }
    }

    #[test]
    fn subscribe_ack_then_event_fanout() {
        let subs = Arc::new(SubscriptionRegistry::new());
        let hub = Hub::new(subs);
        let sink = Arc::new(RecordingSink::default());
        hub.register("c1".into(), sink.clone());

        let reply = hub.handle_inbound("c1", r#"{"type":"subscribe","topic":"work","filter":{"capability":"typescript"}}"#);
        let reply_str = String::from_utf8(reply).unwrap();
        assert!(reply_str.contains("\"subscribed\":\"work\""));

        for capability in ["typescript", "python", "typescript"] {
            hub.dispatch_event(&Event::new("p1", EventPayload::WorkSubmitted {
                work_item_id: "x".into(), capability: capability.into(), boundary: "b".into(), task_id: "t".into(), priority: 5,
            }));
        }
        assert_eq!(sink.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn unknown_message_type_replies_error_without_closing() {
        let subs = Arc::new(SubscriptionRegistry::new());
        let hub = Hub::new(subs);
        let sink = Arc::new(RecordingSink::default());
        hub.register("c1".into(), sink.clone());
        let reply = hub.handle_inbound("c1", r#"{"type":"frobnicate"}"#);
        let reply_str = String::from_utf8(reply).unwrap();
        assert!(reply_str.contains("Unknown message type"));
        assert!(sink.closed.lock().unwrap().is_none());
    }

    #[test]
    fn ping_pong() {
        let subs = Arc::new(SubscriptionRegistry::new());
        let hub = Hub::new(subs);
        let reply = hub.handle_inbound("c1", r#"{"type":"ping"}"#);
        assert!(String::from_utf8(reply).unwrap().contains("pong"));
    }

    #[test]
    fn heartbeat_terminates_unresponsive_connections() {
        let subs = Arc::new(SubscriptionRegistry::new());
        let hub = Hub::new(subs);
        let sink = Arc::new(RecordingSink::default());
        hub.register("c1".into(), sink.clone());
        hub.heartbeat_tick(); // marks not-alive, pings
        assert_eq!(*sink.pings.lock().unwrap(), 1);
        hub.heartbeat_tick(); // no pong arrived, terminates
        assert!(sink.closed.lock().unwrap().is_some());
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn pong_keeps_connection_alive_across_heartbeats() {
        let subs = Arc::new(SubscriptionRegistry::new());
        let hub = Hub::new(subs);
        let sink = Arc::new(RecordingSink::default());
        hub.register("c1".into(), sink.clone());
        hub.heartbeat_tick();
        hub.mark_alive("c1");
        hub.heartbeat_tick();
        assert_eq!(hub.connection_count(), 1);
    }
}
