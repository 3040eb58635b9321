//! Connection/session state, kept separate from I/O so the lifecycle
//! and dispatch rules stay unit-testable without a live transport.

use crate::protocol::{InboundEnvelope, OutboundEnvelope};
use eyre::Result;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Lifecycle of the single bus connection.
///
/// `Connected` is only entered on the first valid inbound frame, not on
/// socket establishment: for this protocol, transport-ready does not
/// mean handshake-complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

/// Handler invoked with the raw payload of each matching `publish` frame.
pub type TopicCallback = Box<dyn Fn(Value) + Send>;

struct Subscription {
    id: String,
    callback: TopicCallback,
}

/// One in-flight service call, matched strictly by correlation ID.
struct PendingCall {
    reply: oneshot::Sender<Result<Value>>,
}

pub struct Session {
    state: ConnectionState,
    subscriptions: HashMap<String, Subscription>,
    pending: HashMap<String, PendingCall>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            subscriptions: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Start a connection attempt. Returns false if one is already in
    /// flight or established; only one attempt may exist at a time.
    pub fn begin_connect(&mut self) -> bool {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Error(_) => {
                self.state = ConnectionState::Connecting;
                true
            }
            ConnectionState::Connecting | ConnectionState::Connected => false,
        }
    }

    /// Record the first valid inbound frame. Returns true when this
    /// frame completed the handshake.
    pub fn mark_frame_received(&mut self) -> bool {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
            true
        } else {
            false
        }
    }

    pub fn mark_error(&mut self, reason: String) {
        warn!("Bus transport error: {}", reason);
        self.state = ConnectionState::Error(reason);
    }

    pub fn mark_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// Register (or replace) the handler for a topic and build the
    /// subscribe envelope to send.
    pub fn subscribe(
        &mut self,
        topic: String,
        msg_type: String,
        callback: TopicCallback,
    ) -> OutboundEnvelope {
        let id = new_correlation_id();
        if self.subscriptions.contains_key(&topic) {
            debug!("Replacing existing subscription for '{}'", topic);
        }
        self.subscriptions.insert(
            topic.clone(),
            Subscription {
                id: id.clone(),
                callback,
            },
        );
        OutboundEnvelope::Subscribe {
            id,
            topic,
            msg_type,
        }
    }

    /// Drop the registration and build the unsubscribe envelope.
    /// Returns None when the topic was never subscribed.
    pub fn unsubscribe(&mut self, topic: &str) -> Option<OutboundEnvelope> {
        self.subscriptions
            .remove(topic)
            .map(|sub| OutboundEnvelope::Unsubscribe {
                id: sub.id,
                topic: topic.to_string(),
            })
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.contains_key(topic)
    }

    /// Register a pending service call and build its envelope.
    /// Correlation IDs are unique for the life of the client, so
    /// concurrent calls can never cross-talk.
    pub fn register_call(
        &mut self,
        service: String,
        service_type: String,
        args: Value,
        reply: oneshot::Sender<Result<Value>>,
    ) -> OutboundEnvelope {
        let id = new_correlation_id();
        self.pending.insert(id.clone(), PendingCall { reply });
        OutboundEnvelope::CallService {
            id,
            service,
            service_type,
            args,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Abandon all in-flight service calls without resolving them.
    /// Dropping the reply senders wakes the callers with a closed-channel
    /// error, so none of them can block past a disconnect.
    pub fn clear_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!("Abandoning {} pending service call(s)", self.pending.len());
        }
        self.pending.clear();
    }

    /// Route one decoded inbound envelope.
    pub fn dispatch(&mut self, envelope: InboundEnvelope) {
        match envelope {
            InboundEnvelope::Publish { topic, msg } => match self.subscriptions.get(&topic) {
                Some(sub) => (sub.callback)(msg),
                None => debug!("Dropping publish for unsubscribed topic '{}'", topic),
            },
            InboundEnvelope::ServiceResponse {
                id,
                values,
                result,
                error,
            } => match self.pending.remove(&id) {
                Some(call) => {
                    let outcome = if result == Some(false) {
                        Err(eyre::eyre!(
                            "service call failed: {}",
                            error.unwrap_or_else(|| "no error detail".to_string())
                        ))
                    } else {
                        Ok(values.unwrap_or(Value::Null))
                    };
                    // Receiver may have given up waiting; that is fine.
                    let _ = call.reply.send(outcome);
                }
                None => warn!("service_response with unknown correlation id '{}'", id),
            },
            InboundEnvelope::Status { level, msg } => {
                debug!(
                    "Bus status [{}]: {}",
                    level.unwrap_or_else(|| "none".to_string()),
                    msg.unwrap_or_default()
                );
            }
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc;

    fn call_id(envelope: &OutboundEnvelope) -> String {
        match envelope {
            OutboundEnvelope::CallService { id, .. } => id.clone(),
            other => panic!("expected call_service envelope, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_is_noop_while_connecting_or_connected() {
        let mut session = Session::new();
        assert!(session.begin_connect());
        assert!(!session.begin_connect());

        session.mark_frame_received();
        assert_eq!(*session.state(), ConnectionState::Connected);
        assert!(!session.begin_connect());
    }

    #[test]
    fn test_connected_only_on_first_frame() {
        let mut session = Session::new();
        session.begin_connect();
        assert_eq!(*session.state(), ConnectionState::Connecting);

        assert!(session.mark_frame_received());
        assert_eq!(*session.state(), ConnectionState::Connected);

        // Later frames are not transitions
        assert!(!session.mark_frame_received());
    }

    #[test]
    fn test_reconnect_allowed_from_error() {
        let mut session = Session::new();
        session.begin_connect();
        session.mark_error("connection reset".to_string());
        assert!(matches!(session.state(), ConnectionState::Error(_)));

        // The reconnect timer path calls begin_connect again
        assert!(session.begin_connect());
        assert_eq!(*session.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_subscribe_replaces_prior_callback() {
        let mut session = Session::new();
        let (tx1, rx1) = mpsc::channel();
        let (tx2, rx2) = mpsc::channel();

        session.subscribe(
            "obstacle_warning".to_string(),
            "std_msgs/Bool".to_string(),
            Box::new(move |msg| tx1.send(msg).unwrap()),
        );
        session.subscribe(
            "obstacle_warning".to_string(),
            "std_msgs/Bool".to_string(),
            Box::new(move |msg| tx2.send(msg).unwrap()),
        );

        session.dispatch(InboundEnvelope::Publish {
            topic: "obstacle_warning".to_string(),
            msg: json!({"data": true}),
        });

        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap()["data"], true);
    }

    #[test]
    fn test_unsubscribe_then_publish_is_dropped() {
        let mut session = Session::new();
        let (tx, rx) = mpsc::channel();
        session.subscribe(
            "scan".to_string(),
            "sensor_msgs/LaserScan".to_string(),
            Box::new(move |msg| tx.send(msg).unwrap()),
        );

        assert!(session.unsubscribe("scan").is_some());
        assert!(session.unsubscribe("scan").is_none());

        session.dispatch(InboundEnvelope::Publish {
            topic: "scan".to_string(),
            msg: json!({}),
        });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_out_of_order_correlation() {
        let mut session = Session::new();
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();

        let id_a = call_id(&session.register_call(
            "list_available_actions".to_string(),
            "std_srvs/Trigger".to_string(),
            json!({}),
            tx_a,
        ));
        let id_b = call_id(&session.register_call(
            "slam_toolbox/clear_queue".to_string(),
            "std_srvs/Empty".to_string(),
            json!({}),
            tx_b,
        ));
        assert_ne!(id_a, id_b);
        assert_eq!(session.pending_count(), 2);

        // Responses arrive in reverse order
        session.dispatch(InboundEnvelope::ServiceResponse {
            id: id_b,
            values: Some(json!({"which": "b"})),
            result: Some(true),
            error: None,
        });
        session.dispatch(InboundEnvelope::ServiceResponse {
            id: id_a,
            values: Some(json!({"which": "a"})),
            result: Some(true),
            error: None,
        });

        assert_eq!(
            rx_a.blocking_recv().unwrap().unwrap()["which"],
            "a"
        );
        assert_eq!(
            rx_b.blocking_recv().unwrap().unwrap()["which"],
            "b"
        );
        assert_eq!(session.pending_count(), 0);
    }

    #[test]
    fn test_explicit_service_failure_resolves_with_error() {
        let mut session = Session::new();
        let (tx, rx) = oneshot::channel();
        let id = call_id(&session.register_call(
            "broken".to_string(),
            "std_srvs/Trigger".to_string(),
            json!({}),
            tx,
        ));

        session.dispatch(InboundEnvelope::ServiceResponse {
            id,
            values: None,
            result: Some(false),
            error: Some("no such service".to_string()),
        });

        let outcome = rx.blocking_recv().unwrap();
        assert!(outcome.is_err());
        assert!(outcome.unwrap_err().to_string().contains("no such service"));
    }

    #[test]
    fn test_clear_pending_wakes_callers_without_resolving() {
        let mut session = Session::new();
        let (tx, rx) = oneshot::channel();
        session.register_call(
            "stuck".to_string(),
            "std_srvs/Trigger".to_string(),
            json!({}),
            tx,
        );

        session.clear_pending();
        // Sender dropped: the caller observes a closed channel, not a value
        assert!(rx.blocking_recv().is_err());
    }
}
