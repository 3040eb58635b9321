//! Tokio actor owning the websocket transport and all session state.
//!
//! A single task serializes every mutation: inbound frames, handle
//! commands, the heartbeat timer and the reconnect timer all run on the
//! same select loop, so a reconnect can never race a publish and a
//! topic callback can never race a service resolution.

use crate::protocol::{decode_frame, Decoded, OutboundEnvelope};
use crate::session::{ConnectionState, Session, TopicCallback};
use eyre::Result;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use teleop_lib::BusConfig;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsError = tokio_tungstenite::tungstenite::Error;

enum Command {
    Connect,
    Disconnect,
    Subscribe {
        topic: String,
        msg_type: String,
        callback: TopicCallback,
    },
    Unsubscribe {
        topic: String,
    },
    Publish {
        topic: String,
        msg: Value,
    },
    CallService {
        service: String,
        service_type: String,
        args: Value,
        reply: oneshot::Sender<Result<Value>>,
    },
}

/// Handle to the bus client actor. Cheap to clone; all clones talk to
/// the same connection. Dropping every handle tears the actor down,
/// which also kills its timers.
#[derive(Clone)]
pub struct BusClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl BusClient {
    /// Construct a client and spawn its actor task. One client per
    /// process is the intended composition; pass clones of the handle
    /// to every consumer instead of sharing a global.
    pub fn new(config: BusConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let actor = Actor {
            url: config.ws_url(),
            reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            session: Session::new(),
            cmd_rx,
            state_tx,
            ws: None,
            reconnect_at: None,
            shutdown: false,
        };
        tokio::spawn(actor.run());

        Self { cmd_tx, state_rx }
    }

    /// Begin connecting. No-op while a connection attempt is in flight
    /// or established.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// Tear the connection down. Idempotent; cancels the heartbeat and
    /// reconnect timers and abandons pending service calls.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// Register a topic handler and send the subscribe envelope. A
    /// second subscribe on the same topic replaces the handler.
    pub fn subscribe<F>(&self, topic: &str, msg_type: &str, callback: F)
    where
        F: Fn(Value) + Send + 'static,
    {
        self.send(Command::Subscribe {
            topic: topic.to_string(),
            msg_type: msg_type.to_string(),
            callback: Box::new(callback),
        });
    }

    pub fn unsubscribe(&self, topic: &str) {
        self.send(Command::Unsubscribe {
            topic: topic.to_string(),
        });
    }

    /// Fire-and-forget publish; no acknowledgement is expected.
    pub fn publish(&self, topic: &str, msg: Value) {
        self.send(Command::Publish {
            topic: topic.to_string(),
            msg,
        });
    }

    /// Call a bus service and await its response, matched by
    /// correlation ID. No timeout is enforced here; callers must bound
    /// their own wait. Resolves with an error when the response carries
    /// an explicit failure, or when the call is abandoned by a
    /// disconnect.
    pub async fn call_service(
        &self,
        service: &str,
        service_type: &str,
        args: Value,
    ) -> Result<Value> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::CallService {
                service: service.to_string(),
                service_type: service_type.to_string(),
                args,
                reply,
            })
            .map_err(|_| eyre::eyre!("bus client actor is gone"))?;

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(eyre::eyre!(
                "service call to '{}' abandoned before a response arrived",
                service
            )),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Watch channel for connection-state changes. Consumers use this
    /// to re-issue their subscriptions after a reconnect.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    fn send(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).is_err() {
            debug!("Bus client actor is gone; command dropped");
        }
    }
}

struct Actor {
    url: String,
    reconnect_interval: Duration,
    heartbeat_interval: Duration,
    session: Session,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    ws: Option<WsStream>,
    /// Armed single-shot reconnect deadline, None while idle.
    reconnect_at: Option<Instant>,
    /// Set by an explicit disconnect; suppresses reconnection.
    shutdown: bool,
}

impl Actor {
    async fn run(mut self) {
        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let transport_open = self.ws.is_some();
            let reconnect_armed = self.reconnect_at.is_some();
            let reconnect_deadline = self.reconnect_at.unwrap_or_else(Instant::now);

            tokio::select! {
                maybe_cmd = self.cmd_rx.recv() => match maybe_cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        // Every handle dropped: tear down, taking the
                        // timers with the task.
                        self.do_disconnect().await;
                        break;
                    }
                },

                maybe_frame = next_frame(&mut self.ws), if transport_open => {
                    self.handle_frame(maybe_frame).await;
                }

                _ = heartbeat.tick(), if transport_open => {
                    self.send_heartbeat().await;
                }

                _ = tokio::time::sleep_until(reconnect_deadline), if reconnect_armed => {
                    debug!("Reconnect timer fired");
                    self.try_connect().await;
                }
            }
        }

        debug!("Bus client actor finished");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect => {
                self.shutdown = false;
                self.try_connect().await;
            }
            Command::Disconnect => self.do_disconnect().await,
            Command::Subscribe {
                topic,
                msg_type,
                callback,
            } => {
                let envelope = self.session.subscribe(topic, msg_type, callback);
                self.send_envelope(envelope).await;
            }
            Command::Unsubscribe { topic } => match self.session.unsubscribe(&topic) {
                Some(envelope) => self.send_envelope(envelope).await,
                None => debug!("unsubscribe('{}') ignored: not subscribed", topic),
            },
            Command::Publish { topic, msg } => {
                self.send_envelope(OutboundEnvelope::Publish { topic, msg })
                    .await;
            }
            Command::CallService {
                service,
                service_type,
                args,
                reply,
            } => {
                let envelope = self
                    .session
                    .register_call(service, service_type, args, reply);
                self.send_envelope(envelope).await;
            }
        }
    }

    async fn try_connect(&mut self) {
        self.reconnect_at = None;
        if !self.session.begin_connect() {
            debug!("connect() ignored: attempt already in flight or established");
            return;
        }
        self.push_state();

        info!("Connecting to bus at {}", self.url);
        match connect_async(self.url.as_str()).await {
            Ok((stream, _)) => {
                // Transport is open but the handshake completes only on
                // the first valid inbound frame.
                self.ws = Some(stream);
                debug!("Transport open, awaiting first frame");
            }
            Err(e) => self.on_transport_error(&e.to_string()),
        }
    }

    async fn do_disconnect(&mut self) {
        self.shutdown = true;
        self.reconnect_at = None;
        if let Some(mut ws) = self.ws.take() {
            let _ = ws.close(None).await;
        }
        self.session.clear_pending();
        self.session.mark_disconnected();
        self.push_state();
        info!("Disconnected from bus");
    }

    async fn handle_frame(&mut self, maybe_frame: Option<Result<Message, WsError>>) {
        match maybe_frame {
            Some(Ok(Message::Text(text))) => {
                let decoded = decode_frame(&text);
                if !matches!(decoded, Decoded::Malformed(_)) && self.session.mark_frame_received()
                {
                    info!("Bus connection established");
                    self.push_state();
                }
                match decoded {
                    Decoded::Envelope(envelope) => self.session.dispatch(envelope),
                    Decoded::UnknownOp(op) => warn!("Dropping frame with unknown op '{}'", op),
                    Decoded::Malformed(reason) => warn!("Dropping malformed frame: {}", reason),
                }
            }
            Some(Ok(Message::Pong(_))) => debug!("Heartbeat acknowledged"),
            // Inbound pings are answered by the websocket layer itself
            Some(Ok(Message::Ping(_))) => {}
            Some(Ok(Message::Close(_))) => self.on_transport_error("closed by remote"),
            // Binary frames are not part of this protocol
            Some(Ok(other)) => debug!("Ignoring non-text frame: {:?}", other),
            Some(Err(e)) => self.on_transport_error(&e.to_string()),
            None => self.on_transport_error("connection closed"),
        }
    }

    async fn send_heartbeat(&mut self) {
        if let Some(ws) = self.ws.as_mut() {
            if let Err(e) = ws.send(Message::Ping(Vec::new())).await {
                self.on_transport_error(&format!("heartbeat failed: {}", e));
            }
        }
    }

    async fn send_envelope(&mut self, envelope: OutboundEnvelope) {
        let text = match envelope.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode envelope: {}", e);
                return;
            }
        };

        match self.ws.as_mut() {
            Some(ws) => {
                if let Err(e) = ws.send(Message::Text(text)).await {
                    self.on_transport_error(&e.to_string());
                }
            }
            // No local queue or replay: sends while the transport is
            // down are dropped, not buffered.
            None => debug!("Transport not open; dropping outbound envelope"),
        }
    }

    fn on_transport_error(&mut self, reason: &str) {
        self.ws = None;
        self.session.mark_error(reason.to_string());
        self.session.clear_pending();
        self.push_state();

        if self.shutdown {
            debug!("Not reconnecting: client was explicitly disconnected");
        } else {
            info!(
                "Scheduling reconnect in {} ms",
                self.reconnect_interval.as_millis()
            );
            self.reconnect_at = Some(Instant::now() + self.reconnect_interval);
        }
    }

    fn push_state(&self) {
        let state = self.session.state().clone();
        self.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
    }
}

async fn next_frame(ws: &mut Option<WsStream>) -> Option<Result<Message, WsError>> {
    match ws {
        Some(stream) => stream.next().await,
        // Guarded out by the select arm; never resolve just in case
        None => std::future::pending().await,
    }
}
