//! # Bus Client
//!
//! Persistent bidirectional client for the robot's pub/sub message bus.
//! Implements subscribe/unsubscribe/publish/service-call semantics over
//! a JSON envelope protocol, with heartbeats and automatic reconnection.

pub mod client;
pub mod protocol;
pub mod session;

pub use client::BusClient;
pub use protocol::{InboundEnvelope, OutboundEnvelope};
pub use session::{ConnectionState, Session, TopicCallback};
