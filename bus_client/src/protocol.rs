//! JSON envelope wire protocol for the message bus.
//!
//! Every frame is a JSON object whose `op` field selects the operation.
//! Payloads (`msg`, `args`, `values`) are heterogeneous per topic, so
//! they stay as raw `serde_json::Value` at this layer; interpretation
//! is each subscriber's responsibility.

use eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames the client sends to the bus.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OutboundEnvelope {
    Subscribe {
        id: String,
        topic: String,
        #[serde(rename = "type")]
        msg_type: String,
    },
    Unsubscribe {
        id: String,
        topic: String,
    },
    Publish {
        topic: String,
        msg: Value,
    },
    CallService {
        id: String,
        service: String,
        #[serde(rename = "type")]
        service_type: String,
        args: Value,
    },
}

impl OutboundEnvelope {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Frames the bus sends to the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InboundEnvelope {
    Publish {
        topic: String,
        msg: Value,
    },
    ServiceResponse {
        id: String,
        #[serde(default)]
        values: Option<Value>,
        #[serde(default)]
        result: Option<bool>,
        #[serde(default)]
        error: Option<String>,
    },
    Status {
        #[serde(default)]
        level: Option<String>,
        #[serde(default)]
        msg: Option<String>,
    },
}

/// Outcome of decoding one inbound frame.
///
/// Unknown ops and malformed frames are protocol errors: logged and
/// dropped by the caller, never fatal to the connection.
#[derive(Debug)]
pub enum Decoded {
    Envelope(InboundEnvelope),
    UnknownOp(String),
    Malformed(String),
}

pub fn decode_frame(text: &str) -> Decoded {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return Decoded::Malformed(e.to_string()),
    };

    let op = match value.get("op").and_then(Value::as_str) {
        Some(op) => op.to_string(),
        None => return Decoded::Malformed("frame has no 'op' field".to_string()),
    };

    match op.as_str() {
        "publish" | "service_response" | "status" => {
            match serde_json::from_value::<InboundEnvelope>(value) {
                Ok(env) => Decoded::Envelope(env),
                Err(e) => Decoded::Malformed(format!("bad '{}' frame: {}", op, e)),
            }
        }
        _ => Decoded::UnknownOp(op),
    }
}
