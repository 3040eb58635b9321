//! One-shot load of the robot's categorized discrete-action list.
//!
//! The `list_available_actions` service responds with a Trigger-style
//! payload whose `message` field is itself a JSON document (double
//! encoded): an object mapping category names to arrays of action
//! names. Each failure mode produces its own error message so the
//! operator sees more than a generic "load failed".

use bus_client::BusClient;
use eyre::Result;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use teleop_lib::{EXECUTE_ACTION_TOPIC, LIST_ACTIONS_SERVICE};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCategory {
    pub name: String,
    pub actions: Vec<String>,
}

pub struct ActionCatalog {
    categories: Mutex<Vec<ActionCategory>>,
    in_flight: AtomicBool,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self {
            categories: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Fetch the action list. A call while a prior load is still in
    /// flight is a no-op, so a double-tapped refresh cannot fan out
    /// into duplicate service calls.
    pub async fn load(&self, bus: &BusClient) -> Result<()> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("Action catalog load already in flight");
            return Ok(());
        }

        let outcome = bus
            .call_service(LIST_ACTIONS_SERVICE, "std_srvs/Trigger", json!({}))
            .await
            .and_then(|values| parse_action_list(&values));
        self.in_flight.store(false, Ordering::SeqCst);

        let categories = outcome?;
        info!("Loaded {} action categories", categories.len());
        if let Ok(mut held) = self.categories.lock() {
            *held = categories;
        }
        Ok(())
    }

    pub fn categories(&self) -> Vec<ActionCategory> {
        self.categories
            .lock()
            .map(|held| held.clone())
            .unwrap_or_default()
    }

    /// Fire-and-forget execution of a named action; no correlation or
    /// acknowledgement, same as a velocity command.
    pub fn execute(&self, bus: &BusClient, action: &str) {
        info!("Executing action '{}'", action);
        bus.publish(EXECUTE_ACTION_TOPIC, json!({ "data": action }));
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode the double-encoded service payload into sorted categories.
fn parse_action_list(values: &Value) -> Result<Vec<ActionCategory>> {
    let success = match values.get("success") {
        Some(flag) => flag.as_bool().unwrap_or(false),
        None => eyre::bail!("action list response has no 'success' field"),
    };
    if !success {
        let detail = values
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no detail given");
        eyre::bail!("robot rejected the action list request: {}", detail);
    }

    let message = match values.get("message") {
        Some(message) => message,
        None => eyre::bail!("action list response has no 'message' field"),
    };
    let text = match message.as_str() {
        Some(text) => text,
        None => eyre::bail!("action list 'message' field is not text"),
    };

    let inner: BTreeMap<String, Vec<String>> = serde_json::from_str(text)
        .map_err(|e| eyre::eyre!("action list payload is not valid JSON: {}", e))?;

    Ok(inner
        .into_iter()
        .map(|(name, actions)| ActionCategory { name, actions })
        .collect())
}
