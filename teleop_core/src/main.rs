use bus_client::{BusClient, ConnectionState};
use eyre::Result;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use teleop_core::control_loop::{self, InputHub};
use teleop_core::{ActionCatalog, ActuationController};
use teleop_lib::{init_tracing, TeleopConfig, OBSTACLE_WARNING_TOPIC};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting teleoperation client core...");

    let config_path =
        std::env::var("TELEOP_CONFIG").unwrap_or_else(|_| "config/teleop.toml".to_string());
    let config = match TeleopConfig::load_from_file(&config_path) {
        Ok(config) => {
            info!("Loaded configuration from {}", config_path);
            config
        }
        Err(e) => {
            warn!("No usable config at {}: {} - using defaults", config_path, e);
            TeleopConfig::default()
        }
    };
    info!("Bus endpoint: {}", config.bus.ws_url());
    info!("Control rate: {} Hz", config.control.tick_rate_hz);

    // One bus client per process, handed to every consumer
    let bus = BusClient::new(config.bus.clone());

    let obstacle_warning = Arc::new(AtomicBool::new(false));
    {
        let obstacle_warning = obstacle_warning.clone();
        bus.subscribe(OBSTACLE_WARNING_TOPIC, "std_msgs/Bool", move |msg| {
            let warning = msg.get("data").and_then(Value::as_bool).unwrap_or(false);
            obstacle_warning.store(warning, Ordering::Relaxed);
        });
    }

    let catalog = Arc::new(ActionCatalog::new());

    // The client does not replay subscriptions across reconnects, so
    // re-issue them (and refresh the catalog) on every handshake
    {
        let bus = bus.clone();
        let catalog = catalog.clone();
        let obstacle_warning = obstacle_warning.clone();
        let mut states = bus.state_changes();
        tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let connected = *states.borrow_and_update() == ConnectionState::Connected;
                if !connected {
                    continue;
                }
                info!("Bus handshake complete; issuing subscriptions");
                let obstacle_warning = obstacle_warning.clone();
                bus.subscribe(OBSTACLE_WARNING_TOPIC, "std_msgs/Bool", move |msg| {
                    let warning = msg.get("data").and_then(Value::as_bool).unwrap_or(false);
                    obstacle_warning.store(warning, Ordering::Relaxed);
                });
                if let Err(e) = catalog.load(&bus).await {
                    warn!("Failed to load action catalog: {}", e);
                }
            }
        });
    }

    bus.connect();

    // Platform layers (touch UI, gamepad driver) feed the hub and the
    // action channel; the control loop drains both
    let hub = Arc::new(Mutex::new(InputHub::new(config.control.deadzone)));
    let (_action_tx, action_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let controller = ActuationController::new(&config.control);
    let loop_task = tokio::spawn(control_loop::run(
        bus.clone(),
        controller,
        hub.clone(),
        obstacle_warning.clone(),
        action_rx,
        config.control.tick_rate_hz,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    let _ = shutdown_tx.send(true);
    let _ = loop_task.await;
    bus.disconnect();

    info!("Teleoperation client stopped");
    Ok(())
}
