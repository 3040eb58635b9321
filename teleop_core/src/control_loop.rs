//! The fixed-rate control loop task.
//!
//! One task owns the actuation controller; button actions, the obstacle
//! flag and input reads are all folded into the tick so there is no
//! second write path into actuation state. Bus sends are fire-and-forget
//! from the tick's perspective; a tick never blocks on I/O.

use crate::actuation::{ActuationController, ControlEffect};
use crate::arbitrator::InputArbitrator;
use crate::input::{GamepadSource, GestureSource};
use bus_client::BusClient;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use teleop_lib::{
    ActuationCommand, ButtonAction, CLEAR_QUEUE_SERVICE, CMD_VEL_TOPIC, SAFETY_OVERRIDE_TOPIC,
    SERVO_CONTROLLER_TOPIC,
};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

/// The two input sources, shared between the platform layers that feed
/// them and the control loop that reads them.
pub struct InputHub {
    pub gesture: GestureSource,
    pub gamepad: GamepadSource,
}

impl InputHub {
    pub fn new(deadzone: f64) -> Self {
        Self {
            gesture: GestureSource::new(deadzone),
            gamepad: GamepadSource::new(deadzone),
        }
    }
}

pub async fn run(
    bus: BusClient,
    mut controller: ActuationController,
    hub: Arc<Mutex<InputHub>>,
    obstacle_warning: Arc<AtomicBool>,
    mut actions_rx: mpsc::UnboundedReceiver<ButtonAction>,
    tick_rate_hz: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut arbitrator = InputArbitrator::new();
    let tick_period = Duration::from_micros(1_000_000 / u64::from(tick_rate_hz.max(1)));
    let mut ticker = tokio::time::interval(tick_period);
    // A late tick must not be followed by a burst of catch-up ticks
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!("Control loop running at {} Hz", tick_rate_hz);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Button actions drain on the tick, keeping all
                // actuation-state mutation on this one task
                while let Ok(action) = actions_rx.try_recv() {
                    for effect in controller.apply_action(action) {
                        perform_effect(&bus, effect);
                    }
                }

                controller.set_obstacle_warning(obstacle_warning.load(Ordering::Relaxed));

                let input = {
                    let hub = hub.lock().await;
                    let (input, _source) = arbitrator.select(&hub.gamepad, &hub.gesture);
                    input
                };

                for command in controller.tick(&input, Instant::now()) {
                    publish_command(&bus, command);
                }
            }

            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Control loop stopped");
}

fn perform_effect(bus: &BusClient, effect: ControlEffect) {
    match effect {
        ControlEffect::PublishSafetyOverride(enabled) => {
            bus.publish(SAFETY_OVERRIDE_TOPIC, json!({ "data": enabled }));
        }
        ControlEffect::ClearSlamQueue => {
            // Completion only matters for the log; never block the tick
            let bus = bus.clone();
            tokio::spawn(async move {
                match bus
                    .call_service(CLEAR_QUEUE_SERVICE, "slam_toolbox/srv/ClearQueue", json!({}))
                    .await
                {
                    Ok(_) => debug!("Mapper queue cleared"),
                    Err(e) => warn!("clear_queue service call failed: {}", e),
                }
            });
        }
    }
}

fn publish_command(bus: &BusClient, command: ActuationCommand) {
    match command {
        ActuationCommand::Velocity(cmd) => match serde_json::to_value(cmd) {
            Ok(msg) => {
                debug!("Publishing velocity command: {:?}", cmd);
                bus.publish(CMD_VEL_TOPIC, msg);
            }
            Err(e) => warn!("Failed to serialize velocity command: {}", e),
        },
        ActuationCommand::Joints(cmd) => match serde_json::to_value(&cmd) {
            Ok(msg) => {
                debug!("Publishing joint command: {:?}", cmd);
                bus.publish(SERVO_CONTROLLER_TOPIC, msg);
            }
            Err(e) => warn!("Failed to serialize joint command: {}", e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleop_lib::{BusConfig, ControlConfig};
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_loop_stops_on_shutdown_signal() {
        let bus = BusClient::new(BusConfig::default());
        let controller = ActuationController::new(&ControlConfig::default());
        let hub = Arc::new(Mutex::new(InputHub::new(0.15)));
        let obstacle = Arc::new(AtomicBool::new(false));
        let (_actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run(
            bus,
            controller,
            hub,
            obstacle,
            actions_rx,
            60,
            shutdown_rx,
        ));

        // Let a few ticks pass, then ask the loop to stop
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();

        timeout(Duration::from_secs(5), task)
            .await
            .expect("control loop did not stop")
            .unwrap();
    }
}
