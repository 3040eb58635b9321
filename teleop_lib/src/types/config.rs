use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeleopConfig {
    pub bus: BusConfig,
    pub control: ControlConfig,
}

/// Connection settings for the robot's message bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    /// Separate endpoint for bulk telemetry (video) transport.
    pub video_host: String,
    pub video_port: u16,
    pub reconnect_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
}

/// Control-loop tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    pub tick_rate_hz: u32,
    pub movement_throttle_ms: u64,
    pub arm_throttle_ms: u64,
    pub deadzone: f64,
    pub smoothing_factor: f64,
    pub speed_step: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.10".to_string(),
            port: 9090,
            video_host: "192.168.1.10".to_string(),
            video_port: 8080,
            reconnect_interval_ms: 5000,
            heartbeat_interval_ms: 30000,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,        // Control loop rate
            movement_throttle_ms: 50, // 20Hz max for velocity commands
            arm_throttle_ms: 100,     // 10Hz max for joint commands
            deadzone: 0.15,
            smoothing_factor: 0.15,
            speed_step: 10,
        }
    }
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

impl BusConfig {
    /// Websocket URL of the message bus.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl TeleopConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: TeleopConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.control.deadzone) {
            return Err(eyre::eyre!(
                "deadzone {} outside [0, 1)",
                self.control.deadzone
            ));
        }

        if !(0.0..=1.0).contains(&self.control.smoothing_factor)
            || self.control.smoothing_factor == 0.0
        {
            return Err(eyre::eyre!(
                "smoothing_factor {} outside (0, 1]",
                self.control.smoothing_factor
            ));
        }

        if self.control.tick_rate_hz == 0 {
            return Err(eyre::eyre!("tick_rate_hz must be positive"));
        }

        if self.control.speed_step == 0 || self.control.speed_step > 100 {
            return Err(eyre::eyre!(
                "speed_step {} outside 1..=100",
                self.control.speed_step
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TeleopConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bus.ws_url(), "ws://192.168.1.10:9090");
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = TeleopConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: TeleopConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.bus.port, 9090);
        assert_eq!(parsed.control.movement_throttle_ms, 50);
    }

    #[test]
    fn test_validate_rejects_bad_deadzone() {
        let mut config = TeleopConfig::default();
        config.control.deadzone = 1.0;
        assert!(config.validate().is_err());
    }
}
