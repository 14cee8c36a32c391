//! Bridge configuration.
//!
//! Loaded once at startup from TOML. Lookup order:
//! 1. `$POLYNODE_CONFIG`
//! 2. `~/.config/polynode/polynode.toml`
//!
//! A missing file is not an error; every section falls back to the rover's deployment
//! defaults.

use crate::command::{DriveMode, TranslatorSettings};
use crate::controller::ControllerSettings;
use crate::mqtt::MqttConfig;
use crate::serial::SerialConfig;
use crate::telemetry::TelemetryConfig;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const CONFIG_ENV: &str = "POLYNODE_CONFIG";
const CONFIG_DIR: &str = "polynode";
const CONFIG_FILE: &str = "polynode.toml";

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(default)]
pub struct BridgeConfig {
    pub serial: SerialConfig,
    pub broker: MqttConfig,
    pub commands: CommandConfig,
    pub gamepad: ControllerSettings,
    pub telemetry: TelemetryConfig,
    pub runtime: RuntimeConfig,
}

/// Throttling and rendering of outbound commands
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct CommandConfig {
    /// Minimum spacing between non-important commands
    pub update_interval_ms: u64,
    /// Mode sent once the serial link is up
    pub initial_mode: DriveMode,
    pub move_step: i32,
    pub max_output: i32,
    pub min_output: i32,
    pub axis_max: i32,
}

impl Default for CommandConfig {
    fn default() -> Self {
        let translator = TranslatorSettings::default();
        Self {
            update_interval_ms: 100,
            initial_mode: DriveMode::Follow,
            move_step: translator.move_step,
            max_output: translator.max_output,
            min_output: translator.min_output,
            axis_max: translator.axis_max,
        }
    }
}

impl CommandConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn translator_settings(&self) -> TranslatorSettings {
        TranslatorSettings {
            move_step: self.move_step,
            max_output: self.max_output,
            min_output: self.min_output,
            axis_max: self.axis_max,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How long shutdown waits for each loop before abandoning it
    pub shutdown_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 2000,
        }
    }
}

impl BridgeConfig {
    pub async fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => default_path()?,
        };
        Self::load_from(&path).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check config file {}: {}", path.display(), e))?;

        let config = if exists {
            info!("Loading configuration from {}", path.display());
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
            Self::from_toml(&content)?
        } else {
            warn!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| eyre!("Failed to parse config: {}", e))
    }

    pub fn validate(&self) -> Result<()> {
        let commands = &self.commands;
        if commands.move_step == 0 {
            return Err(eyre!("commands.move_step must not be 0"));
        }
        if commands.min_output >= commands.max_output {
            return Err(eyre!(
                "commands.min_output ({}) must be below commands.max_output ({})",
                commands.min_output,
                commands.max_output
            ));
        }
        if commands.axis_max <= 0 {
            return Err(eyre!("commands.axis_max must be positive"));
        }
        if self.broker.command_topic.is_empty() || self.broker.telemetry_topic.is_empty() {
            return Err(eyre!("broker topics must not be empty"));
        }
        Ok(())
    }
}

fn default_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| eyre!("No config directory available"))?;
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment() {
        let config = BridgeConfig::default();
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.broker.client_id, "polyver1");
        assert_eq!(config.broker.command_topic, "Dr. Polyver/command");
        assert_eq!(config.broker.telemetry_topic, "telemetry");
        assert!(!config.broker.clean_session);
        assert_eq!(config.commands.update_interval(), Duration::from_millis(100));
        assert_eq!(config.commands.initial_mode, DriveMode::Follow);
        assert_eq!(
            config.commands.translator_settings(),
            TranslatorSettings::default()
        );
        assert_eq!(config.gamepad.deadzone, 500);
        assert_eq!(config.gamepad.repeat_interval_ms, 100);
        assert_eq!(config.telemetry.rover_name, "Dr. Polyver");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml() {
        let config = BridgeConfig::from_toml(
            r#"
[serial]
port = "/dev/ttyACM0"

[broker]
endpoint = "localhost"
port = 1883
tls = false

[commands]
update_interval_ms = 250
initial_mode = "manual"
move_step = 10

[gamepad]
enabled = false
"#,
        )
        .unwrap();

        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud, 9600);
        assert_eq!(config.broker.endpoint, "localhost");
        assert!(!config.broker.tls);
        assert_eq!(config.broker.client_id, "polyver1");
        assert_eq!(config.commands.update_interval_ms, 250);
        assert_eq!(config.commands.initial_mode, DriveMode::Manual);
        assert_eq!(config.commands.translator_settings().move_step, 10);
        assert_eq!(config.commands.max_output, 250);
        assert!(!config.gamepad.enabled);
        assert_eq!(config.runtime.shutdown_timeout_ms, 2000);
    }

    #[test]
    fn rejects_bad_command_ranges() {
        let mut config = BridgeConfig::default();
        config.commands.move_step = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.commands.min_output = 250;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.commands.axis_max = 0;
        assert!(config.validate().is_err());

        assert!(BridgeConfig::from_toml("[commands]\ninitial_mode = \"turbo\"").is_err());
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let config = BridgeConfig::load_from(Path::new("/nonexistent/polynode/polynode.toml"))
            .await
            .unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
    }
}
