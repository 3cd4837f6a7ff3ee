use serde::{Deserialize, Serialize};

use crate::errors::FloatlinkError;

const CONFIG_FILE_NAME: &str = "config.json";

/// Alert and unit preferences, loaded once at startup. Changes arrive as a
/// fresh config value, never through ambient mutable state.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct AlertConfig {
    /// Master switch; off silences every alert category
    pub audio_alerts: bool,
    pub foot_alerts: bool,
    pub speed_alerts: bool,
    pub battery_alerts: bool,
    pub mileage_alerts: bool,
    pub connection_alerts: bool,
    /// Switch the board lights on after connecting
    pub auto_lights: bool,
    pub alerts_volume: f32,
    /// Goofy stance swaps which pad is toe and which is heel
    pub is_goofy: bool,
    pub is_metric: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            audio_alerts: true,
            foot_alerts: true,
            speed_alerts: true,
            battery_alerts: true,
            mileage_alerts: true,
            connection_alerts: true,
            auto_lights: false,
            alerts_volume: 1.0,
            is_goofy: false,
            is_metric: false,
        }
    }
}

impl AlertConfig {
    pub fn from_local_file() -> Option<Self> {
        let config_path = dirs::config_dir()?.join("floatlink").join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let file = std::fs::File::open(config_path).ok()?;
            serde_json::from_reader(file).ok()
        } else {
            None
        }
    }

    pub fn save(&self) -> Result<(), FloatlinkError> {
        let config_path = dirs::config_dir()
            .ok_or(FloatlinkError::NoConfigDir)?
            .join("floatlink")
            .join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            std::fs::create_dir_all(config_path.parent().unwrap())
                .map_err(|e| FloatlinkError::ConfigIOError { source: e })?;
        }

        let file = std::fs::File::create(config_path)
            .map_err(|e| FloatlinkError::ConfigIOError { source: e })?;
        serde_json::to_writer(file, self)
            .map_err(|e| FloatlinkError::ConfigSerializeError { source: e })
    }
}
