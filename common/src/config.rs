use serde::{Deserialize, Serialize};

use crate::{history::RetentionPolicy, settings::Settings};

pub const DEFAULT_HISTORY_CAPACITY: usize = 288;
pub const MAX_HISTORY_CAPACITY: usize = 4_096;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    pub history_capacity: usize,
    #[serde(default)]
    pub retention: RetentionPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            retention: RetentionPolicy::Overwrite,
        }
    }
}

impl MonitorConfig {
    pub fn sanitize(&mut self) {
        self.history_capacity = self.history_capacity.clamp(1, MAX_HISTORY_CAPACITY);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WifiSecurity {
    #[default]
    #[serde(rename = "WPA2-Personal")]
    Wpa2Personal,
    #[serde(rename = "WPA2-Enterprise")]
    Wpa2Enterprise,
}

impl WifiSecurity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wpa2Personal => "WPA2-Personal",
            Self::Wpa2Enterprise => "WPA2-Enterprise",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    pub ssid: String,
    pub password: String,
    #[serde(default)]
    pub security: WifiSecurity,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub passcode: String,
}

impl NetworkConfig {
    pub fn has_station_credentials(&self) -> bool {
        let ssid = self.ssid.trim();
        !ssid.is_empty() && ssid != "CHANGE_ME"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub defaults: Settings,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub network: NetworkConfig,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            defaults: Settings::default(),
            timezone: default_timezone(),
            network: NetworkConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.monitor.sanitize();
        self.defaults.sanitize();
        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            self.timezone = "UTC".to_string();
        }
    }
}
