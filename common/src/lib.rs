pub mod alert;
pub mod clock;
pub mod config;
pub mod history;
pub mod link;
pub mod monitor;
pub mod poll;
pub mod provisioning;
pub mod reading;
pub mod settings;
pub mod template;
pub mod types;

pub use alert::{evaluate, evaluate_latest, AlertState};
pub use clock::Uptime;
pub use config::{MonitorConfig, NetworkConfig, RuntimeConfig, WifiSecurity};
pub use history::{HistoryError, HistoryStore, RetentionPolicy};
pub use link::{LinkAction, LinkWatch};
pub use monitor::{RecordOutcome, TemperatureMonitor};
pub use poll::PollSchedule;
pub use provisioning::{ProvisioningError, ProvisioningRequest};
pub use reading::{Reading, SensorFault, SensorReader, TemperatureDriver};
pub use settings::{PollInterval, Settings, SettingsError, SettingsState, SettingsUpdate};
pub use template::{render_template, Placeholder};
pub use types::{DataRow, NetworkInfo, StatusInfo};
