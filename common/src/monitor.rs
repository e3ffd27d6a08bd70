use crate::{
    alert::{evaluate, evaluate_latest, AlertState},
    config::MonitorConfig,
    history::{HistoryError, HistoryStore},
    poll::PollSchedule,
    reading::{format_temperature, Reading, MISSING_VALUE},
    settings::{Settings, SettingsError, SettingsState, SettingsUpdate},
    template::Placeholder,
    types::{data_table, status_info, DataRow, NetworkInfo, StatusInfo},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    pub stored: bool,
    pub alert: AlertState,
    pub previous_alert: AlertState,
}

impl RecordOutcome {
    pub fn alert_changed(&self) -> bool {
        self.alert != self.previous_alert
    }
}

/// History, settings and polling state shared between the sampling loop and
/// the web handlers. Callers hold one lock around the whole value.
#[derive(Debug, Clone)]
pub struct TemperatureMonitor {
    history: HistoryStore,
    settings: SettingsState,
    schedule: PollSchedule,
    alert: AlertState,
}

impl TemperatureMonitor {
    pub fn new(config: &MonitorConfig, settings: Settings) -> Result<Self, HistoryError> {
        Ok(Self {
            history: HistoryStore::new(config.history_capacity, config.retention)?,
            settings: SettingsState::new(settings),
            schedule: PollSchedule::new(),
            alert: AlertState::Unknown,
        })
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn settings(&self) -> Settings {
        self.settings.current()
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.history.latest()
    }

    pub fn alert(&self) -> AlertState {
        self.alert
    }

    pub fn poll_due(&mut self, now_ms: u64) -> bool {
        let interval = self.settings.current().poll_interval;
        self.schedule.due(now_ms, interval)
    }

    pub fn next_poll_in_ms(&self, now_ms: u64) -> u64 {
        self.schedule
            .remaining_ms(now_ms, self.settings.current().poll_interval)
    }

    pub fn record(&mut self, reading: Reading) -> RecordOutcome {
        let alert = evaluate(&reading, &self.settings.current());
        let stored = self.history.append(reading);
        let previous_alert = self.alert;
        if stored {
            self.alert = alert;
        }

        RecordOutcome {
            stored,
            alert: self.alert,
            previous_alert,
        }
    }

    /// Re-evaluates the latest reading so new bounds apply immediately.
    pub fn update_settings(&mut self, update: SettingsUpdate) -> Result<Settings, SettingsError> {
        let settings = self.settings.apply(update)?;
        self.alert = evaluate_latest(&self.history, &settings);
        Ok(settings)
    }

    pub fn data_table(&self) -> Vec<DataRow> {
        data_table(self.history.iter())
    }

    pub fn status(&self, network: &NetworkInfo, uptime_secs: u64) -> [StatusInfo; 1] {
        status_info(&self.settings.current(), network, uptime_secs, self.alert)
    }

    pub fn placeholder(&self, placeholder: Placeholder) -> String {
        let latest = self.history.latest();
        match placeholder {
            Placeholder::TemperatureC => format_temperature(latest.and_then(|r| r.temperature_c)),
            Placeholder::TemperatureF => format_temperature(latest.and_then(|r| r.temperature_f)),
            Placeholder::CurrentTime => latest
                .map(|r| r.timestamp.clone())
                .unwrap_or_else(|| MISSING_VALUE.to_string()),
        }
    }
}
