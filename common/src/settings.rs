use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MIN_THRESHOLD_C: f32 = 22.0;
pub const DEFAULT_MAX_THRESHOLD_C: f32 = 25.0;

pub const PARAM_MIN_TEMPERATURE: &str = "minTemperature";
pub const PARAM_MAX_TEMPERATURE: &str = "maxTemperature";
pub const PARAM_TIMER_DELAY: &str = "timerDelay";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("timer delay must be one of 30, 45, 60, 90 or 120 minutes (got {0})")]
    InvalidPollInterval(u16),
    #[error("minimum temperature {min} is above maximum temperature {max}")]
    InvertedThresholds { min: f32, max: f32 },
    #[error("temperature thresholds must be finite numbers")]
    NonFinite,
    #[error("missing '{0}' parameter")]
    MissingField(&'static str),
    #[error("invalid value '{value}' for '{field}'")]
    Malformed { field: &'static str, value: String },
}

/// Allowed sampling periods, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum PollInterval {
    #[default]
    Min30,
    Min45,
    Min60,
    Min90,
    Min120,
}

impl PollInterval {
    pub const ALL: [PollInterval; 5] = [
        Self::Min30,
        Self::Min45,
        Self::Min60,
        Self::Min90,
        Self::Min120,
    ];

    pub fn minutes(self) -> u16 {
        match self {
            Self::Min30 => 30,
            Self::Min45 => 45,
            Self::Min60 => 60,
            Self::Min90 => 90,
            Self::Min120 => 120,
        }
    }

    pub fn as_millis(self) -> u64 {
        u64::from(self.minutes()) * 60_000
    }
}

impl TryFrom<u16> for PollInterval {
    type Error = SettingsError;

    fn try_from(minutes: u16) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|interval| interval.minutes() == minutes)
            .ok_or(SettingsError::InvalidPollInterval(minutes))
    }
}

impl From<PollInterval> for u16 {
    fn from(interval: PollInterval) -> Self {
        interval.minutes()
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.minutes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub min_threshold_c: f32,
    pub max_threshold_c: f32,
    pub poll_interval: PollInterval,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_threshold_c: DEFAULT_MIN_THRESHOLD_C,
            max_threshold_c: DEFAULT_MAX_THRESHOLD_C,
            poll_interval: PollInterval::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.min_threshold_c.is_finite() || !self.max_threshold_c.is_finite() {
            return Err(SettingsError::NonFinite);
        }
        if self.min_threshold_c > self.max_threshold_c {
            return Err(SettingsError::InvertedThresholds {
                min: self.min_threshold_c,
                max: self.max_threshold_c,
            });
        }
        Ok(())
    }

    /// Falls back to defaults when the stored thresholds are unusable.
    pub fn sanitize(&mut self) {
        if self.validate().is_err() {
            let poll_interval = self.poll_interval;
            *self = Self {
                poll_interval,
                ..Self::default()
            };
        }
    }
}

/// A parsed `/updateSettings` request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettingsUpdate {
    pub min_threshold_c: f32,
    pub max_threshold_c: f32,
    pub poll_minutes: u16,
}

impl SettingsUpdate {
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, SettingsError> {
        Ok(Self {
            min_threshold_c: parse_param(params, PARAM_MIN_TEMPERATURE)?,
            max_threshold_c: parse_param(params, PARAM_MAX_TEMPERATURE)?,
            poll_minutes: parse_param(params, PARAM_TIMER_DELAY)?,
        })
    }
}

fn parse_param<T: std::str::FromStr>(
    params: &HashMap<String, String>,
    field: &'static str,
) -> Result<T, SettingsError> {
    let raw = params
        .get(field)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or(SettingsError::MissingField(field))?;
    raw.parse::<T>().map_err(|_| SettingsError::Malformed {
        field,
        value: raw.to_string(),
    })
}

/// The live threshold/interval triple.
///
/// Updates are validated in full before anything is written, so a rejected
/// update leaves the previous triple in place.
#[derive(Debug, Clone, Default)]
pub struct SettingsState {
    current: Settings,
}

impl SettingsState {
    pub fn new(mut initial: Settings) -> Self {
        initial.sanitize();
        Self { current: initial }
    }

    pub fn current(&self) -> Settings {
        self.current
    }

    pub fn update(
        &mut self,
        min_threshold_c: f32,
        max_threshold_c: f32,
        poll_minutes: u16,
    ) -> Result<(), SettingsError> {
        let candidate = Settings {
            min_threshold_c,
            max_threshold_c,
            poll_interval: PollInterval::try_from(poll_minutes)?,
        };
        candidate.validate()?;
        self.current = candidate;
        Ok(())
    }

    pub fn apply(&mut self, update: SettingsUpdate) -> Result<Settings, SettingsError> {
        self.update(
            update.min_threshold_c,
            update.max_threshold_c,
            update.poll_minutes,
        )?;
        Ok(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn update_replaces_whole_triple() {
        let mut state = SettingsState::default();
        state.update(20.0, 25.0, 60).unwrap();

        assert_eq!(
            state.current(),
            Settings {
                min_threshold_c: 20.0,
                max_threshold_c: 25.0,
                poll_interval: PollInterval::Min60,
            }
        );
    }

    #[test]
    fn inverted_thresholds_are_rejected_without_side_effects() {
        let mut state = SettingsState::default();
        state.update(20.0, 25.0, 60).unwrap();
        let before = state.current();

        let err = state.update(30.0, 10.0, 60).unwrap_err();

        assert_eq!(
            err,
            SettingsError::InvertedThresholds {
                min: 30.0,
                max: 10.0
            }
        );
        assert_eq!(state.current(), before);
    }

    #[test]
    fn equal_thresholds_are_allowed() {
        let mut state = SettingsState::default();
        assert!(state.update(22.5, 22.5, 30).is_ok());
    }

    #[test]
    fn unknown_interval_is_rejected() {
        let mut state = SettingsState::default();
        let before = state.current();

        assert_eq!(
            state.update(20.0, 25.0, 50),
            Err(SettingsError::InvalidPollInterval(50))
        );
        assert_eq!(state.current(), before);
    }

    #[test]
    fn non_finite_threshold_is_rejected() {
        let mut state = SettingsState::default();
        assert_eq!(
            state.update(f32::NAN, 25.0, 30),
            Err(SettingsError::NonFinite)
        );
    }

    #[test]
    fn every_listed_interval_round_trips_through_minutes() {
        for interval in PollInterval::ALL {
            assert_eq!(PollInterval::try_from(interval.minutes()), Ok(interval));
        }
        assert_eq!(PollInterval::Min90.as_millis(), 5_400_000);
    }

    #[test]
    fn parses_query_parameters() {
        let update = SettingsUpdate::from_query(&query(&[
            ("minTemperature", "18.5"),
            ("maxTemperature", " 26 "),
            ("timerDelay", "45"),
        ]))
        .unwrap();

        assert_eq!(
            update,
            SettingsUpdate {
                min_threshold_c: 18.5,
                max_threshold_c: 26.0,
                poll_minutes: 45,
            }
        );
    }

    #[test]
    fn reports_missing_and_malformed_parameters() {
        assert_eq!(
            SettingsUpdate::from_query(&query(&[("minTemperature", "18")])),
            Err(SettingsError::MissingField(PARAM_MAX_TEMPERATURE))
        );
        assert_eq!(
            SettingsUpdate::from_query(&query(&[
                ("minTemperature", "cold"),
                ("maxTemperature", "26"),
                ("timerDelay", "30"),
            ])),
            Err(SettingsError::Malformed {
                field: PARAM_MIN_TEMPERATURE,
                value: "cold".to_string(),
            })
        );
    }

    #[test]
    fn sanitize_restores_default_thresholds() {
        let mut settings = Settings {
            min_threshold_c: 30.0,
            max_threshold_c: 10.0,
            poll_interval: PollInterval::Min120,
        };
        settings.sanitize();

        assert_eq!(settings.min_threshold_c, DEFAULT_MIN_THRESHOLD_C);
        assert_eq!(settings.max_threshold_c, DEFAULT_MAX_THRESHOLD_C);
        assert_eq!(settings.poll_interval, PollInterval::Min120);
    }
}
