use serde::{Deserialize, Serialize};

use crate::{history::HistoryStore, reading::Reading, settings::Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertState {
    Normal,
    BelowMin,
    AboveMax,
    #[default]
    Unknown,
}

impl AlertState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::BelowMin => "BELOW_MIN",
            Self::AboveMax => "ABOVE_MAX",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn is_alarm(self) -> bool {
        matches!(self, Self::BelowMin | Self::AboveMax)
    }
}

/// Classifies a reading against the configured bounds. Both bounds are
/// inclusive: a reading exactly at min or max is `Normal`.
pub fn evaluate(current: &Reading, settings: &Settings) -> AlertState {
    let Some(temp_c) = current.temperature_c else {
        return AlertState::Unknown;
    };

    if temp_c < settings.min_threshold_c {
        AlertState::BelowMin
    } else if temp_c > settings.max_threshold_c {
        AlertState::AboveMax
    } else {
        AlertState::Normal
    }
}

pub fn evaluate_latest(history: &HistoryStore, settings: &Settings) -> AlertState {
    history
        .latest()
        .map(|reading| evaluate(reading, settings))
        .unwrap_or(AlertState::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{history::RetentionPolicy, settings::PollInterval};

    fn settings() -> Settings {
        Settings {
            min_threshold_c: 20.0,
            max_threshold_c: 25.0,
            poll_interval: PollInterval::Min30,
        }
    }

    fn at(temp_c: f32) -> Reading {
        Reading::new(Some(temp_c), None, "t".to_string())
    }

    #[test]
    fn classifies_all_branches() {
        let settings = settings();

        assert_eq!(evaluate(&at(19.99), &settings), AlertState::BelowMin);
        assert_eq!(evaluate(&at(25.01), &settings), AlertState::AboveMax);
        assert_eq!(evaluate(&at(22.0), &settings), AlertState::Normal);
        assert_eq!(
            evaluate(&Reading::fault("t".to_string()), &settings),
            AlertState::Unknown
        );
    }

    #[test]
    fn bounds_are_inclusive() {
        let settings = settings();

        assert_eq!(evaluate(&at(20.0), &settings), AlertState::Normal);
        assert_eq!(evaluate(&at(25.0), &settings), AlertState::Normal);
    }

    #[test]
    fn only_out_of_range_states_are_alarms() {
        assert!(AlertState::BelowMin.is_alarm());
        assert!(AlertState::AboveMax.is_alarm());
        assert!(!AlertState::Normal.is_alarm());
        assert!(!AlertState::Unknown.is_alarm());
    }

    #[test]
    fn zero_celsius_is_evaluated_not_treated_as_fault() {
        assert_eq!(evaluate(&at(0.0), &settings()), AlertState::BelowMin);
    }

    #[test]
    fn empty_history_is_unknown() {
        let history = HistoryStore::new(4, RetentionPolicy::Overwrite).unwrap();
        assert_eq!(evaluate_latest(&history, &settings()), AlertState::Unknown);
    }

    #[test]
    fn latest_reading_drives_evaluation() {
        let mut history = HistoryStore::new(4, RetentionPolicy::Overwrite).unwrap();
        history.append(at(30.0));
        history.append(at(21.0));

        assert_eq!(evaluate_latest(&history, &settings()), AlertState::Normal);
    }
}
