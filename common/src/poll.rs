use crate::settings::PollInterval;

/// Tracks when the last sample was taken on a monotonic millisecond clock.
#[derive(Debug, Clone, Default)]
pub struct PollSchedule {
    last_sample_ms: Option<u64>,
}

impl PollSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_sample_ms(&self) -> Option<u64> {
        self.last_sample_ms
    }

    /// Returns true and marks `now_ms` as the sample time when a sample is due.
    pub fn due(&mut self, now_ms: u64, interval: PollInterval) -> bool {
        let due = self
            .last_sample_ms
            .map(|last| now_ms.saturating_sub(last) >= interval.as_millis())
            .unwrap_or(true);
        if due {
            self.last_sample_ms = Some(now_ms);
        }
        due
    }

    pub fn remaining_ms(&self, now_ms: u64, interval: PollInterval) -> u64 {
        match self.last_sample_ms {
            Some(last) => interval
                .as_millis()
                .saturating_sub(now_ms.saturating_sub(last)),
            None => 0,
        }
    }
}
