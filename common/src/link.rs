use std::time::{Duration, Instant};

pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Idle,
    /// Link dropped or stayed down past the retry interval.
    Reconnect,
    /// Link came back after being down this long.
    Restored(Duration),
}

/// Decides when to re-issue a station connect. The device keeps sampling
/// while the link is down, so there is no restart path.
#[derive(Debug, Clone, Default)]
pub struct LinkWatch {
    down_since: Option<Instant>,
    last_attempt: Option<Instant>,
}

impl LinkWatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_down(&self) -> bool {
        self.down_since.is_some()
    }

    pub fn observe(&mut self, connected: bool, now: Instant) -> LinkAction {
        if connected {
            self.last_attempt = None;
            return match self.down_since.take() {
                Some(since) => LinkAction::Restored(now.saturating_duration_since(since)),
                None => LinkAction::Idle,
            };
        }

        self.down_since.get_or_insert(now);
        let retry_due = self
            .last_attempt
            .map_or(true, |at| now.saturating_duration_since(at) >= RECONNECT_INTERVAL);
        if retry_due {
            self.last_attempt = Some(now);
            LinkAction::Reconnect
        } else {
            LinkAction::Idle
        }
    }
}
