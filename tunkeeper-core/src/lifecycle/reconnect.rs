//! Reconnect policy applied after an unrequested disconnect

use std::time::{Duration, Instant};

use crate::config::{ReconnectConfig, ReconnectMode};

/// Backoff delays: immediate, 1s, 5s, 15s, 30s
const BACKOFF_DELAYS: [Duration; 5] = [
    Duration::from_secs(0),
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(15),
    Duration::from_secs(30),
];

const IMMEDIATE: [Duration; 1] = [Duration::from_secs(0)];

/// Decides whether, and after how long, a dropped session is restarted
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    attempts: Vec<Instant>,
    max_attempts_per_window: Option<u32>,
    window_duration: Duration,
    delays: &'static [Duration],
    current_backoff_idx: usize,
}

impl ReconnectPolicy {
    /// Reconnect at once, forever.
    pub fn immediate() -> Self {
        Self {
            attempts: Vec::new(),
            max_attempts_per_window: None,
            window_duration: Duration::ZERO,
            delays: &IMMEDIATE,
            current_backoff_idx: 0,
        }
    }

    /// Back off 0s, 1s, 5s, 15s, 30s and give up after `max_attempts` within `window`.
    pub fn backoff(max_attempts: u32, window: Duration) -> Self {
        Self {
            attempts: Vec::new(),
            max_attempts_per_window: Some(max_attempts),
            window_duration: window,
            delays: &BACKOFF_DELAYS,
            current_backoff_idx: 0,
        }
    }

    /// Check if we should reconnect and get the delay
    ///
    /// Returns `Some(delay)` if a new attempt is allowed, `None` if we should give up
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_attempts_per_window {
            let now = Instant::now();
            let window = self.window_duration;
            self.attempts.retain(|t| now.duration_since(*t) < window);

            if self.attempts.len() >= max as usize {
                return None;
            }
            self.attempts.push(now);
        }

        let last = self.delays.len() - 1;
        let delay = self.delays[self.current_backoff_idx.min(last)];
        self.current_backoff_idx = (self.current_backoff_idx + 1).min(last);

        Some(delay)
    }

    /// Reset after a successful connection or an explicit start
    pub fn reset(&mut self) {
        self.attempts.clear();
        self.current_backoff_idx = 0;
    }

    /// Number of attempts counted in the current window
    pub fn recent_attempts(&self) -> usize {
        self.attempts.len()
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        match config.mode {
            ReconnectMode::Immediate => Self::immediate(),
            ReconnectMode::Backoff => Self::backoff(
                config.max_attempts,
                Duration::from_secs(config.window_secs),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(policy: &mut ReconnectPolicy, n: usize) -> Vec<Option<Duration>> {
        (0..n).map(|_| policy.next_delay()).collect()
    }

    #[test]
    fn immediate_policy_never_gives_up() {
        let mut policy = ReconnectPolicy::immediate();
        assert!(drain(&mut policy, 1000).iter().all(|d| *d == Some(Duration::ZERO)));
        // Nothing is counted when there is no cap
        assert_eq!(policy.recent_attempts(), 0);
    }

    #[test]
    fn backoff_walks_the_delay_table_and_holds_at_thirty_seconds() {
        let mut policy = ReconnectPolicy::backoff(10, Duration::from_secs(600));
        let secs: Vec<u64> = drain(&mut policy, 7)
            .into_iter()
            .map(|d| d.unwrap().as_secs())
            .collect();
        assert_eq!(secs, vec![0, 1, 5, 15, 30, 30, 30]);
        assert_eq!(policy.recent_attempts(), 7);
    }

    #[test]
    fn explicit_start_revives_an_exhausted_policy() {
        let mut policy = ReconnectPolicy::backoff(2, Duration::from_secs(60));
        assert_eq!(
            drain(&mut policy, 3),
            vec![Some(Duration::ZERO), Some(Duration::from_secs(1)), None]
        );

        // What the manager does on start and on a successful handshake
        policy.reset();
        assert_eq!(policy.next_delay(), Some(Duration::ZERO));
        assert_eq!(policy.recent_attempts(), 1);
    }

    #[test]
    fn attempts_outside_the_window_stop_counting() {
        let mut policy = ReconnectPolicy::backoff(1, Duration::from_millis(20));
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());

        std::thread::sleep(Duration::from_millis(40));

        // Allowed again, but the delay keeps growing until a session succeeds
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn built_from_config() {
        let config = ReconnectConfig {
            mode: ReconnectMode::Backoff,
            max_attempts: 2,
            window_secs: 30,
        };
        let mut policy = ReconnectPolicy::from(&config);
        assert_eq!(drain(&mut policy, 3).last(), Some(&None));

        let mut policy = ReconnectPolicy::from(&ReconnectConfig::default());
        assert!(drain(&mut policy, 50).iter().all(Option::is_some));
    }
}
