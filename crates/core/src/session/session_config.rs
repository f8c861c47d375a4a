use std::time::Duration;

use crate::shared::constants::{
    CONFIDENCE_THRESHOLD, LOGIN_TICK_MS, MAX_CONSECUTIVE_FAILURES, MIN_CAPTURE_GAP_MS,
    REGISTER_TICK_MS, REQUIRED_FRAME_COUNT, SESSION_TIMEOUT_SECS,
};

/// Shortest tick period a session will run with.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Timing and gating parameters for one capture session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub tick_interval: Duration,
    pub session_timeout: Duration,
    /// Registration only: minimum spacing between two captured frames.
    pub min_capture_gap: Duration,
    pub confidence_threshold: f64,
    /// Login only.
    pub max_consecutive_failures: u32,
    /// Registration only.
    pub required_frame_count: usize,
}

impl SessionConfig {
    pub fn login() -> Self {
        Self {
            tick_interval: Duration::from_millis(LOGIN_TICK_MS),
            ..Self::register()
        }
    }

    pub fn register() -> Self {
        Self {
            tick_interval: Duration::from_millis(REGISTER_TICK_MS),
            session_timeout: Duration::from_secs(SESSION_TIMEOUT_SECS),
            min_capture_gap: Duration::from_millis(MIN_CAPTURE_GAP_MS),
            confidence_threshold: CONFIDENCE_THRESHOLD,
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
            required_frame_count: REQUIRED_FRAME_COUNT,
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(MIN_TICK_INTERVAL);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }
}
