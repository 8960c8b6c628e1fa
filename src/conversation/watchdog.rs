//! Inactivity watchdog.
//!
//! Evaluated on each external tick while a conversation is active. Holds no
//! timers of its own: the caller passes `now`.

use std::time::{Duration, Instant};

use tracing::info;

/// Last-activity timestamps, written only by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityClock {
    pub last_user_speech_at: Instant,
    pub last_assistant_response_at: Instant,
    pub is_assistant_speaking: bool,
}

impl ActivityClock {
    pub fn new(now: Instant) -> Self {
        Self {
            last_user_speech_at: now,
            last_assistant_response_at: now,
            is_assistant_speaking: false,
        }
    }

    /// Reset both timestamps to `now` and clear the speaking flag.
    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(now);
    }

    pub fn user_spoke(&mut self, now: Instant) {
        self.last_user_speech_at = now;
    }

    pub fn assistant_started_speaking(&mut self) {
        self.is_assistant_speaking = true;
    }

    pub fn assistant_finished(&mut self, now: Instant) {
        self.is_assistant_speaking = false;
        self.last_assistant_response_at = now;
    }

    pub fn user_silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_user_speech_at)
    }

    pub fn assistant_silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_assistant_response_at)
    }
}

/// Outcome of one watchdog evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// The assistant is speaking; inactivity is not measured.
    Suspended,
    Active,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct ActivityWatchdog {
    timeout: Duration,
    log_updates: bool,
}

impl ActivityWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            log_updates: false,
        }
    }

    /// Log silence durations on every evaluation.
    #[must_use]
    pub fn with_activity_logging(mut self, enabled: bool) -> Self {
        self.log_updates = enabled;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Times out when either party has been silent for at least the threshold.
    pub fn evaluate(&self, clock: &ActivityClock, now: Instant) -> WatchdogVerdict {
        if clock.is_assistant_speaking {
            return WatchdogVerdict::Suspended;
        }
        let user = clock.user_silence(now);
        let assistant = clock.assistant_silence(now);
        if self.log_updates {
            info!(
                user_silence_secs = user.as_secs(),
                assistant_silence_secs = assistant.as_secs(),
                timeout_secs = self.timeout.as_secs(),
                "activity check"
            );
        }
        if user >= self.timeout || assistant >= self.timeout {
            WatchdogVerdict::TimedOut
        } else {
            WatchdogVerdict::Active
        }
    }
}
