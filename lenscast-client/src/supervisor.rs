use std::time::Duration;

/// Timing policy for transport recovery.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How long a connection may sit in `checking` before the attempt is
    /// treated as failed.
    pub checking_timeout: Duration,
    /// Delay before the first reset-and-renegotiate attempt.
    pub retry_base: Duration,
    /// Upper bound for the backed-off retry delay.
    pub retry_cap: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            checking_timeout: Duration::from_secs(10),
            retry_base: Duration::from_secs(2),
            retry_cap: Duration::from_secs(30),
        }
    }
}

/// Decides when a failed connection gets its next reset-and-renegotiate
/// attempt: one attempt pending at a time, delay doubling up to the cap
/// while failures recur, back to the base once a connection succeeds.
/// Retries never stop on their own.
#[derive(Debug)]
pub struct ReconnectSupervisor {
    config: SupervisorConfig,
    pending: bool,
    next_delay: Duration,
}

impl ReconnectSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let next_delay = config.retry_base;
        Self {
            config,
            pending: false,
            next_delay,
        }
    }

    /// Delay for a new retry attempt, or `None` while one is already armed.
    pub fn schedule_retry(&mut self) -> Option<Duration> {
        if self.pending {
            return None;
        }
        self.pending = true;
        let delay = self.next_delay;
        self.next_delay = (self.next_delay * 2).min(self.config.retry_cap);
        Some(delay)
    }

    /// The armed attempt has fired; the next failure may arm a new one.
    pub fn retry_fired(&mut self) {
        self.pending = false;
    }

    /// A connection came up; future failures start from the base delay again.
    pub fn note_connected(&mut self) {
        self.next_delay = self.config.retry_base;
    }

    pub fn retry_pending(&self) -> bool {
        self.pending
    }

    pub fn checking_timeout(&self) -> Duration {
        self.config.checking_timeout
    }
}
