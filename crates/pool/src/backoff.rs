//! Exponential backoff for worker respawn attempts.
//!
//! A crashing engine binary would otherwise put the pool into a tight
//! spawn loop. Each consecutive failed spawn doubles the delay up to a
//! cap; a worker that reaches `Idle` resets the sequence.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SpawnBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Default for SpawnBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl SpawnBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
            attempts: 0,
        }
    }

    /// Delay to wait before the next spawn attempt, advancing the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        self.attempts += 1;
        delay
    }

    /// Reset after a successful worker startup.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
