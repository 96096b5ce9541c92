use std::time::Duration;

use embedded_hal::delay::DelayNs;
use log::{info, warn};

/// Bounded retry with a fixed pause between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `attempt` until it succeeds or `max_attempts` tries have failed.
    ///
    /// The pause is only taken between attempts, never after the last one.
    /// Returns the number of attempts spent when every one of them failed.
    pub fn run<T, E, D, F>(&self, what: &str, delay: &mut D, mut attempt: F) -> Result<T, u32>
    where
        E: core::fmt::Display,
        D: DelayNs,
        F: FnMut(u32) -> Result<T, E>,
    {
        for n in 1..=self.max_attempts {
            match attempt(n) {
                Ok(value) => {
                    info!("{what}: connected on attempt {n}/{}", self.max_attempts);
                    return Ok(value);
                }
                Err(err) => {
                    warn!("{what}: attempt {n}/{} failed: {err}", self.max_attempts);
                }
            }

            if n < self.max_attempts {
                delay.delay_ms(self.delay.as_millis().min(u32::MAX as u128) as u32);
            }
        }

        Err(self.max_attempts)
    }
}
