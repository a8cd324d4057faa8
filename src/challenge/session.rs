//! Verification-attempt accounting.
//!
//! One [`VerificationSession`] exists per page load. It tracks how many
//! verification attempts were spent inside the current cooldown window and
//! enforces the anti-double-submit spacing. Time is always passed in by the
//! caller so the sweep and the submission path share one clock.

use chrono::{DateTime, Utc};

/// Minimum spacing between two submissions, in milliseconds.
pub const MIN_SUBMIT_SPACING_MS: i64 = 2_000;

/// Why a submission was refused before reaching the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptRejection {
    /// The attempt budget for the current cooldown window is spent.
    TooManyAttempts,
    /// The previous submission was less than the minimum spacing ago.
    TooSoon,
}

/// Ephemeral per-load attempt state.
///
/// Invariant: `attempt_count` never exceeds `max_attempts` within one cooldown
/// window; the window resets the count to zero once the last attempt falls out
/// of it.
#[derive(Debug, Clone)]
pub struct VerificationSession {
    attempt_count: u32,
    last_attempt: Option<DateTime<Utc>>,
    max_attempts: u32,
    cooldown_window_ms: i64,
    verifying: bool,
    last_error: Option<String>,
}

impl VerificationSession {
    pub fn new(max_attempts: u32, cooldown_window_ms: i64) -> Self {
        Self {
            attempt_count: 0,
            last_attempt: None,
            max_attempts,
            cooldown_window_ms,
            verifying: false,
            last_error: None,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn is_verifying(&self) -> bool {
        self.verifying
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Check the rate limits without consuming an attempt.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), AttemptRejection> {
        if self.attempt_count >= self.max_attempts {
            return Err(AttemptRejection::TooManyAttempts);
        }
        if let Some(last) = self.last_attempt
            && (now - last).num_milliseconds() < MIN_SUBMIT_SPACING_MS
        {
            return Err(AttemptRejection::TooSoon);
        }
        Ok(())
    }

    /// Consume one attempt and enter the verifying state.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> Result<(), AttemptRejection> {
        self.check(now)?;
        self.attempt_count += 1;
        self.last_attempt = Some(now);
        self.verifying = true;
        self.last_error = None;
        Ok(())
    }

    /// Leave the verifying state after the confirmation step settles.
    pub fn finish_attempt(&mut self) {
        self.verifying = false;
    }

    /// Forgive spent attempts once the cooldown window has elapsed.
    ///
    /// Called by the periodic sweep, independently of the submission path.
    pub fn sweep(&mut self, now: DateTime<Utc>) {
        if let Some(last) = self.last_attempt
            && (now - last).num_milliseconds() > self.cooldown_window_ms
            && self.attempt_count > 0
        {
            log::debug!("cooldown window elapsed, forgiving {} attempts", self.attempt_count);
            self.attempt_count = 0;
        }
    }
}
