//! Route gate between the public redirect view and the operator
//! configuration surface.
//!
//! Config access always starts locked. Entry requires a PIN checked against
//! the salted digest in the settings, and guesses are rate limited with the
//! same attempt/cooldown accounting the challenge controller uses. Leaving
//! the configuration view re-locks it unconditionally.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::challenge::session::{AttemptRejection, VerificationSession};
use crate::config::AccessSettings;

pub const MSG_INVALID_PIN: &str = "Invalid PIN. Access denied.";

/// Active view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteView {
    #[default]
    Redirect,
    Config,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("Invalid PIN. Access denied.")]
    InvalidPin,
    #[error("Too many attempts. Please try again later.")]
    TooManyGuesses,
    #[error("Please wait before trying again.")]
    GuessTooSoon,
}

/// PIN-protected two-state view machine.
#[derive(Debug)]
pub struct RouteGate {
    view: RouteView,
    config_locked: bool,
    access: AccessSettings,
    guesses: VerificationSession,
}

impl RouteGate {
    pub fn new(access: AccessSettings) -> Self {
        let guesses = VerificationSession::new(access.pin_max_attempts, access.pin_cooldown_ms);
        Self {
            view: RouteView::Redirect,
            config_locked: true,
            access,
            guesses,
        }
    }

    pub fn view(&self) -> RouteView {
        self.view
    }

    pub fn is_config_locked(&self) -> bool {
        self.config_locked
    }

    /// Attempt to enter the configuration view with the supplied PIN.
    ///
    /// Every guess spends attempt budget; only a matching digest unlocks the
    /// view. Denials leave the state untouched.
    pub fn enter_config(&mut self, pin: &str, now: DateTime<Utc>) -> Result<(), RouteError> {
        // The gate has no background task, so the cooldown sweep runs inline.
        self.guesses.sweep(now);

        if let Err(rejection) = self.guesses.begin_attempt(now) {
            log::warn!("config PIN guess rate limited");
            return Err(match rejection {
                AttemptRejection::TooManyAttempts => RouteError::TooManyGuesses,
                AttemptRejection::TooSoon => RouteError::GuessTooSoon,
            });
        }
        self.guesses.finish_attempt();

        if !self.access.matches(pin) {
            log::warn!("config access denied: PIN mismatch");
            return Err(RouteError::InvalidPin);
        }

        self.config_locked = false;
        self.view = RouteView::Config;
        Ok(())
    }

    /// Return to the redirect view, re-locking configuration unconditionally.
    pub fn leave_config(&mut self) {
        self.view = RouteView::Redirect;
        self.config_locked = true;
    }
}
