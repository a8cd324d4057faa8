//! Challenge widget lifecycle controller.
//!
//! Owns the widget from readiness polling through render, token submission,
//! and teardown. All retry policy lives here: the provider is asked to never
//! retry on its own, attempt budgets are enforced through the session, and a
//! background sweep forgives spent attempts once the cooldown window elapses.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::TurnstileSettings;

use super::provider::{
    ChallengeProvider, RenderOptions, TokenVerifier, WidgetEvent, WidgetHandle,
};
use super::session::{AttemptRejection, VerificationSession};

/// Readiness polls before the provider is declared unavailable.
const READY_POLL_ATTEMPTS: u32 = 3;
/// Spacing between readiness polls.
const READY_POLL_SPACING: Duration = Duration::from_secs(1);
/// Tick interval of the cooldown-reset sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub const MSG_EXPIRED: &str = "Verification expired. Please try again.";
pub const MSG_PROVIDER_ERROR: &str = "An error occurred. Please try again.";
pub const MSG_TIMEOUT: &str = "Verification timed out. Please try again.";

/// Lifecycle states of the rendered widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Uninitialized,
    Loading,
    Ready,
    Verifying,
    Verified,
    Failed,
}

/// Errors surfaced by the controller. The `Display` text of the user-facing
/// variants is exactly the message shown to the visitor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Failed to load verification widget.")]
    WidgetUnavailable,
    #[error("Verification failed. Please try again.")]
    EmptyToken,
    #[error("Too many attempts. Please try again later.")]
    TooManyAttempts,
    #[error("Please wait before trying again.")]
    TooSoon,
    #[error("Failed to verify. Please try again.")]
    ConfirmationFailed,
    #[error("widget is not accepting submissions in state {0:?}")]
    NotReady(WidgetState),
}

#[derive(Debug)]
struct Inner {
    state: WidgetState,
    handle: Option<WidgetHandle>,
    session: VerificationSession,
    message: Option<String>,
    /// Set when the provider never became available; such a failure is
    /// terminal for the session and cannot be reset.
    fatal: bool,
}

/// Controller owning one challenge widget for the lifetime of a page load.
pub struct WidgetController {
    provider: Arc<dyn ChallengeProvider>,
    verifier: Arc<dyn TokenVerifier>,
    options: RenderOptions,
    inner: Arc<Mutex<Inner>>,
    sweep_task: StdMutex<Option<JoinHandle<()>>>,
}

impl WidgetController {
    pub fn new(
        provider: Arc<dyn ChallengeProvider>,
        verifier: Arc<dyn TokenVerifier>,
        settings: &TurnstileSettings,
    ) -> Self {
        Self::with_render_options(
            provider,
            verifier,
            settings,
            RenderOptions::new(settings.site_key.clone()),
        )
    }

    pub fn with_render_options(
        provider: Arc<dyn ChallengeProvider>,
        verifier: Arc<dyn TokenVerifier>,
        settings: &TurnstileSettings,
        options: RenderOptions,
    ) -> Self {
        Self {
            provider,
            verifier,
            options,
            inner: Arc::new(Mutex::new(Inner {
                state: WidgetState::Uninitialized,
                handle: None,
                session: VerificationSession::new(
                    settings.max_attempts,
                    settings.cooldown_period_ms,
                ),
                message: None,
                fatal: false,
            })),
            sweep_task: StdMutex::new(None),
        }
    }

    pub async fn state(&self) -> WidgetState {
        self.inner.lock().await.state
    }

    /// Latest user-facing message, if any.
    pub async fn message(&self) -> Option<String> {
        self.inner.lock().await.message.clone()
    }

    pub async fn attempt_count(&self) -> u32 {
        self.inner.lock().await.session.attempt_count()
    }

    /// Poll the provider for readiness and render the widget.
    ///
    /// The provider is polled up to three times at one-second spacing. If it
    /// never reports ready, the controller enters a fatal `Failed` state for
    /// the rest of the session; no automatic retry follows.
    pub async fn initialize(&self, mount: &str) -> Result<(), ControllerError> {
        self.inner.lock().await.state = WidgetState::Loading;

        let mut ready = false;
        for attempt in 1..=READY_POLL_ATTEMPTS {
            if self.provider.is_ready() {
                ready = true;
                break;
            }
            log::debug!("challenge provider not ready ({attempt}/{READY_POLL_ATTEMPTS})");
            if attempt < READY_POLL_ATTEMPTS {
                sleep(READY_POLL_SPACING).await;
            }
        }

        let mut inner = self.inner.lock().await;
        if !ready {
            return Err(Self::fail_fatally(&mut inner, "provider never became ready"));
        }

        match self.provider.render(mount, &self.options) {
            Ok(handle) => {
                log::debug!("challenge widget rendered with handle {}", handle.id());
                inner.handle = Some(handle);
                inner.state = WidgetState::Ready;
                inner.message = None;
                Ok(())
            }
            Err(err) => Err(Self::fail_fatally(&mut inner, &err.to_string())),
        }
    }

    fn fail_fatally(inner: &mut Inner, detail: &str) -> ControllerError {
        log::error!("challenge widget initialization failed: {detail}");
        inner.state = WidgetState::Failed;
        inner.fatal = true;
        inner.message = Some(ControllerError::WidgetUnavailable.to_string());
        ControllerError::WidgetUnavailable
    }

    /// Dispatch one provider callback.
    pub async fn handle_event(
        &self,
        event: WidgetEvent,
        now: DateTime<Utc>,
    ) -> Result<(), ControllerError> {
        match event {
            WidgetEvent::Token(token) => self.submit_token(&token, now).await,
            WidgetEvent::Expired => {
                let mut inner = self.inner.lock().await;
                inner.message = Some(MSG_EXPIRED.into());
                // An expired token leaves the widget stale; reset it proactively.
                if let Some(handle) = inner.handle.clone()
                    && let Err(err) = self.provider.reset(&handle)
                {
                    log::warn!("widget reset after expiry failed: {err}");
                }
                Ok(())
            }
            WidgetEvent::Error => {
                self.inner.lock().await.message = Some(MSG_PROVIDER_ERROR.into());
                Ok(())
            }
            WidgetEvent::Timeout => {
                self.inner.lock().await.message = Some(MSG_TIMEOUT.into());
                Ok(())
            }
        }
    }

    /// Run the submission path for a provider-issued token.
    ///
    /// Local rejections (empty token, spent budget, double submit) are
    /// surfaced as errors whose `Display` text is the user-facing message;
    /// only budget and spacing rejections leave the attempt budget untouched.
    pub async fn submit_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ControllerError> {
        {
            let mut inner = self.inner.lock().await;
            if inner.state != WidgetState::Ready {
                return Err(ControllerError::NotReady(inner.state));
            }

            if token.is_empty() {
                // Not counted against the attempt budget.
                let err = ControllerError::EmptyToken;
                inner.session.set_error(err.to_string());
                inner.message = Some(err.to_string());
                return Err(err);
            }

            if let Err(rejection) = inner.session.begin_attempt(now) {
                let err = match rejection {
                    AttemptRejection::TooManyAttempts => ControllerError::TooManyAttempts,
                    AttemptRejection::TooSoon => ControllerError::TooSoon,
                };
                inner.session.set_error(err.to_string());
                inner.message = Some(err.to_string());
                return Err(err);
            }

            inner.state = WidgetState::Verifying;
            inner.message = None;
        }

        let confirmation = self.verifier.confirm(token).await;

        let mut inner = self.inner.lock().await;
        inner.session.finish_attempt();
        match confirmation {
            Ok(()) => {
                inner.state = WidgetState::Verified;
                inner.message = None;
                Ok(())
            }
            Err(err) => {
                log::warn!("token confirmation failed: {err}");
                inner.state = WidgetState::Failed;
                let message = ControllerError::ConfirmationFailed.to_string();
                inner.session.set_error(message.clone());
                inner.message = Some(message);
                if let Some(handle) = inner.handle.clone()
                    && let Err(reset_err) = self.provider.reset(&handle)
                {
                    log::warn!("widget reset after failed confirmation failed: {reset_err}");
                }
                Err(ControllerError::ConfirmationFailed)
            }
        }
    }

    /// Re-enter `Ready` after a non-fatal failure.
    pub async fn reset(&self) -> Result<(), ControllerError> {
        let mut inner = self.inner.lock().await;
        if inner.fatal {
            return Err(ControllerError::WidgetUnavailable);
        }
        if inner.state != WidgetState::Failed {
            return Err(ControllerError::NotReady(inner.state));
        }
        inner.state = WidgetState::Ready;
        inner.message = None;
        inner.session.clear_error();
        Ok(())
    }

    /// Start the periodic cooldown sweep. Idempotent; a running sweep is
    /// never replaced, so ticks are never doubled.
    pub fn start_cooldown_sweep(&self) {
        let mut guard = self.sweep_task.lock().expect("sweep task lock poisoned");
        if guard.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            // The immediate first tick would sweep before any attempt exists.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                inner.lock().await.session.sweep(Utc::now());
            }
        }));
    }

    /// Cancel timers and remove the rendered widget.
    ///
    /// Removal failures are logged, never propagated; after teardown no timer
    /// may fire against the torn-down state.
    pub async fn teardown(&self) {
        if let Some(task) = self
            .sweep_task
            .lock()
            .expect("sweep task lock poisoned")
            .take()
        {
            task.abort();
        }

        let mut inner = self.inner.lock().await;
        if let Some(handle) = inner.handle.take() {
            if let Err(err) = self.provider.remove(&handle) {
                log::warn!("failed to remove challenge widget {}: {err}", handle.id());
            }
        }
        inner.state = WidgetState::Uninitialized;
    }
}

impl Drop for WidgetController {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.sweep_task.lock()
            && let Some(task) = guard.take()
        {
            task.abort();
        }
    }
}
