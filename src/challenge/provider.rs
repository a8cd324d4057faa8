//! Challenge provider and verifier seams.
//!
//! The widget library is an externally owned service injected at construction
//! time, never a global. The controller only depends on these traits, so hosts
//! can bridge to the real provider or substitute stubs in tests.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Opaque identifier for a rendered widget, owned by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetHandle(String);

impl WidgetHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Visual theme requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidgetTheme {
    #[default]
    Light,
    Dark,
    Auto,
}

/// Provider-side retry policy. The controller owns all retry behaviour, so
/// rendering always requests `Never`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    Auto,
    #[default]
    Never,
}

/// Options passed to [`ChallengeProvider::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub site_key: String,
    pub action: String,
    pub theme: WidgetTheme,
    pub size: String,
    pub appearance: String,
    pub language: String,
    pub retry: RetryPolicy,
}

impl RenderOptions {
    pub fn new(site_key: impl Into<String>) -> Self {
        Self {
            site_key: site_key.into(),
            action: "redirect_verification".into(),
            theme: WidgetTheme::Light,
            size: "normal".into(),
            appearance: "always".into(),
            language: "auto".into(),
            retry: RetryPolicy::Never,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("challenge provider is not available")]
    Unavailable,
    #[error("widget render failed: {0}")]
    Render(String),
    #[error("no widget with handle '{0}'")]
    UnknownHandle(String),
}

/// Events the provider delivers for a rendered widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    /// Successful solve carrying the proof-of-humanity token.
    Token(String),
    /// The issued token expired before submission.
    Expired,
    /// Provider-side error during the interaction.
    Error,
    /// The interaction timed out.
    Timeout,
}

/// Externally owned challenge-widget service.
pub trait ChallengeProvider: Send + Sync {
    /// Whether the provider script has finished loading.
    fn is_ready(&self) -> bool;

    /// Render the widget against `mount` and return its handle.
    fn render(&self, mount: &str, options: &RenderOptions) -> Result<WidgetHandle, ProviderError>;

    /// Reset a rendered widget for another attempt.
    fn reset(&self, handle: &WidgetHandle) -> Result<(), ProviderError>;

    /// Remove a rendered widget from the page.
    fn remove(&self, handle: &WidgetHandle) -> Result<(), ProviderError>;
}

#[derive(Debug, Error)]
#[error("token confirmation failed: {0}")]
pub struct VerifierError(pub String);

/// Confirmation step applied to a provider-issued token.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn confirm(&self, token: &str) -> Result<(), VerifierError>;
}

/// Default verifier: waits a fixed delay and accepts the token.
///
/// This reproduces the client-only acceptance of the original design. The
/// token is never checked against the provider's verification endpoint;
/// deployments that need a sound check should implement [`TokenVerifier`]
/// against a server-side endpoint instead.
#[derive(Debug, Clone)]
pub struct DelayedAcceptVerifier {
    delay: Duration,
}

impl DelayedAcceptVerifier {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(1_500),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for DelayedAcceptVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenVerifier for DelayedAcceptVerifier {
    async fn confirm(&self, _token: &str) -> Result<(), VerifierError> {
        sleep(self.delay).await;
        Ok(())
    }
}
