//! Challenge widget subsystem.
//!
//! Each submodule covers one concern: the provider/verifier seams, the
//! per-load attempt accounting, and the lifecycle controller tying them
//! together.

pub mod controller;
pub mod provider;
pub mod session;

pub use controller::{
    ControllerError, MSG_EXPIRED, MSG_PROVIDER_ERROR, MSG_TIMEOUT, WidgetController, WidgetState,
};
pub use provider::{
    ChallengeProvider, DelayedAcceptVerifier, ProviderError, RenderOptions, RetryPolicy,
    TokenVerifier, VerifierError, WidgetEvent, WidgetHandle, WidgetTheme,
};
pub use session::{AttemptRejection, MIN_SUBMIT_SPACING_MS, VerificationSession};
