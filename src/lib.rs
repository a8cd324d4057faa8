//! # verigate-rs
//!
//! A human-verification gate for redirect pages: visitors are screened by
//! bot-likelihood heuristics, must pass an externally rendered challenge
//! widget, and are then redirected to a validated destination URL after a
//! short countdown. A PIN-protected route gate separates the public redirect
//! view from the operator configuration surface.
//!
//! The crate is host-agnostic: the challenge widget, navigation, environment
//! signals, and input events are all injected capabilities, so the same gate
//! logic runs against a real browser bridge or against stubs in tests.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use verigate_rs::{GateState, VerificationGate};
//! # use verigate_rs::{ChallengeProvider, Navigator, ProviderError, RenderOptions, WidgetHandle};
//! # struct Bridge;
//! # impl ChallengeProvider for Bridge {
//! #     fn is_ready(&self) -> bool { true }
//! #     fn render(&self, _: &str, _: &RenderOptions) -> Result<WidgetHandle, ProviderError> {
//! #         Ok(WidgetHandle::new("w"))
//! #     }
//! #     fn reset(&self, _: &WidgetHandle) -> Result<(), ProviderError> { Ok(()) }
//! #     fn remove(&self, _: &WidgetHandle) -> Result<(), ProviderError> { Ok(()) }
//! # }
//! # impl Navigator for Bridge { fn navigate(&self, _: &url::Url) {} }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = Arc::new(Bridge);
//!     let gate = VerificationGate::builder()
//!         .with_provider(bridge.clone())
//!         .with_navigator(bridge)
//!         .with_query_string("?to=https://example.com/landing")
//!         .build()?;
//!
//!     if gate.state() == GateState::Challenge {
//!         gate.start("#challenge-mount").await?;
//!     }
//!     Ok(())
//! }
//! ```

mod gate;

pub mod challenge;
pub mod config;
pub mod detection;
pub mod routes;
pub mod target;

pub use crate::gate::{
    GateError,
    GateResult,
    GateState,
    Navigator,
    VerificationGate,
    VerificationGateBuilder,
};

pub use crate::challenge::{
    AttemptRejection,
    ChallengeProvider,
    ControllerError,
    DelayedAcceptVerifier,
    ProviderError,
    RenderOptions,
    RetryPolicy,
    TokenVerifier,
    VerificationSession,
    VerifierError,
    WidgetController,
    WidgetEvent,
    WidgetHandle,
    WidgetState,
    WidgetTheme,
};

pub use crate::config::{
    AccessSettings,
    ConfigError,
    ConfigStore,
    GateSettings,
    GateSettingsPatch,
    MemoryConfigStore,
    RedbConfigStore,
    ThemeSettings,
    TurnstileSettings,
};

pub use crate::detection::{
    BehaviorMonitor,
    BotSignal,
    BotVerdict,
    EnvironmentProbe,
    InputEvent,
};

pub use crate::routes::{RouteError, RouteGate, RouteView};

pub use crate::target::RedirectTarget;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
