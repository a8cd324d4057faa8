//! High level gate orchestration.
//!
//! Composes the bot heuristics, target resolver, and widget controller into
//! one presentation state machine and drives the post-verification countdown.
//! Denial by the heuristics overrides everything; an invalid target blocks the
//! challenge; a confirmed challenge enters a five-second countdown that ends
//! in exactly one navigation to the resolved target.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use url::Url;

use crate::challenge::{
    ChallengeProvider, ControllerError, DelayedAcceptVerifier, TokenVerifier, WidgetController,
    WidgetEvent, WidgetState,
};
use crate::config::{ConfigError, ConfigStore, GateSettings, MemoryConfigStore};
use crate::detection::{self, BehaviorMonitor, BotVerdict, EnvironmentProbe, InputEvent};
use crate::target::{self, RedirectTarget};

/// Countdown length, in one-second ticks.
const COUNTDOWN_SECONDS: u32 = 5;
/// Widget successes tolerated per rolling window before the signal is dropped.
const SUCCESS_WINDOW_LIMIT: usize = 5;
/// Rolling window for the orchestrator-level success guard.
const SUCCESS_WINDOW_MS: i64 = 3_600_000;

/// Result alias used across the orchestration layer.
pub type GateResult<T> = Result<T, GateError>;

/// High-level error surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("no challenge provider configured")]
    MissingProvider,
    #[error("no navigator configured")]
    MissingNavigator,
    #[error("widget controller error: {0}")]
    Controller(#[from] ControllerError),
    #[error("configuration store error: {0}")]
    Config(#[from] ConfigError),
}

/// Presentation states, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    /// Bot heuristics tripped; terminal for the session.
    Denied { reason: Option<String> },
    /// No valid destination URL could be resolved.
    InvalidTarget { message: &'static str },
    /// Waiting on the challenge widget.
    Challenge,
    /// Verified; counting down to the navigation.
    Redirecting { seconds_remaining: u32 },
}

/// Navigation capability supplied by the host.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &Url);
}

/// Rolling window of accepted verification successes.
///
/// Guards the orchestrator against a compromised or replayed success
/// callback: once the window holds the limit, further success signals are
/// dropped without a state transition.
#[derive(Debug, Default)]
struct SuccessWindow {
    entries: VecDeque<DateTime<Utc>>,
}

impl SuccessWindow {
    fn try_record(&mut self, now: DateTime<Utc>) -> bool {
        while let Some(front) = self.entries.front().copied() {
            if (now - front).num_milliseconds() >= SUCCESS_WINDOW_MS {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        if self.entries.len() >= SUCCESS_WINDOW_LIMIT {
            return false;
        }
        self.entries.push_back(now);
        true
    }
}

/// Fluent builder for [`VerificationGate`].
pub struct VerificationGateBuilder {
    provider: Option<Arc<dyn ChallengeProvider>>,
    verifier: Arc<dyn TokenVerifier>,
    navigator: Option<Arc<dyn Navigator>>,
    store: Arc<dyn ConfigStore>,
    probe: EnvironmentProbe,
    query: Vec<(String, String)>,
}

impl VerificationGateBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            verifier: Arc::new(DelayedAcceptVerifier::new()),
            navigator: None,
            store: Arc::new(MemoryConfigStore::new()),
            probe: EnvironmentProbe::default(),
            query: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ChallengeProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn with_config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_environment(mut self, probe: EnvironmentProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_query_pairs<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn with_query_string(mut self, raw: &str) -> Self {
        let trimmed = raw.strip_prefix('?').unwrap_or(raw);
        self.query = url::form_urlencoded::parse(trimmed.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        self
    }

    pub fn build(self) -> GateResult<VerificationGate> {
        let provider = self.provider.ok_or(GateError::MissingProvider)?;
        let navigator = self.navigator.ok_or(GateError::MissingNavigator)?;

        let settings = self.store.get();
        let target = target::resolve(&self.query, settings.default_target_url.as_deref());
        let verdict = detection::inspect(&self.probe);

        let controller = Arc::new(WidgetController::new(
            provider,
            self.verifier,
            &settings.turnstile,
        ));

        let state = if verdict.is_bot {
            GateState::Denied {
                reason: verdict.reason.clone(),
            }
        } else if let Some(message) = target.error() {
            GateState::InvalidTarget { message }
        } else {
            GateState::Challenge
        };

        Ok(VerificationGate {
            controller,
            navigator,
            settings,
            target,
            state: Arc::new(StdMutex::new(state)),
            monitor: StdMutex::new(BehaviorMonitor::new(Utc::now())),
            successes: StdMutex::new(SuccessWindow::default()),
            countdown_task: StdMutex::new(None),
            navigated: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl Default for VerificationGateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrator owning one verification session.
pub struct VerificationGate {
    controller: Arc<WidgetController>,
    navigator: Arc<dyn Navigator>,
    settings: GateSettings,
    target: RedirectTarget,
    state: Arc<StdMutex<GateState>>,
    monitor: StdMutex<BehaviorMonitor>,
    successes: StdMutex<SuccessWindow>,
    countdown_task: StdMutex<Option<JoinHandle<()>>>,
    navigated: Arc<AtomicBool>,
}

impl VerificationGate {
    pub fn builder() -> VerificationGateBuilder {
        VerificationGateBuilder::new()
    }

    pub fn state(&self) -> GateState {
        self.state.lock().expect("gate state lock poisoned").clone()
    }

    pub fn target(&self) -> &RedirectTarget {
        &self.target
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub fn controller(&self) -> &WidgetController {
        &self.controller
    }

    /// Begin the challenge: attach the behaviour monitor, initialize the
    /// widget, and start the cooldown sweep.
    ///
    /// Does nothing unless the gate is in the challenge state. A fatal widget
    /// failure leaves the gate in `Challenge` with the controller carrying
    /// the static failure message; the session simply cannot complete.
    pub async fn start(&self, mount: &str) -> GateResult<()> {
        if self.state() != GateState::Challenge {
            return Ok(());
        }
        self.monitor
            .lock()
            .expect("monitor lock poisoned")
            .attach();
        self.controller.start_cooldown_sweep();
        self.controller.initialize(mount).await?;
        Ok(())
    }

    /// Feed one behavioural input event to the heuristics.
    pub fn record_input(&self, event: InputEvent, now: DateTime<Utc>) {
        let verdict = {
            let mut monitor = self.monitor.lock().expect("monitor lock poisoned");
            monitor.record(event, now).clone()
        };
        if verdict.is_bot {
            self.deny(verdict);
        }
    }

    fn deny(&self, verdict: BotVerdict) {
        self.cancel_countdown();
        let mut state = self.state.lock().expect("gate state lock poisoned");
        *state = GateState::Denied {
            reason: verdict.reason,
        };
    }

    /// Dispatch one provider callback through the controller; a confirmed
    /// token advances the gate to the redirect countdown.
    pub async fn handle_widget_event(
        &self,
        event: WidgetEvent,
        now: DateTime<Utc>,
    ) -> GateResult<()> {
        let is_token = matches!(event, WidgetEvent::Token(_));
        self.controller.handle_event(event, now).await?;
        if is_token && self.controller.state().await == WidgetState::Verified {
            self.on_verification_success(now);
        }
        Ok(())
    }

    /// Accept a verification success and start the redirect countdown.
    ///
    /// Independent of the controller's own budget: even a widget-reported
    /// success is dropped when the rolling success window is already full,
    /// so a replayed success callback cannot force a redirect.
    pub fn on_verification_success(&self, now: DateTime<Utc>) -> bool {
        if self.state() != GateState::Challenge {
            return false;
        }
        let accepted = self
            .successes
            .lock()
            .expect("success window lock poisoned")
            .try_record(now);
        if !accepted {
            log::warn!("dropping verification success: window limit reached");
            return false;
        }

        let Some(url) = self.target.url().cloned() else {
            return false;
        };

        *self.state.lock().expect("gate state lock poisoned") = GateState::Redirecting {
            seconds_remaining: COUNTDOWN_SECONDS,
        };
        self.start_countdown(url);
        true
    }

    fn start_countdown(&self, url: Url) {
        let state = Arc::clone(&self.state);
        let navigator = Arc::clone(&self.navigator);
        let navigated = Arc::clone(&self.navigated);

        let mut guard = self
            .countdown_task
            .lock()
            .expect("countdown task lock poisoned");
        if guard.is_some() {
            return;
        }
        *guard = Some(tokio::spawn(async move {
            for remaining in (0..COUNTDOWN_SECONDS).rev() {
                sleep(Duration::from_secs(1)).await;
                let mut state = state.lock().expect("gate state lock poisoned");
                match *state {
                    GateState::Redirecting { .. } => {
                        *state = GateState::Redirecting {
                            seconds_remaining: remaining,
                        };
                    }
                    // Denied in the meantime; stop without navigating.
                    _ => return,
                }
            }
            navigate_once(&navigated, navigator.as_ref(), &url);
        }));
    }

    /// Bypass the remaining countdown and navigate immediately.
    pub fn redirect_now(&self) {
        let Some(url) = self.target.url().cloned() else {
            return;
        };
        {
            let state = self.state.lock().expect("gate state lock poisoned");
            if !matches!(*state, GateState::Redirecting { .. }) {
                return;
            }
        }
        self.cancel_countdown();
        *self.state.lock().expect("gate state lock poisoned") = GateState::Redirecting {
            seconds_remaining: 0,
        };
        navigate_once(&self.navigated, self.navigator.as_ref(), &url);
    }

    fn cancel_countdown(&self) {
        if let Some(task) = self
            .countdown_task
            .lock()
            .expect("countdown task lock poisoned")
            .take()
        {
            task.abort();
        }
    }

    /// Cancel all timers and tear down the widget.
    pub async fn teardown(&self) {
        self.cancel_countdown();
        self.monitor
            .lock()
            .expect("monitor lock poisoned")
            .detach();
        self.controller.teardown().await;
    }
}

impl Drop for VerificationGate {
    fn drop(&mut self) {
        self.cancel_countdown();
    }
}

fn navigate_once(navigated: &AtomicBool, navigator: &dyn Navigator, url: &Url) {
    if navigated.swap(true, Ordering::SeqCst) {
        return;
    }
    log::info!("redirecting to {url}");
    navigator.navigate(url);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::provider::{ProviderError, RenderOptions, WidgetHandle};
    use crate::config::{GateSettingsPatch, TurnstileSettings};

    struct ReadyProvider;

    impl ChallengeProvider for ReadyProvider {
        fn is_ready(&self) -> bool {
            true
        }

        fn render(
            &self,
            _mount: &str,
            _options: &RenderOptions,
        ) -> Result<WidgetHandle, ProviderError> {
            Ok(WidgetHandle::new("widget-1"))
        }

        fn reset(&self, _handle: &WidgetHandle) -> Result<(), ProviderError> {
            Ok(())
        }

        fn remove(&self, _handle: &WidgetHandle) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNavigator {
        visits: StdMutex<Vec<Url>>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, url: &Url) {
            self.visits.lock().unwrap().push(url.clone());
        }
    }

    fn human_probe() -> EnvironmentProbe {
        EnvironmentProbe {
            webdriver: false,
            languages: vec!["en-US".into()],
            primary_language: Some("en-US".into()),
            automation_globals: false,
            screen_width: 1280,
            screen_height: 800,
            navigation_start_ms: 1_700_000_000_000,
            user_agent: "Mozilla/5.0 (Macintosh) Safari/605.1.15".into(),
        }
    }

    fn gate_with(navigator: Arc<RecordingNavigator>, query: &str) -> VerificationGate {
        let store = Arc::new(MemoryConfigStore::new());
        store
            .set(GateSettingsPatch {
                turnstile: Some(TurnstileSettings {
                    site_key: "0x4AAAAAAB".into(),
                    max_attempts: 5,
                    cooldown_period_ms: 3_600_000,
                }),
                ..Default::default()
            })
            .unwrap();
        VerificationGate::builder()
            .with_provider(Arc::new(ReadyProvider))
            .with_verifier(Arc::new(
                DelayedAcceptVerifier::new().with_delay(Duration::ZERO),
            ))
            .with_navigator(navigator)
            .with_config_store(store)
            .with_environment(human_probe())
            .with_query_string(query)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn clean_visitor_with_valid_target_sees_challenge() {
        let navigator = Arc::new(RecordingNavigator::default());
        let gate = gate_with(navigator, "?to=https://example.com/x");
        assert_eq!(gate.state(), GateState::Challenge);
        assert_eq!(
            gate.target().url().unwrap().as_str(),
            "https://example.com/x"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bot_verdict_overrides_valid_target() {
        let navigator = Arc::new(RecordingNavigator::default());
        let mut probe = human_probe();
        probe.webdriver = true;
        let gate = VerificationGate::builder()
            .with_provider(Arc::new(ReadyProvider))
            .with_navigator(navigator)
            .with_environment(probe)
            .with_query_string("?to=https://example.com/x")
            .build()
            .unwrap();

        assert!(matches!(gate.state(), GateState::Denied { .. }));
        // The challenge never starts for a denied session.
        gate.start("#mount").await.unwrap();
        assert_eq!(gate.controller().state().await, WidgetState::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_target_blocks_challenge() {
        let navigator = Arc::new(RecordingNavigator::default());
        let gate = gate_with(navigator, "");
        assert_eq!(
            gate.state(),
            GateState::InvalidTarget {
                message: crate::target::ERR_MISSING
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn success_starts_countdown_and_navigates_once() {
        let navigator = Arc::new(RecordingNavigator::default());
        let gate = gate_with(navigator.clone(), "?to=https://example.com/x");
        gate.start("#mount").await.unwrap();

        gate.handle_widget_event(WidgetEvent::Token("tok".into()), Utc::now())
            .await
            .unwrap();
        assert_eq!(
            gate.state(),
            GateState::Redirecting {
                seconds_remaining: 5
            }
        );

        sleep(Duration::from_millis(1_100)).await;
        assert_eq!(
            gate.state(),
            GateState::Redirecting {
                seconds_remaining: 4
            }
        );
        assert!(navigator.visits.lock().unwrap().is_empty());

        sleep(Duration::from_secs(5)).await;
        assert_eq!(
            gate.state(),
            GateState::Redirecting {
                seconds_remaining: 0
            }
        );
        let visits = navigator.visits.lock().unwrap();
        assert_eq!(visits.len(), 1);
        assert_eq!(visits[0].as_str(), "https://example.com/x");
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_now_bypasses_countdown() {
        let navigator = Arc::new(RecordingNavigator::default());
        let gate = gate_with(navigator.clone(), "?to=https://example.com/x");
        gate.start("#mount").await.unwrap();
        gate.handle_widget_event(WidgetEvent::Token("tok".into()), Utc::now())
            .await
            .unwrap();

        sleep(Duration::from_millis(1_500)).await;
        gate.redirect_now();
        assert_eq!(navigator.visits.lock().unwrap().len(), 1);

        // The aborted countdown must not navigate a second time.
        sleep(Duration::from_secs(6)).await;
        assert_eq!(navigator.visits.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_window_drops_excess_signals() {
        let navigator = Arc::new(RecordingNavigator::default());
        let gate = gate_with(navigator, "?to=https://example.com/x");

        let start = Utc::now();
        {
            let mut window = gate.successes.lock().unwrap();
            for i in 0..5 {
                assert!(window.try_record(start + chrono::Duration::milliseconds(i)));
            }
        }

        // Sixth success inside the window is dropped with no transition.
        assert!(!gate.on_verification_success(start + chrono::Duration::milliseconds(10)));
        assert_eq!(gate.state(), GateState::Challenge);

        // Once the oldest entries fall out of the hour, successes flow again.
        let later = start + chrono::Duration::milliseconds(SUCCESS_WINDOW_MS + 50);
        assert!(gate.on_verification_success(later));
        assert!(matches!(gate.state(), GateState::Redirecting { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn behavioural_trip_denies_mid_session() {
        let navigator = Arc::new(RecordingNavigator::default());
        let gate = gate_with(navigator, "?to=https://example.com/x");
        gate.start("#mount").await.unwrap();

        let now = Utc::now() + chrono::Duration::milliseconds(1_000);
        for _ in 0..200 {
            gate.record_input(InputEvent::PointerMove, now);
        }
        assert!(matches!(gate.state(), GateState::Denied { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_stops_countdown() {
        let navigator = Arc::new(RecordingNavigator::default());
        let gate = gate_with(navigator.clone(), "?to=https://example.com/x");
        gate.start("#mount").await.unwrap();
        gate.handle_widget_event(WidgetEvent::Token("tok".into()), Utc::now())
            .await
            .unwrap();

        gate.teardown().await;
        sleep(Duration::from_secs(10)).await;
        assert!(navigator.visits.lock().unwrap().is_empty());
    }
}
