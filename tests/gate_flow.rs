//! End-to-end flows through the public API: challenge to redirect, denial
//! paths, and the PIN-gated configuration surface.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use url::Url;

use verigate_rs::{
    AccessSettings, ChallengeProvider, ConfigStore, DelayedAcceptVerifier, EnvironmentProbe,
    GateSettingsPatch, GateState, MemoryConfigStore, Navigator, ProviderError, RenderOptions,
    RouteError, RouteGate, RouteView, TurnstileSettings, VerificationGate, WidgetEvent,
    WidgetHandle, WidgetState,
};

#[derive(Default)]
struct FakeBrowser {
    ready_polls: AtomicU32,
    ready_after: u32,
    visits: Mutex<Vec<Url>>,
}

impl FakeBrowser {
    fn ready() -> Self {
        Self::default()
    }

    fn never_ready() -> Self {
        Self {
            ready_after: u32::MAX,
            ..Self::default()
        }
    }
}

impl ChallengeProvider for FakeBrowser {
    fn is_ready(&self) -> bool {
        self.ready_polls.fetch_add(1, Ordering::SeqCst) >= self.ready_after
    }

    fn render(&self, _mount: &str, _options: &RenderOptions) -> Result<WidgetHandle, ProviderError> {
        Ok(WidgetHandle::new("widget-1"))
    }

    fn reset(&self, _handle: &WidgetHandle) -> Result<(), ProviderError> {
        Ok(())
    }

    fn remove(&self, _handle: &WidgetHandle) -> Result<(), ProviderError> {
        Ok(())
    }
}

impl Navigator for FakeBrowser {
    fn navigate(&self, url: &Url) {
        self.visits.lock().unwrap().push(url.clone());
    }
}

fn human_probe() -> EnvironmentProbe {
    EnvironmentProbe {
        webdriver: false,
        languages: vec!["en-US".into(), "en".into()],
        primary_language: Some("en-US".into()),
        automation_globals: false,
        screen_width: 1920,
        screen_height: 1080,
        navigation_start_ms: 1_700_000_000_000,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/131.0".into(),
    }
}

fn build_gate(browser: Arc<FakeBrowser>, query: &str) -> VerificationGate {
    VerificationGate::builder()
        .with_provider(browser.clone())
        .with_navigator(browser)
        .with_verifier(Arc::new(
            DelayedAcceptVerifier::new().with_delay(Duration::ZERO),
        ))
        .with_environment(human_probe())
        .with_query_string(query)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn verified_visitor_is_redirected_after_countdown() {
    let browser = Arc::new(FakeBrowser::ready());
    let gate = build_gate(browser.clone(), "?to=https://example.com/x");

    assert_eq!(gate.state(), GateState::Challenge);
    gate.start("#mount").await.unwrap();
    assert_eq!(gate.controller().state().await, WidgetState::Ready);

    gate.handle_widget_event(WidgetEvent::Token("proof".into()), Utc::now())
        .await
        .unwrap();
    assert_eq!(
        gate.state(),
        GateState::Redirecting {
            seconds_remaining: 5
        }
    );

    tokio::time::sleep(Duration::from_secs(6)).await;
    let visits = browser.visits.lock().unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].as_str(), "https://example.com/x");
}

#[tokio::test(start_paused = true)]
async fn unavailable_provider_is_fatal_for_the_session() {
    let browser = Arc::new(FakeBrowser::never_ready());
    let gate = build_gate(browser, "?to=https://example.com/x");

    assert!(gate.start("#mount").await.is_err());
    assert_eq!(gate.controller().state().await, WidgetState::Failed);
    assert_eq!(
        gate.controller().message().await.as_deref(),
        Some("Failed to load verification widget.")
    );
    // The gate stays in the challenge state; nothing navigates.
    assert_eq!(gate.state(), GateState::Challenge);
}

#[tokio::test(start_paused = true)]
async fn default_target_from_config_store_is_used() {
    let store = Arc::new(MemoryConfigStore::new());
    store
        .set(GateSettingsPatch {
            default_target_url: Some("https://fallback.example/landing".into()),
            turnstile: Some(TurnstileSettings {
                site_key: "0x4AAAAAAB".into(),
                max_attempts: 5,
                cooldown_period_ms: 3_600_000,
            }),
            ..Default::default()
        })
        .unwrap();

    let browser = Arc::new(FakeBrowser::ready());
    let gate = VerificationGate::builder()
        .with_provider(browser.clone())
        .with_navigator(browser)
        .with_config_store(store)
        .with_environment(human_probe())
        .build()
        .unwrap();

    assert_eq!(gate.state(), GateState::Challenge);
    assert_eq!(
        gate.target().url().unwrap().as_str(),
        "https://fallback.example/landing"
    );
}

#[tokio::test(start_paused = true)]
async fn crawler_never_sees_the_challenge() {
    let browser = Arc::new(FakeBrowser::ready());
    let mut probe = human_probe();
    probe.user_agent = "Mozilla/5.0 (compatible; bingbot/2.0)".into();

    let gate = VerificationGate::builder()
        .with_provider(browser.clone())
        .with_navigator(browser)
        .with_environment(probe)
        .with_query_string("?to=https://example.com/x")
        .build()
        .unwrap();

    match gate.state() {
        GateState::Denied { reason } => {
            assert_eq!(
                reason.as_deref(),
                Some("Suspicious activity detected: userAgent")
            );
        }
        other => panic!("expected denial, got {other:?}"),
    }
}

#[test]
fn route_gate_guards_the_config_surface() {
    let store = MemoryConfigStore::new();
    let mut routes = RouteGate::new(store.get().access.clone());
    assert_eq!(routes.view(), RouteView::Redirect);

    let start = Utc::now();
    assert_eq!(
        routes.enter_config("0000", start),
        Err(RouteError::InvalidPin)
    );
    assert_eq!(routes.view(), RouteView::Redirect);

    routes
        .enter_config("4190", start + chrono::Duration::milliseconds(2_500))
        .unwrap();
    assert_eq!(routes.view(), RouteView::Config);

    // Operators can rotate the PIN through the store; re-entry uses it.
    let rotated = AccessSettings::from_pin("7312", "fresh-salt");
    store
        .set(GateSettingsPatch {
            access: Some(rotated.clone()),
            ..Default::default()
        })
        .unwrap();

    routes.leave_config();
    assert!(routes.is_config_locked());

    let mut routes = RouteGate::new(store.get().access.clone());
    let later = Utc::now();
    assert_eq!(
        routes.enter_config("4190", later),
        Err(RouteError::InvalidPin)
    );
    routes
        .enter_config("7312", later + chrono::Duration::milliseconds(2_500))
        .unwrap();
    assert_eq!(routes.view(), RouteView::Config);
}

#[test]
fn route_gate_uses_store_trait_object() {
    let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new());
    let settings = store.get();
    let mut routes = RouteGate::new(settings.access);
    assert!(routes.enter_config("4190", Utc::now()).is_ok());
}
