//! Bot-likelihood heuristics.
//!
//! A fixed battery of static signals is evaluated once against a snapshot of
//! the host environment; behavioural signals (input cadence) are then fed in
//! continuously. Any confirmed signal is terminal for the session. The engine
//! never errors: a missing environment API is itself treated as a headless
//! indicator.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Pointer-move events per second beyond which input is considered scripted.
const MAX_POINTER_RATE: f64 = 50.0;
/// Key-press events per second beyond which input is considered scripted.
const MAX_KEY_RATE: f64 = 20.0;

const MIN_SCREEN_WIDTH: u32 = 100;
const MIN_SCREEN_HEIGHT: u32 = 100;

pub const REASON_POINTER: &str = "Suspicious mouse movement pattern";
pub const REASON_KEYBOARD: &str = "Suspicious keyboard activity";

static BOT_UA_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"bot|crawler|spider|crawling")
        .case_insensitive(true)
        .build()
        .expect("invalid bot user-agent regex")
});

/// Static signals, in the fixed order they are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotSignal {
    /// Automation-driver marker (`navigator.webdriver`).
    Webdriver,
    /// Empty language list or primary language mismatch.
    Headless,
    /// Known automation-framework globals present on the page.
    Automation,
    /// Viewport below the minimum plausible dimensions.
    Screen,
    /// Navigation-timing origin reported as zero.
    Timing,
    /// User-agent string matching a crawler pattern.
    UserAgent,
}

impl BotSignal {
    fn name(self) -> &'static str {
        match self {
            BotSignal::Webdriver => "webdriver",
            BotSignal::Headless => "headless",
            BotSignal::Automation => "automation",
            BotSignal::Screen => "screen",
            BotSignal::Timing => "timing",
            BotSignal::UserAgent => "userAgent",
        }
    }
}

const STATIC_SIGNALS: [BotSignal; 6] = [
    BotSignal::Webdriver,
    BotSignal::Headless,
    BotSignal::Automation,
    BotSignal::Screen,
    BotSignal::Timing,
    BotSignal::UserAgent,
];

/// Snapshot of the host environment taken at load time.
///
/// The host supplies whatever it can observe; fields it cannot populate keep
/// their defaults, which read as headless/automated rather than as errors.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentProbe {
    pub webdriver: bool,
    pub languages: Vec<String>,
    pub primary_language: Option<String>,
    pub automation_globals: bool,
    pub screen_width: u32,
    pub screen_height: u32,
    pub navigation_start_ms: i64,
    pub user_agent: String,
}

impl EnvironmentProbe {
    fn signal_fires(&self, signal: BotSignal) -> bool {
        match signal {
            BotSignal::Webdriver => self.webdriver,
            BotSignal::Headless => {
                self.languages.is_empty()
                    || self.primary_language.as_deref() != Some(self.languages[0].as_str())
            }
            BotSignal::Automation => self.automation_globals,
            BotSignal::Screen => {
                self.screen_width < MIN_SCREEN_WIDTH || self.screen_height < MIN_SCREEN_HEIGHT
            }
            BotSignal::Timing => self.navigation_start_ms == 0,
            BotSignal::UserAgent => BOT_UA_RE.is_match(&self.user_agent),
        }
    }
}

/// Outcome of a heuristics pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BotVerdict {
    pub is_bot: bool,
    pub reason: Option<String>,
}

impl BotVerdict {
    fn human() -> Self {
        Self::default()
    }

    fn bot(reason: impl Into<String>) -> Self {
        Self {
            is_bot: true,
            reason: Some(reason.into()),
        }
    }
}

/// Evaluate the static battery against an environment snapshot.
///
/// Signals are checked in a fixed enumeration order; the first one that fires
/// short-circuits the rest and is terminal for the session.
pub fn inspect(probe: &EnvironmentProbe) -> BotVerdict {
    for signal in STATIC_SIGNALS {
        if probe.signal_fires(signal) {
            log::info!("static bot signal fired: {}", signal.name());
            return BotVerdict::bot(format!(
                "Suspicious activity detected: {}",
                signal.name()
            ));
        }
    }
    BotVerdict::human()
}

/// Input events fed to the behavioural monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    PointerMove,
    KeyPress,
}

/// Continuous input-cadence monitor, active after the static pass clears.
///
/// Once a verdict is reached the monitor detaches: further events are ignored
/// and `detach` is safe to call repeatedly. Re-attaching an attached monitor
/// is a no-op, so listeners are never double-registered across
/// re-initialization.
#[derive(Debug)]
pub struct BehaviorMonitor {
    loaded_at: DateTime<Utc>,
    pointer_moves: u64,
    key_presses: u64,
    attached: bool,
    verdict: BotVerdict,
}

impl BehaviorMonitor {
    pub fn new(loaded_at: DateTime<Utc>) -> Self {
        Self {
            loaded_at,
            pointer_moves: 0,
            key_presses: 0,
            attached: false,
            verdict: BotVerdict::human(),
        }
    }

    /// Begin accepting events. Idempotent.
    pub fn attach(&mut self) {
        if !self.attached && !self.verdict.is_bot {
            self.attached = true;
        }
    }

    /// Stop accepting events. Idempotent.
    pub fn detach(&mut self) {
        self.attached = false;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn verdict(&self) -> &BotVerdict {
        &self.verdict
    }

    /// Record one input event and re-evaluate the cadence thresholds.
    ///
    /// Returns the verdict after the event. Scripted input shows up as a
    /// sustained rate no human produces; bursts below the thresholds are
    /// tolerated.
    pub fn record(&mut self, event: InputEvent, now: DateTime<Utc>) -> &BotVerdict {
        if !self.attached || self.verdict.is_bot {
            return &self.verdict;
        }

        match event {
            InputEvent::PointerMove => self.pointer_moves += 1,
            InputEvent::KeyPress => self.key_presses += 1,
        }

        let elapsed_ms = (now - self.loaded_at).num_milliseconds();
        if elapsed_ms <= 0 {
            return &self.verdict;
        }

        let pointer_rate = self.pointer_moves as f64 / elapsed_ms as f64 * 1000.0;
        let key_rate = self.key_presses as f64 / elapsed_ms as f64 * 1000.0;

        if pointer_rate > MAX_POINTER_RATE {
            log::info!("behavioural bot signal fired: pointer rate {pointer_rate:.1}/s");
            self.verdict = BotVerdict::bot(REASON_POINTER);
            self.detach();
        } else if key_rate > MAX_KEY_RATE {
            log::info!("behavioural bot signal fired: key rate {key_rate:.1}/s");
            self.verdict = BotVerdict::bot(REASON_KEYBOARD);
            self.detach();
        }

        &self.verdict
    }
}
