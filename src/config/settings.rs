//! Gate settings and validation.
//!
//! Mirrors the operator-facing configuration surface: redirect defaults,
//! presentation strings, widget parameters, and the access-control secrets.
//! Partial updates are validated field by field; rejected values fall back to
//! the last known good setting rather than failing the caller.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

const MAX_TITLE_LEN: usize = 50;
const MAX_SUBTITLE_LEN: usize = 100;
const MIN_CHALLENGE_ATTEMPTS: u32 = 1;
const MAX_CHALLENGE_ATTEMPTS: u32 = 10;

/// Default cooldown window before attempt counters are forgiven (1 hour).
pub const DEFAULT_COOLDOWN_MS: i64 = 3_600_000;
/// Default cap on challenge verification attempts per cooldown window.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("invalid hex color regex"));

/// Visual theme colors applied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeSettings {
    pub primary_color: String,
    pub background_color: String,
    pub text_color: String,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self {
            primary_color: "#3B82F6".into(),
            background_color: "#F9FAFB".into(),
            text_color: "#1F2937".into(),
        }
    }
}

/// Parameters handed to the challenge widget provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnstileSettings {
    pub site_key: String,
    pub max_attempts: u32,
    /// Rolling window after which attempt counters reset, in milliseconds.
    pub cooldown_period_ms: i64,
}

impl Default for TurnstileSettings {
    fn default() -> Self {
        Self {
            site_key: "0x0000000000000000000000".into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cooldown_period_ms: DEFAULT_COOLDOWN_MS,
        }
    }
}

/// Access control for the configuration surface.
///
/// The PIN itself is never stored; only a salted SHA-256 digest is kept, and
/// guesses are rate limited with the same attempt/cooldown pattern the widget
/// controller applies to verification attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSettings {
    pub pin_salt: String,
    pub pin_hash: String,
    pub pin_max_attempts: u32,
    pub pin_cooldown_ms: i64,
}

impl AccessSettings {
    /// Build access settings from a plaintext PIN and salt.
    pub fn from_pin(pin: &str, salt: &str) -> Self {
        Self {
            pin_salt: salt.to_string(),
            pin_hash: hash_pin(salt, pin),
            pin_max_attempts: DEFAULT_MAX_ATTEMPTS,
            pin_cooldown_ms: DEFAULT_COOLDOWN_MS,
        }
    }

    /// Constant-shape comparison of a candidate PIN against the stored digest.
    pub fn matches(&self, pin: &str) -> bool {
        hash_pin(&self.pin_salt, pin) == self.pin_hash
    }
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self::from_pin("4190", "verigate")
    }
}

fn hash_pin(salt: &str, pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(pin.as_bytes());
    hex::encode(hasher.finalize())
}

/// Complete, validated settings snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSettings {
    pub default_target_url: Option<String>,
    pub header_title: String,
    pub header_subtitle: String,
    pub left_logo_url: Option<String>,
    pub right_logo_url: Option<String>,
    pub show_destination_url: bool,
    pub theme: ThemeSettings,
    pub turnstile: TurnstileSettings,
    pub access: AccessSettings,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            default_target_url: None,
            header_title: "Secure Redirect".into(),
            header_subtitle: "Please verify to continue".into(),
            left_logo_url: None,
            right_logo_url: None,
            show_destination_url: false,
            theme: ThemeSettings::default(),
            turnstile: TurnstileSettings::default(),
            access: AccessSettings::default(),
        }
    }
}

/// Partial settings update; absent fields leave the current value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateSettingsPatch {
    pub default_target_url: Option<String>,
    pub header_title: Option<String>,
    pub header_subtitle: Option<String>,
    pub left_logo_url: Option<String>,
    pub right_logo_url: Option<String>,
    pub show_destination_url: Option<bool>,
    pub theme: Option<ThemeSettings>,
    pub turnstile: Option<TurnstileSettings>,
    pub access: Option<AccessSettings>,
}

impl GateSettings {
    /// Apply a patch, keeping only the fields that validate.
    ///
    /// Invalid values are dropped with a warning and the existing value is
    /// retained, so a bad update can never leave the gate without a working
    /// configuration.
    pub fn apply_patch(&self, patch: GateSettingsPatch) -> GateSettings {
        let mut next = self.clone();

        if let Some(url) = patch.default_target_url {
            if Url::parse(&url).is_ok() {
                next.default_target_url = Some(url);
            } else {
                log::warn!("ignoring invalid default target URL");
            }
        }

        if let Some(title) = patch.header_title {
            next.header_title = truncate(&title, MAX_TITLE_LEN);
        }
        if let Some(subtitle) = patch.header_subtitle {
            next.header_subtitle = truncate(&subtitle, MAX_SUBTITLE_LEN);
        }

        if let Some(url) = patch.left_logo_url {
            if Url::parse(&url).is_ok() {
                next.left_logo_url = Some(url);
            } else {
                log::warn!("ignoring invalid left logo URL");
            }
        }
        if let Some(url) = patch.right_logo_url {
            if Url::parse(&url).is_ok() {
                next.right_logo_url = Some(url);
            } else {
                log::warn!("ignoring invalid right logo URL");
            }
        }

        if let Some(show) = patch.show_destination_url {
            next.show_destination_url = show;
        }

        if let Some(theme) = patch.theme {
            next.theme = ThemeSettings {
                primary_color: valid_color_or(&theme.primary_color, &self.theme.primary_color),
                background_color: valid_color_or(
                    &theme.background_color,
                    &self.theme.background_color,
                ),
                text_color: valid_color_or(&theme.text_color, &self.theme.text_color),
            };
        }

        if let Some(turnstile) = patch.turnstile {
            next.turnstile = TurnstileSettings {
                site_key: if turnstile.site_key.is_empty() {
                    self.turnstile.site_key.clone()
                } else {
                    turnstile.site_key
                },
                max_attempts: turnstile
                    .max_attempts
                    .clamp(MIN_CHALLENGE_ATTEMPTS, MAX_CHALLENGE_ATTEMPTS),
                cooldown_period_ms: turnstile.cooldown_period_ms.max(0),
            };
        }

        if let Some(access) = patch.access {
            if access.pin_salt.is_empty() || access.pin_hash.is_empty() {
                log::warn!("ignoring access update with empty salt or hash");
            } else {
                next.access = AccessSettings {
                    pin_salt: access.pin_salt,
                    pin_hash: access.pin_hash,
                    pin_max_attempts: access
                        .pin_max_attempts
                        .clamp(MIN_CHALLENGE_ATTEMPTS, MAX_CHALLENGE_ATTEMPTS),
                    pin_cooldown_ms: access.pin_cooldown_ms.max(0),
                };
            }
        }

        next
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

fn valid_color_or(candidate: &str, fallback: &str) -> String {
    if HEX_COLOR_RE.is_match(candidate) {
        candidate.to_string()
    } else {
        log::warn!("ignoring invalid theme color {candidate:?}");
        fallback.to_string()
    }
}
