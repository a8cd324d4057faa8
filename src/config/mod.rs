//! Settings and configuration module
//!
//! Provides the validated settings snapshot, partial-merge updates, and the
//! pluggable persistence collaborator the gate reads through.

pub mod settings;
pub mod store;

pub use settings::{
    AccessSettings, DEFAULT_COOLDOWN_MS, DEFAULT_MAX_ATTEMPTS, GateSettings, GateSettingsPatch,
    ThemeSettings, TurnstileSettings,
};
pub use store::{ConfigError, ConfigStore, MemoryConfigStore, RedbConfigStore};
