//! Capture settings as stored by the host.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::identify::SubstringIdentifier;

/// Env var forcing the one-shot debug path.
pub const DEBUG_CAPTURE_ENV: &str = "PASSTAP_DEBUG_CAPTURE";
/// Env var overriding the pass identifier tag.
pub const PASS_TAG_ENV: &str = "PASSTAP_PASS_TAG";

/// Which end-of-pass strategy an activation installs. Switching takes effect
/// on the next init.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Copy every target pass into the persistent buffer.
    #[default]
    Realtime,
    /// Read back a single pass and present it, then disarm.
    DebugOneShot,
}

/// Runtime configuration for the capture service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub mode: CaptureMode,
    /// Host-side on-screen mirror of the buffer. Not used by the core.
    pub mirror_preview: bool,
    pub identifier: SubstringIdentifier,
    /// Where the default debug presenter writes PNGs.
    pub debug_output_dir: PathBuf,
    /// Pixel density used when the host does not report one.
    pub resolution: f32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Realtime,
            mirror_preview: false,
            identifier: SubstringIdentifier::default(),
            debug_output_dir: std::env::temp_dir().join("passtap"),
            resolution: 1.0,
        }
    }
}

impl CaptureSettings {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `PASSTAP_DEBUG_CAPTURE` and `PASSTAP_PASS_TAG` if set.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`, keyed by the env var names.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if lookup(DEBUG_CAPTURE_ENV).is_some_and(|v| v != "0" && !v.is_empty()) {
            self.mode = CaptureMode::DebugOneShot;
        }
        if let Some(tag) = lookup(PASS_TAG_ENV).filter(|tag| !tag.is_empty()) {
            self.identifier.tag = tag;
        }
        self
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}
