//! Persistent application configuration.
//!
//! Stored as JSON in a platform-appropriate config directory. One value is
//! loaded at startup and handed to each component; nothing reads it globally.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const MAX_POLL_INTERVAL_MS: u64 = 5000;

/// What a matching cycle reports beyond the result itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Emit raw keyword hits and the best ranked candidates.
    pub text: bool,
    /// Emit the captured frame as PNG bytes.
    pub image: bool,
    /// How many ranked candidates to include.
    pub top_n: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            text: false,
            image: false,
            top_n: 3,
        }
    }
}

/// On-disk configuration for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Holds `weapons.json`, `owned.json`, `calibration.json` and `templates/`.
    pub data_dir: PathBuf,

    /// Window to capture from when the region document doesn't name one.
    pub game_window_title: Option<String>,

    /// Delay between scan cycles, clamped to 100..=5000 ms.
    pub poll_interval_ms: u64,

    pub gate: ie::GateConfig,
    pub matcher: ie::MatchConfig,
    pub snap: data::SnapConfig,
    pub categories: data::EssenceCategories,
    pub diagnostics: DiagnosticsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir().unwrap_or_default().join("essencewatch"),
            game_window_title: None,
            poll_interval_ms: MIN_POLL_INTERVAL_MS,
            gate: ie::GateConfig::default(),
            matcher: ie::MatchConfig::default(),
            snap: data::SnapConfig::default(),
            categories: data::EssenceCategories::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl Config {
    /// Path to the config file.
    pub fn path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("config_dir() unavailable")?;
        Ok(base.join("essencewatch").join("config.json"))
    }

    /// Load configuration, falling back to defaults on a missing or broken file.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let loaded = match path {
            Some(path) => Self::try_load_from(path),
            None => Self::try_load(),
        };
        match loaded {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "failed to load config; using defaults");
                Self::default()
            }
        }
    }

    /// Try to load configuration from the default location.
    pub fn try_load() -> Result<Self> {
        Self::try_load_from(&Self::path()?)
    }

    pub fn try_load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        let cfg = serde_json::from_str(&json).with_context(|| format!("parse {:?}", path))?;
        Ok(cfg)
    }

    /// Save configuration to disk.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(path, json).with_context(|| format!("write {:?}", path))?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
        )
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("weapons.json")
    }

    pub fn owned_path(&self) -> PathBuf {
        self.data_dir.join("owned.json")
    }

    pub fn region_path(&self) -> PathBuf {
        self.data_dir.join("calibration.json")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.data_dir.join("templates")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_interval_is_clamped() {
        let mut cfg = Config::default();
        assert_eq!(cfg.poll_interval(), Duration::from_millis(100));

        cfg.poll_interval_ms = 10;
        assert_eq!(cfg.poll_interval(), Duration::from_millis(100));
        cfg.poll_interval_ms = 60_000;
        assert_eq!(cfg.poll_interval(), Duration::from_millis(5000));
        cfg.poll_interval_ms = 250;
        assert_eq!(cfg.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn partial_file_fills_in_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "poll_interval_ms": 300, "matcher": { "template_threshold": 0.8 }, "snap": { "display_threshold": 70 } }"#,
        )?;

        let cfg = Config::try_load_from(&path)?;
        assert_eq!(cfg.poll_interval_ms, 300);
        assert_eq!(cfg.matcher.template_threshold, 0.8);
        assert_eq!(cfg.matcher.scales.len(), 19);
        assert_eq!(cfg.snap.snap_threshold, 50);
        assert_eq!(cfg.snap.display_threshold, 70);
        assert_eq!(cfg.gate.force_rescan_ms, 2000);
        assert_eq!(cfg.diagnostics.top_n, 3);
        Ok(())
    }

    #[test]
    fn broken_file_falls_back_to_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope")?;

        assert!(Config::try_load_from(&path).is_err());
        assert_eq!(Config::load_or_default(Some(&path)), Config::default());
        Ok(())
    }

    #[test]
    fn save_then_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested/config.json");
        let cfg = Config {
            game_window_title: Some("Endfield".into()),
            ..Config::default()
        };
        cfg.save_to(&path)?;
        assert_eq!(Config::try_load_from(&path)?, cfg);
        Ok(())
    }
}
