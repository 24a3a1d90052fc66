//! Capture region document and change notifications for it.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::watch::{FileWatcher, watch_file};

/// Screen rectangle in device pixels, written by the calibration tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRegion {
	#[serde(alias = "Left")]
	pub left: i32,
	#[serde(alias = "Top")]
	pub top: i32,
	#[serde(alias = "Width")]
	pub width: i32,
	#[serde(alias = "Height")]
	pub height: i32,
	#[serde(default, alias = "GameWindowTitle", skip_serializing_if = "Option::is_none")]
	pub game_window_title: Option<String>,
}

impl CaptureRegion {
	pub fn is_empty(&self) -> bool {
		self.width <= 0 || self.height <= 0
	}

	pub fn try_load(path: &Path) -> Result<Self> {
		let json = fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
		serde_json::from_str(&json).with_context(|| format!("parse {:?}", path))
	}

	/// A missing or broken document gives an empty region; every capture is
	/// then skipped until a valid one shows up.
	pub fn load_or_default(path: &Path) -> Self {
		match Self::try_load(path) {
			Ok(region) => region,
			Err(err) => {
				tracing::warn!(error = %format!("{err:#}"), "no usable capture region");
				Self::default()
			}
		}
	}
}

/// Call `on_change` with the reloaded region whenever the document at `path`
/// is written, replaced or removed.
pub fn watch(path: &Path, on_change: impl Fn(CaptureRegion) + Send + 'static) -> Result<FileWatcher> {
	let target = path.to_path_buf();
	watch_file(path, move || {
		tracing::debug!(path = %target.display(), "capture region changed");
		on_change(CaptureRegion::load_or_default(&target));
	})
}
