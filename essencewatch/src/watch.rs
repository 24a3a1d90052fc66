//! Change notifications for single files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Keeps the file watcher alive. Dropping it stops notifications.
pub struct FileWatcher {
	_watcher: RecommendedWatcher,
}

/// Call `on_change` whenever the file at `path` is created, written, replaced
/// or removed. One write may produce several calls.
///
/// The parent directory is watched so editors and atomic saves that go through
/// a rename are still seen.
pub fn watch_file(path: &Path, on_change: impl Fn() + Send + 'static) -> Result<FileWatcher> {
	let dir = path
		.parent()
		.filter(|p| !p.as_os_str().is_empty())
		.map(Path::to_path_buf)
		.unwrap_or_else(|| PathBuf::from("."));
	fs::create_dir_all(&dir).with_context(|| format!("create {:?}", dir))?;

	let file_name = path.file_name().map(|n| n.to_os_string());
	let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
		Ok(event) => {
			let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
				&& event.paths.iter().any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
			if relevant {
				on_change();
			}
		}
		Err(err) => tracing::warn!(error = %err, "file watcher error"),
	})
	.context("create file watcher")?;

	watcher
		.watch(&dir, RecursiveMode::NonRecursive)
		.with_context(|| format!("watch {:?}", dir))?;
	Ok(FileWatcher { _watcher: watcher })
}

#[cfg(test)]
mod tests {
	use std::sync::mpsc;
	use std::time::Duration;

	use super::*;

	#[test]
	fn only_the_watched_file_triggers() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let path = dir.path().join("owned.json");

		let (tx, rx) = mpsc::channel();
		let _watcher = watch_file(&path, move || {
			let _ = tx.send(());
		})?;

		fs::write(dir.path().join("owned.json.bak"), "[]")?;
		assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());

		// Written the way the ownership store saves: temp file, then rename.
		fs::write(dir.path().join("owned.json.tmp"), "[\"E1\"]")?;
		fs::rename(dir.path().join("owned.json.tmp"), &path)?;
		assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
		Ok(())
	}
}
