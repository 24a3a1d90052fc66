use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::DataError;

/// Names of owned catalog entries. Case-insensitive, persisted as a sorted
/// JSON array.
///
/// Names that aren't in the catalog are kept; they simply never match.
#[derive(Debug, Clone, Default)]
pub struct OwnershipSet {
	path: Option<PathBuf>,
	// lowercase -> spelling as given
	names: HashMap<String, String>,
}

impl OwnershipSet {
	/// A set that is never written to disk.
	pub fn in_memory<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
		let mut set = Self::default();
		set.extend(names);
		set
	}

	pub fn try_load(path: impl Into<PathBuf>) -> Result<Self, DataError> {
		let path = path.into();
		let file = File::open(&path).map_err(|source| DataError::Read {
			path: path.clone(),
			source,
		})?;
		let names: Vec<String> = serde_json::from_reader(BufReader::new(file)).map_err(|source| DataError::Parse {
			path: path.clone(),
			source,
		})?;

		let mut set = Self::in_memory(names);
		set.path = Some(path);
		Ok(set)
	}

	/// Like [`OwnershipSet::try_load`], but a missing or malformed file gives
	/// an empty set that still saves to `path`.
	pub fn load_or_empty(path: impl Into<PathBuf>) -> Self {
		let path = path.into();
		match Self::try_load(&path) {
			Ok(set) => {
				log::info!("loaded {} owned entries from {}", set.len(), path.display());
				set
			}
			Err(err) => {
				if path.exists() {
					log::warn!("ownership unavailable, starting empty: {err}");
				} else {
					log::info!("no ownership file at {}, starting empty", path.display());
				}
				Self {
					path: Some(path),
					names: HashMap::new(),
				}
			}
		}
	}

	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.names.contains_key(&name.trim().to_lowercase())
	}

	pub fn len(&self) -> usize {
		self.names.len()
	}

	pub fn is_empty(&self) -> bool {
		self.names.is_empty()
	}

	/// Owned names in ordinal order.
	pub fn names(&self) -> Vec<&str> {
		let mut names: Vec<&str> = self.names.values().map(String::as_str).collect();
		names.sort_unstable();
		names
	}

	/// Add names without persisting. The first spelling of a name is kept.
	pub fn extend<S: AsRef<str>>(&mut self, names: impl IntoIterator<Item = S>) {
		for name in names {
			let name = name.as_ref().trim();
			if name.is_empty() {
				continue;
			}
			self.names
				.entry(name.to_lowercase())
				.or_insert_with(|| name.to_string());
		}
	}

	/// Replace the whole set without persisting.
	pub fn reset<S: AsRef<str>>(&mut self, names: impl IntoIterator<Item = S>) {
		self.names.clear();
		self.extend(names);
	}

	/// Rewrite the backing file with the full set.
	///
	/// Writes to a sibling temp file first and renames it over the target.
	pub fn save(&self) -> Result<(), DataError> {
		let Some(path) = &self.path else {
			return Ok(());
		};
		let write_err = |source: std::io::Error| DataError::Write {
			path: path.clone(),
			source,
		};

		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			std::fs::create_dir_all(parent).map_err(write_err)?;
		}

		let tmp = path.with_extension("json.tmp");
		let file = File::create(&tmp).map_err(write_err)?;
		let mut writer = BufWriter::new(file);
		serde_json::to_writer_pretty(&mut writer, &self.names())?;
		writer.flush().map_err(write_err)?;
		drop(writer);

		// Replace existing file (Windows-friendly).
		if std::fs::rename(&tmp, path).is_err() {
			let _ = std::fs::remove_file(path);
			std::fs::rename(&tmp, path).map_err(write_err)?;
		}
		log::debug!("saved {} owned entries to {}", self.len(), path.display());
		Ok(())
	}
}
