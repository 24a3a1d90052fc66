use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::DataError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
	pub name: String,
	#[serde(alias = "star")]
	pub tier: i64,
	/// Keywords that must all be visible for this entry to match.
	pub essences: Vec<String>,
}

/// Read-only list of entries and the essences each one requires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
	#[serde(alias = "gameVersion")]
	pub version: String,
	#[serde(alias = "weapons")]
	pub entries: Vec<CatalogEntry>,
}

impl Catalog {
	pub fn from_json(text: &str) -> Result<Self, DataError> {
		Ok(serde_json::from_str::<Self>(text)?.checked())
	}

	pub fn try_load(path: impl AsRef<Path>) -> Result<Self, DataError> {
		let path = path.as_ref();
		let file = File::open(path).map_err(|source| DataError::Read {
			path: path.to_owned(),
			source,
		})?;
		let catalog: Self = serde_json::from_reader(BufReader::new(file)).map_err(|source| DataError::Parse {
			path: path.to_owned(),
			source,
		})?;
		Ok(catalog.checked())
	}

	/// Like [`Catalog::try_load`], but any failure yields an empty catalog.
	pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
		match Self::try_load(path.as_ref()) {
			Ok(catalog) => {
				log::info!(
					"loaded catalog {:?} with {} entries",
					catalog.version,
					catalog.entries.len()
				);
				catalog
			}
			Err(err) => {
				log::warn!("catalog unavailable, every scan will be invalid: {err}");
				Self::default()
			}
		}
	}

	/// Drops duplicate names (first one wins) and warns about entries that
	/// require nothing. Those are kept as they are.
	fn checked(mut self) -> Self {
		let mut seen = HashSet::new();
		self.entries.retain(|entry| {
			if !seen.insert(entry.name.to_lowercase()) {
				log::warn!("duplicate catalog entry {:?} ignored", entry.name);
				return false;
			}
			if entry.essences.is_empty() {
				log::warn!("catalog entry {:?} requires no essences; it matches whenever anything is recognized", entry.name);
			}
			true
		});
		self
	}

	pub fn entries(&self) -> &[CatalogEntry] {
		&self.entries
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn vocabulary(&self) -> Vocabulary {
		Vocabulary::from_catalog(self)
	}

	/// Resolve a user-typed entry name.
	///
	/// An exact case-insensitive match wins, otherwise the entry with the
	/// smallest edit distance, as long as that distance is at most half the
	/// typed length.
	pub fn closest_name(&self, name: &str) -> Option<&str> {
		let name = name.trim();
		if name.is_empty() {
			return None;
		}
		let lower = name.to_lowercase();
		if let Some(entry) = self.entries.iter().find(|e| e.name.to_lowercase() == lower) {
			return Some(&entry.name);
		}

		let (entry, distance) = self
			.entries
			.iter()
			.map(|e| (e, levenshtein::levenshtein(&lower, &e.name.to_lowercase())))
			.min_by_key(|(_, distance)| *distance)?;

		if distance > name.chars().count() / 2 {
			return None;
		}
		Some(&entry.name)
	}
}

/// Distinct essence keywords of a catalog, in first-seen order.
///
/// Comparison is case-insensitive; the first spelling seen is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
	keywords: Vec<String>,
}

impl Vocabulary {
	pub fn from_catalog(catalog: &Catalog) -> Self {
		Self::from_keywords(catalog.entries.iter().flat_map(|e| e.essences.iter()))
	}

	pub fn from_keywords<S: AsRef<str>>(keywords: impl IntoIterator<Item = S>) -> Self {
		let mut seen = HashSet::new();
		let mut out = Vec::new();
		for keyword in keywords {
			let keyword = keyword.as_ref();
			if seen.insert(keyword.to_lowercase()) {
				out.push(keyword.to_string());
			}
		}
		Self { keywords: out }
	}

	pub fn keywords(&self) -> &[String] {
		&self.keywords
	}

	pub fn contains(&self, keyword: &str) -> bool {
		let keyword = keyword.to_lowercase();
		self.keywords.iter().any(|k| k.to_lowercase() == keyword)
	}

	pub fn len(&self) -> usize {
		self.keywords.len()
	}

	pub fn is_empty(&self) -> bool {
		self.keywords.is_empty()
	}
}
