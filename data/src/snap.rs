//! Fuzzy snapping of noisy keyword hits onto the catalog vocabulary.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Vocabulary, hangul};

// Everything that is neither a Hangul syllable nor whitespace.
static NOISE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"[^\x{AC00}-\x{D7A3}\s]").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
	/// Minimum similarity (0-100) for a hit to snap at all.
	pub snap_threshold: u8,
	/// Minimum similarity for a snapped keyword to be shown to the user.
	pub display_threshold: u8,
}

impl Default for SnapConfig {
	fn default() -> Self {
		Self {
			snap_threshold: 50,
			display_threshold: 60,
		}
	}
}

/// Strip everything but Hangul syllables and whitespace, then trim.
pub fn normalize(raw: &str) -> String {
	NOISE.replace_all(raw, "").trim().to_string()
}

/// Indel similarity of two strings on a 0-100 scale.
///
/// `100 * 2 * lcs / (len_a + len_b)` over chars, rounded half to even.
/// Either side empty scores 0.
pub fn ratio(a: &str, b: &str) -> u8 {
	let a: Vec<char> = a.chars().collect();
	let b: Vec<char> = b.chars().collect();
	if a.is_empty() || b.is_empty() {
		return 0;
	}

	let lcs = lcs_len(&a, &b);
	let num = 200 * lcs;
	let den = a.len() + b.len();
	let (q, r) = (num / den, num % den);
	let rounded = match (2 * r).cmp(&den) {
		std::cmp::Ordering::Less => q,
		std::cmp::Ordering::Greater => q + 1,
		std::cmp::Ordering::Equal => q + (q & 1),
	};
	rounded as u8
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
	let mut row = vec![0usize; b.len() + 1];
	for &ca in a {
		let mut diag = 0;
		for (j, &cb) in b.iter().enumerate() {
			let above = row[j + 1];
			row[j + 1] = if ca == cb { diag + 1 } else { above.max(row[j]) };
			diag = above;
		}
	}
	row[b.len()]
}

/// A hit mapped onto a vocabulary keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snap {
	pub keyword: String,
	pub score: u8,
}

/// Both views of one cycle's snapped keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapOutcome {
	/// Every accepted keyword, used for classification.
	pub matching: Vec<String>,
	/// The confident subset of `matching`, shown to the user.
	pub display: Vec<String>,
}

pub struct Snapper {
	config: SnapConfig,
	// (keyword, decomposed keyword)
	vocabulary: Vec<(String, String)>,
}

impl Snapper {
	pub fn new(vocabulary: &Vocabulary, config: SnapConfig) -> Self {
		let vocabulary = vocabulary
			.keywords()
			.iter()
			.map(|k| (k.clone(), hangul::decompose(k)))
			.collect();
		Self { config, vocabulary }
	}

	/// Best vocabulary keyword for one raw hit, whatever its score.
	///
	/// Ties go to the keyword seen first in the catalog. `None` when the hit
	/// is empty after normalization or the vocabulary is empty.
	pub fn best(&self, raw: &str) -> Option<Snap> {
		let normalized = normalize(raw);
		if normalized.is_empty() {
			return None;
		}
		let decomposed = hangul::decompose(&normalized);

		let mut best: Option<Snap> = None;
		for (keyword, jamo) in &self.vocabulary {
			let score = ratio(&decomposed, jamo);
			if best.as_ref().is_none_or(|b| score > b.score) {
				best = Some(Snap {
					keyword: keyword.clone(),
					score,
				});
			}
		}
		best
	}

	/// Snap every raw hit, keep one occurrence per keyword (highest score,
	/// first on ties) in first-appearance order.
	pub fn snap_all<S: AsRef<str>>(&self, raw_hits: &[S]) -> Vec<Snap> {
		let mut out: Vec<Snap> = Vec::new();
		for raw in raw_hits {
			let Some(snap) = self.best(raw.as_ref()) else {
				continue;
			};
			if snap.score < self.config.snap_threshold {
				log::trace!("discarding {:?}: best {:?} at {}", raw.as_ref(), snap.keyword, snap.score);
				continue;
			}
			let key = snap.keyword.to_lowercase();
			match out.iter_mut().find(|s| s.keyword.to_lowercase() == key) {
				Some(existing) if snap.score > existing.score => *existing = snap,
				Some(_) => {}
				None => out.push(snap),
			}
		}
		out
	}

	pub fn snap<S: AsRef<str>>(&self, raw_hits: &[S]) -> SnapOutcome {
		let snaps = self.snap_all(raw_hits);
		let display = snaps
			.iter()
			.filter(|s| s.score >= self.config.display_threshold)
			.map(|s| s.keyword.clone())
			.collect();
		let matching = snaps.into_iter().map(|s| s.keyword).collect();
		SnapOutcome { matching, display }
	}
}
