use serde::Serialize;

use crate::{Catalog, CatalogEntry, DataError, EssenceCategories, OwnershipSet, SnapConfig, SnapOutcome, Snapper, Vocabulary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchStatus {
	Invalid,
	ValidUnowned,
	ValidOwned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
	pub status: MatchStatus,
	/// Every catalog entry whose essences are all visible, in catalog order.
	pub matched_names: Vec<String>,
	/// The matched entries that aren't owned.
	pub unowned_names: Vec<String>,
	/// Required essences of the first matched entry, category sorted.
	pub matched_essences: Vec<String>,
	/// Accepted keywords, category sorted. For an invalid result only the
	/// confident ones.
	pub snapped_essences: Vec<String>,
}

impl MatchResult {
	fn invalid(snapped_essences: Vec<String>) -> Self {
		Self {
			status: MatchStatus::Invalid,
			matched_names: Vec::new(),
			unowned_names: Vec::new(),
			matched_essences: Vec::new(),
			snapped_essences,
		}
	}

	pub fn is_valid(&self) -> bool {
		self.status != MatchStatus::Invalid
	}

	/// Matched names joined for display, `None` without a match.
	pub fn matched_name(&self) -> Option<String> {
		if self.matched_names.is_empty() {
			None
		} else {
			Some(self.matched_names.join(" / "))
		}
	}
}

/// Catalog, vocabulary and ownership, and the classification over them.
pub struct EssenceMatcher {
	catalog: Catalog,
	vocabulary: Vocabulary,
	snapper: Snapper,
	categories: EssenceCategories,
	owned: OwnershipSet,
}

impl EssenceMatcher {
	pub fn new(catalog: Catalog, owned: OwnershipSet, snap: SnapConfig, categories: EssenceCategories) -> Self {
		let vocabulary = catalog.vocabulary();
		let snapper = Snapper::new(&vocabulary, snap);
		log::debug!("vocabulary has {} keywords", vocabulary.len());
		Self {
			catalog,
			vocabulary,
			snapper,
			categories,
			owned,
		}
	}

	pub fn catalog(&self) -> &Catalog {
		&self.catalog
	}

	pub fn vocabulary(&self) -> &Vocabulary {
		&self.vocabulary
	}

	pub fn owned(&self) -> &OwnershipSet {
		&self.owned
	}

	pub fn snap<S: AsRef<str>>(&self, raw_hits: &[S]) -> SnapOutcome {
		self.snapper.snap(raw_hits)
	}

	/// Snap raw keyword hits and classify the result.
	pub fn evaluate<S: AsRef<str>>(&self, raw_hits: &[S]) -> MatchResult {
		self.classify(&self.snap(raw_hits))
	}

	/// Entries whose required essences are all in `matching`.
	pub fn hits<'a>(&'a self, matching: &[String]) -> Vec<&'a CatalogEntry> {
		let matching: Vec<String> = matching.iter().map(|k| k.to_lowercase()).collect();
		self.catalog
			.entries()
			.iter()
			.filter(|entry| {
				entry
					.essences
					.iter()
					.all(|essence| matching.contains(&essence.to_lowercase()))
			})
			.collect()
	}

	pub fn classify(&self, outcome: &SnapOutcome) -> MatchResult {
		if outcome.matching.is_empty() {
			return MatchResult::invalid(self.categories.sorted(outcome.display.iter().cloned()));
		}

		let hits = self.hits(&outcome.matching);
		let Some(first) = hits.first() else {
			return MatchResult::invalid(self.categories.sorted(outcome.display.iter().cloned()));
		};

		let matched_names: Vec<String> = hits.iter().map(|e| e.name.clone()).collect();
		let unowned_names: Vec<String> = matched_names
			.iter()
			.filter(|name| !self.owned.contains(name))
			.cloned()
			.collect();
		let status = if unowned_names.is_empty() {
			MatchStatus::ValidOwned
		} else {
			MatchStatus::ValidUnowned
		};

		MatchResult {
			status,
			matched_names,
			unowned_names,
			matched_essences: self.categories.sorted(first.essences.iter().cloned()),
			snapped_essences: self.categories.sorted(outcome.matching.iter().cloned()),
		}
	}

	/// Add names to the ownership set and persist it.
	///
	/// The in-memory set is updated even when persisting fails.
	pub fn mark_owned<S: AsRef<str>>(&mut self, names: impl IntoIterator<Item = S>) -> Result<(), DataError> {
		self.owned.extend(names);
		self.owned.save()
	}

	/// Replace the ownership set and persist it.
	pub fn replace_owned<S: AsRef<str>>(&mut self, names: impl IntoIterator<Item = S>) -> Result<(), DataError> {
		self.owned.reset(names);
		self.owned.save()
	}

	/// Swap in a set that is already on disk, e.g. one reloaded after another
	/// process rewrote it. Returns `false` if nothing changed.
	pub fn set_owned(&mut self, owned: OwnershipSet) -> bool {
		if owned.names() == self.owned.names() {
			return false;
		}
		self.owned = owned;
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn outcome(matching: &[&str], display: &[&str]) -> SnapOutcome {
		SnapOutcome {
			matching: matching.iter().map(|s| s.to_string()).collect(),
			display: display.iter().map(|s| s.to_string()).collect(),
		}
	}

	fn latin_categories() -> EssenceCategories {
		EssenceCategories {
			primary: vec!["STR+".into()],
			secondary: vec!["ATK+".into(), "CRIT+".into()],
		}
	}

	fn e1_catalog() -> Catalog {
		Catalog::from_json(
			r#"{ "version": "1", "entries": [
				{ "name": "E1", "tier": 5, "essences": ["ATK+", "STR+"] },
				{ "name": "E2", "tier": 4, "essences": ["STR+", "HP+"] }
			] }"#,
		)
		.unwrap()
	}

	fn matcher(owned: &[&str]) -> EssenceMatcher {
		EssenceMatcher::new(
			e1_catalog(),
			OwnershipSet::in_memory(owned.iter().copied()),
			SnapConfig::default(),
			latin_categories(),
		)
	}

	#[test]
	fn empty_matching_set_is_invalid_with_display_only() {
		let result = matcher(&[]).classify(&outcome(&[], &["CRIT+", "STR+"]));
		assert_eq!(result.status, MatchStatus::Invalid);
		assert!(result.matched_names.is_empty());
		assert!(result.unowned_names.is_empty());
		assert!(result.matched_essences.is_empty());
		assert_eq!(result.snapped_essences, vec!["STR+", "CRIT+"]);
		assert_eq!(result.matched_name(), None);
	}

	#[test]
	fn partial_set_is_invalid() {
		let result = matcher(&[]).classify(&outcome(&["STR+", "CRIT+"], &["STR+"]));
		assert_eq!(result.status, MatchStatus::Invalid);
		assert_eq!(result.snapped_essences, vec!["STR+"]);
	}

	#[test]
	fn unowned_hit() {
		let result = matcher(&[]).classify(&outcome(&["STR+", "ATK+", "CRIT+"], &["STR+", "ATK+", "CRIT+"]));
		assert_eq!(result.status, MatchStatus::ValidUnowned);
		assert_eq!(result.matched_names, vec!["E1"]);
		assert_eq!(result.unowned_names, vec!["E1"]);
		assert_eq!(result.matched_essences, vec!["STR+", "ATK+"]);
		assert_eq!(result.snapped_essences, vec!["STR+", "ATK+", "CRIT+"]);
	}

	#[test]
	fn owned_hit() {
		let result = matcher(&["e1"]).classify(&outcome(&["STR+", "ATK+", "CRIT+"], &[]));
		assert_eq!(result.status, MatchStatus::ValidOwned);
		assert_eq!(result.matched_names, vec!["E1"]);
		assert!(result.unowned_names.is_empty());
	}

	#[test]
	fn multiple_hits_in_catalog_order() {
		let result = matcher(&["E2"]).classify(&outcome(&["HP+", "STR+", "ATK+"], &[]));
		assert_eq!(result.status, MatchStatus::ValidUnowned);
		assert_eq!(result.matched_names, vec!["E1", "E2"]);
		assert_eq!(result.unowned_names, vec!["E1"]);
		assert_eq!(result.matched_essences, vec!["STR+", "ATK+"]);
		assert_eq!(result.matched_name().as_deref(), Some("E1 / E2"));
	}

	#[test]
	fn extra_keywords_never_remove_a_hit() {
		let matcher = matcher(&[]);
		let base = vec!["STR+".to_string(), "ATK+".to_string()];
		assert_eq!(matcher.hits(&base).len(), 1);

		let mut more = base.clone();
		more.extend(["CRIT+", "DEF+", "SPD+"].map(String::from));
		assert_eq!(matcher.hits(&more).len(), 1);

		assert!(matcher.hits(&base[..1]).is_empty());
	}

	#[test]
	fn entry_without_essences_hits_any_nonempty_set() {
		let catalog = Catalog::from_json(
			r#"{ "version": "1", "entries": [
				{ "name": "Blank", "tier": 3, "essences": [] },
				{ "name": "E1", "tier": 5, "essences": ["ATK+", "STR+"] }
			] }"#,
		)
		.unwrap();
		let matcher = EssenceMatcher::new(catalog, OwnershipSet::default(), SnapConfig::default(), latin_categories());

		let result = matcher.classify(&outcome(&["CRIT+"], &[]));
		assert_eq!(result.status, MatchStatus::ValidUnowned);
		assert_eq!(result.matched_names, vec!["Blank"]);
		assert!(result.matched_essences.is_empty());

		let result = matcher.classify(&outcome(&["STR+", "ATK+"], &[]));
		assert_eq!(result.matched_names, vec!["Blank", "E1"]);

		// Nothing recognized stays invalid.
		assert_eq!(matcher.classify(&outcome(&[], &[])).status, MatchStatus::Invalid);
	}

	#[test]
	fn set_owned_swaps_without_saving() {
		let mut matcher = matcher(&[]);
		assert!(!matcher.set_owned(OwnershipSet::in_memory(Vec::<String>::new())));
		assert!(matcher.set_owned(OwnershipSet::in_memory(["E1"])));
		assert!(!matcher.set_owned(OwnershipSet::in_memory(["E1"])));

		let result = matcher.classify(&outcome(&["STR+", "ATK+"], &[]));
		assert_eq!(result.status, MatchStatus::ValidOwned);
		assert!(result.is_valid());
	}

	#[test]
	fn hit_comparison_ignores_case() {
		let matcher = matcher(&[]);
		assert_eq!(matcher.hits(&["str+".to_string(), "atk+".to_string()]).len(), 1);
	}

	#[test]
	fn empty_catalog_is_always_invalid() {
		let matcher = EssenceMatcher::new(
			Catalog::default(),
			OwnershipSet::default(),
			SnapConfig::default(),
			EssenceCategories::default(),
		);
		assert!(matcher.vocabulary().is_empty());
		assert_eq!(matcher.evaluate(&["힘 증가"]).status, MatchStatus::Invalid);
	}

	#[test]
	fn ownership_mutation_is_idempotent() {
		let mut matcher = matcher(&[]);
		matcher.mark_owned(["E1"]).unwrap();
		matcher.mark_owned(["e1", "E1"]).unwrap();
		assert_eq!(matcher.owned().names(), vec!["E1"]);

		matcher.replace_owned(["E2", "Unknown"]).unwrap();
		matcher.replace_owned(["E2", "Unknown"]).unwrap();
		assert_eq!(matcher.owned().names(), vec!["E2", "Unknown"]);
		assert_eq!(matcher.vocabulary().len(), 3);
	}

	#[test]
	fn evaluate_snaps_then_classifies() {
		let catalog = Catalog::from_json(
			r#"{ "version": "1", "entries": [
				{ "name": "Longsword", "tier": 5, "essences": ["힘 증가", "공격력 증가"] }
			] }"#,
		)
		.unwrap();
		let matcher = EssenceMatcher::new(
			catalog,
			OwnershipSet::default(),
			SnapConfig::default(),
			EssenceCategories::default(),
		);

		let result = matcher.evaluate(&["공격력 증가", "힘 증거", "다음"]);
		assert_eq!(result.status, MatchStatus::ValidUnowned);
		assert_eq!(result.matched_essences, vec!["힘 증가", "공격력 증가"]);
		assert_eq!(result.snapped_essences, vec!["힘 증가", "공격력 증가"]);
	}
}
