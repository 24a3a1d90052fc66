use serde::{Deserialize, Serialize};

const PRIMARY: [&str; 5] = ["힘 증가", "민첩 증가", "의지 증가", "지능 증가", "주요 능력치 증가"];

const SECONDARY: [&str; 12] = [
	"공격력 증가",
	"생명력 증가",
	"물리 피해 증가",
	"열기 피해 증가",
	"전기 피해 증가",
	"냉기 피해 증가",
	"자연 피해 증가",
	"치명타 확률 증가",
	"오리지늄 아츠 증가",
	"궁극기 획득 효율 증가",
	"아츠 피해 증가",
	"치유 효율 증가",
];

/// Display ordering of essence keywords: primary attributes, then secondary
/// effects, then everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EssenceCategories {
	pub primary: Vec<String>,
	pub secondary: Vec<String>,
}

impl Default for EssenceCategories {
	fn default() -> Self {
		Self {
			primary: PRIMARY.iter().map(|s| s.to_string()).collect(),
			secondary: SECONDARY.iter().map(|s| s.to_string()).collect(),
		}
	}
}

impl EssenceCategories {
	pub fn tier(&self, keyword: &str) -> u8 {
		let is_in = |list: &[String]| list.iter().any(|k| k.to_lowercase() == keyword.to_lowercase());
		if is_in(&self.primary) {
			0
		} else if is_in(&self.secondary) {
			1
		} else {
			2
		}
	}

	/// Stable sort by tier.
	pub fn sort(&self, keywords: &mut [String]) {
		keywords.sort_by_key(|k| self.tier(k));
	}

	pub fn sorted(&self, keywords: impl IntoIterator<Item = String>) -> Vec<String> {
		let mut keywords: Vec<String> = keywords.into_iter().collect();
		self.sort(&mut keywords);
		keywords
	}
}
