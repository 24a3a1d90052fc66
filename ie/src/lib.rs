mod bbox;
pub use bbox::*;
mod config;
pub use config::*;
mod frame;
pub use frame::*;
mod gate;
pub use gate::*;
mod matcher;
pub use matcher::*;
mod template;
pub use template::*;

use std::path::Path;

/// Template bank plus the matcher that searches it.
pub struct Ie {
	matcher: Matcher,
	bank: TemplateBank,
	scaled: ScaledBank,
}

impl Ie {
	pub fn new(config: MatchConfig, bank: TemplateBank) -> Self {
		let matcher = Matcher::new(config);
		let scaled = matcher.prepare(&bank);
		Self { matcher, bank, scaled }
	}

	/// Load the bank from `dir`. A missing or empty directory is not an error.
	pub fn load(config: MatchConfig, dir: impl AsRef<Path>) -> Self {
		Self::new(config, TemplateBank::load(dir))
	}

	pub fn detect(&self, frame: &Frame) -> Detection {
		self.matcher.detect(frame, &self.scaled)
	}

	/// Replace the bank with a fresh load from `dir`.
	pub fn reinitialize(&mut self, dir: impl AsRef<Path>) {
		self.bank = TemplateBank::load(dir);
		self.scaled = self.matcher.prepare(&self.bank);
	}

	pub fn bank(&self) -> &TemplateBank {
		&self.bank
	}

	pub fn config(&self) -> &MatchConfig {
		self.matcher.config()
	}
}
