use std::path::PathBuf;

mod catalog;
pub use catalog::*;
mod category;
pub use category::*;
mod essence;
pub use essence::*;
pub mod hangul;
mod ownership;
pub use ownership::*;
mod snap;
pub use snap::*;

#[derive(Debug, thiserror::Error)]
pub enum DataError {
	#[error("read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("write {}: {source}", path.display())]
	Write {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("parse {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
	#[error(transparent)]
	Json(#[from] serde_json::Error),
}
