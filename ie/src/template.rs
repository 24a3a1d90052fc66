//! Template bank: keyword reference images loaded once from a directory tree.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::GrayImage;

const SUPPORTED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// A keyword label and its single-channel reference image.
#[derive(Debug, Clone)]
pub struct Template {
    pub keyword: String,
    pub image: GrayImage,
}

impl Template {
    pub fn new(keyword: impl Into<String>, image: GrayImage) -> Self {
        Self {
            keyword: keyword.into(),
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemplateBank {
    templates: Vec<Template>,
}

impl TemplateBank {
    pub fn new(templates: Vec<Template>) -> Self {
        Self { templates }
    }

    /// Load every reference image under `dir`, recursively.
    ///
    /// Never fails: a missing directory yields an empty bank, and any file that
    /// can't be read or decoded is skipped.
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            log::warn!("template directory {} not found; matcher will report nothing", dir.display());
            return Self::default();
        }

        let mut files = Vec::new();
        collect_files(dir, &mut files);
        // Directory iteration order is platform dependent.
        files.sort();

        let mut templates = Vec::with_capacity(files.len());
        for path in files {
            let Some(keyword) = keyword_from_path(&path) else {
                continue;
            };
            match load_gray(&path) {
                Ok(image) if image.width() > 0 && image.height() > 0 => {
                    templates.push(Template::new(keyword, image));
                }
                Ok(_) => log::debug!("skipping empty template {}", path.display()),
                Err(err) => log::debug!("skipping template {}: {err:#}", path.display()),
            }
        }

        log::info!("loaded {} templates from {}", templates.len(), dir.display());
        Self { templates }
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log::debug!("skipping unreadable directory {}: {err}", dir.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else if has_supported_extension(&path) {
            out.push(path);
        }
    }
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// File stem with `_` separators turned into spaces: `힘_증가.png` -> `힘 증가`.
pub fn keyword_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    let keyword = stem.replace('_', " ");
    let keyword = keyword.trim();
    if keyword.is_empty() {
        None
    } else {
        Some(keyword.to_string())
    }
}

fn load_gray(path: &Path) -> Result<GrayImage> {
    let image = image::open(path).with_context(|| format!("open {:?}", path))?;
    Ok(image.to_luma8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_replaces_underscores() {
        assert_eq!(
            keyword_from_path(Path::new("a/b/치명타_확률_증가.png")).as_deref(),
            Some("치명타 확률 증가")
        );
        assert_eq!(keyword_from_path(Path::new("STR+.png")).as_deref(), Some("STR+"));
        assert_eq!(keyword_from_path(Path::new("_.png")), None);
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_supported_extension(Path::new("x.PNG")));
        assert!(has_supported_extension(Path::new("x.jpeg")));
        assert!(!has_supported_extension(Path::new("x.txt")));
        assert!(!has_supported_extension(Path::new("noext")));
    }

    #[test]
    fn missing_directory_gives_empty_bank() {
        let bank = TemplateBank::load("/definitely/not/a/template/dir");
        assert!(bank.is_empty());
    }
}
