use std::path::{Path, PathBuf};

/// Finds the segmentation mask belonging to an instance image, if there is one.
pub trait MaskResolver {
    fn resolve(&self, instance: &Path) -> Option<PathBuf>;
}

/// Resolver for runs without instance masks; every instance is pasted opaquely.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMasks;

impl MaskResolver for NoMasks {
    fn resolve(&self, _instance: &Path) -> Option<PathBuf> {
        None
    }
}

const MASK_TOKENS: [&str; 3] = ["", "mask", "_mask"];
const MASK_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Looks for the mask in a `masks/` folder beside the instance's `images/` folder.
///
/// For `<cat>/images/P008.png` the candidates are `<cat>/masks/P008.{jpg,jpeg,png}`,
/// then `P008mask.*`, then `P008_mask.*`. A `mask` or `_mask` token already in
/// the instance name is stripped first.
#[derive(Clone, Debug)]
pub struct SiblingMaskFolder {
    folder_name: String,
}

impl Default for SiblingMaskFolder {
    fn default() -> Self {
        Self {
            folder_name: "masks".to_string(),
        }
    }
}

impl SiblingMaskFolder {
    pub fn new(folder_name: impl Into<String>) -> Self {
        Self {
            folder_name: folder_name.into(),
        }
    }

    /// Candidate paths in lookup order.
    pub fn candidates(&self, instance: &Path) -> Vec<PathBuf> {
        let Some(stem) = instance.file_stem().and_then(|s| s.to_str()) else {
            return Vec::new();
        };
        let images_dir = instance.parent().unwrap_or_else(|| Path::new(""));
        let mask_dir = images_dir
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&self.folder_name);

        let base = mask_base_name(stem);
        let mut out = Vec::with_capacity(MASK_TOKENS.len() * MASK_EXTENSIONS.len());
        for token in MASK_TOKENS {
            for ext in MASK_EXTENSIONS {
                out.push(mask_dir.join(format!("{base}{token}.{ext}")));
            }
        }
        out
    }
}

impl MaskResolver for SiblingMaskFolder {
    fn resolve(&self, instance: &Path) -> Option<PathBuf> {
        self.candidates(instance).into_iter().find(|p| p.is_file())
    }
}

fn mask_base_name(stem: &str) -> String {
    if stem.contains("_mask") {
        stem.replace("_mask", "")
    } else {
        stem.replace("mask", "")
    }
}
