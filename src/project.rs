use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, FixedOffset, Utc};

use crate::foundation::error::{PasteError, PasteResult};

/// Input and output folders of a copy-paste project.
///
/// ```text
/// <root>/backgrounds/*
/// <root>/instances/<category>/images/*
/// <root>/instances/<category>/masks/*      (optional)
/// <root>/output/<timestamp>/{composites,masks,labels}
/// ```
#[derive(Clone, Debug)]
pub struct ProjectLayout {
    root: PathBuf,
}

/// One instance image and the category folder it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceSource {
    pub category: String,
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct OutputDirs {
    pub composites: PathBuf,
    /// `None` when cumulative masks are disabled.
    pub masks: Option<PathBuf>,
    pub labels: PathBuf,
}

impl OutputDirs {
    /// Create (if missing) the three output folders under `base`.
    pub fn create(base: &Path, with_masks: bool) -> PasteResult<Self> {
        let composites = base.join("composites");
        let labels = base.join("labels");
        create_dir(&composites)?;
        create_dir(&labels)?;
        let masks = if with_masks {
            let dir = base.join("masks");
            create_dir(&dir)?;
            Some(dir)
        } else {
            None
        };
        Ok(Self {
            composites,
            masks,
            labels,
        })
    }
}

fn create_dir(dir: &Path) -> PasteResult<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create output dir '{}'", dir.display()))?;
    Ok(())
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn backgrounds_dir(&self) -> PathBuf {
        self.root.join("backgrounds")
    }

    pub fn instances_dir(&self) -> PathBuf {
        self.root.join("instances")
    }

    pub fn output_dir(&self, stamp: &str) -> PathBuf {
        self.root.join("output").join(stamp)
    }

    /// Background image files, sorted by path.
    pub fn backgrounds(&self) -> PasteResult<Vec<PathBuf>> {
        let dir = self.backgrounds_dir();
        let files = image_files(&dir)?;
        if files.is_empty() {
            return Err(PasteError::config(format!(
                "no background images found in '{}'",
                dir.display()
            )));
        }
        Ok(files)
    }

    /// Category folder names under `instances/`, sorted.
    pub fn categories(&self) -> PasteResult<Vec<String>> {
        let dir = self.instances_dir();
        let mut out = Vec::new();
        for entry in read_dir(&dir)? {
            if !entry.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().and_then(|n| n.to_str()) {
                out.push(name.to_string());
            }
        }
        out.sort();
        Ok(out)
    }

    /// Instance images of each category in `categories`, in category order.
    pub fn instances(&self, categories: &[String]) -> PasteResult<Vec<InstanceSource>> {
        let mut out = Vec::new();
        for category in categories {
            let dir = self.instances_dir().join(category).join("images");
            if !dir.is_dir() {
                return Err(PasteError::config(format!(
                    "instance category '{category}' has no images folder at '{}'",
                    dir.display()
                )));
            }
            out.extend(image_files(&dir)?.into_iter().map(|path| InstanceSource {
                category: category.clone(),
                path,
            }));
        }
        if out.is_empty() {
            return Err(PasteError::config(format!(
                "no instance images found under '{}'",
                self.instances_dir().display()
            )));
        }
        Ok(out)
    }
}

fn read_dir(dir: &Path) -> PasteResult<Vec<PathBuf>> {
    let rd = std::fs::read_dir(dir).with_context(|| format!("read dir '{}'", dir.display()))?;
    let mut out = Vec::new();
    for entry in rd {
        let entry = entry.with_context(|| format!("read dir entry in '{}'", dir.display()))?;
        out.push(entry.path());
    }
    out.sort();
    Ok(out)
}

/// Files in `dir` whose extension the `image` crate recognises.
fn image_files(dir: &Path) -> PasteResult<Vec<PathBuf>> {
    Ok(read_dir(dir)?
        .into_iter()
        .filter(|p| p.is_file() && image::ImageFormat::from_path(p).is_ok())
        .collect())
}

/// Output folder name: Beijing time (UTC+8) as `YYYY-MM-DD-HH-MM-SS`.
pub fn run_timestamp() -> String {
    format_timestamp(Utc::now())
}

const BEIJING_UTC_OFFSET_SECS: i32 = 8 * 3600;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

pub fn format_timestamp(now: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(BEIJING_UTC_OFFSET_SECS) {
        Some(tz) => now.with_timezone(&tz).format(TIMESTAMP_FORMAT).to_string(),
        None => now.format(TIMESTAMP_FORMAT).to_string(),
    }
}
