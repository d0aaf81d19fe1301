use std::{fs::File, io::BufReader, path::Path};

use anyhow::Context as _;

use crate::foundation::error::{PasteError, PasteResult};

/// Resampling kernel used when resizing instances and their masks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResampleFilter {
    Nearest,
    Triangle,
    #[default]
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl ResampleFilter {
    pub fn filter_type(self) -> image::imageops::FilterType {
        use image::imageops::FilterType;
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskChannels {
    #[default]
    Gray,
    Rgb,
}

impl MaskChannels {
    pub fn count(self) -> u8 {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
        }
    }

    pub fn from_count(n: u8) -> PasteResult<Self> {
        match n {
            1 => Ok(Self::Gray),
            3 => Ok(Self::Rgb),
            other => Err(PasteError::config(format!(
                "mask channels must be 1 or 3, got {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    /// Always use the configured factor range, even when prior boxes exist.
    pub manual_scaling: bool,
    /// Lower bound, as a fraction of the largest scale that still fits the background.
    pub min_scaling_factor: f64,
    pub max_scaling_factor: f64,
    /// Categories whose mean box size drives auto-scaling; `None` means all
    /// categories present on the background.
    pub reference_categories: Option<Vec<String>>,
    pub resample_filter: ResampleFilter,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            manual_scaling: false,
            min_scaling_factor: 0.2,
            max_scaling_factor: 0.3,
            reference_categories: None,
            resample_filter: ResampleFilter::default(),
        }
    }
}

impl ScaleConfig {
    pub fn validate(&self) -> PasteResult<()> {
        let (lo, hi) = (self.min_scaling_factor, self.max_scaling_factor);
        if !(lo > 0.0 && lo <= hi && hi <= 1.0) {
            return Err(PasteError::config(format!(
                "scaling factors must satisfy 0 < min <= max <= 1 (min={lo}, max={hi})"
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PasteConfig {
    #[serde(flatten)]
    pub scaling: ScaleConfig,
    pub max_placement_attempts: u32,
    pub min_instances_per_background: usize,
    pub max_instances_per_background: usize,
    /// Randomly keep at most this many backgrounds.
    pub background_limit: Option<usize>,
    /// Randomly keep at most this many instances.
    pub instance_limit: Option<usize>,
    /// Instance category folders to use; `None` selects every folder.
    pub instance_categories: Option<Vec<String>>,
    /// Ordered class list for normalized labels; `None` uses the selected
    /// categories in sorted order.
    pub class_index_list: Option<Vec<String>>,
    pub mask_disabled: bool,
    pub mask_channels: MaskChannels,
    pub seed: Option<u64>,
}

impl Default for PasteConfig {
    fn default() -> Self {
        Self {
            scaling: ScaleConfig::default(),
            max_placement_attempts: 1000,
            min_instances_per_background: 3,
            max_instances_per_background: 5,
            background_limit: None,
            instance_limit: None,
            instance_categories: None,
            class_index_list: None,
            mask_disabled: false,
            mask_channels: MaskChannels::default(),
            seed: None,
        }
    }
}

impl PasteConfig {
    pub fn read(path: &Path) -> PasteResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> PasteResult<()> {
        self.scaling.validate()?;
        if self.max_placement_attempts == 0 {
            return Err(PasteError::config("max_placement_attempts must be >= 1"));
        }
        if self.min_instances_per_background > self.max_instances_per_background {
            return Err(PasteError::config(format!(
                "min_instances_per_background ({}) must be <= max_instances_per_background ({})",
                self.min_instances_per_background, self.max_instances_per_background
            )));
        }
        if self.background_limit == Some(0) {
            return Err(PasteError::config("background_limit must be >= 1 when set"));
        }
        if self.instance_limit == Some(0) {
            return Err(PasteError::config("instance_limit must be >= 1 when set"));
        }
        if let Some(refs) = &self.scaling.reference_categories {
            if refs.is_empty() {
                return Err(PasteError::config(
                    "reference_categories must name at least one category when set",
                ));
            }
        }
        Ok(())
    }
}
