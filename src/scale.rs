use image::{GrayImage, RgbaImage, imageops};
use rand::Rng;

use crate::{
    annotation::record::BackgroundRecord,
    composite::Stencil,
    config::ScaleConfig,
    foundation::{
        core::PixelSize,
        error::{PasteError, PasteResult},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleMode {
    /// Factor range inferred from the mean size of boxes already on the background.
    Auto,
    /// Factor range taken from configuration, relative to the largest fitting scale.
    Fallback,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleResolution {
    pub mode: ScaleMode,
    pub min_factor: f64,
    pub max_factor: f64,
    pub chosen_factor: f64,
}

impl ScaleResolution {
    pub fn apply(&self, intrinsic: PixelSize) -> PixelSize {
        PixelSize::new(
            scale_dim(intrinsic.width, self.chosen_factor),
            scale_dim(intrinsic.height, self.chosen_factor),
        )
    }
}

fn scale_dim(v: u32, factor: f64) -> u32 {
    let scaled = (f64::from(v) * factor).round();
    if scaled <= 0.0 {
        0
    } else if scaled >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        scaled as u32
    }
}

/// An instance resized for pasting, with its mask resized alongside.
#[derive(Clone, Debug)]
pub struct ScaledInstance {
    pub image: RgbaImage,
    pub mask: Option<GrayImage>,
}

impl ScaledInstance {
    pub fn size(&self) -> PixelSize {
        PixelSize::of(&self.image)
    }

    pub fn stencil(&self) -> Stencil<'_> {
        match &self.mask {
            Some(m) => Stencil::Mask(m),
            None => Stencil::Opaque,
        }
    }
}

/// Decides how large a pasted instance should be on a given background.
#[derive(Clone, Copy, Debug)]
pub struct ScaleResolver<'a> {
    config: &'a ScaleConfig,
}

impl<'a> ScaleResolver<'a> {
    pub fn new(config: &'a ScaleConfig) -> PasteResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Candidate factor bounds, unordered.
    pub fn bounds(
        &self,
        instance: PixelSize,
        background: PixelSize,
        record: &BackgroundRecord,
    ) -> (ScaleMode, f64, f64) {
        let ins_w = f64::from(instance.width);
        let ins_h = f64::from(instance.height);

        if !self.config.manual_scaling && !record.is_empty() {
            if let Some((mean_w, mean_h)) = self.reference_mean_size(record) {
                let rw = mean_w / ins_w;
                let rh = mean_h / ins_h;
                return (ScaleMode::Auto, rw.min(rh), rw.max(rh));
            }
        }

        let fit = (f64::from(background.width) / ins_w).min(f64::from(background.height) / ins_h);
        (
            ScaleMode::Fallback,
            fit * self.config.min_scaling_factor,
            fit * self.config.max_scaling_factor,
        )
    }

    /// Draw a factor for `instance` on `background`.
    ///
    /// Returns `None` for an empty instance image.
    pub fn resolve<R: Rng>(
        &self,
        instance: PixelSize,
        background: PixelSize,
        record: &BackgroundRecord,
        rng: &mut R,
    ) -> Option<ScaleResolution> {
        if instance.is_empty() {
            return None;
        }

        let (mode, b1, b2) = self.bounds(instance, background, record);
        let (min_factor, max_factor) = (b1.min(b2), b1.max(b2));
        if !min_factor.is_finite() || !max_factor.is_finite() {
            return None;
        }
        let chosen_factor = uniform_in(rng, min_factor, max_factor);
        tracing::debug!(
            ?mode,
            min_factor,
            max_factor,
            chosen_factor,
            "resolved scale"
        );

        Some(ScaleResolution {
            mode,
            min_factor,
            max_factor,
            chosen_factor,
        })
    }

    /// Target size for `instance`; fallback results are clamped to the background.
    pub fn target_size(
        &self,
        resolution: &ScaleResolution,
        instance: PixelSize,
        background: PixelSize,
    ) -> PixelSize {
        let size = resolution.apply(instance);
        match resolution.mode {
            ScaleMode::Auto => size,
            ScaleMode::Fallback => PixelSize::new(
                size.width.min(background.width),
                size.height.min(background.height),
            ),
        }
    }

    /// Resize the instance and its mask with the configured filter.
    ///
    /// The mask is scaled from its own intrinsic size by the same factor; if the
    /// two results differ the instance/mask pair is inconsistent and the run
    /// must stop.
    pub fn resize(
        &self,
        image: &RgbaImage,
        mask: Option<&GrayImage>,
        target: PixelSize,
        resolution: &ScaleResolution,
    ) -> PasteResult<ScaledInstance> {
        let filter = self.config.resample_filter.filter_type();
        let scaled = imageops::resize(image, target.width, target.height, filter);

        let scaled_mask = match mask {
            Some(m) => {
                let intrinsic = PixelSize::of(m);
                let mask_target = if intrinsic == PixelSize::of(image) {
                    target
                } else {
                    resolution.apply(intrinsic)
                };
                let resized = imageops::resize(m, mask_target.width, mask_target.height, filter);
                if resized.dimensions() != scaled.dimensions() {
                    return Err(PasteError::DimensionMismatch {
                        image: scaled.dimensions(),
                        mask: resized.dimensions(),
                    });
                }
                Some(resized)
            }
            None => None,
        };

        Ok(ScaledInstance {
            image: scaled,
            mask: scaled_mask,
        })
    }

    fn reference_mean_size(&self, record: &BackgroundRecord) -> Option<(f64, f64)> {
        let categories = match &self.config.reference_categories {
            Some(list) => list.as_slice(),
            None => record.exist_category(),
        };

        let mut total_w = 0.0;
        let mut total_h = 0.0;
        let mut n = 0usize;
        for quad in record.quads_in(categories) {
            let b = quad.bounds();
            total_w += b.width();
            total_h += b.height();
            n += 1;
        }
        if n == 0 {
            return None;
        }
        Some((total_w / n as f64, total_h / n as f64))
    }
}

fn uniform_in<R: Rng>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    if lo >= hi {
        lo
    } else {
        rng.random_range(lo..=hi)
    }
}
