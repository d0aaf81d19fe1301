use std::path::Path;

use anyhow::Context;
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage, buffer::ConvertBuffer as _};

use crate::foundation::{core::PixelSize, error::PasteResult};

/// A decoded background, kept as RGBA8 while instances are pasted onto it.
#[derive(Clone, Debug)]
pub struct BackgroundImage {
    pub rgba: RgbaImage,
    /// Whether the source carried an alpha channel; composites of opaque
    /// sources are written back as RGB.
    pub has_alpha: bool,
}

impl BackgroundImage {
    pub fn size(&self) -> PixelSize {
        PixelSize::of(&self.rgba)
    }
}

pub fn decode_background(bytes: &[u8]) -> PasteResult<BackgroundImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode background from memory")?;
    Ok(background_from_dynamic(dyn_img))
}

pub fn load_background(path: &Path) -> PasteResult<BackgroundImage> {
    let dyn_img =
        image::open(path).with_context(|| format!("decode background '{}'", path.display()))?;
    Ok(background_from_dynamic(dyn_img))
}

fn background_from_dynamic(dyn_img: DynamicImage) -> BackgroundImage {
    let has_alpha = dyn_img.color().has_alpha();
    BackgroundImage {
        rgba: dyn_img.to_rgba8(),
        has_alpha,
    }
}

pub fn load_instance(path: &Path) -> PasteResult<RgbaImage> {
    let dyn_img =
        image::open(path).with_context(|| format!("decode instance '{}'", path.display()))?;
    Ok(dyn_img.to_rgba8())
}

/// Masks are reduced to a single luma channel whatever their stored format.
pub fn load_mask(path: &Path) -> PasteResult<GrayImage> {
    let dyn_img = image::open(path).with_context(|| format!("decode mask '{}'", path.display()))?;
    Ok(dyn_img.to_luma8())
}

/// Write a composite as PNG, dropping alpha when the background had none.
pub fn save_composite(img: &RgbaImage, has_alpha: bool, path: &Path) -> PasteResult<()> {
    let res = if has_alpha {
        img.save_with_format(path, image::ImageFormat::Png)
    } else {
        let rgb: RgbImage = img.convert();
        rgb.save_with_format(path, image::ImageFormat::Png)
    };
    res.with_context(|| format!("write composite png '{}'", path.display()))?;
    Ok(())
}
