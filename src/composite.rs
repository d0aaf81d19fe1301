use std::path::Path;

use anyhow::Context as _;
use image::{GrayImage, ImageBuffer, Luma, Pixel, Rgb, RgbImage};

use crate::{
    config::MaskChannels,
    foundation::{
        core::{PixelPos, PixelSize, Quad},
        error::{PasteError, PasteResult},
    },
};

/// Mask values at or above this count as inside the object.
pub const STENCIL_THRESHOLD: u8 = 128;

/// How the pasted rectangle is filtered.
#[derive(Clone, Copy, Debug)]
pub enum Stencil<'a> {
    /// Only pixels where the mask is active are copied.
    Mask(&'a GrayImage),
    /// The whole rectangle is overwritten.
    Opaque,
}

impl Stencil<'_> {
    fn is_active(&self, x: u32, y: u32) -> bool {
        match self {
            Self::Mask(m) => m.get_pixel(x, y).0[0] >= STENCIL_THRESHOLD,
            Self::Opaque => true,
        }
    }
}

/// Paste `src` onto `dst` with its top-left corner at `top_left`.
///
/// Only pixels inside the pasted rectangle are written. Returns the rectangle
/// as a clockwise quad anchored at `top_left`.
pub fn paste<P: Pixel>(
    src: &ImageBuffer<P, Vec<P::Subpixel>>,
    dst: &mut ImageBuffer<P, Vec<P::Subpixel>>,
    top_left: PixelPos,
    stencil: Stencil<'_>,
) -> PasteResult<Quad> {
    let size = PixelSize::of(src);
    let dst_size = PixelSize::of(&*dst);
    let fits = top_left
        .x
        .checked_add(size.width)
        .is_some_and(|r| r <= dst_size.width)
        && top_left
            .y
            .checked_add(size.height)
            .is_some_and(|b| b <= dst_size.height);
    if !fits {
        return Err(PasteError::Other(anyhow::anyhow!(
            "paste of {}x{} at ({}, {}) leaves the {}x{} destination",
            size.width,
            size.height,
            top_left.x,
            top_left.y,
            dst_size.width,
            dst_size.height
        )));
    }
    if let Stencil::Mask(m) = stencil {
        if m.dimensions() != src.dimensions() {
            return Err(PasteError::DimensionMismatch {
                image: src.dimensions(),
                mask: m.dimensions(),
            });
        }
    }

    for (x, y, px) in src.enumerate_pixels() {
        if stencil.is_active(x, y) {
            dst.put_pixel(top_left.x + x, top_left.y + y, *px);
        }
    }

    Ok(Quad::from_rect(top_left, size))
}

/// Full-image segmentation mask accumulated over every placed instance.
#[derive(Clone, Debug)]
pub enum MaskCanvas {
    Gray(GrayImage),
    Rgb(RgbImage),
}

impl MaskCanvas {
    /// All-black canvas of the background's size.
    pub fn new(size: PixelSize, channels: MaskChannels) -> Self {
        match channels {
            MaskChannels::Gray => Self::Gray(GrayImage::new(size.width, size.height)),
            MaskChannels::Rgb => Self::Rgb(RgbImage::new(size.width, size.height)),
        }
    }

    pub fn size(&self) -> PixelSize {
        match self {
            Self::Gray(img) => PixelSize::of(img),
            Self::Rgb(img) => PixelSize::of(img),
        }
    }

    /// Mark an instance of `size` placed at `top_left` in white.
    pub fn stamp(
        &mut self,
        size: PixelSize,
        top_left: PixelPos,
        stencil: Stencil<'_>,
    ) -> PasteResult<Quad> {
        match self {
            Self::Gray(canvas) => {
                let white = GrayImage::from_pixel(size.width, size.height, Luma([255]));
                paste(&white, canvas, top_left, stencil)
            }
            Self::Rgb(canvas) => {
                let white = RgbImage::from_pixel(size.width, size.height, Rgb([255, 255, 255]));
                paste(&white, canvas, top_left, stencil)
            }
        }
    }

    pub fn save(&self, path: &Path) -> PasteResult<()> {
        let res = match self {
            Self::Gray(img) => img.save_with_format(path, image::ImageFormat::Png),
            Self::Rgb(img) => img.save_with_format(path, image::ImageFormat::Png),
        };
        res.with_context(|| format!("write mask png '{}'", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;

    #[test]
    fn opaque_paste_overwrites_rectangle_only() {
        let mut dst = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let src = RgbaImage::from_pixel(3, 2, Rgba([255, 0, 0, 255]));
        let quad = paste(&src, &mut dst, PixelPos::new(4, 5), Stencil::Opaque).unwrap();

        assert_eq!(quad.0, [4.0, 5.0, 7.0, 5.0, 7.0, 7.0, 4.0, 7.0]);
        for (x, y, px) in dst.enumerate_pixels() {
            let inside = (4..7).contains(&x) && (5..7).contains(&y);
            let expected = if inside { [255, 0, 0, 255] } else { [0, 0, 0, 255] };
            assert_eq!(px.0, expected, "pixel ({x}, {y})");
        }
    }

    #[test]
    fn masked_paste_copies_active_pixels_only() {
        let mut dst = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        let src = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 255]));
        let mut mask = GrayImage::new(2, 2);
        mask.put_pixel(0, 0, Luma([255]));
        mask.put_pixel(1, 1, Luma([STENCIL_THRESHOLD]));
        mask.put_pixel(1, 0, Luma([STENCIL_THRESHOLD - 1]));

        paste(&src, &mut dst, PixelPos::new(1, 1), Stencil::Mask(&mask)).unwrap();

        assert_eq!(dst.get_pixel(1, 1).0, [200, 100, 50, 255]);
        assert_eq!(dst.get_pixel(2, 2).0, [200, 100, 50, 255]);
        assert_eq!(dst.get_pixel(2, 1).0, [9, 9, 9, 255]);
        assert_eq!(dst.get_pixel(1, 2).0, [9, 9, 9, 255]);
        assert_eq!(dst.get_pixel(0, 0).0, [9, 9, 9, 255]);
    }

    #[test]
    fn out_of_bounds_paste_is_rejected() {
        let mut dst = RgbaImage::new(4, 4);
        let src = RgbaImage::new(3, 3);
        assert!(paste(&src, &mut dst, PixelPos::new(2, 0), Stencil::Opaque).is_err());
        assert!(paste(&src, &mut dst, PixelPos::new(1, 1), Stencil::Opaque).is_ok());
    }

    #[test]
    fn stencil_size_must_match_source() {
        let mut dst = RgbaImage::new(4, 4);
        let src = RgbaImage::new(2, 2);
        let mask = GrayImage::new(3, 2);
        let err = paste(&src, &mut dst, PixelPos::new(0, 0), Stencil::Mask(&mask)).unwrap_err();
        assert!(matches!(err, PasteError::DimensionMismatch { .. }));
    }

    #[test]
    fn mask_canvas_accumulates_stamps() {
        let mut canvas = MaskCanvas::new(PixelSize::new(6, 6), MaskChannels::Gray);
        canvas
            .stamp(PixelSize::new(2, 2), PixelPos::new(0, 0), Stencil::Opaque)
            .unwrap();
        let mut mask = GrayImage::new(2, 2);
        mask.put_pixel(1, 1, Luma([255]));
        canvas
            .stamp(PixelSize::new(2, 2), PixelPos::new(4, 4), Stencil::Mask(&mask))
            .unwrap();

        let MaskCanvas::Gray(img) = &canvas else {
            panic!("expected gray canvas");
        };
        let white: Vec<(u32, u32)> = img
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] == 255)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(white, vec![(0, 0), (1, 0), (0, 1), (1, 1), (5, 5)]);
    }

    #[test]
    fn rgb_mask_canvas_starts_black() {
        let canvas = MaskCanvas::new(PixelSize::new(3, 2), MaskChannels::Rgb);
        assert_eq!(canvas.size(), PixelSize::new(3, 2));
        let MaskCanvas::Rgb(img) = canvas else {
            panic!("expected rgb canvas");
        };
        assert!(img.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn rgb_mask_canvas_stamps_white_and_saves() {
        let mut canvas = MaskCanvas::new(PixelSize::new(5, 4), MaskChannels::Rgb);
        canvas
            .stamp(PixelSize::new(2, 1), PixelPos::new(0, 0), Stencil::Opaque)
            .unwrap();
        let mut mask = GrayImage::new(2, 2);
        mask.put_pixel(0, 1, Luma([200]));
        mask.put_pixel(1, 0, Luma([STENCIL_THRESHOLD - 1]));
        canvas
            .stamp(PixelSize::new(2, 2), PixelPos::new(3, 2), Stencil::Mask(&mask))
            .unwrap();

        let MaskCanvas::Rgb(img) = &canvas else {
            panic!("expected rgb canvas");
        };
        let white: Vec<(u32, u32)> = img
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0 == [255, 255, 255])
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(white, vec![(0, 0), (1, 0), (3, 3)]);
        assert!(img.pixels().all(|p| p.0 == [255, 255, 255] || p.0 == [0, 0, 0]));

        let dir = std::path::PathBuf::from("target").join("mask_canvas_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rgb.png");
        canvas.save(&path).unwrap();
        let back = image::open(&path).unwrap();
        assert_eq!(back.color(), image::ColorType::Rgb8);
        assert_eq!(back.to_rgb8(), *img);
    }
}
