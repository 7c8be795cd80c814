//! Image loading for the flood.
//!
//! Decodes an image file, resizes it to the requested width while keeping the
//! aspect ratio, and hands the result over as a [`PixelGrid`] of 16-bit RGBA
//! samples.

use crate::command::Rgba;
use crate::error::Result;
use image::imageops::FilterType;
use image::{ImageBuffer, Rgba as ImageRgba};
use std::path::Path;

/// Decoded image with 16-bit RGBA pixels, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
}

impl PixelGrid {
    /// Grid of the given size filled with transparent black.
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_fn(width, height, |_, _| [0; 4])
    }

    /// Build a grid by evaluating `f(x, y)` for every pixel.
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> Rgba,
    {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Build a grid from 8-bit colours, widening each channel to 16 bits.
    pub fn from_rgba8<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> [u8; 4],
    {
        Self::from_fn(width, height, |x, y| f(x, y).map(widen))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels in the bounding box.
    pub fn area(&self) -> usize {
        self.pixels.len()
    }

    /// Pixel at `(x, y)`, or `None` outside the grid.
    pub fn get(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

impl From<ImageBuffer<ImageRgba<u16>, Vec<u16>>> for PixelGrid {
    fn from(buffer: ImageBuffer<ImageRgba<u16>, Vec<u16>>) -> Self {
        let (width, height) = buffer.dimensions();
        let pixels = buffer.pixels().map(|p| p.0).collect();
        Self {
            width,
            height,
            pixels,
        }
    }
}

/// Same 8 -> 16 bit expansion the decoder uses (0xab -> 0xabab).
fn widen(c: u8) -> u16 {
    u16::from(c) * 257
}

/// Height that keeps the aspect ratio for `target_width`.
///
/// Returns 0 for a zero-width source.
pub fn scaled_height(target_width: u32, width: u32, height: u32) -> u32 {
    if width == 0 {
        return 0;
    }
    (f64::from(target_width) * f64::from(height) / f64::from(width)).round() as u32
}

/// Load an image file and resize it to `target_width`.
///
/// Any format the `image` crate can decode is accepted. A target width of zero
/// yields an empty grid.
pub fn load_and_resize<P: AsRef<Path>>(path: P, target_width: u32) -> Result<PixelGrid> {
    let path = path.as_ref();
    let decoded = image::open(path)?;

    let (width, height) = (decoded.width(), decoded.height());
    let target_height = scaled_height(target_width, width, height);
    log::info!(" - original WxH: {}x{}", width, height);
    log::info!(" - resized  WxH: {}x{}", target_width, target_height);

    if target_width == 0 || target_height == 0 {
        return Ok(PixelGrid::new(target_width, target_height));
    }

    let resized = decoded.resize_exact(target_width, target_height, FilterType::Lanczos3);
    Ok(PixelGrid::from(resized.to_rgba16()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_height_rounds() {
        assert_eq!(scaled_height(800, 1600, 900), 450);
        assert_eq!(scaled_height(100, 3, 2), 67); // 66.67
        assert_eq!(scaled_height(10, 4, 1), 3); // 2.5 rounds away from zero
        assert_eq!(scaled_height(10, 0, 5), 0);
    }

    #[test]
    fn test_grid_indexing() {
        let grid = PixelGrid::from_rgba8(3, 2, |x, y| [x as u8, y as u8, 0, 255]);
        assert_eq!(grid.area(), 6);
        assert_eq!(grid.get(2, 1), Some([2 * 257, 257, 0, 0xffff]));
        assert_eq!(grid.get(3, 0), None);
        assert_eq!(grid.get(0, 2), None);
    }

    #[test]
    fn test_new_grid_is_transparent() {
        let grid = PixelGrid::new(2, 3);
        assert_eq!(grid.area(), 6);
        assert_eq!(grid.get(1, 2), Some([0; 4]));
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(load_and_resize("/nonexistent/definitely/missing.png", 10).is_err());
    }
}
