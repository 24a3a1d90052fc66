//! Image primitives.
//!
//! A capture arrives as a tightly packed RGBA buffer (`Capture`). Everything
//! downstream works on a single-channel `Frame`, which is derived once per
//! cycle and then shared by the change gate and the matcher.

use std::io::Cursor;

use anyhow::{Context, Result};
use image::{GrayImage, ImageFormat, RgbaImage};

/// Owned RGBA capture, exactly as the frame source produced it.
#[derive(Clone, Debug)]
pub struct Capture {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Capture {
    /// Build a `Capture` from RGBA bytes.
    ///
    /// The buffer is expected to be tightly packed: `width * height * 4` bytes.
    /// A trailing partial row is dropped.
    pub fn from_rgba(width: u32, bytes: &[u8]) -> Self {
        let height = if width == 0 {
            0
        } else {
            (bytes.len() / width as usize / 4) as u32
        };
        let len = width as usize * height as usize * 4;

        Self {
            width,
            height,
            data: bytes[..len].to_vec(),
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }

    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Convert to the normalized single-channel frame (luma).
    pub fn to_frame(&self) -> Frame {
        let mut out = GrayImage::new(self.width, self.height);
        for (dst, px) in out.iter_mut().zip(self.data.chunks_exact(4)) {
            *dst = luma(px[0], px[1], px[2]);
        }
        Frame(out)
    }

    /// Encode the capture as PNG bytes (diagnostics only).
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let img = RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .context("RgbaImage::from_raw failed")?;
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png)
            .context("encode png")?;
        Ok(bytes.into_inner())
    }
}

/// Compute luma (grayscale intensity), same weights as OpenCV's BGR2GRAY.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let r = r as u32;
    let g = g as u32;
    let b = b as u32;
    ((299 * r + 587 * g + 114 * b) / 1000) as u8
}

// ----------

/// Single-channel frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame(GrayImage);

impl Frame {
    pub fn new(image: GrayImage) -> Self {
        Self(image)
    }

    /// Build a frame from raw luma bytes. Returns `None` if the buffer is too short.
    pub fn from_luma(width: u32, height: u32, bytes: Vec<u8>) -> Option<Self> {
        GrayImage::from_raw(width, height, bytes).map(Self)
    }

    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    /// Mean absolute per-pixel difference on a 0-255 scale.
    ///
    /// Returns `None` when the frames differ in size; callers treat that as a change.
    pub fn mean_abs_diff(&self, other: &Frame) -> Option<f64> {
        if self.0.dimensions() != other.0.dimensions() {
            return None;
        }

        let a = self.0.as_raw();
        let b = other.0.as_raw();
        if a.is_empty() {
            return Some(0.0);
        }

        let sum: u64 = a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| x.abs_diff(y) as u64)
            .sum();
        Some(sum as f64 / a.len() as f64)
    }
}
