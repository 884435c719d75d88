// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: decode encoded images and flatten them to interleaved
// 8-bit RGB for the raster encoder.  Uses the `image` crate.

use image::{DynamicImage, GenericImageView};
use lanprint_core::error::LanprintError;
use tracing::{debug, instrument};

/// A flat, row-major, 3-channel pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbPixels {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, R G B per pixel.
    pub data: Vec<u8>,
}

/// A decoded image waiting to be reduced to RGB.
pub struct ImageProcessor {
    /// The current working image.
    image: DynamicImage,
}

impl ImageProcessor {
    /// Create a processor from raw encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, LanprintError> {
        let img = image::load_from_memory(data).map_err(|err| {
            LanprintError::Image(format!("failed to decode image: {}", err))
        })?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image: img })
    }

    /// Current image width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Current image height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Reduce the image to 3 channels.
    ///
    /// Transparent pixels are composited onto white paper rather than having
    /// their alpha dropped, so a transparent background prints as blank.
    pub fn to_rgb_pixels(&self) -> RgbPixels {
        let (width, height) = self.image.dimensions();
        let data = if self.image.color().has_alpha() {
            let rgba = self.image.to_rgba8();
            let mut out = Vec::with_capacity(width as usize * height as usize * 3);
            for pixel in rgba.pixels() {
                let [r, g, b, a] = pixel.0;
                out.push(over_white(r, a));
                out.push(over_white(g, a));
                out.push(over_white(b, a));
            }
            out
        } else {
            self.image.to_rgb8().into_raw()
        };
        RgbPixels { width, height, data }
    }
}

/// Composite one channel value with coverage `alpha` onto white.
fn over_white(channel: u8, alpha: u8) -> u8 {
    let c = channel as u32;
    let a = alpha as u32;
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}
