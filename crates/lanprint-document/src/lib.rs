// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// lanprint-document: Payload preparation for the lanprint dispatcher.
//
// Decodes image payloads into flat RGB buffers and encodes them into the
// uncompressed PWG raster wire format used as the universal fallback when a
// printer's own format support is unknown.

pub mod image;
pub mod raster;

pub use self::image::processor::{ImageProcessor, RgbPixels};
pub use self::raster::encoder::{RasterOptions, encode_raster};

use lanprint_core::error::Result;

/// Decode an encoded image (PNG, JPEG, ...) and encode it as one raster page.
pub fn rasterize_image(data: &[u8], options: &RasterOptions) -> Result<Vec<u8>> {
    let pixels = ImageProcessor::from_bytes(data)?.to_rgb_pixels();
    encode_raster(&pixels.data, pixels.width, pixels.height, options)
}
