// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PWG raster page encoder.
//
// Output is a 4-byte sync word, a fixed 1792-byte page header, then one
// record per scanline: a repeat-count byte (always 1, no compression)
// followed by `width` interleaved RGB pixels.  All multi-byte header fields
// are big-endian 32-bit integers at fixed offsets from the start of the
// header block; every field not written below stays zero.
//
// The encoder is pure.  Identical input produces identical bytes.

use lanprint_core::error::{LanprintError, Result};
use tracing::debug;

/// Synchronisation word that opens every raster stream.
pub const SYNC_WORD: [u8; 4] = *b"RaS2";

/// Size of the page header that follows the sync word.
pub const HEADER_LEN: usize = 1792;

/// Printer points per inch, for the page-size fields.
const POINTS_PER_INCH: u64 = 72;

const CHANNELS: u32 = 3;
const BITS_PER_COLOR: u32 = 8;
const BITS_PER_PIXEL: u32 = BITS_PER_COLOR * CHANNELS;

/// `cupsColorOrder` value for chunky (interleaved) pixels.
const COLOR_ORDER_CHUNKED: u32 = 0;

/// `cupsColorSpace` value for sRGB.
const COLOR_SPACE_SRGB: u32 = 19;

/// Byte offsets of the header fields, relative to the start of the header.
mod offset {
    pub const HW_RESOLUTION_X: usize = 276;
    pub const HW_RESOLUTION_Y: usize = 280;
    pub const NUM_COPIES: usize = 340;
    pub const PAGE_SIZE_W: usize = 352;
    pub const PAGE_SIZE_H: usize = 356;
    pub const WIDTH: usize = 372;
    pub const HEIGHT: usize = 376;
    pub const BITS_PER_COLOR: usize = 384;
    pub const BITS_PER_PIXEL: usize = 388;
    pub const BYTES_PER_LINE: usize = 392;
    pub const COLOR_ORDER: usize = 396;
    pub const COLOR_SPACE: usize = 400;
    pub const NUM_COLORS: usize = 420;
    pub const TOTAL_PAGE_COUNT: usize = 452;
    pub const CROSS_FEED_TRANSFORM: usize = 456;
    pub const FEED_TRANSFORM: usize = 460;
    pub const IMAGE_BOX_LEFT: usize = 464;
    pub const IMAGE_BOX_TOP: usize = 468;
    pub const IMAGE_BOX_RIGHT: usize = 472;
    pub const IMAGE_BOX_BOTTOM: usize = 476;
}

/// Page parameters that are not derived from the pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterOptions {
    /// Horizontal and vertical resolution in dots per inch.
    pub resolution: (u32, u32),
    pub copies: u32,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            resolution: (300, 300),
            copies: 1,
        }
    }
}

/// Encode one RGB page.
///
/// `pixels` must hold exactly `width * height * 3` bytes in row-major order.
/// Zero dimensions, a zero resolution, or a length mismatch are rejected as
/// [`LanprintError::Encoding`].
pub fn encode_raster(
    pixels: &[u8],
    width: u32,
    height: u32,
    options: &RasterOptions,
) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(LanprintError::Encoding(format!(
            "page dimensions must be non-zero (got {width}x{height})"
        )));
    }
    let (res_x, res_y) = options.resolution;
    if res_x == 0 || res_y == 0 {
        return Err(LanprintError::Encoding(format!(
            "resolution must be non-zero (got {res_x}x{res_y})"
        )));
    }

    let bytes_per_line = width
        .checked_mul(CHANNELS)
        .ok_or_else(|| LanprintError::Encoding(format!("width {width} overflows line length")))?;
    let expected = (bytes_per_line as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| LanprintError::Encoding(format!("{width}x{height} overflows page size")))?;
    if pixels.len() != expected {
        return Err(LanprintError::Encoding(format!(
            "pixel buffer is {} bytes, expected {expected} for {width}x{height}x{CHANNELS}",
            pixels.len()
        )));
    }

    let line_len = bytes_per_line as usize;
    let mut out = Vec::with_capacity(SYNC_WORD.len() + HEADER_LEN + height as usize * (1 + line_len));
    out.extend_from_slice(&SYNC_WORD);
    out.extend_from_slice(&build_header(width, height, bytes_per_line, options));

    for row in pixels.chunks_exact(line_len) {
        out.push(1);
        out.extend_from_slice(row);
    }

    debug!(width, height, bytes = out.len(), "raster page encoded");
    Ok(out)
}

fn build_header(width: u32, height: u32, bytes_per_line: u32, options: &RasterOptions) -> [u8; HEADER_LEN] {
    let (res_x, res_y) = options.resolution;
    let mut header = [0u8; HEADER_LEN];
    let mut put = |at: usize, value: u32| header[at..at + 4].copy_from_slice(&value.to_be_bytes());

    put(offset::HW_RESOLUTION_X, res_x);
    put(offset::HW_RESOLUTION_Y, res_y);
    put(offset::NUM_COPIES, options.copies.max(1));
    put(offset::PAGE_SIZE_W, pixels_to_points(width, res_x));
    put(offset::PAGE_SIZE_H, pixels_to_points(height, res_y));
    put(offset::WIDTH, width);
    put(offset::HEIGHT, height);
    put(offset::BITS_PER_COLOR, BITS_PER_COLOR);
    put(offset::BITS_PER_PIXEL, BITS_PER_PIXEL);
    put(offset::BYTES_PER_LINE, bytes_per_line);
    put(offset::COLOR_ORDER, COLOR_ORDER_CHUNKED);
    put(offset::COLOR_SPACE, COLOR_SPACE_SRGB);
    put(offset::NUM_COLORS, CHANNELS);
    put(offset::TOTAL_PAGE_COUNT, 1);
    put(offset::CROSS_FEED_TRANSFORM, 1);
    put(offset::FEED_TRANSFORM, 1);
    put(offset::IMAGE_BOX_LEFT, 0);
    put(offset::IMAGE_BOX_TOP, 0);
    put(offset::IMAGE_BOX_RIGHT, width);
    put(offset::IMAGE_BOX_BOTTOM, height);

    header
}

/// Pixel count at `dpi` converted to points, rounded to nearest.
fn pixels_to_points(pixels: u32, dpi: u32) -> u32 {
    let dpi = dpi as u64;
    ((pixels as u64 * POINTS_PER_INCH + dpi / 2) / dpi) as u32
}
