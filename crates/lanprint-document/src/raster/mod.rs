// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster module: uncompressed PWG-style raster pages.

pub mod encoder;

pub use encoder::{HEADER_LEN, RasterOptions, SYNC_WORD, encode_raster};
