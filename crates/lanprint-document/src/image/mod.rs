// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module: decode payloads and reduce them to 3-channel RGB.

pub mod processor;

pub use processor::{ImageProcessor, RgbPixels};
