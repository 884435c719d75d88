// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for lanprint.
//
// Network, process, and filesystem failures are converted into one of these
// variants before they leave the component that saw them.

use thiserror::Error;

/// Top-level error type for all lanprint operations.
#[derive(Debug, Error)]
pub enum LanprintError {
    // -- Discovery errors (non-fatal, logged) --
    #[error("printer discovery failed: {0}")]
    Discovery(String),

    // -- Probe errors --
    /// A capability probe failed for a reason that is not a known device quirk.
    #[error("capability probe failed: {0}")]
    Probe(String),

    // -- Submission errors --
    #[error("printer not found: {0}")]
    PrinterNotFound(String),

    #[error("printer is offline: {0}")]
    PrinterOffline(String),

    #[error("IPP submission failed: {0}")]
    Transport(String),

    #[error("local spooler failed: {message}")]
    Spooler {
        message: String,
        /// Captured stderr/stdout of the spooler command, if any.
        diagnostics: String,
    },

    // -- Document errors --
    #[error("raster encoding failed: {0}")]
    Encoding(String),

    #[error("image decoding failed: {0}")]
    Image(String),

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LanprintError {
    /// Build a spooler error without captured output.
    pub fn spooler(message: impl Into<String>) -> Self {
        Self::Spooler {
            message: message.into(),
            diagnostics: String::new(),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LanprintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spooler_error_displays_message_only() {
        let err = LanprintError::Spooler {
            message: "lp exited with status 1".into(),
            diagnostics: "lp: The printer or class does not exist.".into(),
        };
        assert_eq!(err.to_string(), "local spooler failed: lp exited with status 1");
    }

    #[test]
    fn spooler_helper_leaves_diagnostics_empty() {
        match LanprintError::spooler("timed out") {
            LanprintError::Spooler { diagnostics, .. } => assert!(diagnostics.is_empty()),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
