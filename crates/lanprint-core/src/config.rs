// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LanprintError, Result};

/// Whether the local print spooler (CUPS `lp`) is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpoolerMode {
    /// Use the spooler when `lp` and `lpstat` are found on `PATH`.
    Auto,
    /// Always route through the spooler.
    Enabled,
    /// Never use the spooler; all jobs go over IPP.
    Disabled,
}

/// Persistent service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Period of the liveness sweep.
    pub sweep_interval_secs: u64,
    /// An entry not refreshed within this window is marked offline.
    pub liveness_window_secs: u64,
    /// Upper bound on one Get-Printer-Attributes probe.
    pub probe_timeout_secs: u64,
    /// Upper bound on one Print-Job attempt (`None` = unbounded).
    pub submit_timeout_secs: Option<u64>,
    pub spooler: SpoolerMode,
    /// Upper bound on each `lp`/`lpstat` invocation.
    pub spooler_timeout_secs: u64,
    /// `requesting-user-name` sent with IPP submissions.
    pub requesting_user_name: String,
    /// Directory for staged spooler payloads (system temp dir if unset).
    pub staging_dir: Option<PathBuf>,
    /// Buffer size of the registry event channel.
    pub event_capacity: usize,
    /// Accept self-signed certificates on `ipps://` URIs.
    pub accept_invalid_certs: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            liveness_window_secs: 60,
            probe_timeout_secs: 10,
            submit_timeout_secs: Some(120),
            spooler: SpoolerMode::Auto,
            spooler_timeout_secs: 60,
            requesting_user_name: "lanprint".into(),
            staging_dir: None,
            event_capacity: 64,
            accept_invalid_certs: true,
        }
    }
}

impl ServiceConfig {
    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(LanprintError::Config("sweep_interval_secs must be > 0".into()));
        }
        if self.liveness_window_secs == 0 {
            return Err(LanprintError::Config("liveness_window_secs must be > 0".into()));
        }
        if self.event_capacity == 0 {
            return Err(LanprintError::Config("event_capacity must be > 0".into()));
        }
        if self.requesting_user_name.trim().is_empty() {
            return Err(LanprintError::Config("requesting_user_name must not be empty".into()));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn submit_timeout(&self) -> Option<Duration> {
        self.submit_timeout_secs.map(Duration::from_secs)
    }

    pub fn spooler_timeout(&self) -> Duration {
        Duration::from_secs(self.spooler_timeout_secs)
    }

    /// Staging directory, defaulting to the system temp dir.
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
