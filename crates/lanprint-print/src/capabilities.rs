// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer capability probing.
//
// Sends Get-Printer-Attributes for a fixed attribute set and maps the answer
// onto `PrinterCapabilities`, the device status, and its state reasons.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use lanprint_core::error::{LanprintError, Result};
use lanprint_core::types::{PrinterCapabilities, PrinterStatus};

use crate::ipp_client::{IppTransport, PrinterAttributes};
use crate::quirks::{self, Operation, Quirk};

/// Attributes requested by every probe.
pub const REQUESTED_ATTRIBUTES: &[&str] = &[
    "printer-state",
    "printer-state-reasons",
    "document-format-supported",
    "color-supported",
    "sides-supported",
    "media-supported",
];

/// Outcome of a successful (or quirk-normalised) probe.
///
/// `None` fields mean "leave the registry value as it is".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub status: Option<PrinterStatus>,
    pub capabilities: Option<PrinterCapabilities>,
    pub state_reasons: Option<Vec<String>>,
    /// Set when the device answered with a known anomaly instead.
    pub normalized: Option<Quirk>,
}

impl ProbeReport {
    /// Map a Printer Attributes group.
    pub fn from_attributes(attrs: &PrinterAttributes) -> Self {
        let list = |name: &str| attrs.get(name).map(|values| non_empty(values));

        let color = attrs
            .get("color-supported")
            .and_then(|v| v.first())
            .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            });

        let capabilities = PrinterCapabilities {
            color,
            duplex_modes: list("sides-supported"),
            media: list("media-supported"),
            document_formats: list("document-format-supported"),
        };

        let status = attrs
            .get("printer-state")
            .and_then(|v| v.first())
            .and_then(|v| PrinterStatus::from_ipp_state(v));

        let state_reasons = attrs.get("printer-state-reasons").map(|values| {
            non_empty(values)
                .into_iter()
                .filter(|r| !r.eq_ignore_ascii_case("none"))
                .collect()
        });

        Self {
            status,
            capabilities: Some(capabilities),
            state_reasons,
            normalized: None,
        }
    }

    /// A reachable device whose answer could not be used.
    pub fn normalized(quirk: Quirk) -> Self {
        Self {
            normalized: Some(quirk),
            ..Default::default()
        }
    }
}

fn non_empty(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Issues capability probes through an [`IppTransport`].
#[derive(Clone)]
pub struct CapabilityProber {
    client: Arc<dyn IppTransport>,
    timeout: Duration,
}

impl CapabilityProber {
    pub fn new(client: Arc<dyn IppTransport>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Probe one printer URI.
    ///
    /// Failures listed in the quirk table come back as a normalised report.
    /// Everything else, including the timeout, is a `Probe` error.
    pub async fn probe(&self, uri: &str) -> Result<ProbeReport> {
        let call = self.client.get_printer_attributes(uri, REQUESTED_ATTRIBUTES);
        let outcome = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                LanprintError::Probe(format!("{uri}: no answer within {:?}", self.timeout))
            })?;

        match outcome {
            Ok(attrs) => {
                let report = ProbeReport::from_attributes(&attrs);
                debug!(uri, status = ?report.status, "probe succeeded");
                Ok(report)
            }
            Err(failure) => match quirks::classify(Operation::GetPrinterAttributes, &failure.message) {
                Some(quirk) => {
                    info!(uri, quirk = %quirk, "probe failure normalised");
                    Ok(ProbeReport::normalized(quirk))
                }
                None => {
                    warn!(uri, error = %failure, "probe failed");
                    Err(LanprintError::Probe(format!("{uri}: {failure}")))
                }
            },
        }
    }
}
