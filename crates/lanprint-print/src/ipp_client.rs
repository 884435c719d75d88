// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async IPP client for communicating with network printers.
//
// Uses the `ipp` crate's async API to send the two operations the service
// needs:
//   - Get-Printer-Attributes  (RFC 8011 §4.2.5)
//   - Print-Job               (RFC 8011 §4.2.1)
//
// Failures are reported as `IppFailure` so the caller can check them against
// the quirk table before converting to `LanprintError`.

use std::collections::HashMap;
use std::io::Cursor;

use async_trait::async_trait;
use ipp::prelude::*;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::quirks::Operation;

/// Printer Attributes group of a Get-Printer-Attributes response, flattened
/// to attribute name → string values (one per value of a multi-valued set).
pub type PrinterAttributes = HashMap<String, Vec<String>>;

/// A failed IPP exchange.
#[derive(Debug, Clone, Error)]
#[error("{operation}: {message}")]
pub struct IppFailure {
    pub operation: Operation,
    pub message: String,
}

impl IppFailure {
    pub fn new(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Everything needed to build one Print-Job request.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub printer_uri: String,
    pub requesting_user: String,
    pub job_name: String,
    pub document_format: String,
    /// Optional attributes are only sent when set.
    pub copies: Option<u32>,
    pub sides: Option<String>,
    pub color_mode: Option<String>,
    pub document: Vec<u8>,
}

/// Job Attributes group of a Print-Job response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobAttributes {
    pub job_id: Option<i32>,
    /// `job-state` keyword (RFC 8011 §5.3.7).
    pub job_state: Option<String>,
}

/// The IPP operations the service depends on.
#[async_trait]
pub trait IppTransport: Send + Sync {
    async fn get_printer_attributes(
        &self,
        uri: &str,
        requested: &[&str],
    ) -> Result<PrinterAttributes, IppFailure>;

    async fn print_job(&self, job: &JobSubmission) -> Result<JobAttributes, IppFailure>;
}

/// IPP client backed by `ipp::AsyncIppClient`.
///
/// Stateless apart from its TLS policy; one client serves every printer.
#[derive(Debug, Clone)]
pub struct IppClient {
    accept_invalid_certs: bool,
}

impl IppClient {
    pub fn new(accept_invalid_certs: bool) -> Self {
        Self {
            accept_invalid_certs,
        }
    }

    fn connect(&self, uri: Uri) -> AsyncIppClient {
        AsyncIppClient::builder(uri)
            .ignore_tls_errors(self.accept_invalid_certs)
            .build()
    }
}

impl Default for IppClient {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Render an error with every `source()` level, joined by ": ".
///
/// HTTP errors keep the socket-level cause (broken pipe, reset) only in the
/// chain, and the quirk table needs to see it.  A level whose text is
/// already part of the message is skipped.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !text.is_empty() && !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

fn parse_uri(operation: Operation, uri: &str) -> Result<Uri, IppFailure> {
    uri.parse()
        .map_err(|e| IppFailure::new(operation, format!("invalid URI '{uri}': {e}")))
}

#[async_trait]
impl IppTransport for IppClient {
    #[instrument(skip(self, requested), fields(uri = %uri))]
    async fn get_printer_attributes(
        &self,
        uri: &str,
        requested: &[&str],
    ) -> Result<PrinterAttributes, IppFailure> {
        let op = Operation::GetPrinterAttributes;
        let target = parse_uri(op, uri)?;
        let operation = IppOperationBuilder::get_printer_attributes(target.clone())
            .attributes(requested)
            .build();

        debug!("sending Get-Printer-Attributes");
        let response = self
            .connect(target)
            .send(operation)
            .await
            .map_err(|e| IppFailure::new(op, error_chain(&e)))?;

        let code = response.header().status_code();
        if !code.is_success() {
            error!(status = ?code, "Get-Printer-Attributes failed");
            return Err(IppFailure::new(op, format!("returned status {code:?}")));
        }

        let attrs = printer_attributes(response.attributes());
        debug!(count = attrs.len(), "received printer attributes");
        Ok(attrs)
    }

    #[instrument(
        skip(self, job),
        fields(uri = %job.printer_uri, job_name = %job.job_name, format = %job.document_format)
    )]
    async fn print_job(&self, job: &JobSubmission) -> Result<JobAttributes, IppFailure> {
        let op = Operation::PrintJob;
        let target = parse_uri(op, &job.printer_uri)?;
        let payload = IppPayload::new(Cursor::new(job.document.clone()));

        let mut builder = IppOperationBuilder::print_job(target.clone(), payload)
            .user_name(&job.requesting_user)
            .job_title(&job.job_name)
            .document_format(&job.document_format);
        if let Some(copies) = job.copies {
            let copies = i32::try_from(copies).unwrap_or(i32::MAX);
            builder = builder.attribute(IppAttribute::new("copies", IppValue::Integer(copies)));
        }
        if let Some(sides) = &job.sides {
            builder = builder.attribute(IppAttribute::new("sides", IppValue::Keyword(sides.clone().into())));
        }
        if let Some(mode) = &job.color_mode {
            builder = builder.attribute(IppAttribute::new(
                "print-color-mode",
                IppValue::Keyword(mode.clone().into()),
            ));
        }

        info!(bytes = job.document.len(), "sending Print-Job");
        let response = self
            .connect(target)
            .send(builder.build())
            .await
            .map_err(|e| IppFailure::new(op, error_chain(&e)))?;

        let code = response.header().status_code();
        if !code.is_success() {
            error!(status = ?code, "Print-Job failed");
            return Err(IppFailure::new(op, format!("returned status {code:?}")));
        }

        let attrs = job_attributes(response.attributes());
        info!(job_id = ?attrs.job_id, job_state = ?attrs.job_state, "print job accepted");
        Ok(attrs)
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

fn value_strings(value: &IppValue) -> Vec<String> {
    match value {
        IppValue::Array(values) => values.iter().flat_map(value_strings).collect(),
        IppValue::Integer(n) | IppValue::Enum(n) => vec![n.to_string()],
        IppValue::Boolean(b) => vec![b.to_string()],
        other => vec![other.to_string()],
    }
}

fn printer_attributes(attrs: &IppAttributes) -> PrinterAttributes {
    let mut map = HashMap::new();
    for group in attrs.groups_of(DelimiterTag::PrinterAttributes) {
        for (name, attr) in group.attributes() {
            map.insert(name.clone(), value_strings(attr.value()));
        }
    }
    map
}

fn job_attributes(attrs: &IppAttributes) -> JobAttributes {
    let mut out = JobAttributes::default();
    for group in attrs.groups_of(DelimiterTag::JobAttributes) {
        let attributes = group.attributes();
        if let Some(IppValue::Integer(id)) = attributes.get("job-id").map(|a| a.value()) {
            out.job_id = Some(*id);
        }
        if let Some(attr) = attributes.get("job-state") {
            out.job_state = match attr.value() {
                IppValue::Enum(code) | IppValue::Integer(code) => job_state_keyword(*code),
                other => Some(other.to_string()),
            };
        }
    }
    out
}

/// `job-state` enum code to keyword (RFC 8011 §5.3.7).
pub fn job_state_keyword(code: i32) -> Option<String> {
    let keyword = match code {
        3 => "pending",
        4 => "pending-held",
        5 => "processing",
        6 => "processing-stopped",
        7 => "canceled",
        8 => "aborted",
        9 => "completed",
        _ => return None,
    };
    Some(keyword.to_owned())
}
