// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the lanprint printer service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Port assumed when an advertisement does not carry one.
pub const DEFAULT_IPP_PORT: u16 = 631;

/// Resource path assumed when the TXT record has no `rp` key.
pub const DEFAULT_RESOURCE_PATH: &str = "ipp/print";

/// MIME type of the raster wire format.
pub const PWG_RASTER_MIME: &str = "image/pwg-raster";

/// Stable identity of a printer, derived from (name, host, port).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrinterId(String);

impl PrinterId {
    /// Derive the identity hash.  Pure: the same triple always yields the same id.
    pub fn derive(name: &str, host: &str, port: u16) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(host.as_bytes());
        hasher.update([0u8]);
        hasher.update(port.to_be_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PrinterId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl std::fmt::Display for PrinterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which advertisement type a printer was first discovered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    /// `_ipp._tcp`: plain IPP.
    Ipp,
    /// `_ipps._tcp`: IPP over TLS.
    Ipps,
}

impl ServiceType {
    /// mDNS service type string.
    pub fn mdns_type(&self) -> &'static str {
        match self {
            Self::Ipp => "_ipp._tcp.local.",
            Self::Ipps => "_ipps._tcp.local.",
        }
    }

    /// URI scheme for this service type.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Ipp => "ipp",
            Self::Ipps => "ipps",
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Ipps)
    }
}

/// Last known device state.  Independent of the `online` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterStatus {
    Idle,
    Printing,
    Stopped,
    Offline,
}

impl PrinterStatus {
    /// Map an IPP `printer-state` value (RFC 8011 §5.4.11).
    ///
    /// Accepts the enum code or its keyword.  Unrecognised values return
    /// `None` so the caller can leave the status unchanged.
    pub fn from_ipp_state(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "3" | "idle" => Some(Self::Idle),
            "4" | "processing" => Some(Self::Printing),
            "5" | "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

/// What a printer reported it supports.  Every field is `None` until probed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterCapabilities {
    pub color: Option<bool>,
    /// `sides-supported` keywords.
    pub duplex_modes: Option<Vec<String>>,
    /// `media-supported` keywords.
    pub media: Option<Vec<String>>,
    /// `document-format-supported` MIME types.
    pub document_formats: Option<Vec<String>>,
}

impl PrinterCapabilities {
    /// True when nothing has been learned yet.
    pub fn is_unknown(&self) -> bool {
        self.color.is_none()
            && self.duplex_modes.is_none()
            && self.media.is_none()
            && self.document_formats.is_none()
    }
}

/// A registry entry for one network printer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Printer {
    pub id: PrinterId,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// `scheme://host:port/resource-path` from the first advertisement.
    pub uri: String,
    /// The `ipps://` variant, once the printer has been seen on the secure feed.
    pub secure_uri: Option<String>,
    pub service_type: ServiceType,
    pub status: PrinterStatus,
    pub online: bool,
    pub capabilities: PrinterCapabilities,
    /// `printer-state-reasons` from the last successful probe (without `none`).
    pub state_reasons: Vec<String>,
    pub make_and_model: Option<String>,
    pub location: Option<String>,
    pub last_seen: DateTime<Utc>,
    /// Local spooler queue this printer maps to, if one matched at discovery.
    pub matched_queue_name: Option<String>,
}

impl Printer {
    /// URI used for probes and submissions: the secure variant when known.
    pub fn preferred_uri(&self) -> &str {
        self.secure_uri.as_deref().unwrap_or(&self.uri)
    }
}

/// Duplex printing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplexMode {
    Simplex,
    LongEdge,
    ShortEdge,
}

impl DuplexMode {
    /// IPP `sides` keyword (RFC 8011 §5.2.8).
    pub fn ipp_sides_keyword(&self) -> &'static str {
        match self {
            Self::Simplex => "one-sided",
            Self::LongEdge => "two-sided-long-edge",
            Self::ShortEdge => "two-sided-short-edge",
        }
    }
}

/// Colour mode requested for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Color,
    Monochrome,
}

impl ColorMode {
    /// IPP `print-color-mode` keyword (PWG 5100.13).
    pub fn ipp_keyword(&self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Monochrome => "monochrome",
        }
    }
}

/// Caller-supplied job options.  Unset fields are not sent to the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintOptions {
    pub copies: Option<u32>,
    pub duplex: Option<DuplexMode>,
    pub color: Option<ColorMode>,
    /// Declared MIME type of the payload.
    pub media_type: Option<String>,
}

impl PrintOptions {
    /// Copy count to use: at least 1, default 1.
    pub fn effective_copies(&self) -> u32 {
        self.copies.unwrap_or(1).max(1)
    }
}

/// A submission request as handed over by the outward-facing layer.
#[derive(Debug, Clone)]
pub struct PrintJobRequest {
    pub printer_id: PrinterId,
    pub document: Vec<u8>,
    /// Display name of the job (usually the uploaded file name).
    pub file_name: String,
    pub options: PrintOptions,
}

/// Which transport carried a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Spooler,
    Ipp,
}

/// Job state reported when the device returned none.
pub const UNKNOWN_JOB_STATE: &str = "unknown";

/// Normalised result of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintJobResult {
    /// Job id assigned by the device or spooler, when one was returned.
    pub job_id: Option<String>,
    pub job_state: String,
    pub printer_id: PrinterId,
    pub printer_name: String,
    pub transport: Transport,
    /// MIME type of the bytes actually sent.
    pub document_format: String,
}

/// Supported input document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    Pdf,
    Jpeg,
    Png,
    Tiff,
    Gif,
    Bmp,
    Webp,
    PlainText,
    PostScript,
    PwgRaster,
    Urf,
}

impl DocumentType {
    /// MIME type string for IPP `document-format`.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Tiff => "image/tiff",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Webp => "image/webp",
            Self::PlainText => "text/plain",
            Self::PostScript => "application/postscript",
            Self::PwgRaster => PWG_RASTER_MIME,
            Self::Urf => "image/urf",
        }
    }

    /// Infer document type from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "tif" | "tiff" => Some(Self::Tiff),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "webp" => Some(Self::Webp),
            "txt" => Some(Self::PlainText),
            "ps" | "eps" => Some(Self::PostScript),
            "pwg" => Some(Self::PwgRaster),
            "urf" => Some(Self::Urf),
            _ => None,
        }
    }

    /// Infer document type from a file name's extension.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        std::path::Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// MIME type used when nothing was declared and the extension is unknown.
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Effective MIME type for a payload: declared type, else file extension.
pub fn effective_mime_type(file_name: &str, options: &PrintOptions) -> String {
    if let Some(declared) = options.media_type.as_deref() {
        let declared = declared.trim();
        if !declared.is_empty() {
            return declared.to_ascii_lowercase();
        }
    }
    DocumentType::from_file_name(file_name)
        .map(|t| t.mime_type())
        .unwrap_or(FALLBACK_MIME)
        .to_owned()
}
