// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job dispatcher.
//
// All transport selection lives in `select_route`; `JobDispatcher::submit`
// only carries the decision out.

use tracing::{debug, info, instrument};

use lanprint_core::error::{LanprintError, Result};
use lanprint_core::types::{
    PWG_RASTER_MIME, PrintJobRequest, PrintJobResult, PrintOptions, Printer, Transport,
    UNKNOWN_JOB_STATE, effective_mime_type,
};
use lanprint_document::{RasterOptions, rasterize_image};

use crate::protocol::ProtocolTransport;
use crate::registry::PrinterRegistry;
use crate::spooler::SpoolerTransport;

/// How a job reaches the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Local spooler, payload untouched.
    Spooler,
    /// Decode the image, encode PWG raster, send over IPP.
    RasterThenProtocol,
    /// Send the payload over IPP as is.
    Protocol,
}

/// Raster formats that are sent as they are.
fn is_raster_format(mime: &str) -> bool {
    mime == PWG_RASTER_MIME || mime == "image/urf"
}

/// The routing rules, in priority order.
pub fn select_route(spooler_available: bool, mime: &str) -> Route {
    if spooler_available {
        Route::Spooler
    } else if mime.starts_with("image/") && !is_raster_format(mime) {
        Route::RasterThenProtocol
    } else {
        Route::Protocol
    }
}

/// Routes submissions to a transport.
#[derive(Clone)]
pub struct JobDispatcher {
    registry: PrinterRegistry,
    protocol: ProtocolTransport,
    spooler: Option<SpoolerTransport>,
    raster: RasterOptions,
}

impl JobDispatcher {
    pub fn new(
        registry: PrinterRegistry,
        protocol: ProtocolTransport,
        spooler: Option<SpoolerTransport>,
    ) -> Self {
        Self {
            registry,
            protocol,
            spooler,
            raster: RasterOptions::default(),
        }
    }

    pub fn with_raster_options(mut self, raster: RasterOptions) -> Self {
        self.raster = raster;
        self
    }

    pub fn route_for(&self, mime: &str) -> Route {
        select_route(self.spooler.is_some(), mime)
    }

    /// Submit one job.
    ///
    /// Fails with `PrinterNotFound` for an unknown id and `PrinterOffline`
    /// when the entry is offline.
    #[instrument(
        skip(self, request),
        fields(printer_id = %request.printer_id, file = %request.file_name, bytes = request.document.len())
    )]
    pub async fn submit(&self, request: PrintJobRequest) -> Result<PrintJobResult> {
        let PrintJobRequest {
            printer_id,
            document,
            file_name,
            options,
        } = request;

        let printer = self
            .registry
            .get(&printer_id)
            .ok_or_else(|| LanprintError::PrinterNotFound(printer_id.to_string()))?;
        if !printer.online {
            return Err(LanprintError::PrinterOffline(format!(
                "{} ({})",
                printer.name, printer.id
            )));
        }

        let mime = effective_mime_type(&file_name, &options);
        let route = self.route_for(&mime);
        debug!(mime = %mime, route = ?route, "route selected");

        let result = match (route, &self.spooler) {
            (Route::Spooler, Some(spooler)) => {
                let outcome = spooler
                    .submit(&printer, &document, &file_name, options.effective_copies())
                    .await?;
                PrintJobResult {
                    job_id: outcome.job_id,
                    job_state: UNKNOWN_JOB_STATE.to_owned(),
                    printer_id: printer.id.clone(),
                    printer_name: printer.name.clone(),
                    transport: Transport::Spooler,
                    document_format: mime,
                }
            }
            (Route::RasterThenProtocol, _) => {
                let raster = self.raster;
                let encoded = tokio::task::spawn_blocking(move || rasterize_image(&document, &raster))
                    .await
                    .map_err(|e| LanprintError::Encoding(format!("raster task failed: {e}")))??;
                self.send_protocol(&printer, encoded, PWG_RASTER_MIME, &file_name, &options)
                    .await?
            }
            _ => {
                self.send_protocol(&printer, document, &mime, &file_name, &options)
                    .await?
            }
        };

        info!(
            transport = ?result.transport,
            job_id = ?result.job_id,
            job_state = %result.job_state,
            "job submitted"
        );
        Ok(result)
    }

    async fn send_protocol(
        &self,
        printer: &Printer,
        document: Vec<u8>,
        format: &str,
        job_name: &str,
        options: &PrintOptions,
    ) -> Result<PrintJobResult> {
        let outcome = self
            .protocol
            .submit(printer, document, format, job_name, options)
            .await?;
        Ok(PrintJobResult {
            job_id: outcome.job_id,
            job_state: outcome.job_state,
            printer_id: printer.id.clone(),
            printer_name: printer.name.clone(),
            transport: Transport::Ipp,
            document_format: format.to_owned(),
        })
    }
}
