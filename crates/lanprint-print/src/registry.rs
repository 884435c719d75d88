// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer registry.
//
// One map from `PrinterId` to entry behind one mutex.  Every liveness
// decision (refresh, revival, expiry, probe application) happens under that
// lock, so updates to one entry are applied one at a time.
//
// Each entry carries a liveness epoch, bumped on every online/offline
// transition.  A probe remembers the epoch it started under and its result
// is dropped if the epoch has moved by the time it completes.
//
// Entries are never removed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use lanprint_core::types::{Printer, PrinterCapabilities, PrinterId, PrinterStatus};

use crate::capabilities::ProbeReport;
use crate::discovery::ServiceAnnouncement;

struct Entry {
    printer: Printer,
    epoch: u64,
}

/// What an announcement did to the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// First sighting; the new entry.
    Inserted(Printer),
    /// The entry was offline and is back.
    Revived(Printer),
    /// Already online; `last_seen` refreshed.
    Refreshed(PrinterId),
}

/// Permission to apply one probe result to one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTicket {
    pub id: PrinterId,
    pub uri: String,
    epoch: u64,
}

/// Work produced by one liveness sweep.
#[derive(Debug, Default)]
pub struct SweepPlan {
    /// Entries that just went offline.
    pub expired: Vec<Printer>,
    /// Entries still within the window, to be re-probed.
    pub probes: Vec<ProbeTicket>,
}

/// Shared printer registry.  Clones share the same map.
#[derive(Clone, Default)]
pub struct PrinterRegistry {
    entries: Arc<Mutex<HashMap<PrinterId, Entry>>>,
}

impl PrinterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PrinterId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one service announcement.
    pub fn observe(&self, announcement: &ServiceAnnouncement, now: DateTime<Utc>) -> Observation {
        let id = announcement.printer_id();
        let mut entries = self.lock();

        if let Some(entry) = entries.get_mut(&id) {
            let printer = &mut entry.printer;
            printer.last_seen = now;
            if announcement.service_type.is_secure() && printer.secure_uri.is_none() {
                printer.secure_uri = Some(announcement.uri());
                debug!(printer_id = %id, "secure URI recorded");
            }
            if printer.make_and_model.is_none() {
                printer.make_and_model = announcement.make_and_model();
            }
            if printer.location.is_none() {
                printer.location = announcement.location();
            }

            if printer.online {
                return Observation::Refreshed(id);
            }
            printer.online = true;
            printer.status = PrinterStatus::Idle;
            entry.epoch += 1;
            info!(printer_id = %id, name = %printer.name, "printer back online");
            return Observation::Revived(printer.clone());
        }

        let uri = announcement.uri();
        let printer = Printer {
            id: id.clone(),
            name: announcement.name.clone(),
            host: announcement.identity_host(),
            port: announcement.port(),
            secure_uri: announcement.service_type.is_secure().then(|| uri.clone()),
            uri,
            service_type: announcement.service_type,
            status: PrinterStatus::Idle,
            online: true,
            capabilities: PrinterCapabilities::default(),
            state_reasons: Vec::new(),
            make_and_model: announcement.make_and_model(),
            location: announcement.location(),
            last_seen: now,
            matched_queue_name: None,
        };
        info!(printer_id = %id, name = %printer.name, uri = %printer.uri, "printer added");
        entries.insert(
            id,
            Entry {
                printer: printer.clone(),
                epoch: 0,
            },
        );
        Observation::Inserted(printer)
    }

    /// Every entry, sorted by name.
    pub fn list(&self) -> Vec<Printer> {
        let mut printers: Vec<Printer> = self.lock().values().map(|e| e.printer.clone()).collect();
        printers.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        printers
    }

    pub fn list_online(&self) -> Vec<Printer> {
        self.list().into_iter().filter(|p| p.online).collect()
    }

    pub fn get(&self, id: &PrinterId) -> Option<Printer> {
        self.lock().get(id).map(|e| e.printer.clone())
    }

    /// Look up by id, else by case-insensitive display name.
    pub fn find(&self, id_or_name: &str) -> Option<Printer> {
        if let Some(printer) = self.get(&PrinterId::from(id_or_name)) {
            return Some(printer);
        }
        self.list()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(id_or_name.trim()))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_matched_queue(&self, id: &PrinterId, queue: Option<String>) {
        if let Some(entry) = self.lock().get_mut(id) {
            entry.printer.matched_queue_name = queue;
        }
    }

    /// Ticket for probing `id` under its current epoch.
    pub fn begin_probe(&self, id: &PrinterId) -> Option<ProbeTicket> {
        self.lock().get(id).map(|entry| ProbeTicket {
            id: id.clone(),
            uri: entry.printer.preferred_uri().to_owned(),
            epoch: entry.epoch,
        })
    }

    /// Apply a successful (or normalised) probe.
    ///
    /// Returns the updated entry, or `None` when the entry's epoch moved since
    /// the ticket was issued and the result was dropped.
    pub fn apply_probe(
        &self,
        ticket: &ProbeTicket,
        report: &ProbeReport,
        now: DateTime<Utc>,
    ) -> Option<Printer> {
        let mut entries = self.lock();
        let entry = entries.get_mut(&ticket.id)?;
        if entry.epoch != ticket.epoch {
            debug!(printer_id = %ticket.id, "stale probe result dropped");
            return None;
        }

        let printer = &mut entry.printer;
        if !printer.online {
            printer.online = true;
            printer.status = PrinterStatus::Idle;
            entry.epoch += 1;
            info!(printer_id = %ticket.id, "printer back online after probe");
        }
        // A refresh may have landed while the probe was in flight.
        printer.last_seen = printer.last_seen.max(now);
        if let Some(status) = report.status {
            printer.status = status;
        }
        if let Some(capabilities) = &report.capabilities {
            printer.capabilities = capabilities.clone();
        }
        if let Some(reasons) = &report.state_reasons {
            printer.state_reasons = reasons.clone();
        }
        Some(printer.clone())
    }

    /// Expire entries older than `window` and collect probes for the rest.
    ///
    /// Entries already offline are neither probed nor reported again.
    pub fn sweep(&self, now: DateTime<Utc>, window: Duration) -> SweepPlan {
        let mut plan = SweepPlan::default();
        let mut entries = self.lock();

        for (id, entry) in entries.iter_mut() {
            let printer = &mut entry.printer;
            let expired = (now - printer.last_seen)
                .to_std()
                .is_ok_and(|age| age > window);

            if expired {
                if printer.online {
                    printer.online = false;
                    printer.status = PrinterStatus::Offline;
                    entry.epoch += 1;
                    info!(printer_id = %id, name = %printer.name, "printer went offline");
                    plan.expired.push(printer.clone());
                }
            } else if printer.online {
                plan.probes.push(ProbeTicket {
                    id: id.clone(),
                    uri: printer.preferred_uri().to_owned(),
                    epoch: entry.epoch,
                });
            }
        }
        plan
    }
}
