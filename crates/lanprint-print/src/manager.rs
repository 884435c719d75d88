// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Discovery manager.
//
// Owns the printer registry and two background tasks: the discovery worker,
// which reacts to announcements one at a time, and the periodic liveness
// sweep.  Probes run as separate tasks so a slow printer never holds up new
// announcements.  Registry changes go out as `RegistryEvent`s on a broadcast
// channel; a lagging subscriber loses events rather than blocking discovery.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use lanprint_core::config::ServiceConfig;
use lanprint_core::error::Result;
use lanprint_core::types::Printer;

use crate::capabilities::{CapabilityProber, ProbeReport};
use crate::discovery::{MdnsFeed, ServiceAnnouncement};
use crate::ipp_client::IppTransport;
use crate::queue_match::match_queue;
use crate::registry::{Observation, PrinterRegistry, ProbeTicket};
use crate::spooler::LocalSpooler;

/// Capacity of the announcement channel between feed and worker.
const FEED_CAPACITY: usize = 64;

/// Registry change notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "printer", rename_all = "lowercase")]
pub enum RegistryEvent {
    Added(Printer),
    Updated(Printer),
}

impl RegistryEvent {
    pub fn printer(&self) -> &Printer {
        match self {
            Self::Added(p) | Self::Updated(p) => p,
        }
    }
}

/// Counters from one liveness sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub probed: usize,
    pub refreshed: usize,
    pub failed: usize,
}

struct Inner {
    registry: PrinterRegistry,
    prober: CapabilityProber,
    queues: Option<Arc<dyn LocalSpooler>>,
    events: broadcast::Sender<RegistryEvent>,
    liveness_window: Duration,
}

impl Inner {
    fn emit(&self, event: RegistryEvent) {
        // An error only means there is no subscriber right now.
        if self.events.send(event).is_err() {
            debug!("registry event dropped, no subscribers");
        }
    }

    fn handle(self: &Arc<Self>, announcement: ServiceAnnouncement, now: DateTime<Utc>) {
        match self.registry.observe(&announcement, now) {
            Observation::Inserted(printer) => {
                let inner = Arc::clone(self);
                tokio::spawn(async move { inner.register(printer).await });
            }
            Observation::Revived(printer) => self.emit(RegistryEvent::Updated(printer)),
            Observation::Refreshed(id) => debug!(printer_id = %id, "announcement refreshed entry"),
        }
    }

    /// Queue matching and the first probe for a new entry, then "added".
    async fn register(&self, printer: Printer) {
        if let Some(spooler) = &self.queues {
            match spooler.list_queues().await {
                Ok(queues) => {
                    let matched = match_queue(&printer.name, &queues);
                    debug!(printer_id = %printer.id, queue = ?matched, "queue matching");
                    self.registry.set_matched_queue(&printer.id, matched);
                }
                Err(e) => warn!(printer_id = %printer.id, error = %e, "could not list spooler queues"),
            }
        }

        if let Some(ticket) = self.registry.begin_probe(&printer.id) {
            match self.prober.probe(&ticket.uri).await {
                Ok(report) => {
                    self.registry.apply_probe(&ticket, &report, Utc::now());
                }
                Err(e) => debug!(printer_id = %printer.id, error = %e, "initial probe failed"),
            }
        }

        let current = self.registry.get(&printer.id).unwrap_or(printer);
        self.emit(RegistryEvent::Added(current));
    }

    async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let plan = self.registry.sweep(now, self.liveness_window);
        let mut report = SweepReport {
            expired: plan.expired.len(),
            probed: plan.probes.len(),
            ..Default::default()
        };
        for printer in plan.expired {
            self.emit(RegistryEvent::Updated(printer));
        }

        let mut probes: JoinSet<(ProbeTicket, Result<ProbeReport>)> = JoinSet::new();
        for ticket in plan.probes {
            let prober = self.prober.clone();
            probes.spawn(async move {
                let result = prober.probe(&ticket.uri).await;
                (ticket, result)
            });
        }

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((ticket, Ok(probe))) => {
                    if let Some(printer) = self.registry.apply_probe(&ticket, &probe, now) {
                        report.refreshed += 1;
                        self.emit(RegistryEvent::Updated(printer));
                    }
                }
                // Logged by the prober; the entry is left as it is.
                Ok((_, Err(_))) => report.failed += 1,
                Err(e) => {
                    warn!(error = %e, "probe task failed");
                    report.failed += 1;
                }
            }
        }

        debug!(?report, "liveness sweep finished");
        report
    }
}

/// Owns discovery, the registry, and the liveness timer.
pub struct DiscoveryManager {
    inner: Arc<Inner>,
    sweep_interval: Duration,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    feed: Option<MdnsFeed>,
}

impl DiscoveryManager {
    pub fn new(
        config: &ServiceConfig,
        client: Arc<dyn IppTransport>,
        queues: Option<Arc<dyn LocalSpooler>>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                registry: PrinterRegistry::new(),
                prober: CapabilityProber::new(client, config.probe_timeout()),
                queues,
                events,
                liveness_window: config.liveness_window(),
            }),
            sweep_interval: config.sweep_interval(),
            shutdown,
            tasks: Vec::new(),
            feed: None,
        }
    }

    /// Start the mDNS feed and the background tasks.
    pub fn start(&mut self) -> Result<()> {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        self.feed = Some(MdnsFeed::start(tx)?);
        self.start_with_feed(rx);
        Ok(())
    }

    /// Start the background tasks on an arbitrary announcement channel.
    pub fn start_with_feed(&mut self, mut feed: mpsc::Receiver<ServiceAnnouncement>) {
        if !self.tasks.is_empty() {
            debug!("discovery manager already running");
            return;
        }

        let inner = Arc::clone(&self.inner);
        let mut stop = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    next = feed.recv() => match next {
                        Some(announcement) => inner.handle(announcement, Utc::now()),
                        None => {
                            debug!("announcement feed closed");
                            break;
                        }
                    },
                }
            }
        }));

        let inner = Arc::clone(&self.inner);
        let mut stop = self.shutdown.subscribe();
        let period = self.sweep_interval;
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        inner.sweep(Utc::now()).await;
                    }
                }
            }
        }));

        info!(sweep_interval = ?period, "discovery manager started");
    }

    pub fn registry(&self) -> PrinterRegistry {
        self.inner.registry.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.events.subscribe()
    }

    /// Run one liveness sweep now.
    pub async fn sweep(&self) -> SweepReport {
        self.inner.sweep(Utc::now()).await
    }

    /// Run one liveness sweep as if the clock read `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        self.inner.sweep(now).await
    }

    /// Stop the timer, the worker, and the mDNS feed.
    pub async fn shutdown(&mut self) {
        // Receivers may already be gone if the tasks ended on their own.
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "discovery task ended abnormally");
            }
        }
        if let Some(feed) = self.feed.take() {
            if let Err(e) = feed.shutdown() {
                warn!(error = %e, "mDNS shutdown failed");
            }
        }
        info!("discovery manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipp_client::IppFailure;
    use crate::quirks::Operation;
    use crate::testing::{FakeIpp, FakeSpooler, announcement, attrs};
    use lanprint_core::types::{PrinterStatus, ServiceType};

    fn config() -> ServiceConfig {
        ServiceConfig {
            probe_timeout_secs: 1,
            ..Default::default()
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<RegistryEvent>) -> RegistryEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no event in time")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn new_printer_is_probed_matched_and_added() {
        let ipp = Arc::new(FakeIpp::default());
        ipp.set_attributes(attrs(&[
            ("printer-state", &["4"]),
            ("color-supported", &["true"]),
        ]));
        let spooler = Arc::new(FakeSpooler::with_queues(&["EPSON_L3250_Series_2", "HP_OfficeJet"]));
        let mut manager = DiscoveryManager::new(&config(), ipp, Some(spooler));
        let mut events = manager.subscribe();
        let (tx, rx) = mpsc::channel(8);
        manager.start_with_feed(rx);

        tx.send(announcement("EPSON L3250 Series", "10.0.0.7", ServiceType::Ipp))
            .await
            .unwrap();

        let RegistryEvent::Added(printer) = next_event(&mut events).await else {
            panic!("expected added event");
        };
        assert!(printer.online);
        assert_eq!(printer.status, PrinterStatus::Printing);
        assert_eq!(printer.capabilities.color, Some(true));
        assert_eq!(printer.matched_queue_name.as_deref(), Some("EPSON_L3250_Series_2"));
        assert_eq!(manager.registry().list().len(), 1);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn failed_initial_probe_still_announces() {
        let ipp = Arc::new(FakeIpp::default());
        ipp.fail_probes(IppFailure::new(Operation::GetPrinterAttributes, "connection refused"));
        let mut manager = DiscoveryManager::new(&config(), ipp, None);
        let mut events = manager.subscribe();
        let (tx, rx) = mpsc::channel(8);
        manager.start_with_feed(rx);

        tx.send(announcement("Office", "10.0.0.5", ServiceType::Ipp)).await.unwrap();
        let RegistryEvent::Added(printer) = next_event(&mut events).await else {
            panic!("expected added event");
        };
        assert!(printer.online);
        assert!(printer.capabilities.is_unknown());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_announcements_keep_one_entry() {
        let ipp = Arc::new(FakeIpp::default());
        let mut manager = DiscoveryManager::new(&config(), ipp, None);
        let mut events = manager.subscribe();
        let (tx, rx) = mpsc::channel(8);
        manager.start_with_feed(rx);

        let ann = announcement("Office", "10.0.0.5", ServiceType::Ipp);
        tx.send(ann.clone()).await.unwrap();
        tx.send(ann).await.unwrap();
        let added = next_event(&mut events).await;
        assert!(matches!(added, RegistryEvent::Added(_)));
        assert_eq!(added.printer().name, "Office");

        // The worker handles announcements in order; give it a moment.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.registry().len(), 1);
        assert!(events.try_recv().is_err());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn sweep_expires_then_rediscovery_revives() {
        let ipp = Arc::new(FakeIpp::default());
        let mut manager = DiscoveryManager::new(&config(), ipp, None);
        let mut events = manager.subscribe();
        let (tx, rx) = mpsc::channel(8);
        manager.start_with_feed(rx);

        let ann = announcement("Office", "10.0.0.5", ServiceType::Ipp);
        tx.send(ann.clone()).await.unwrap();
        let RegistryEvent::Added(added) = next_event(&mut events).await else {
            panic!("expected added event");
        };

        let report = manager.sweep_at(Utc::now() + chrono::Duration::seconds(120)).await;
        assert_eq!(report.expired, 1);
        assert_eq!(report.probed, 0);
        let RegistryEvent::Updated(offline) = next_event(&mut events).await else {
            panic!("expected updated event");
        };
        assert_eq!(offline.id, added.id);
        assert!(!offline.online);
        assert_eq!(offline.status, PrinterStatus::Offline);

        // A second sweep of an offline entry is silent.
        let report = manager.sweep_at(Utc::now() + chrono::Duration::seconds(240)).await;
        assert_eq!(report, SweepReport::default());
        assert!(events.try_recv().is_err());

        tx.send(ann).await.unwrap();
        let RegistryEvent::Updated(back) = next_event(&mut events).await else {
            panic!("expected updated event");
        };
        assert_eq!(back.id, added.id);
        assert!(back.online);
        assert_eq!(back.status, PrinterStatus::Idle);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn sweep_reprobes_live_entries() {
        let ipp = Arc::new(FakeIpp::default());
        let mut manager = DiscoveryManager::new(&config(), ipp.clone(), None);
        let mut events = manager.subscribe();
        let (tx, rx) = mpsc::channel(8);
        manager.start_with_feed(rx);

        tx.send(announcement("Office", "10.0.0.5", ServiceType::Ipp)).await.unwrap();
        tx.send(announcement("Lab", "10.0.0.6", ServiceType::Ipp)).await.unwrap();
        next_event(&mut events).await;
        next_event(&mut events).await;

        ipp.set_attributes(attrs(&[("printer-state", &["5"])]));
        let report = manager.sweep().await;
        assert_eq!(report.probed, 2);
        assert_eq!(report.refreshed, 2);
        for _ in 0..2 {
            let RegistryEvent::Updated(p) = next_event(&mut events).await else {
                panic!("expected updated event");
            };
            assert_eq!(p.status, PrinterStatus::Stopped);
        }
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn genuine_probe_failure_leaves_entry_alone() {
        let ipp = Arc::new(FakeIpp::default());
        let mut manager = DiscoveryManager::new(&config(), ipp.clone(), None);
        let mut events = manager.subscribe();
        let (tx, rx) = mpsc::channel(8);
        manager.start_with_feed(rx);

        tx.send(announcement("Office", "10.0.0.5", ServiceType::Ipp)).await.unwrap();
        let RegistryEvent::Added(before) = next_event(&mut events).await else {
            panic!("expected added event");
        };

        ipp.fail_probes(IppFailure::new(Operation::GetPrinterAttributes, "connection refused"));
        let report = manager.sweep().await;
        assert_eq!(report.failed, 1);
        let after = manager.registry().get(&before.id).unwrap();
        assert!(after.online);
        assert_eq!(after.last_seen, before.last_seen);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn quirky_probe_counts_as_success() {
        let ipp = Arc::new(FakeIpp::default());
        let mut manager = DiscoveryManager::new(&config(), ipp.clone(), None);
        let mut events = manager.subscribe();
        let (tx, rx) = mpsc::channel(8);
        manager.start_with_feed(rx);

        tx.send(announcement("Office", "10.0.0.5", ServiceType::Ipp)).await.unwrap();
        next_event(&mut events).await;

        ipp.fail_probes(IppFailure::new(
            Operation::GetPrinterAttributes,
            "failed to fill whole buffer",
        ));
        let report = manager.sweep().await;
        assert_eq!(report.refreshed, 1);
        let RegistryEvent::Updated(p) = next_event(&mut events).await else {
            panic!("expected updated event");
        };
        assert!(p.online);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_worker() {
        let ipp = Arc::new(FakeIpp::default());
        let mut manager = DiscoveryManager::new(&config(), ipp, None);
        let (tx, rx) = mpsc::channel(8);
        manager.start_with_feed(rx);
        manager.shutdown().await;

        // The worker dropped its receiver.
        assert!(tx.send(announcement("Office", "10.0.0.5", ServiceType::Ipp)).await.is_err());
        assert!(manager.registry().is_empty());
    }

    #[test]
    fn events_serialise_with_tag() {
        let registry = PrinterRegistry::new();
        let Observation::Inserted(p) =
            registry.observe(&announcement("Office", "10.0.0.5", ServiceType::Ipp), Utc::now())
        else {
            panic!("expected insert");
        };
        let json = serde_json::to_value(RegistryEvent::Added(p)).unwrap();
        assert_eq!(json["event"], "added");
        assert_eq!(json["printer"]["name"], "Office");
    }
}
