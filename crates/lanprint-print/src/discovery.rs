// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mDNS service discovery for IPP and IPPS printers on the local network.
//
// We browse for `_ipp._tcp.local.` (plain IPP) and `_ipps._tcp.local.`
// (TLS-secured IPP) using the `mdns-sd` crate.  Each resolved service becomes
// a `ServiceAnnouncement` pushed down a tokio channel to the discovery
// manager, which owns all registry state.

use std::collections::HashMap;
use std::net::IpAddr;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use lanprint_core::error::{LanprintError, Result};
use lanprint_core::types::{DEFAULT_IPP_PORT, DEFAULT_RESOURCE_PATH, PrinterId, ServiceType};

/// One resolved advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAnnouncement {
    /// Instance name, service-type suffix removed.
    pub name: String,
    /// Advertised host name without the trailing dot.
    pub host: Option<String>,
    /// Sorted, so "first address" is stable across announcements.
    pub addresses: Vec<IpAddr>,
    pub port: Option<u16>,
    pub service_type: ServiceType,
    /// TXT record, keys lowercased.
    pub txt: HashMap<String, String>,
}

impl ServiceAnnouncement {
    /// Host component of the identity: the host name, else the first address.
    pub fn identity_host(&self) -> String {
        self.host
            .as_deref()
            .filter(|h| !h.is_empty())
            .map(str::to_owned)
            .or_else(|| self.addresses.first().map(IpAddr::to_string))
            .unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.port.filter(|p| *p != 0).unwrap_or(DEFAULT_IPP_PORT)
    }

    pub fn printer_id(&self) -> PrinterId {
        PrinterId::derive(&self.name, &self.identity_host(), self.port())
    }

    /// TXT `rp`, else `ipp/print`.
    pub fn resource_path(&self) -> &str {
        self.txt
            .get("rp")
            .map(|rp| rp.trim().trim_start_matches('/'))
            .unwrap_or(DEFAULT_RESOURCE_PATH)
    }

    /// `scheme://host:port/resource-path`.
    ///
    /// The host is the first IPv4 address, else the first address, else the
    /// host name.
    pub fn uri(&self) -> String {
        let host = self
            .addresses
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| self.addresses.first())
            .map(|addr| match addr {
                IpAddr::V4(v4) => v4.to_string(),
                IpAddr::V6(v6) => format!("[{v6}]"),
            })
            .unwrap_or_else(|| self.identity_host());
        format!(
            "{}://{}:{}/{}",
            self.service_type.scheme(),
            host,
            self.port(),
            self.resource_path()
        )
    }

    pub fn make_and_model(&self) -> Option<String> {
        self.txt_first(&["printer-make-and-model", "ty"])
    }

    pub fn location(&self) -> Option<String> {
        self.txt_first(&["printer-location", "note"])
    }

    fn txt_first(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.txt.get(*k))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
            .map(str::to_owned)
    }
}

/// Live mDNS browser feeding announcements into a channel.
pub struct MdnsFeed {
    daemon: ServiceDaemon,
}

impl MdnsFeed {
    /// Start browsing both service types.
    ///
    /// A browse failure on one type is logged and the other keeps running;
    /// only when neither can start is an error returned.
    pub fn start(tx: mpsc::Sender<ServiceAnnouncement>) -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| LanprintError::Discovery(format!("failed to start mDNS daemon: {e}")))?;

        start_browsing(&daemon, |service_type, receiver| {
            spawn_listener(service_type, receiver, tx.clone())
        })?;

        info!("mDNS printer discovery started");
        Ok(Self { daemon })
    }

    /// Shut down the mDNS daemon; listener threads end with it.
    pub fn shutdown(self) -> Result<()> {
        self.daemon
            .shutdown()
            .map_err(|e| LanprintError::Discovery(format!("daemon shutdown: {e}")))?;
        info!("mDNS daemon shut down");
        Ok(())
    }
}

/// The part of the mDNS daemon `start_browsing` drives.
trait Browser {
    type Events;

    fn browse(&self, service_type: ServiceType) -> std::result::Result<Self::Events, String>;

    /// Stop the daemon being abandoned after a failed start.
    fn abandon(&self);
}

impl Browser for ServiceDaemon {
    type Events = mdns_sd::Receiver<ServiceEvent>;

    fn browse(&self, service_type: ServiceType) -> std::result::Result<Self::Events, String> {
        ServiceDaemon::browse(self, service_type.mdns_type()).map_err(|e| e.to_string())
    }

    fn abandon(&self) {
        if let Err(e) = self.shutdown() {
            debug!(error = %e, "mDNS daemon shutdown after failed start");
        }
    }
}

/// Browse both service types and hand each receiver to `spawn`.
///
/// On error the browser is abandoned before returning, so no daemon or
/// listener outlives a failed start.
fn start_browsing<B: Browser>(
    browser: &B,
    mut spawn: impl FnMut(ServiceType, B::Events) -> Result<()>,
) -> Result<()> {
    let mut started = 0;
    for service_type in [ServiceType::Ipp, ServiceType::Ipps] {
        match browser.browse(service_type) {
            Ok(events) => {
                if let Err(e) = spawn(service_type, events) {
                    browser.abandon();
                    return Err(e);
                }
                started += 1;
            }
            Err(e) => warn!(
                service_type = service_type.mdns_type(),
                error = %e,
                "mDNS browse failed"
            ),
        }
    }
    if started == 0 {
        browser.abandon();
        return Err(LanprintError::Discovery("no mDNS browse could be started".into()));
    }
    Ok(())
}

/// Drain one browse receiver on its own thread.
fn spawn_listener(
    service_type: ServiceType,
    receiver: mdns_sd::Receiver<ServiceEvent>,
    tx: mpsc::Sender<ServiceAnnouncement>,
) -> Result<()> {
    std::thread::Builder::new()
        .name(format!("mdns-{}", service_type.scheme()))
        .spawn(move || {
            while let Ok(event) = receiver.recv() {
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let announcement = announcement_from_info(&info, service_type);
                        debug!(name = %announcement.name, "service resolved");
                        if tx.blocking_send(announcement).is_err() {
                            debug!("discovery channel closed, listener exiting");
                            break;
                        }
                    }
                    ServiceEvent::ServiceRemoved(stype, fullname) => {
                        // Liveness is decided by the sweep, not by goodbyes.
                        debug!(service_type = %stype, name = %fullname, "service removed");
                    }
                    ServiceEvent::SearchStopped(stype) => {
                        debug!(service_type = %stype, "mDNS search stopped");
                        break;
                    }
                    other => debug!(event = ?other, "mDNS event"),
                }
            }
        })
        .map(|_| ())
        .map_err(|e| LanprintError::Discovery(format!("failed to spawn mDNS listener: {e}")))
}

fn announcement_from_info(info: &ServiceInfo, service_type: ServiceType) -> ServiceAnnouncement {
    let fullname = info.get_fullname();
    let suffix = format!(".{}", info.get_type());
    let name = fullname
        .strip_suffix(&suffix)
        .unwrap_or(fullname)
        .to_owned();

    let host = Some(info.get_hostname().trim_end_matches('.').to_owned()).filter(|h| !h.is_empty());

    let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    addresses.sort();

    let txt = info
        .get_properties()
        .iter()
        .map(|p| (p.key().to_ascii_lowercase(), p.val_str().to_owned()))
        .collect();

    ServiceAnnouncement {
        name,
        host,
        addresses,
        port: Some(info.get_port()),
        service_type,
        txt,
    }
}
