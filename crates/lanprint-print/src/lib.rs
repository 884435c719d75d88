// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// lanprint-print: mDNS printer discovery, the printer registry, capability
// probing, and job dispatch over IPP or the local spooler.  This crate
// bridges the domain types of `lanprint-core` and the network printing
// infrastructure.

pub mod capabilities;
pub mod discovery;
pub mod dispatcher;
pub mod ipp_client;
pub mod manager;
pub mod protocol;
pub mod queue_match;
pub mod quirks;
pub mod registry;
pub mod spooler;

#[cfg(test)]
mod testing;

pub use capabilities::{CapabilityProber, ProbeReport};
pub use discovery::{MdnsFeed, ServiceAnnouncement};
pub use dispatcher::{JobDispatcher, Route, select_route};
pub use ipp_client::{IppClient, IppTransport};
pub use manager::{DiscoveryManager, RegistryEvent, SweepReport};
pub use protocol::ProtocolTransport;
pub use queue_match::match_queue;
pub use registry::PrinterRegistry;
pub use spooler::{LocalSpooler, LpSpooler, SpoolerTransport};
