// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: builds the discovery manager and the job
// dispatcher from one `ServiceConfig` and owns them for the process lifetime.

use std::path::Path;
use std::sync::Arc;

use lanprint_core::ServiceConfig;
use lanprint_core::error::{LanprintError, Result};
use lanprint_print::{
    DiscoveryManager, IppClient, IppTransport, JobDispatcher, LocalSpooler, LpSpooler,
    PrinterRegistry, ProtocolTransport, SpoolerTransport,
};
use tracing::{info, warn};

use super::data_dir;

/// Everything a CLI command needs.
pub struct AppServices {
    config: ServiceConfig,
    manager: DiscoveryManager,
    dispatcher: JobDispatcher,
}

impl AppServices {
    /// Wire up the subsystems.  Discovery is prepared but not started.
    pub fn init(config: ServiceConfig) -> Self {
        let client: Arc<dyn IppTransport> = Arc::new(IppClient::new(config.accept_invalid_certs));

        let spooler: Option<Arc<dyn LocalSpooler>> =
            LpSpooler::detect(config.spooler, config.spooler_timeout())
                .map(|s| Arc::new(s) as Arc<dyn LocalSpooler>);
        match &spooler {
            Some(_) => info!("local spooler available, jobs go through lp"),
            None => info!("no local spooler, jobs go over IPP"),
        }

        let manager = DiscoveryManager::new(&config, Arc::clone(&client), spooler.clone());
        let protocol = ProtocolTransport::new(
            client,
            config.requesting_user_name.clone(),
            config.submit_timeout(),
        );
        let spooler = spooler.map(|s| SpoolerTransport::new(s, config.staging_dir()));
        let dispatcher = JobDispatcher::new(manager.registry(), protocol, spooler);

        Self {
            config,
            manager,
            dispatcher,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn manager(&mut self) -> &mut DiscoveryManager {
        &mut self.manager
    }

    pub fn registry(&self) -> PrinterRegistry {
        self.manager.registry()
    }

    pub fn dispatcher(&self) -> &JobDispatcher {
        &self.dispatcher
    }

    /// Stop background discovery.  Safe to call when it never started.
    pub async fn shutdown(&mut self) {
        self.manager.shutdown().await;
    }
}

/// Load and validate the configuration.
///
/// An explicit `path` must exist.  Without one the default location is
/// tried and built-in defaults are used when nothing is there.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let config = match path {
        Some(path) => read_config(path)?,
        None => {
            let default = data_dir::default_config_path();
            if default.exists() {
                read_config(&default)?
            } else {
                ServiceConfig::default()
            }
        }
    };
    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<ServiceConfig> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        warn!(path = %path.display(), error = %e, "cannot read config");
        LanprintError::Config(format!("{}: {e}", path.display()))
    })?;
    let config = serde_json::from_str(&data)?;
    info!(path = %path.display(), "configuration loaded");
    Ok(config)
}
