// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// lanprint: LAN printer discovery and job dispatch
//
// Entry point. Initialises logging, loads the configuration, builds the
// services, and runs one subcommand.

mod cli;
mod services;

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use lanprint_core::error::{LanprintError, Result};
use lanprint_core::types::{PrintJobRequest, Printer};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use cli::{Cli, Command};
use services::app_services::{AppServices, load_config};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("lanprint starting");

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };

    let mut services = AppServices::init(config);
    info!(spooler = ?services.config().spooler, "services ready");
    let outcome = run(&mut services, cli.command).await;
    services.shutdown().await;

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

fn fail(e: &LanprintError) -> ExitCode {
    error!(error = %e, "command failed");
    eprintln!("lanprint: {e}");
    if let LanprintError::Spooler { diagnostics, .. } = e {
        if !diagnostics.is_empty() {
            eprintln!("{diagnostics}");
        }
    }
    ExitCode::FAILURE
}

async fn run(services: &mut AppServices, command: Command) -> Result<()> {
    match command {
        Command::Watch => watch(services).await,
        Command::List { wait, online } => list(services, Duration::from_secs(wait), online).await,
        Command::Print {
            file,
            printer,
            wait,
            copies,
            duplex,
            color,
            mime,
        } => {
            let options = cli::print_options(copies, duplex, color, mime);
            print(services, &file, &printer, Duration::from_secs(wait), options).await
        }
    }
}

async fn watch(services: &mut AppServices) -> Result<()> {
    let mut events = services.manager().subscribe();
    services.manager().start()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    debug!(printer_id = %event.printer().id, "registry event");
                    println!("{}", serde_json::to_string(&event)?);
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

async fn list(services: &mut AppServices, wait: Duration, online: bool) -> Result<()> {
    services.manager().start()?;
    tokio::time::sleep(wait).await;

    let registry = services.registry();
    let printers = if online {
        registry.list_online()
    } else {
        registry.list()
    };
    println!("{}", serde_json::to_string_pretty(&printers)?);
    Ok(())
}

async fn print(
    services: &mut AppServices,
    file: &Path,
    printer: &str,
    wait: Duration,
    options: lanprint_core::types::PrintOptions,
) -> Result<()> {
    let document = tokio::fs::read(file).await?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let mut events = services.manager().subscribe();
    services.manager().start()?;
    let target = wait_for_printer(services, &mut events, printer, wait).await?;
    info!(printer = %target.name, id = %target.id, "printer resolved");

    let result = services
        .dispatcher()
        .submit(PrintJobRequest {
            printer_id: target.id,
            document,
            file_name,
            options,
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Wait until `wanted` shows up in the registry or `wait` runs out.
async fn wait_for_printer(
    services: &AppServices,
    events: &mut tokio::sync::broadcast::Receiver<lanprint_print::RegistryEvent>,
    wanted: &str,
    wait: Duration,
) -> Result<Printer> {
    let registry = services.registry();
    let deadline = Instant::now() + wait;
    loop {
        if let Some(found) = registry.find(wanted) {
            return Ok(found);
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            event = events.recv() => {
                if let Err(RecvError::Closed) = event {
                    break;
                }
            }
        }
    }
    registry
        .find(wanted)
        .ok_or_else(|| LanprintError::PrinterNotFound(wanted.to_owned()))
}
