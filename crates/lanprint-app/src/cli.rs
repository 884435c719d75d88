// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use lanprint_core::types::{ColorMode, DuplexMode, PrintOptions};

#[derive(Parser, Debug)]
#[command(name = "lanprint", author, version, about = "Discover LAN printers and send jobs to them")]
pub struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Browse the network and print registry events as JSON lines until Ctrl-C
    Watch,

    /// Browse for a while, then print the known printers
    List {
        /// Seconds to browse before listing
        #[arg(short, long, default_value_t = 5)]
        wait: u64,

        /// Only list printers that are online
        #[arg(long)]
        online: bool,
    },

    /// Send a file to a printer
    Print {
        /// Document to print
        file: PathBuf,

        /// Printer id or name
        #[arg(short, long)]
        printer: String,

        /// Seconds to wait for the printer to be discovered
        #[arg(short, long, default_value_t = 10)]
        wait: u64,

        #[arg(short = 'n', long)]
        copies: Option<u32>,

        #[arg(long, value_enum)]
        duplex: Option<DuplexArg>,

        #[arg(long, value_enum)]
        color: Option<ColorArg>,

        /// MIME type of the file (derived from the extension if omitted)
        #[arg(long)]
        mime: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum DuplexArg {
    OneSided,
    LongEdge,
    ShortEdge,
}

impl From<DuplexArg> for DuplexMode {
    fn from(arg: DuplexArg) -> Self {
        match arg {
            DuplexArg::OneSided => Self::Simplex,
            DuplexArg::LongEdge => Self::LongEdge,
            DuplexArg::ShortEdge => Self::ShortEdge,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ColorArg {
    Color,
    Monochrome,
}

impl From<ColorArg> for ColorMode {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Color => Self::Color,
            ColorArg::Monochrome => Self::Monochrome,
        }
    }
}

/// Collect the print flags into `PrintOptions`.
pub fn print_options(
    copies: Option<u32>,
    duplex: Option<DuplexArg>,
    color: Option<ColorArg>,
    mime: Option<String>,
) -> PrintOptions {
    PrintOptions {
        copies,
        duplex: duplex.map(Into::into),
        color: color.map(Into::into),
        media_type: mime,
    }
}
