// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local spooler transport (CUPS `lp` / `lpstat`).
//
// The spooler is a black box: we list its queues, hand it a staged file with
// a queue name and copy count, and read the request id back out of its
// output.  Each command runs under a timeout and is killed if it overruns.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use lanprint_core::config::SpoolerMode;
use lanprint_core::error::{LanprintError, Result};
use lanprint_core::types::Printer;

use crate::queue_match::sanitize_queue_name;

/// Captured result of one spooler command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpoolerOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl SpoolerOutput {
    /// stderr and stdout, for error diagnostics.
    pub fn diagnostics(&self) -> String {
        [self.stderr.trim(), self.stdout.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The two spooler commands the service uses.
#[async_trait]
pub trait LocalSpooler: Send + Sync {
    /// Names of the queues accepting jobs.
    async fn list_queues(&self) -> Result<Vec<String>>;

    /// Submit `path` to `queue`.  A non-zero exit is returned, not raised.
    async fn print_file(&self, queue: &str, copies: u32, path: &Path) -> Result<SpoolerOutput>;
}

/// CUPS command-line spooler.
#[derive(Debug, Clone)]
pub struct LpSpooler {
    timeout: Duration,
}

impl LpSpooler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The spooler to use under `mode`, if any.
    pub fn detect(mode: SpoolerMode, timeout: Duration) -> Option<Self> {
        match mode {
            SpoolerMode::Disabled => None,
            SpoolerMode::Enabled => Some(Self::new(timeout)),
            SpoolerMode::Auto => {
                let found = on_path("lp") && on_path("lpstat");
                debug!(found, "local spooler detection");
                found.then(|| Self::new(timeout))
            }
        }
    }

    async fn run(&self, mut command: Command) -> Result<SpoolerOutput> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| LanprintError::spooler(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| LanprintError::spooler(format!("failed to run spooler command: {e}")))?;

        Ok(SpoolerOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl LocalSpooler for LpSpooler {
    async fn list_queues(&self) -> Result<Vec<String>> {
        let mut command = Command::new("lpstat");
        command.arg("-a");
        let output = self.run(command).await?;
        if !output.success {
            return Err(LanprintError::Spooler {
                message: format!("lpstat exited with status {:?}", output.exit_code),
                diagnostics: output.diagnostics(),
            });
        }
        Ok(parse_queue_list(&output.stdout))
    }

    async fn print_file(&self, queue: &str, copies: u32, path: &Path) -> Result<SpoolerOutput> {
        let mut command = Command::new("lp");
        command
            .arg("-d")
            .arg(queue)
            .arg("-n")
            .arg(copies.max(1).to_string())
            .arg("--")
            .arg(path);
        self.run(command).await
    }
}

fn on_path(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// First column of each `lpstat -a` line.
fn parse_queue_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_owned)
        .collect()
}

/// Job id from `lp` output (`request id is Queue-42 (1 file(s))`).
pub fn parse_request_id(stdout: &str) -> Option<String> {
    const MARKER: &str = "request id is ";
    let lower = stdout.to_ascii_lowercase();
    let start = lower.find(MARKER)? + MARKER.len();
    stdout[start..]
        .split_whitespace()
        .next()
        .map(str::to_owned)
}

/// Result of a spooler submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolerOutcome {
    pub job_id: Option<String>,
    pub queue: String,
}

/// Stages payloads and submits them through a [`LocalSpooler`].
#[derive(Clone)]
pub struct SpoolerTransport {
    spooler: Arc<dyn LocalSpooler>,
    staging_dir: PathBuf,
}

impl SpoolerTransport {
    pub fn new(spooler: Arc<dyn LocalSpooler>, staging_dir: PathBuf) -> Self {
        Self {
            spooler,
            staging_dir,
        }
    }

    /// Print `document` on `printer`'s queue.
    ///
    /// The queue is the one matched at discovery, else the sanitised display
    /// name.  The staged file is removed before this returns, whatever the
    /// outcome.
    #[instrument(skip(self, printer, document), fields(printer_id = %printer.id, bytes = document.len()))]
    pub async fn submit(
        &self,
        printer: &Printer,
        document: &[u8],
        file_name: &str,
        copies: u32,
    ) -> Result<SpoolerOutcome> {
        let queue = printer
            .matched_queue_name
            .clone()
            .unwrap_or_else(|| sanitize_queue_name(&printer.name));

        // `NamedTempFile` deletes on drop, which covers every early return.
        let staged = self.stage(document, file_name)?;
        let submitted = self.spooler.print_file(&queue, copies, staged.path()).await;
        let staged_path = staged.path().to_owned();
        if let Err(e) = staged.close() {
            warn!(path = %staged_path.display(), error = %e, "failed to remove staged file");
        }

        let output = submitted?;
        if !output.success {
            return Err(LanprintError::Spooler {
                message: format!("lp exited with status {:?} for queue {queue}", output.exit_code),
                diagnostics: output.diagnostics(),
            });
        }

        let job_id = parse_request_id(&output.stdout);
        info!(queue = %queue, job_id = ?job_id, "job handed to local spooler");
        Ok(SpoolerOutcome { job_id, queue })
    }

    fn stage(&self, document: &[u8], file_name: &str) -> Result<tempfile::NamedTempFile> {
        let prefix = format!("lanprint-{}-", Utc::now().timestamp_millis());
        let suffix = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();

        let mut staged = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(&self.staging_dir)
            .map_err(|e| LanprintError::spooler(format!("failed to stage payload: {e}")))?;
        staged
            .write_all(document)
            .and_then(|()| staged.flush())
            .map_err(|e| LanprintError::spooler(format!("failed to write staged payload: {e}")))?;
        debug!(path = %staged.path().display(), "payload staged");
        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSpooler, printer};

    #[test]
    fn request_id_is_parsed() {
        assert_eq!(
            parse_request_id("request id is EPSON_L3250-42 (1 file(s))\n").as_deref(),
            Some("EPSON_L3250-42")
        );
        assert_eq!(parse_request_id("Request id is Office-7"), Some("Office-7".into()));
        assert_eq!(parse_request_id(""), None);
        assert_eq!(parse_request_id("lp: printing started"), None);
    }

    #[test]
    fn queue_list_takes_first_column() {
        let out = "EPSON_L3250 accepting requests since Mon 01 Jan\nHP_OfficeJet accepting requests since Tue\n\n";
        assert_eq!(parse_queue_list(out), vec!["EPSON_L3250", "HP_OfficeJet"]);
    }

    #[test]
    fn explicit_mode_overrides_detection() {
        assert!(LpSpooler::detect(SpoolerMode::Disabled, Duration::from_secs(1)).is_none());
        assert!(LpSpooler::detect(SpoolerMode::Enabled, Duration::from_secs(1)).is_some());
    }

    #[tokio::test]
    async fn staged_file_removed_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeSpooler::accepting("request id is Office-12 (1 file(s))"));
        let transport = SpoolerTransport::new(fake.clone(), dir.path().to_owned());
        let mut target = printer("Office Laser");
        target.matched_queue_name = Some("Office_Laser".into());

        let outcome = transport.submit(&target, b"%PDF-1.7", "report.pdf", 2).await.unwrap();
        assert_eq!(outcome.job_id.as_deref(), Some("Office-12"));
        assert_eq!(outcome.queue, "Office_Laser");

        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].queue, "Office_Laser");
        assert_eq!(calls[0].copies, 2);
        assert_eq!(calls[0].contents, b"%PDF-1.7");
        let name = calls[0].path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("lanprint-") && name.ends_with(".pdf"));
        assert!(!calls[0].path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn staged_file_removed_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeSpooler::rejecting("lp: The printer or class does not exist."));
        let transport = SpoolerTransport::new(fake.clone(), dir.path().to_owned());

        let err = transport
            .submit(&printer("EPSON L3250 Series"), b"data", "photo.png", 1)
            .await
            .unwrap_err();
        match err {
            LanprintError::Spooler { diagnostics, .. } => {
                assert!(diagnostics.contains("does not exist"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let calls = fake.calls();
        assert_eq!(calls[0].queue, "EPSON_L3250_Series");
        assert!(!calls[0].path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_request_id_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeSpooler::accepting(""));
        let transport = SpoolerTransport::new(fake, dir.path().to_owned());
        let outcome = transport.submit(&printer("Office"), b"x", "x.txt", 1).await.unwrap();
        assert_eq!(outcome.job_id, None);
    }
}
