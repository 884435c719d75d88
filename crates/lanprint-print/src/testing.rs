// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory fakes for the IPP client and the local spooler, shared by the
// unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use lanprint_core::error::Result;
use lanprint_core::types::{Printer, PrinterCapabilities, PrinterId, PrinterStatus, ServiceType};

use crate::discovery::ServiceAnnouncement;
use crate::ipp_client::{IppFailure, IppTransport, JobAttributes, JobSubmission, PrinterAttributes};
use crate::spooler::{LocalSpooler, SpoolerOutput};

/// Build a `PrinterAttributes` map from literal pairs.
pub fn attrs(pairs: &[(&str, &[&str])]) -> PrinterAttributes {
    pairs
        .iter()
        .map(|(name, values)| {
            (
                name.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

/// A plain announcement with one address and no host name.
pub fn announcement(name: &str, address: &str, service_type: ServiceType) -> ServiceAnnouncement {
    ServiceAnnouncement {
        name: name.to_owned(),
        host: None,
        addresses: vec![address.parse().unwrap()],
        port: Some(631),
        service_type,
        txt: HashMap::new(),
    }
}

/// An online printer at 10.0.0.5 that was never probed.
pub fn printer(name: &str) -> Printer {
    Printer {
        id: PrinterId::derive(name, "10.0.0.5", 631),
        name: name.to_owned(),
        host: "10.0.0.5".into(),
        port: 631,
        uri: "ipp://10.0.0.5:631/ipp/print".into(),
        secure_uri: None,
        service_type: ServiceType::Ipp,
        status: PrinterStatus::Idle,
        online: true,
        capabilities: PrinterCapabilities::default(),
        state_reasons: Vec::new(),
        make_and_model: None,
        location: None,
        last_seen: Utc::now(),
        matched_queue_name: None,
    }
}

struct IppScript {
    probe: std::result::Result<PrinterAttributes, IppFailure>,
    probe_delay: Option<Duration>,
    jobs: VecDeque<std::result::Result<JobAttributes, IppFailure>>,
    job_delay: Option<Duration>,
    submissions: Vec<JobSubmission>,
}

/// Scripted IPP device.
///
/// Probes answer with the configured attributes (idle by default).  Print-Job
/// answers are taken from the script in order, then default to an accepted
/// job with no id.
pub struct FakeIpp {
    script: Mutex<IppScript>,
}

impl Default for FakeIpp {
    fn default() -> Self {
        Self {
            script: Mutex::new(IppScript {
                probe: Ok(attrs(&[("printer-state", &["3"])])),
                probe_delay: None,
                jobs: VecDeque::new(),
                job_delay: None,
                submissions: Vec::new(),
            }),
        }
    }
}

impl FakeIpp {
    pub fn set_attributes(&self, attributes: PrinterAttributes) {
        self.script.lock().unwrap().probe = Ok(attributes);
    }

    pub fn fail_probes(&self, failure: IppFailure) {
        self.script.lock().unwrap().probe = Err(failure);
    }

    pub fn delay_probes(&self, delay: Duration) {
        self.script.lock().unwrap().probe_delay = Some(delay);
    }

    pub fn script_jobs(&self, answers: Vec<std::result::Result<JobAttributes, IppFailure>>) {
        self.script.lock().unwrap().jobs = answers.into();
    }

    pub fn delay_jobs(&self, delay: Duration) {
        self.script.lock().unwrap().job_delay = Some(delay);
    }

    pub fn submissions(&self) -> Vec<JobSubmission> {
        self.script.lock().unwrap().submissions.clone()
    }
}

#[async_trait]
impl IppTransport for FakeIpp {
    async fn get_printer_attributes(
        &self,
        _uri: &str,
        _requested: &[&str],
    ) -> std::result::Result<PrinterAttributes, IppFailure> {
        let (answer, delay) = {
            let script = self.script.lock().unwrap();
            (script.probe.clone(), script.probe_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        answer
    }

    async fn print_job(&self, job: &JobSubmission) -> std::result::Result<JobAttributes, IppFailure> {
        let (answer, delay) = {
            let mut script = self.script.lock().unwrap();
            script.submissions.push(job.clone());
            (script.jobs.pop_front(), script.job_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        answer.unwrap_or_else(|| Ok(JobAttributes::default()))
    }
}

/// One recorded `print_file` call.
#[derive(Debug, Clone)]
pub struct SpoolCall {
    pub queue: String,
    pub copies: u32,
    pub path: PathBuf,
    /// File contents at the time of the call.
    pub contents: Vec<u8>,
}

/// Scripted local spooler.
pub struct FakeSpooler {
    queues: Vec<String>,
    output: SpoolerOutput,
    calls: Mutex<Vec<SpoolCall>>,
}

impl FakeSpooler {
    pub fn accepting(stdout: &str) -> Self {
        Self {
            queues: Vec::new(),
            output: SpoolerOutput {
                success: true,
                exit_code: Some(0),
                stdout: stdout.to_owned(),
                stderr: String::new(),
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(stderr: &str) -> Self {
        Self {
            output: SpoolerOutput {
                success: false,
                exit_code: Some(1),
                stdout: String::new(),
                stderr: stderr.to_owned(),
            },
            ..Self::accepting("")
        }
    }

    pub fn with_queues(queues: &[&str]) -> Self {
        Self {
            queues: queues.iter().map(|q| q.to_string()).collect(),
            ..Self::accepting("")
        }
    }

    pub fn calls(&self) -> Vec<SpoolCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalSpooler for FakeSpooler {
    async fn list_queues(&self) -> Result<Vec<String>> {
        Ok(self.queues.clone())
    }

    async fn print_file(&self, queue: &str, copies: u32, path: &Path) -> Result<SpoolerOutput> {
        self.calls.lock().unwrap().push(SpoolCall {
            queue: queue.to_owned(),
            copies,
            path: path.to_owned(),
            contents: std::fs::read(path).unwrap_or_default(),
        });
        Ok(self.output.clone())
    }
}
