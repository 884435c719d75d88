// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP protocol transport.
//
// Builds one Print-Job per submission against the printer's preferred URI
// (the `ipps://` variant when known).  Failures are checked against the quirk
// table: an unparseable response is taken as accepted, and the
// rejected-after-body anomaly gets exactly one retry, which is taken as
// accepted if it dies on a broken connection.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use lanprint_core::error::{LanprintError, Result};
use lanprint_core::types::{PrintOptions, Printer, UNKNOWN_JOB_STATE};

use crate::ipp_client::{IppFailure, IppTransport, JobAttributes, JobSubmission};
use crate::quirks::{self, Operation, Quirk};

/// Normalised Print-Job result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolOutcome {
    pub job_id: Option<String>,
    pub job_state: String,
    /// The quirk that turned a failure into this outcome, if any.
    pub normalized: Option<Quirk>,
}

impl ProtocolOutcome {
    fn accepted(attrs: JobAttributes) -> Self {
        Self {
            job_id: attrs.job_id.map(|id| id.to_string()),
            job_state: attrs.job_state.unwrap_or_else(|| UNKNOWN_JOB_STATE.to_owned()),
            normalized: None,
        }
    }

    fn normalized(quirk: Quirk) -> Self {
        Self {
            job_id: None,
            job_state: UNKNOWN_JOB_STATE.to_owned(),
            normalized: Some(quirk),
        }
    }
}

enum AttemptError {
    TimedOut(Duration),
    Failed(IppFailure),
}

/// Submits documents over IPP.
#[derive(Clone)]
pub struct ProtocolTransport {
    client: Arc<dyn IppTransport>,
    requesting_user: String,
    /// Bound on each Print-Job attempt; `None` waits indefinitely.
    timeout: Option<Duration>,
}

impl ProtocolTransport {
    pub fn new(
        client: Arc<dyn IppTransport>,
        requesting_user: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            client,
            requesting_user: requesting_user.into(),
            timeout,
        }
    }

    #[instrument(
        skip(self, printer, document, options),
        fields(printer_id = %printer.id, format = %document_format, bytes = document.len())
    )]
    pub async fn submit(
        &self,
        printer: &Printer,
        document: Vec<u8>,
        document_format: &str,
        job_name: &str,
        options: &PrintOptions,
    ) -> Result<ProtocolOutcome> {
        let job = JobSubmission {
            printer_uri: printer.preferred_uri().to_owned(),
            requesting_user: self.requesting_user.clone(),
            job_name: job_name.to_owned(),
            document_format: document_format.to_owned(),
            copies: options.copies.map(|c| c.max(1)),
            sides: options.duplex.map(|d| d.ipp_sides_keyword().to_owned()),
            color_mode: options.color.map(|c| c.ipp_keyword().to_owned()),
            document,
        };

        let failure = match self.attempt(&job).await {
            Ok(attrs) => return Ok(ProtocolOutcome::accepted(attrs)),
            Err(AttemptError::TimedOut(after)) => return Err(timed_out(&job, after)),
            Err(AttemptError::Failed(failure)) => failure,
        };

        let Some(quirk) = quirks::classify(Operation::PrintJob, &failure.message) else {
            return Err(LanprintError::Transport(format!("{}: {failure}", job.printer_uri)));
        };
        if !quirk.needs_retry() {
            info!(quirk = %quirk, "Print-Job failure normalised");
            return Ok(ProtocolOutcome::normalized(quirk));
        }

        warn!(quirk = %quirk, error = %failure, "Print-Job rejected after body, retrying once");
        match self.attempt(&job).await {
            Ok(attrs) => Ok(ProtocolOutcome::accepted(attrs)),
            Err(AttemptError::TimedOut(after)) => Err(timed_out(&job, after)),
            Err(AttemptError::Failed(retry)) => {
                if quirks::confirmed_by_retry(quirk, &retry.message) {
                    info!(quirk = %quirk, "Print-Job retry failure normalised");
                    Ok(ProtocolOutcome::normalized(quirk))
                } else if let Some(other) = quirks::classify(Operation::PrintJob, &retry.message)
                    .filter(|q| !q.needs_retry())
                {
                    info!(quirk = %other, "Print-Job retry failure normalised");
                    Ok(ProtocolOutcome::normalized(other))
                } else {
                    Err(LanprintError::Transport(format!(
                        "{}: {failure}; retry: {retry}",
                        job.printer_uri
                    )))
                }
            }
        }
    }

    async fn attempt(&self, job: &JobSubmission) -> std::result::Result<JobAttributes, AttemptError> {
        let call = self.client.print_job(job);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| AttemptError::TimedOut(limit))?
                .map_err(AttemptError::Failed),
            None => call.await.map_err(AttemptError::Failed),
        }
    }
}

fn timed_out(job: &JobSubmission, after: Duration) -> LanprintError {
    LanprintError::Transport(format!("{}: no answer within {after:?}", job.printer_uri))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipp_client::IppClient;
    use crate::testing::{FakeIpp, printer};
    use lanprint_core::types::{ColorMode, DuplexMode};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn transport(ipp: Arc<FakeIpp>) -> ProtocolTransport {
        ProtocolTransport::new(ipp, "tester", Some(Duration::from_secs(5)))
    }

    fn fail(message: &str) -> std::result::Result<JobAttributes, IppFailure> {
        Err(IppFailure::new(Operation::PrintJob, message))
    }

    #[tokio::test]
    async fn accepted_job_reports_id_and_state() {
        let ipp = Arc::new(FakeIpp::default());
        ipp.script_jobs(vec![Ok(JobAttributes {
            job_id: Some(17),
            job_state: Some("processing".into()),
        })]);

        let options = PrintOptions {
            copies: Some(2),
            duplex: Some(DuplexMode::LongEdge),
            color: Some(ColorMode::Monochrome),
            media_type: None,
        };
        let outcome = transport(ipp.clone())
            .submit(&printer("Office"), b"%PDF".to_vec(), "application/pdf", "report.pdf", &options)
            .await
            .unwrap();
        assert_eq!(outcome.job_id.as_deref(), Some("17"));
        assert_eq!(outcome.job_state, "processing");

        let sent = ipp.submissions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].requesting_user, "tester");
        assert_eq!(sent[0].copies, Some(2));
        assert_eq!(sent[0].sides.as_deref(), Some("two-sided-long-edge"));
        assert_eq!(sent[0].color_mode.as_deref(), Some("monochrome"));
    }

    #[tokio::test]
    async fn unset_options_are_not_sent() {
        let ipp = Arc::new(FakeIpp::default());
        transport(ipp.clone())
            .submit(&printer("Office"), vec![1], "application/pdf", "a", &PrintOptions::default())
            .await
            .unwrap();
        let sent = ipp.submissions();
        assert_eq!(sent[0].copies, None);
        assert_eq!(sent[0].sides, None);
        assert_eq!(sent[0].color_mode, None);
    }

    #[tokio::test]
    async fn secure_uri_is_preferred() {
        let ipp = Arc::new(FakeIpp::default());
        let mut target = printer("Office");
        target.secure_uri = Some("ipps://10.0.0.5:631/ipp/print".into());
        transport(ipp.clone())
            .submit(&target, vec![1], "application/pdf", "a", &PrintOptions::default())
            .await
            .unwrap();
        assert_eq!(ipp.submissions()[0].printer_uri, "ipps://10.0.0.5:631/ipp/print");
    }

    #[tokio::test]
    async fn unparseable_response_is_success_with_unknown_id() {
        let ipp = Arc::new(FakeIpp::default());
        ipp.script_jobs(vec![fail("error parsing IPP response: unexpected end of file")]);

        let outcome = transport(ipp.clone())
            .submit(&printer("Office"), vec![1], "application/pdf", "a", &PrintOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.job_id, None);
        assert_eq!(outcome.job_state, "unknown");
        assert_eq!(outcome.normalized, Some(Quirk::UnparseableResponse));
        assert_eq!(ipp.submissions().len(), 1);
    }

    #[tokio::test]
    async fn rejected_then_broken_pipe_is_success() {
        let ipp = Arc::new(FakeIpp::default());
        ipp.script_jobs(vec![
            fail("HTTP request error: unexpected HTTP status 400"),
            fail("io error: Broken pipe (os error 32)"),
        ]);

        let outcome = transport(ipp.clone())
            .submit(&printer("Office"), vec![1], "image/pwg-raster", "a", &PrintOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.normalized, Some(Quirk::RejectedAfterBody));
        assert_eq!(ipp.submissions().len(), 2);
    }

    #[tokio::test]
    async fn rejected_then_genuine_failure_is_error() {
        let ipp = Arc::new(FakeIpp::default());
        ipp.script_jobs(vec![
            fail("HTTP request error: unexpected HTTP status 400"),
            fail("returned status ClientErrorDocumentFormatNotSupported"),
        ]);

        let result = transport(ipp)
            .submit(&printer("Office"), vec![1], "application/pdf", "a", &PrintOptions::default())
            .await;
        assert!(matches!(result, Err(LanprintError::Transport(_))));
    }

    #[tokio::test]
    async fn retry_success_returns_real_result() {
        let ipp = Arc::new(FakeIpp::default());
        ipp.script_jobs(vec![
            fail("unexpected HTTP status 417 Expectation Failed"),
            Ok(JobAttributes {
                job_id: Some(3),
                job_state: None,
            }),
        ]);
        let outcome = transport(ipp)
            .submit(&printer("Office"), vec![1], "application/pdf", "a", &PrintOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.job_id.as_deref(), Some("3"));
        assert_eq!(outcome.normalized, None);
    }

    #[tokio::test]
    async fn genuine_failure_is_transport_error() {
        let ipp = Arc::new(FakeIpp::default());
        ipp.script_jobs(vec![fail("connection refused")]);
        let result = transport(ipp.clone())
            .submit(&printer("Office"), vec![1], "application/pdf", "a", &PrintOptions::default())
            .await;
        assert!(matches!(result, Err(LanprintError::Transport(msg)) if msg.contains("connection refused")));
        assert_eq!(ipp.submissions().len(), 1);
    }

    /// Read what the client sends until it has been quiet for a moment.
    async fn drain(stream: &mut TcpStream) {
        let mut buf = [0u8; 4096];
        while let Ok(Ok(n)) =
            tokio::time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await
        {
            if n == 0 {
                break;
            }
        }
    }

    #[tokio::test]
    async fn real_client_rejected_then_dropped_retry_is_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let device = tokio::spawn(async move {
            // First attempt: swallow the whole job, then refuse it.
            let (mut first, _) = listener.accept().await.unwrap();
            drain(&mut first).await;
            first
                .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            let _ = first.shutdown().await;
            drop(first);

            // Retry: hang up without answering.
            let (second, _) = listener.accept().await.unwrap();
            drop(second);
        });

        let mut target = printer("Office");
        target.uri = format!("ipp://127.0.0.1:{port}/ipp/print");
        let outcome = ProtocolTransport::new(
            Arc::new(IppClient::default()),
            "tester",
            Some(Duration::from_secs(10)),
        )
        .submit(&target, b"%PDF-1.7".to_vec(), "application/pdf", "a.pdf", &PrintOptions::default())
        .await
        .unwrap();

        assert_eq!(outcome.normalized, Some(Quirk::RejectedAfterBody));
        assert_eq!(outcome.job_id, None);
        assert_eq!(outcome.job_state, "unknown");
        device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn submission_timeout_is_transport_error() {
        let ipp = Arc::new(FakeIpp::default());
        ipp.delay_jobs(Duration::from_secs(600));
        let result = transport(ipp)
            .submit(&printer("Office"), vec![1], "application/pdf", "a", &PrintOptions::default())
            .await;
        assert!(matches!(result, Err(LanprintError::Transport(msg)) if msg.contains("no answer")));
    }
}
