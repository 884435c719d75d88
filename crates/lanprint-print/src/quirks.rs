// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Vendor quirk table.
//
// Some printers answer IPP requests in ways the client cannot accept even
// though the device did what was asked.  Each rule below names one such
// anomaly, the operations it may be applied to, and the exact message
// fragments that identify it.  Matching is a case-insensitive substring test
// against the client's failure message.
//
// A new anomaly gets a new row.  Do not widen an existing fragment list to
// cover it.

use std::fmt;

/// IPP operation a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetPrinterAttributes,
    PrintJob,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::GetPrinterAttributes => "Get-Printer-Attributes",
            Self::PrintJob => "Print-Job",
        })
    }
}

/// A known device anomaly that is normalised to success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quirk {
    /// The device answered, but the response body does not decode.
    UnparseableResponse,
    /// Print-Job: unexpected HTTP status after the body was accepted, and the
    /// one retry then hits a dead connection.
    RejectedAfterBody,
}

impl Quirk {
    /// Whether the rule is only confirmed by a failing retry.
    pub fn needs_retry(&self) -> bool {
        rule_for(*self).is_some_and(|rule| !rule.retry_symptoms.is_empty())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UnparseableResponse => "unparseable-response",
            Self::RejectedAfterBody => "rejected-after-body",
        }
    }
}

impl fmt::Display for Quirk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of the quirk table.
pub struct QuirkRule {
    pub quirk: Quirk,
    pub operations: &'static [Operation],
    /// Fragments of the first failure that identify the rule.
    pub symptoms: &'static [&'static str],
    /// Fragments the retry failure must show.  Empty = no retry involved.
    pub retry_symptoms: &'static [&'static str],
}

/// Rules are tried in order; the first match wins.
pub const QUIRK_TABLE: &[QuirkRule] = &[
    QuirkRule {
        quirk: Quirk::UnparseableResponse,
        operations: &[Operation::GetPrinterAttributes, Operation::PrintJob],
        symptoms: &[
            "error parsing",
            "parsing error",
            "invalid tag",
            "incomplete ipp",
            "unexpected end of",
            "failed to fill whole buffer",
            "ipp parse",
        ],
        retry_symptoms: &[],
    },
    QuirkRule {
        quirk: Quirk::RejectedAfterBody,
        operations: &[Operation::PrintJob],
        symptoms: &[
            "http request error",
            "unexpected http status",
            "expectation failed",
        ],
        retry_symptoms: &[
            "broken pipe",
            "connection reset",
            "connection closed before message completed",
            "epipe",
            "econnreset",
            "connection aborted",
        ],
    },
];

fn rule_for(quirk: Quirk) -> Option<&'static QuirkRule> {
    QUIRK_TABLE.iter().find(|rule| rule.quirk == quirk)
}

fn mentions_any(message: &str, fragments: &[&str]) -> bool {
    let message = message.to_ascii_lowercase();
    fragments.iter().any(|f| message.contains(f))
}

/// Classify a failure of `operation` against the table.
pub fn classify(operation: Operation, message: &str) -> Option<Quirk> {
    QUIRK_TABLE
        .iter()
        .filter(|rule| rule.operations.contains(&operation))
        .find(|rule| mentions_any(message, rule.symptoms))
        .map(|rule| rule.quirk)
}

/// Whether the failure of the retry confirms `quirk`.
pub fn confirmed_by_retry(quirk: Quirk, retry_message: &str) -> bool {
    rule_for(quirk).is_some_and(|rule| {
        !rule.retry_symptoms.is_empty() && mentions_any(retry_message, rule.retry_symptoms)
    })
}
