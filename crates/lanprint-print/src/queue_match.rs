// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Matching a discovered printer name to a local spooler queue.

/// Return the first queue matching `printer_name`.
///
/// Rules are tried in priority order, each over the whole list before the
/// next one starts:
///   1. case-insensitive exact match
///   2. exact match after dropping every non-alphanumeric character
///   3. case-insensitive substring, in either direction, on the
///      alphanumeric forms (so `EPSON L3250` finds `EPSON_L3250_2`)
pub fn match_queue(printer_name: &str, queues: &[String]) -> Option<String> {
    let name = printer_name.trim();
    if name.is_empty() {
        return None;
    }
    let lower = name.to_lowercase();
    let squashed = alphanumeric(name);
    if squashed.is_empty() {
        return None;
    }

    let candidates = || queues.iter().filter(|q| !q.trim().is_empty());

    candidates()
        .find(|q| q.trim().to_lowercase() == lower)
        .or_else(|| {
            candidates().find(|q| {
                let q = alphanumeric(q);
                !q.is_empty() && q == squashed
            })
        })
        .or_else(|| {
            candidates().find(|q| {
                let q = alphanumeric(q);
                !q.is_empty() && (q.contains(&squashed) || squashed.contains(&q))
            })
        })
        .cloned()
}

fn alphanumeric(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Queue name derived from a display name when nothing matched.
///
/// CUPS queue names may not contain spaces, `/` or `#`; anything outside
/// `[A-Za-z0-9_.-]` becomes `_`.
pub fn sanitize_queue_name(display_name: &str) -> String {
    let name: String = display_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() { "printer".to_owned() } else { name }
}
