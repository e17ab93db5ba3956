//! Order-insensitive response comparison.
//!
//! Concurrent chat participants may receive broadcast notifications in a
//! different relative order from one implementation to the next. The
//! comparator therefore treats a newline-terminated payload as a set of
//! lines: reordering is accepted, while omission, substitution, and
//! duplication are rejected.
//!
//! Payloads that are not newline-terminated on both sides only match on
//! exact byte equality.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use bytes::Bytes;

/// Outcome of comparing an actual response with the expected one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    /// Whether the payloads are considered equal.
    pub equal: bool,
    /// Human-readable explanation; empty when `equal` is true.
    pub diagnostic: String,
}

/// Return `true` when `actual` matches `expected` up to line order.
///
/// A payload containing the same line twice never matches anything but
/// itself byte-for-byte, because each side's line count must equal its
/// distinct-line count.
#[must_use]
pub fn receive_equals(actual: &[u8], expected: &[u8]) -> bool {
    if actual == expected {
        return true;
    }

    if !actual.ends_with(b"\n") || !expected.ends_with(b"\n") {
        return false;
    }

    let actual_lines = split_lines(actual);
    let expected_lines = split_lines(expected);

    let actual_set: BTreeSet<&[u8]> = actual_lines.iter().copied().collect();
    let expected_set: BTreeSet<&[u8]> = expected_lines.iter().copied().collect();

    actual_set == expected_set
        && actual_set.len() == actual_lines.len()
        && expected_set.len() == expected_lines.len()
}

/// Compare `actual` with `expected` and build a diagnostic on mismatch.
#[must_use]
pub fn compare(actual: &[u8], expected: &[u8]) -> Comparison {
    if receive_equals(actual, expected) {
        return Comparison {
            equal: true,
            diagnostic: String::new(),
        };
    }

    Comparison {
        equal: false,
        diagnostic: describe_mismatch(actual, expected),
    }
}

/// Render `Expected b"…" Got b"…"`, followed by the missing and unexpected
/// lines when both payloads are line-terminated.
#[must_use]
pub fn describe_mismatch(actual: &[u8], expected: &[u8]) -> String {
    let mut out = format!(
        "Expected {:?} Got {:?}",
        Bytes::copy_from_slice(expected),
        Bytes::copy_from_slice(actual)
    );

    if actual.ends_with(b"\n") && expected.ends_with(b"\n") {
        let actual_lines = split_lines(actual);
        let expected_lines = split_lines(expected);

        let missing = lines_not_in(&expected_lines, &actual_lines);
        let unexpected = lines_not_in(&actual_lines, &expected_lines);

        if !missing.is_empty() {
            let _ = write!(out, "\n  missing: {}", render_lines(&missing));
        }
        if !unexpected.is_empty() {
            let _ = write!(out, "\n  unexpected: {}", render_lines(&unexpected));
        }
        if let Some(line) = first_duplicate(&actual_lines) {
            let _ = write!(out, "\n  duplicated: {}", render_lines(&[line]));
        }
    }

    out
}

/// Split a payload into lines on `\n`, `\r\n`, or a lone `\r`, dropping
/// the terminators. A trailing terminator does not yield an empty line.
fn split_lines(payload: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut rest = payload;
    while let Some(end) = rest.iter().position(|byte| matches!(byte, b'\n' | b'\r')) {
        lines.push(&rest[..end]);
        let width = if rest[end..].starts_with(b"\r\n") { 2 } else { 1 };
        rest = &rest[end + width..];
    }
    if !rest.is_empty() {
        lines.push(rest);
    }
    lines
}

fn lines_not_in<'a>(from: &[&'a [u8]], other: &[&[u8]]) -> Vec<&'a [u8]> {
    let other: BTreeSet<&[u8]> = other.iter().copied().collect();
    let mut seen = BTreeSet::new();
    from.iter()
        .copied()
        .filter(|line| !other.contains(line) && seen.insert(*line))
        .collect()
}

fn first_duplicate<'a>(lines: &[&'a [u8]]) -> Option<&'a [u8]> {
    let mut seen = BTreeSet::new();
    lines.iter().copied().find(|line| !seen.insert(*line))
}

fn render_lines(lines: &[&[u8]]) -> String {
    let rendered: Vec<String> = lines
        .iter()
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect();
    format!("{rendered:?}")
}
