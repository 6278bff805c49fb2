// src/bib/writer.rs

//! Canonical snapshot writer
//!
//! Output is a pure function of the record contents: entries sorted by id,
//! reserved keys first in fixed order, remaining fields sorted by name, keys
//! padded so every value starts in the same column. Loading and re-writing an
//! unmodified file therefore reproduces it byte for byte.

use super::{DATA_PROVENANCE_KEY, MASTERDATA_PROVENANCE_KEY, ORIGIN_KEY, STATUS_KEY, SnapshotKind};
use crate::provenance::ProvenanceMap;
use crate::record::Record;
use std::fmt::Write;

/// Width of the key column (including the two-space indent)
const KEY_COLUMN: usize = 32;

/// Column at which values start (after `= {`)
const VALUE_COLUMN: usize = KEY_COLUMN + 3;

fn push_field(out: &mut String, key: &str, value: &str) {
    let value = escape_value(value);
    let _ = writeln!(out, "  {:<width$}= {{{}}},", key, value, width = KEY_COLUMN - 2);
}

/// Encode a value for a brace-delimited slot
///
/// Matched brace pairs are written as they are. Unmatched braces become
/// `\{` / `\}`, and a backslash becomes `\\` when it precedes a brace,
/// another backslash or the end of the value. Values without such
/// characters are written unchanged.
pub(crate) fn escape_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut matched = vec![false; chars.len()];
    let mut open = Vec::new();
    for (i, c) in chars.iter().enumerate() {
        match c {
            '{' => open.push(i),
            '}' => {
                if let Some(j) = open.pop() {
                    matched[i] = true;
                    matched[j] = true;
                }
            }
            _ => {}
        }
    }

    let mut out = String::with_capacity(value.len());
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '\\' if matches!(chars.get(i + 1).copied(), None | Some('{' | '}' | '\\')) => out.push_str("\\\\"),
            '{' | '}' if !matched[i] => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Render a provenance map, one field per line
pub(crate) fn render_provenance(map: &ProvenanceMap) -> String {
    let indent = " ".repeat(VALUE_COLUMN);
    map.iter()
        .map(|(field, entry)| format!("{}:{};{}", field, entry.sources.join(","), entry.notes.join(",")))
        .collect::<Vec<_>>()
        .join(&format!("\n{indent}"))
}

/// Render one entry
pub fn write_entry(out: &mut String, record: &Record, kind: SnapshotKind) {
    let _ = writeln!(out, "@{}{{{},", record.entry_type, record.id);

    if kind == SnapshotKind::Main {
        if !record.origins.is_empty() {
            let origins = record
                .origins
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(";");
            push_field(out, ORIGIN_KEY, &origins);
        }
        push_field(out, STATUS_KEY, record.status.as_ref());
        if !record.masterdata_provenance.is_empty() {
            push_field(out, MASTERDATA_PROVENANCE_KEY, &render_provenance(&record.masterdata_provenance));
        }
        if !record.data_provenance.is_empty() {
            push_field(out, DATA_PROVENANCE_KEY, &render_provenance(&record.data_provenance));
        }
    }

    for (key, value) in &record.fields {
        push_field(out, key, value);
    }
    out.push_str("}\n");
}

/// Render a whole snapshot
pub fn write_records<'a, I>(records: I, kind: SnapshotKind) -> String
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut sorted: Vec<&Record> = records.into_iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut out = String::new();
    for (i, record) in sorted.into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        write_entry(&mut out, record, kind);
    }
    out
}
