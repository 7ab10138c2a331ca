//! Row normalizer
//!
//! Turns a header row plus data rows into [`Lead`]s and recovers pipeline
//! state that an earlier export wrote into the reserved columns.

use indexmap::IndexMap;

use super::tokenizer::{retain_non_empty, Grid};
use crate::models::{
    Lead, LeadStatus, SubStatus, NOTES_COLUMN, NOTES_SEPARATOR, STATUS_CALL_COLUMN,
    STATUS_LEAD_COLUMN,
};

/// First surviving row is the header. Fewer than two rows yields no leads.
pub fn normalize(rows: Grid) -> Vec<Lead> {
    let rows = retain_non_empty(rows);
    let Some((header, data)) = rows.split_first() else {
        return Vec::new();
    };
    if data.is_empty() {
        return Vec::new();
    }

    let headers: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();

    data.iter()
        .map(|values| {
            let mut fields = IndexMap::with_capacity(headers.len());
            for (idx, name) in headers.iter().enumerate() {
                if name.is_empty() {
                    continue;
                }
                let value = values.get(idx).cloned().unwrap_or_default();
                fields.insert(name.clone(), value);
            }

            let mut lead = Lead::new(fields);
            recover_pipeline_state(&mut lead);
            lead
        })
        .collect()
}

/// Reads `STATUS(LEAD)`, `STATUS(CALL)` and `Activity & Notes` back into the
/// metadata. The lead already carries defaults, so unknown labels change nothing.
pub fn recover_pipeline_state(lead: &mut Lead) {
    if let Some(raw) = non_blank(lead.fields.get(STATUS_LEAD_COLUMN)) {
        lead.meta.status = LeadStatus::parse_or_default(raw);
    }
    if let Some(raw) = non_blank(lead.fields.get(STATUS_CALL_COLUMN)) {
        lead.meta.sub_status = SubStatus::parse_or_default(raw);
    }
    if let Some(raw) = non_blank(lead.fields.get(NOTES_COLUMN)) {
        lead.meta.notes = raw
            .split(NOTES_SEPARATOR)
            .filter(|note| !note.is_empty())
            .map(str::to_string)
            .collect();
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}
