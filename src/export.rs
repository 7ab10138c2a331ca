//! CSV export with the pipeline columns appended.
//!
//! The written file can be imported again: the normalizer reads the reserved
//! columns back into status, sub-status and notes.

use chrono::{NaiveDate, Utc};
use indexmap::IndexSet;

use crate::models::{Lead, RESERVED_COLUMNS};
use crate::types::{AppError, AppResult};

/// Display columns across all leads, in first-seen order.
pub fn export_columns(leads: &[Lead]) -> Vec<String> {
    let mut columns: IndexSet<&str> = IndexSet::new();
    for lead in leads {
        for (key, _) in lead.display_fields() {
            columns.insert(key.as_str());
        }
    }
    columns.into_iter().map(str::to_string).collect()
}

pub fn export_csv(leads: &[Lead]) -> AppResult<String> {
    let columns = export_columns(leads);
    let mut writer = csv::Writer::from_writer(Vec::new());

    let header = columns
        .iter()
        .map(String::as_str)
        .chain(RESERVED_COLUMNS);
    writer.write_record(header).map_err(export_error)?;

    for lead in leads {
        let status = lead.meta.status.as_str().to_string();
        let sub_status = lead.meta.sub_status.as_str().to_string();
        let row = columns
            .iter()
            .map(|column| lead.fields.get(column).cloned().unwrap_or_default())
            .chain([status, sub_status, lead.notes_joined()]);
        writer.write_record(row).map_err(export_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))
}

fn export_error(e: csv::Error) -> AppError {
    AppError::Internal(format!("CSV export failed: {}", e))
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("LeadGenie_Export_{}.csv", date.format("%Y-%m-%d"))
}

pub fn todays_export_file_name() -> String {
    export_file_name(Utc::now().date_naive())
}
