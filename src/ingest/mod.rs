//! Tabular ingestion
//!
//! Raw text or spreadsheet bytes → grid of cells → [`Lead`]s. Both the
//! pasted-CSV and the uploaded-file paths end in the same normalizer, so a
//! file previously exported with pipeline columns re-imports with its state.

pub mod excel;
pub mod normalizer;
pub mod tokenizer;

pub use normalizer::{normalize, recover_pipeline_state};
pub use tokenizer::{retain_non_empty, tokenize, Grid};

use mime_guess::{mime, Mime};
use tracing::info;

use crate::models::Lead;
use crate::types::{AppError, AppResult};

const DELIMITED_EXTENSIONS: [&str; 2] = ["csv", "txt"];
const SPREADSHEET_EXTENSIONS: [&str; 6] = ["xlsx", "xlsm", "xlsb", "xls", "xla", "ods"];

/// Tokenize and normalize delimited text. Header-only input yields no leads.
pub fn parse_csv(text: &str) -> Vec<Lead> {
    normalize(tokenize(text))
}

/// An import that yields no leads is an error, whatever the source.
pub fn require_leads(leads: Vec<Lead>) -> AppResult<Vec<Lead>> {
    if leads.is_empty() {
        return Err(AppError::NoData);
    }
    Ok(leads)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Delimited,
    Spreadsheet,
}

impl UploadKind {
    /// Extension wins; otherwise the declared (or guessed) MIME type decides.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Self {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();

        if DELIMITED_EXTENSIONS.contains(&extension.as_str()) {
            return UploadKind::Delimited;
        }
        if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
            return UploadKind::Spreadsheet;
        }

        let mime = content_type
            .and_then(|ct| ct.parse::<Mime>().ok())
            .or_else(|| mime_guess::from_path(filename).first());

        match mime {
            Some(m) if m.type_() == mime::TEXT => UploadKind::Delimited,
            _ => UploadKind::Spreadsheet,
        }
    }
}

pub fn parse_upload(filename: &str, content_type: Option<&str>, content: &[u8]) -> AppResult<Vec<Lead>> {
    let kind = UploadKind::detect(filename, content_type);
    info!(filename, ?kind, bytes = content.len(), "Parsing uploaded file");

    let leads = match kind {
        UploadKind::Delimited => parse_csv(&String::from_utf8_lossy(content)),
        UploadKind::Spreadsheet => normalize(excel::read_first_sheet(content)?),
    };
    Ok(leads)
}
