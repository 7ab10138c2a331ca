use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::assist::AssistClient;
use crate::config::Config;
use crate::library::LibraryStore;
use crate::session::SessionStore;
use crate::sheets::SheetsClient;
use crate::sync::SyncClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub session: SessionStore,
    pub library: Arc<dyn LibraryStore>,
    pub sheets: SheetsClient,
    pub sync: SyncClient,
    pub assist: AssistClient,
}

impl AppState {
    pub fn new(config: Config, library: Arc<dyn LibraryStore>) -> Self {
        Self {
            sheets: SheetsClient::from_config(&config.sheets),
            sync: SyncClient::from_config(&config.sync),
            assist: AssistClient::from_config(&config.assist),
            session: SessionStore::default(),
            library,
            config,
        }
    }
}

/// Column written on export and read back on import for the pipeline status.
pub const STATUS_LEAD_COLUMN: &str = "STATUS(LEAD)";
/// Column carrying the sub-status ("call outcome").
pub const STATUS_CALL_COLUMN: &str = "STATUS(CALL)";
/// Column carrying the notes joined by [`NOTES_SEPARATOR`].
pub const NOTES_COLUMN: &str = "Activity & Notes";
pub const NOTES_SEPARATOR: &str = " | ";

pub const RESERVED_COLUMNS: [&str; 3] = [STATUS_LEAD_COLUMN, STATUS_CALL_COLUMN, NOTES_COLUMN];

/// Prefix carried by every metadata key on the wire.
pub const METADATA_PREFIX: char = '_';

const CITY_COLUMNS: [&str; 3] = ["City", "Town", "Location"];
const CATEGORY_COLUMNS: [&str; 3] = ["Sub Category", "Sub-category", "Subcategory"];

// =============================================================================
// Pipeline enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    NotResponded,
    Responded,
    Qualified,
    Lost,
    Won,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 7] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::NotResponded,
        LeadStatus::Responded,
        LeadStatus::Qualified,
        LeadStatus::Lost,
        LeadStatus::Won,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "NEW",
            LeadStatus::Contacted => "CONTACTED",
            LeadStatus::NotResponded => "NOT_RESPONDED",
            LeadStatus::Responded => "RESPONDED",
            LeadStatus::Qualified => "QUALIFIED",
            LeadStatus::Lost => "LOST",
            LeadStatus::Won => "WON",
        }
    }

    /// Exact (case-insensitive) label lookup.
    pub fn from_label(label: &str) -> Option<Self> {
        let upper = label.trim().to_uppercase();
        Self::ALL.into_iter().find(|s| s.as_str() == upper)
    }

    /// Total parse: anything that is not a known label falls back to `NEW`.
    pub fn parse_or_default(label: &str) -> Self {
        match Self::from_label(label) {
            Some(status) => status,
            None => Self::default(),
        }
    }

    pub fn is_contacted(&self) -> bool {
        *self != LeadStatus::New
    }

    pub fn has_responded(&self) -> bool {
        matches!(
            self,
            LeadStatus::Responded | LeadStatus::Qualified | LeadStatus::Won | LeadStatus::Lost
        )
    }

    /// Sub-status is only meaningful once a conversation actually happened.
    pub fn allows_sub_status(&self) -> bool {
        matches!(
            self,
            LeadStatus::Contacted
                | LeadStatus::Responded
                | LeadStatus::Qualified
                | LeadStatus::Lost
                | LeadStatus::Won
        )
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubStatus {
    #[default]
    None,
    Good,
    Average,
    Bad,
    Interested,
    NotInterested,
    FollowUp,
}

impl SubStatus {
    pub const ALL: [SubStatus; 7] = [
        SubStatus::None,
        SubStatus::Good,
        SubStatus::Average,
        SubStatus::Bad,
        SubStatus::Interested,
        SubStatus::NotInterested,
        SubStatus::FollowUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubStatus::None => "NONE",
            SubStatus::Good => "GOOD",
            SubStatus::Average => "AVERAGE",
            SubStatus::Bad => "BAD",
            SubStatus::Interested => "INTERESTED",
            SubStatus::NotInterested => "NOT_INTERESTED",
            SubStatus::FollowUp => "FOLLOW_UP",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let upper = label.trim().to_uppercase();
        Self::ALL.into_iter().find(|s| s.as_str() == upper)
    }

    /// Total parse: unknown labels fall back to `NONE`.
    pub fn parse_or_default(label: &str) -> Self {
        match Self::from_label(label) {
            Some(sub_status) => sub_status,
            None => Self::default(),
        }
    }
}

impl std::fmt::Display for SubStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImportSource {
    Url,
    Csv,
    File,
}

// =============================================================================
// Leads and sheets
// =============================================================================

/// Pipeline state layered on top of the imported columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadMeta {
    #[serde(rename = "_status")]
    pub status: LeadStatus,
    #[serde(rename = "_sub_status")]
    pub sub_status: SubStatus,
    /// Most recent first.
    #[serde(rename = "_notes")]
    pub notes: Vec<String>,
    #[serde(rename = "_last_updated")]
    pub last_updated: DateTime<Utc>,
}

impl Default for LeadMeta {
    fn default() -> Self {
        Self {
            status: LeadStatus::default(),
            sub_status: SubStatus::default(),
            notes: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

/// One imported contact: raw columns in header order plus pipeline metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    #[serde(flatten)]
    pub meta: LeadMeta,
    pub fields: IndexMap<String, String>,
}

impl Lead {
    pub fn new(fields: IndexMap<String, String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            meta: LeadMeta::default(),
            fields,
        }
    }

    /// Looks a column up by exact name, then case-insensitively.
    pub fn get(&self, column: &str) -> Option<&str> {
        if let Some(value) = self.fields.get(column) {
            return Some(value.as_str());
        }
        let lower = column.to_lowercase();
        self.fields
            .iter()
            .find(|(key, _)| key.to_lowercase() == lower)
            .map(|(_, value)| value.as_str())
    }

    /// First candidate column present on the lead, or `""`.
    pub fn first_of(&self, columns: &[&str]) -> &str {
        columns
            .iter()
            .find_map(|column| self.get(column))
            .unwrap_or("")
    }

    pub fn city(&self) -> &str {
        self.first_of(&CITY_COLUMNS)
    }

    /// The sheet's own category column, unrelated to [`SubStatus`].
    pub fn sheet_category(&self) -> &str {
        self.first_of(&CATEGORY_COLUMNS)
    }

    /// Imported columns minus the reserved pipeline columns.
    pub fn display_fields(&self) -> impl Iterator<Item = (&String, &String)> {
        self.fields
            .iter()
            .filter(|(key, _)| !is_reserved_column(key))
    }

    pub fn notes_joined(&self) -> String {
        self.meta.notes.join(NOTES_SEPARATOR)
    }

    /// Stamps the edit time and rewrites the reserved columns from the
    /// metadata, so `fields` never disagrees with `_status`/`_sub_status`/`_notes`.
    pub fn touch(&mut self) {
        self.write_pipeline_columns();
        self.meta.last_updated = Utc::now();
    }

    fn write_pipeline_columns(&mut self) {
        let notes = self.notes_joined();
        self.fields
            .insert(STATUS_LEAD_COLUMN.to_string(), self.meta.status.as_str().to_string());
        self.fields
            .insert(STATUS_CALL_COLUMN.to_string(), self.meta.sub_status.as_str().to_string());
        self.fields.insert(NOTES_COLUMN.to_string(), notes);
    }

    /// Case-insensitive substring match over every visible value.
    pub fn matches_search(&self, needle_lower: &str) -> bool {
        if needle_lower.is_empty() {
            return true;
        }
        let hit = |s: &str| s.to_lowercase().contains(needle_lower);
        hit(&self.id)
            || self.fields.values().any(|v| hit(v.as_str()))
            || hit(self.meta.status.as_str())
            || hit(self.meta.sub_status.as_str())
            || self.meta.notes.iter().any(|n| hit(n.as_str()))
    }
}

pub fn is_reserved_column(name: &str) -> bool {
    RESERVED_COLUMNS.contains(&name)
}

pub fn is_metadata_key(name: &str) -> bool {
    name.starts_with(METADATA_PREFIX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetData {
    pub id: String,
    pub name: String,
    pub columns: Vec<String>,
    pub leads: Vec<Lead>,
    pub import_source: ImportSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_url: Option<String>,
}

impl SheetData {
    pub fn new(
        name: impl Into<String>,
        leads: Vec<Lead>,
        import_source: ImportSource,
        url: Option<String>,
        sync_url: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            columns: columns_of(&leads),
            leads,
            import_source,
            url: url.filter(|u| !u.trim().is_empty()),
            sync_url: sync_url.filter(|u| !u.trim().is_empty()),
        }
    }

    pub fn lead(&self, lead_id: &str) -> Option<&Lead> {
        self.leads.iter().find(|l| l.id == lead_id)
    }

    pub fn lead_mut(&mut self, lead_id: &str) -> Option<&mut Lead> {
        self.leads.iter_mut().find(|l| l.id == lead_id)
    }

    pub fn summary(&self, active: bool) -> SheetSummary {
        SheetSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            columns: self.columns.clone(),
            lead_count: self.leads.len(),
            import_source: self.import_source,
            url: self.url.clone(),
            sync_url: self.sync_url.clone(),
            is_active: active,
        }
    }
}

/// Column names observed on the first lead.
pub fn columns_of(leads: &[Lead]) -> Vec<String> {
    leads
        .first()
        .map(|lead| lead.fields.keys().cloned().collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_url: Option<String>,
    pub import_source: ImportSource,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// API Request/Response types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetSummary {
    pub id: String,
    pub name: String,
    pub columns: Vec<String>,
    pub lead_count: usize,
    pub import_source: ImportSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_url: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ImportUrlRequest {
    pub url: String,
    pub name: Option<String>,
    pub sync_url: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportCsvRequest {
    pub csv: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportResponse {
    pub sheet: SheetSummary,
    /// True when an already-open sheet with the same URL was activated instead.
    pub reused: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SheetsResponse {
    pub active_sheet_id: Option<String>,
    pub sheets: Vec<SheetSummary>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub sheet_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLeadRequest {
    pub status: Option<LeadStatus>,
    pub sub_status: Option<SubStatus>,
}

#[derive(Debug, Deserialize)]
pub struct AddNoteRequest {
    pub note: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeadEditResponse {
    pub lead: Lead,
    /// `None` when the sheet has no write-back endpoint.
    pub synced: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub open_sheets: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead_with(pairs: &[(&str, &str)]) -> Lead {
        Lead::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_status_parsing_is_total() {
        assert_eq!(LeadStatus::parse_or_default("won"), LeadStatus::Won);
        assert_eq!(LeadStatus::parse_or_default(" not_responded "), LeadStatus::NotResponded);
        assert_eq!(LeadStatus::parse_or_default("maybe"), LeadStatus::New);
        assert_eq!(LeadStatus::parse_or_default(""), LeadStatus::New);
        assert_eq!(SubStatus::parse_or_default("follow_up"), SubStatus::FollowUp);
        assert_eq!(SubStatus::parse_or_default("lukewarm"), SubStatus::None);
    }

    #[test]
    fn test_status_serde_labels() {
        let json = serde_json::to_string(&LeadStatus::NotResponded).unwrap();
        assert_eq!(json, "\"NOT_RESPONDED\"");
        let parsed: SubStatus = serde_json::from_str("\"NOT_INTERESTED\"").unwrap();
        assert_eq!(parsed, SubStatus::NotInterested);
        let source = serde_json::to_string(&ImportSource::Url).unwrap();
        assert_eq!(source, "\"URL\"");
    }

    #[test]
    fn test_sub_status_editability() {
        assert!(!LeadStatus::New.allows_sub_status());
        assert!(!LeadStatus::NotResponded.allows_sub_status());
        assert!(LeadStatus::Contacted.allows_sub_status());
        assert!(LeadStatus::Won.allows_sub_status());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let lead = lead_with(&[("city", "Boston"), ("Name", "Hannah")]);
        assert_eq!(lead.get("Name"), Some("Hannah"));
        assert_eq!(lead.get("CITY"), Some("Boston"));
        assert_eq!(lead.city(), "Boston");
        assert_eq!(lead.sheet_category(), "");
    }

    #[test]
    fn test_metadata_is_namespaced_on_the_wire() {
        let lead = lead_with(&[("status", "raw column value")]);
        let value = serde_json::to_value(&lead).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object["_status"], "NEW");
        assert_eq!(object["_sub_status"], "NONE");
        assert_eq!(object["fields"]["status"], "raw column value");
        for key in object.keys().filter(|k| *k != "id" && *k != "fields") {
            assert!(is_metadata_key(key), "{key} should carry the metadata prefix");
        }
    }

    #[test]
    fn test_display_fields_skip_reserved_columns() {
        let lead = lead_with(&[
            ("Name", "Alice"),
            (STATUS_LEAD_COLUMN, "WON"),
            (NOTES_COLUMN, "a | b"),
        ]);
        let names: Vec<&str> = lead.display_fields().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["Name"]);
    }

    #[test]
    fn test_touch_rewrites_reserved_columns() {
        let mut lead = lead_with(&[("Name", "Alice"), (STATUS_LEAD_COLUMN, "WON")]);
        lead.meta.status = LeadStatus::Lost;
        lead.meta.notes = vec!["second".to_string(), "first".to_string()];
        lead.touch();

        assert_eq!(lead.get(STATUS_LEAD_COLUMN), Some("LOST"));
        assert_eq!(lead.get(STATUS_CALL_COLUMN), Some("NONE"));
        assert_eq!(lead.get(NOTES_COLUMN), Some("second | first"));
        // Header order is kept; new reserved columns go to the end.
        let keys: Vec<&str> = lead.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Name", STATUS_LEAD_COLUMN, STATUS_CALL_COLUMN, NOTES_COLUMN]);
        assert!(!lead.matches_search("won"));
    }

    #[test]
    fn test_search_covers_fields_and_notes() {
        let mut lead = lead_with(&[("Company", "TechNova")]);
        lead.meta.notes.push("Sent pricing deck".to_string());
        assert!(lead.matches_search("technova"));
        assert!(lead.matches_search("pricing"));
        assert!(lead.matches_search("new"));
        assert!(!lead.matches_search("construct"));
    }
}
