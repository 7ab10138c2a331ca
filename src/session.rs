//! In-memory session state: open sheets, the active sheet, in-flight flags.
//!
//! [`Workspace`] is plain data with synchronous operations; [`SessionStore`]
//! shares it between request handlers. The lock is never held across a
//! network call: fetches complete first, then the result is committed in one
//! write, so a failed fetch leaves the workspace untouched.
//!
//! In-flight keys live outside the workspace lock so that an [`InFlight`]
//! guard can clear its key from `Drop`, including when the request future is
//! cancelled mid-fetch.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::{columns_of, Lead, LeadStatus, SheetData, SheetSummary, SubStatus};
use crate::types::{AppError, AppResult};

#[derive(Debug, Default)]
pub struct Workspace {
    sheets: Vec<SheetData>,
    active_sheet_id: Option<String>,
}

/// What [`Workspace::add_sheet`] did with the offered sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// An open sheet already had the same source URL; it was activated instead.
    Reused,
}

impl Workspace {
    pub fn sheets(&self) -> &[SheetData] {
        &self.sheets
    }

    pub fn active_sheet_id(&self) -> Option<&str> {
        self.active_sheet_id.as_deref()
    }

    pub fn active(&self) -> Option<&SheetData> {
        let id = self.active_sheet_id.as_deref()?;
        self.sheet(id)
    }

    pub fn sheet(&self, id: &str) -> Option<&SheetData> {
        self.sheets.iter().find(|s| s.id == id)
    }

    fn sheet_mut(&mut self, id: &str) -> AppResult<&mut SheetData> {
        self.sheets
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound(format!("sheet {}", id)))
    }

    pub fn find_by_url(&self, url: &str) -> Option<&SheetData> {
        self.sheets
            .iter()
            .find(|s| s.url.as_deref() == Some(url))
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.sheet(id).is_some()
    }

    pub fn summaries(&self) -> Vec<SheetSummary> {
        self.sheets
            .iter()
            .map(|s| s.summary(self.active_sheet_id.as_deref() == Some(s.id.as_str())))
            .collect()
    }

    /// Adds and activates a sheet, unless one with the same URL (or id) is
    /// already open, in which case that one is activated and returned.
    pub fn add_sheet(&mut self, sheet: SheetData) -> (AddOutcome, SheetSummary) {
        let existing = sheet
            .url
            .as_deref()
            .and_then(|url| self.find_by_url(url))
            .or_else(|| self.sheet(&sheet.id))
            .map(|s| s.id.clone());

        if let Some(id) = existing {
            debug!(sheet_id = %id, "Sheet already open, activating");
            self.active_sheet_id = Some(id.clone());
            if let Some(open) = self.sheet(&id) {
                return (AddOutcome::Reused, open.summary(true));
            }
        }

        info!(sheet_id = %sheet.id, name = %sheet.name, leads = sheet.leads.len(), "Sheet added");
        let summary = sheet.summary(true);
        self.active_sheet_id = Some(sheet.id.clone());
        self.sheets.push(sheet);
        (AddOutcome::Added, summary)
    }

    pub fn set_active(&mut self, id: &str) -> AppResult<()> {
        if !self.is_open(id) {
            return Err(AppError::NotFound(format!("sheet {}", id)));
        }
        self.active_sheet_id = Some(id.to_string());
        Ok(())
    }

    /// Removes a sheet. Closing the active sheet activates the first remaining one.
    pub fn close(&mut self, id: &str) -> Option<SheetData> {
        let position = self.sheets.iter().position(|s| s.id == id)?;
        let removed = self.sheets.remove(position);

        if self.active_sheet_id.as_deref() == Some(id) {
            self.active_sheet_id = self.sheets.first().map(|s| s.id.clone());
        }
        info!(sheet_id = %id, "Sheet closed");
        Some(removed)
    }

    /// Gives an open sheet a new id, e.g. the id of the library item it was saved as.
    pub fn rekey_sheet(&mut self, id: &str, new_id: &str) -> AppResult<SheetSummary> {
        if id != new_id && self.is_open(new_id) {
            return Err(AppError::Conflict(format!("sheet {}", new_id)));
        }
        let sheet = self.sheet_mut(id)?;
        sheet.id = new_id.to_string();
        let summary_id = sheet.id.clone();
        if self.active_sheet_id.as_deref() == Some(id) {
            self.active_sheet_id = Some(summary_id.clone());
        }
        let active = self.active_sheet_id.as_deref() == Some(summary_id.as_str());
        self.sheet(&summary_id)
            .map(|s| s.summary(active))
            .ok_or_else(|| AppError::NotFound(format!("sheet {}", summary_id)))
    }

    /// Swaps in freshly fetched leads (refresh).
    pub fn replace_leads(&mut self, id: &str, leads: Vec<Lead>) -> AppResult<SheetSummary> {
        let active = self.active_sheet_id.as_deref() == Some(id);
        let sheet = self.sheet_mut(id)?;
        sheet.columns = columns_of(&leads);
        sheet.leads = leads;
        Ok(sheet.summary(active))
    }

    fn lead_mut(&mut self, sheet_id: &str, lead_id: &str) -> AppResult<&mut Lead> {
        self.sheet_mut(sheet_id)?
            .lead_mut(lead_id)
            .ok_or_else(|| AppError::NotFound(format!("lead {}", lead_id)))
    }

    pub fn set_status(&mut self, sheet_id: &str, lead_id: &str, status: LeadStatus) -> AppResult<Lead> {
        let lead = self.lead_mut(sheet_id, lead_id)?;
        lead.meta.status = status;
        lead.touch();
        Ok(lead.clone())
    }

    /// Rejected unless the lead's status allows a sub-status.
    pub fn set_sub_status(
        &mut self,
        sheet_id: &str,
        lead_id: &str,
        sub_status: SubStatus,
    ) -> AppResult<Lead> {
        let lead = self.lead_mut(sheet_id, lead_id)?;
        if !lead.meta.status.allows_sub_status() {
            return Err(AppError::InvalidRequest(format!(
                "sub-status cannot be set while status is {}",
                lead.meta.status
            )));
        }
        lead.meta.sub_status = sub_status;
        lead.touch();
        Ok(lead.clone())
    }

    /// Prepends a note (most recent first). Blank notes are rejected.
    pub fn add_note(&mut self, sheet_id: &str, lead_id: &str, note: &str) -> AppResult<Lead> {
        let note = note.trim();
        if note.is_empty() {
            return Err(AppError::InvalidRequest("note is empty".to_string()));
        }
        let lead = self.lead_mut(sheet_id, lead_id)?;
        lead.meta.notes.insert(0, note.to_string());
        lead.touch();
        Ok(lead.clone())
    }
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Workspace>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl SessionStore {
    pub async fn read<T>(&self, f: impl FnOnce(&Workspace) -> T) -> T {
        let guard = self.inner.read().await;
        f(&guard)
    }

    pub async fn write<T>(&self, f: impl FnOnce(&mut Workspace) -> T) -> T {
        let mut guard = self.inner.write().await;
        f(&mut guard)
    }

    pub async fn sheet(&self, id: &str) -> AppResult<SheetData> {
        self.read(|ws| ws.sheet(id).cloned())
            .await
            .ok_or_else(|| AppError::NotFound(format!("sheet {}", id)))
    }

    // Never held across an await, and a panic while holding it leaves the set usable.
    fn in_flight_keys(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claims an in-flight key. The key is released when the guard drops.
    pub fn begin(&self, key: &str) -> AppResult<InFlight> {
        if !self.in_flight_keys().insert(key.to_string()) {
            debug!(key, "Operation already in flight");
            return Err(AppError::Conflict(key.to_string()));
        }
        Ok(InFlight {
            in_flight: Arc::clone(&self.in_flight),
            key: key.to_string(),
        })
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight_keys().contains(key)
    }
}

/// Held while a fetch for a sheet or source URL runs.
pub struct InFlight {
    in_flight: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.key);
    }
}
