//! Dashboard operations: imports, refresh, library round-trips and lead edits.
//!
//! Each operation finishes its network work before touching the session, then
//! commits in a single write. Write-back pushes happen after the local edit
//! and never undo it.

use chrono::Utc;
use tracing::{info, warn};

use crate::ingest::{parse_csv, parse_upload, require_leads};
use crate::models::{
    AddNoteRequest, AppState, ImportCsvRequest, ImportResponse, ImportSource, ImportUrlRequest,
    Lead, LeadEditResponse, LibraryItem, SheetData, SheetSummary, UpdateLeadRequest,
};
use crate::session::AddOutcome;
use crate::sheets::extract_sheet_id;
use crate::types::{AppError, AppResult};

pub const DEFAULT_URL_SHEET_NAME: &str = "Imported Sheet";
pub const DEFAULT_CSV_SHEET_NAME: &str = "Pasted CSV";
pub const DEMO_SHEET_NAME: &str = "Demo Leads";

pub const DEMO_CSV: &str = "Name,Email,Company,Role,Industry,City
Alice Johnson,alice@technova.com,TechNova,CTO,Software,San Francisco
Bob Smith,bob.smith@construct.io,Construct IO,Project Manager,Construction,New York
Charlie Davis,charlie@finspark.net,FinSpark,VP Sales,Finance,London
Diana Prince,diana@themyscira.gov,Justice League,Head of Security,Government,Washington DC
Evan Wright,evan@writegood.com,WriteGood,Editor,Publishing,Chicago
Fiona Gallagher,fiona@chicago.net,Patsy's Pies,Owner,Food & Bev,Chicago
George Miller,george@maxfilms.com,Max Films,Director,Entertainment,Los Angeles
Hannah Lee,hannah@biocore.org,BioCore,Researcher,Biotech,Boston";

fn name_or(name: Option<String>, default: &str) -> String {
    name.map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default.to_string())
}

async fn commit(state: &AppState, sheet: SheetData) -> ImportResponse {
    let (outcome, summary) = state.session.write(|ws| ws.add_sheet(sheet)).await;
    ImportResponse {
        sheet: summary,
        reused: outcome == AddOutcome::Reused,
    }
}

// =============================================================================
// Imports
// =============================================================================

/// Activates the open sheet that was imported from `url`, if any.
async fn activate_open_url(state: &AppState, url: &str) -> Option<SheetSummary> {
    state
        .session
        .write(|ws| {
            let id = ws.find_by_url(url).map(|s| s.id.clone())?;
            ws.set_active(&id).ok()?;
            ws.sheet(&id).map(|s| s.summary(true))
        })
        .await
}

/// Imports a shared sheet. The source URL is held in flight from the
/// duplicate check until the sheet is committed, so concurrent imports of the
/// same URL fetch it once; the others get `Conflict` or the open sheet.
pub async fn import_from_url(state: &AppState, request: ImportUrlRequest) -> AppResult<ImportResponse> {
    let url = request.url.trim().to_string();
    let sheet_id = extract_sheet_id(&url).ok_or(AppError::InvalidUrl)?;

    if let Some(summary) = activate_open_url(state, &url).await {
        info!(sheet_id = %summary.id, "Sheet URL already open, activated existing sheet");
        return Ok(ImportResponse {
            sheet: summary,
            reused: true,
        });
    }

    let _guard = state.session.begin(&url)?;
    // Another import may have committed between the check and the claim.
    if let Some(summary) = activate_open_url(state, &url).await {
        return Ok(ImportResponse {
            sheet: summary,
            reused: true,
        });
    }

    let leads = state.sheets.fetch_leads(&sheet_id).await?;
    let name = name_or(request.name, DEFAULT_URL_SHEET_NAME);
    let sheet = SheetData::new(name, leads, ImportSource::Url, Some(url), request.sync_url);
    let item = LibraryItem {
        id: sheet.id.clone(),
        user_id: String::new(),
        name: sheet.name.clone(),
        url: sheet.url.clone(),
        sync_url: sheet.sync_url.clone(),
        import_source: ImportSource::Url,
        created_at: Utc::now(),
    };

    let mut response = commit(state, sheet).await;
    if response.reused {
        return Ok(response);
    }

    if let Some(user_id) = request.user_id.filter(|u| !u.trim().is_empty()) {
        let item = LibraryItem { user_id, ..item };
        match state.library.upsert(item).await {
            Ok(stored) if stored.id != response.sheet.id => {
                let current = response.sheet.id.clone();
                match state
                    .session
                    .write(|ws| ws.rekey_sheet(&current, &stored.id))
                    .await
                {
                    Ok(summary) => response.sheet = summary,
                    Err(e) => warn!(error = %e, "Could not adopt library id for sheet"),
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to save sheet to library"),
        }
    }

    Ok(response)
}

pub async fn import_csv(state: &AppState, request: ImportCsvRequest) -> AppResult<ImportResponse> {
    let leads = require_leads(parse_csv(&request.csv))?;
    let name = name_or(request.name, DEFAULT_CSV_SHEET_NAME);
    Ok(commit(state, SheetData::new(name, leads, ImportSource::Csv, None, None)).await)
}

pub async fn import_file(
    state: &AppState,
    file_name: &str,
    content_type: Option<&str>,
    bytes: &[u8],
    name: Option<String>,
) -> AppResult<ImportResponse> {
    let leads = require_leads(parse_upload(file_name, content_type, bytes)?)?;
    let name = name_or(name, file_name);
    Ok(commit(state, SheetData::new(name, leads, ImportSource::File, None, None)).await)
}

pub async fn import_demo(state: &AppState) -> AppResult<ImportResponse> {
    let leads = require_leads(parse_csv(DEMO_CSV))?;
    Ok(commit(state, SheetData::new(DEMO_SHEET_NAME, leads, ImportSource::Csv, None, None)).await)
}

// =============================================================================
// Refresh
// =============================================================================

/// Re-fetches a URL-imported sheet. Pipeline state is replaced by whatever the
/// remote sheet currently holds in its reserved columns.
pub async fn refresh_sheet(state: &AppState, sheet_id: &str) -> AppResult<SheetSummary> {
    let sheet = state.session.sheet(sheet_id).await?;
    let url = match (sheet.import_source, sheet.url.as_deref()) {
        (ImportSource::Url, Some(url)) => url.to_string(),
        _ => {
            return Err(AppError::InvalidRequest(
                "only sheets imported from a URL can be refreshed".to_string(),
            ))
        }
    };

    let _guard = state.session.begin(sheet_id)?;
    let leads = state.sheets.fetch_leads_from_url(&url).await?;
    let summary = state
        .session
        .write(|ws| ws.replace_leads(sheet_id, leads))
        .await?;
    info!(sheet_id, leads = summary.lead_count, "Sheet refreshed");
    Ok(summary)
}

// =============================================================================
// Library
// =============================================================================

pub async fn open_from_library(
    state: &AppState,
    user_id: &str,
    item_id: &str,
) -> AppResult<ImportResponse> {
    let item = state
        .library
        .list(user_id)
        .await?
        .into_iter()
        .find(|item| item.id == item_id)
        .ok_or_else(|| AppError::NotFound(format!("library item {}", item_id)))?;

    let already_open = state
        .session
        .write(|ws| {
            let id = ws
                .sheet(&item.id)
                .or_else(|| item.url.as_deref().and_then(|u| ws.find_by_url(u)))
                .map(|s| s.id.clone())?;
            ws.set_active(&id).ok()?;
            ws.sheet(&id).map(|s| s.summary(true))
        })
        .await;
    if let Some(summary) = already_open {
        return Ok(ImportResponse {
            sheet: summary,
            reused: true,
        });
    }

    let url = item
        .url
        .clone()
        .ok_or_else(|| AppError::InvalidRequest("library item has no source URL".to_string()))?;

    let _guard = state.session.begin(&item.id)?;
    let leads = state.sheets.fetch_leads_from_url(&url).await?;

    let mut sheet = SheetData::new(item.name, leads, ImportSource::Url, Some(url), item.sync_url);
    sheet.id = item.id;
    info!(sheet_id = %sheet.id, "Opened sheet from library");
    Ok(commit(state, sheet).await)
}

/// Deletes a library item and closes its sheet if open.
pub async fn remove_from_library(state: &AppState, item_id: &str) -> AppResult<()> {
    if !state.library.delete(item_id).await? {
        return Err(AppError::NotFound(format!("library item {}", item_id)));
    }
    state.session.write(|ws| ws.close(item_id)).await;
    Ok(())
}

// =============================================================================
// Lead edits
// =============================================================================

async fn push_if_configured(state: &AppState, sheet_id: &str, lead: Lead) -> LeadEditResponse {
    let sync_url = state
        .session
        .read(|ws| ws.sheet(sheet_id).and_then(|s| s.sync_url.clone()))
        .await;

    let synced = match sync_url {
        Some(sync_url) => Some(state.sync.push_lead(&sync_url, &lead).await.is_success()),
        None => None,
    };
    LeadEditResponse { lead, synced }
}

/// Applies status and/or sub-status. The sub-status rule is checked against
/// the status the lead will have after the edit; nothing changes on rejection.
pub async fn update_lead(
    state: &AppState,
    sheet_id: &str,
    lead_id: &str,
    request: UpdateLeadRequest,
) -> AppResult<LeadEditResponse> {
    if request.status.is_none() && request.sub_status.is_none() {
        return Err(AppError::InvalidRequest(
            "nothing to update: expected status or sub_status".to_string(),
        ));
    }

    let lead = state
        .session
        .write(|ws| {
            let current = ws
                .sheet(sheet_id)
                .ok_or_else(|| AppError::NotFound(format!("sheet {}", sheet_id)))?
                .lead(lead_id)
                .ok_or_else(|| AppError::NotFound(format!("lead {}", lead_id)))?
                .meta
                .status;
            let target = request.status.unwrap_or(current);
            if request.sub_status.is_some() && !target.allows_sub_status() {
                return Err(AppError::InvalidRequest(format!(
                    "sub-status cannot be set while status is {}",
                    target
                )));
            }

            let mut lead = None;
            if let Some(status) = request.status {
                lead = Some(ws.set_status(sheet_id, lead_id, status)?);
            }
            if let Some(sub_status) = request.sub_status {
                lead = Some(ws.set_sub_status(sheet_id, lead_id, sub_status)?);
            }
            lead.ok_or_else(|| AppError::Internal("lead edit produced no result".to_string()))
        })
        .await?;

    Ok(push_if_configured(state, sheet_id, lead).await)
}

pub async fn add_note(
    state: &AppState,
    sheet_id: &str,
    lead_id: &str,
    request: AddNoteRequest,
) -> AppResult<LeadEditResponse> {
    let lead = state
        .session
        .write(|ws| ws.add_note(sheet_id, lead_id, &request.note))
        .await?;
    Ok(push_if_configured(state, sheet_id, lead).await)
}

/// Pushes the lead's current state without editing it.
pub async fn sync_lead(state: &AppState, sheet_id: &str, lead_id: &str) -> AppResult<LeadEditResponse> {
    let sheet = state.session.sheet(sheet_id).await?;
    let lead = sheet
        .lead(lead_id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("lead {}", lead_id)))?;
    if sheet.sync_url.is_none() {
        return Err(AppError::InvalidRequest("sheet has no sync URL".to_string()));
    }
    Ok(push_if_configured(state, sheet_id, lead).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, FetchStrategy};
    use crate::library::MemoryLibraryStore;
    use crate::models::{LeadStatus, SubStatus};
    use crate::sheets::SheetsClient;
    use mockito::{Matcher, Server, ServerGuard};
    use std::sync::Arc;
    use std::time::Duration;

    const SHEET_CSV: &str = "Name,City,STATUS(LEAD)\nAlice,Boston,WON\nBob,Chicago,\n";

    fn state_for(server: &ServerGuard) -> AppState {
        let mut state = AppState::new(Config::default(), Arc::new(MemoryLibraryStore::default()));
        state.sheets = SheetsClient::new(server.url(), FetchStrategy::Fallback);
        state
    }

    fn sheet_url(id: &str) -> String {
        format!("https://docs.google.com/spreadsheets/d/{}/edit", id)
    }

    fn url_request(id: &str, user_id: Option<&str>) -> ImportUrlRequest {
        ImportUrlRequest {
            url: sheet_url(id),
            name: None,
            sync_url: None,
            user_id: user_id.map(str::to_string),
        }
    }

    async fn mock_sheet(server: &mut Server, id: &str, body: &str, hits: usize) -> mockito::Mock {
        server
            .mock("GET", format!("/spreadsheets/d/{}/gviz/tq", id).as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_url_import_dedups_without_refetch() {
        let mut server = Server::new_async().await;
        let fetch = mock_sheet(&mut server, "abc", SHEET_CSV, 1).await;
        let state = state_for(&server);

        let first = import_from_url(&state, url_request("abc", None)).await.unwrap();
        assert!(!first.reused);
        assert_eq!(first.sheet.name, DEFAULT_URL_SHEET_NAME);
        assert_eq!(first.sheet.lead_count, 2);

        import_demo(&state).await.unwrap();
        let second = import_from_url(&state, url_request("abc", None)).await.unwrap();
        assert!(second.reused);
        assert_eq!(second.sheet.id, first.sheet.id);

        let active = state.session.read(|ws| ws.active_sheet_id().map(str::to_string)).await;
        assert_eq!(active, Some(first.sheet.id));
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn test_concurrent_url_imports_fetch_once() {
        let mut server = Server::new_async().await;
        let fetch = mock_sheet(&mut server, "abc", SHEET_CSV, 1).await;
        let state = state_for(&server);

        let (a, b) = tokio::join!(
            import_from_url(&state, url_request("abc", None)),
            import_from_url(&state, url_request("abc", None)),
        );

        let outcomes = [a, b];
        let added = outcomes
            .iter()
            .filter(|r| matches!(r, Ok(response) if !response.reused))
            .count();
        assert_eq!(added, 1);
        assert!(outcomes.iter().all(|r| match r {
            Ok(_) => true,
            Err(e) => matches!(e, AppError::Conflict(_)),
        }));
        assert_eq!(state.session.read(|ws| ws.sheets().len()).await, 1);
        assert!(!state.session.is_in_flight(&sheet_url("abc")));
        fetch.assert_async().await;
    }

    #[tokio::test]
    async fn test_reimport_adopts_existing_library_id() {
        let mut server = Server::new_async().await;
        let _sheet = mock_sheet(&mut server, "abc", SHEET_CSV, 2).await;
        let state = state_for(&server);

        let first = import_from_url(&state, url_request("abc", Some("u1"))).await.unwrap();
        state.session.write(|ws| ws.close(&first.sheet.id)).await;

        let second = import_from_url(&state, url_request("abc", Some("u1"))).await.unwrap();
        assert!(!second.reused);
        assert_eq!(second.sheet.id, first.sheet.id);
        assert!(second.sheet.is_active);
        assert_eq!(state.library.list("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_url_import_records_library_item() {
        let mut server = Server::new_async().await;
        let _sheet = mock_sheet(&mut server, "abc", SHEET_CSV, 1).await;
        let state = state_for(&server);

        let imported = import_from_url(&state, url_request("abc", Some("u1"))).await.unwrap();
        let items = state.library.list("u1").await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, imported.sheet.id);
        assert_eq!(items[0].url.as_deref(), Some(sheet_url("abc").as_str()));
    }

    #[tokio::test]
    async fn test_invalid_url_and_empty_imports() {
        let server = Server::new_async().await;
        let state = state_for(&server);

        let err = import_from_url(
            &state,
            ImportUrlRequest {
                url: "https://example.com/nothing".to_string(),
                name: None,
                sync_url: None,
                user_id: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidUrl));

        let err = import_csv(
            &state,
            ImportCsvRequest {
                csv: "Name,Email\n".to_string(),
                name: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NoData));
        assert!(state.session.read(|ws| ws.sheets().is_empty()).await);
    }

    #[tokio::test]
    async fn test_demo_import() {
        let server = Server::new_async().await;
        let state = state_for(&server);

        let demo = import_demo(&state).await.unwrap();
        assert_eq!(demo.sheet.name, DEMO_SHEET_NAME);
        assert_eq!(demo.sheet.lead_count, 8);
        assert_eq!(
            demo.sheet.columns,
            vec!["Name", "Email", "Company", "Role", "Industry", "City"]
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_leads() {
        let mut server = Server::new_async().await;
        let good = mock_sheet(&mut server, "abc", SHEET_CSV, 1).await;
        let state = state_for(&server);
        let imported = import_from_url(&state, url_request("abc", None)).await.unwrap();
        good.remove_async().await;

        let _mock = server
            .mock("GET", "/spreadsheets/d/abc/gviz/tq")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("Name,City\n")
            .create_async()
            .await;

        let err = refresh_sheet(&state, &imported.sheet.id).await.unwrap_err();
        assert!(matches!(err, AppError::NoData));

        let sheet = state.session.sheet(&imported.sheet.id).await.unwrap();
        assert_eq!(sheet.leads.len(), 2);
        assert_eq!(sheet.leads[0].meta.status, LeadStatus::Won);
        assert!(!state.session.is_in_flight(&imported.sheet.id));
    }

    #[tokio::test]
    async fn test_timed_out_refresh_releases_sheet() {
        let mut server = Server::new_async().await;
        let _sheet = mock_sheet(&mut server, "abc", SHEET_CSV, 1).await;
        let mut state = state_for(&server);
        let imported = import_from_url(&state, url_request("abc", None)).await.unwrap();

        // Accepts connections and never answers.
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let silent_url = format!("http://{}", silent.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = silent.accept().await {
                held.push(socket);
            }
        });
        state.sheets = SheetsClient::new(silent_url, FetchStrategy::Fallback);

        let timed_out = tokio::time::timeout(
            Duration::from_millis(200),
            refresh_sheet(&state, &imported.sheet.id),
        )
        .await;
        assert!(timed_out.is_err());

        assert!(!state.session.is_in_flight(&imported.sheet.id));
        assert!(state.session.begin(&imported.sheet.id).is_ok());
        let sheet = state.session.sheet(&imported.sheet.id).await.unwrap();
        assert_eq!(sheet.leads.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_requires_url_source() {
        let server = Server::new_async().await;
        let state = state_for(&server);
        let demo = import_demo(&state).await.unwrap();

        let err = refresh_sheet(&state, &demo.sheet.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
        let err = refresh_sheet(&state, "missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_library_open_and_remove() {
        let mut server = Server::new_async().await;
        let fetch = mock_sheet(&mut server, "abc", SHEET_CSV, 2).await;
        let state = state_for(&server);

        let imported = import_from_url(&state, url_request("abc", Some("u1"))).await.unwrap();
        let id = imported.sheet.id.clone();

        let reopened = open_from_library(&state, "u1", &id).await.unwrap();
        assert!(reopened.reused);

        state.session.write(|ws| ws.close(&id)).await;
        let reopened = open_from_library(&state, "u1", &id).await.unwrap();
        assert!(!reopened.reused);
        assert_eq!(reopened.sheet.id, id);
        fetch.assert_async().await;

        remove_from_library(&state, &id).await.unwrap();
        assert!(!state.session.read(|ws| ws.is_open(&id)).await);
        assert!(state.library.list("u1").await.unwrap().is_empty());
        assert!(matches!(
            remove_from_library(&state, &id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_without_sync_url() {
        let server = Server::new_async().await;
        let state = state_for(&server);
        let demo = import_demo(&state).await.unwrap();
        let lead_id = state.session.sheet(&demo.sheet.id).await.unwrap().leads[0].id.clone();

        let rejected = update_lead(
            &state,
            &demo.sheet.id,
            &lead_id,
            UpdateLeadRequest {
                status: None,
                sub_status: Some(SubStatus::Good),
            },
        )
        .await;
        assert!(matches!(rejected, Err(AppError::InvalidRequest(_))));

        let edited = update_lead(
            &state,
            &demo.sheet.id,
            &lead_id,
            UpdateLeadRequest {
                status: Some(LeadStatus::Contacted),
                sub_status: Some(SubStatus::Good),
            },
        )
        .await
        .unwrap();
        assert_eq!(edited.synced, None);
        assert_eq!(edited.lead.meta.status, LeadStatus::Contacted);
        assert_eq!(edited.lead.meta.sub_status, SubStatus::Good);
    }

    #[tokio::test]
    async fn test_note_is_pushed_to_sync_url() {
        let mut server = Server::new_async().await;
        let _sheet = mock_sheet(&mut server, "abc", SHEET_CSV, 1).await;
        let push = server
            .mock("POST", "/exec")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "Activity & Notes": "left voicemail",
            })))
            .with_status(200)
            .create_async()
            .await;
        let state = state_for(&server);

        let mut request = url_request("abc", None);
        request.sync_url = Some(format!("{}/exec", server.url()));
        let imported = import_from_url(&state, request).await.unwrap();
        let lead_id = state.session.sheet(&imported.sheet.id).await.unwrap().leads[1].id.clone();

        let edited = add_note(
            &state,
            &imported.sheet.id,
            &lead_id,
            AddNoteRequest {
                note: "left voicemail".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(edited.synced, Some(true));
        push.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_sync_keeps_local_edit() {
        let mut server = Server::new_async().await;
        let _sheet = mock_sheet(&mut server, "abc", SHEET_CSV, 1).await;
        let state = state_for(&server);

        let mut request = url_request("abc", None);
        request.sync_url = Some("http://127.0.0.1:1/exec".to_string());
        let imported = import_from_url(&state, request).await.unwrap();
        let lead_id = state.session.sheet(&imported.sheet.id).await.unwrap().leads[0].id.clone();

        let edited = update_lead(
            &state,
            &imported.sheet.id,
            &lead_id,
            UpdateLeadRequest {
                status: Some(LeadStatus::Lost),
                sub_status: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(edited.synced, Some(false));

        let stored = state.session.sheet(&imported.sheet.id).await.unwrap();
        assert_eq!(stored.lead(&lead_id).unwrap().meta.status, LeadStatus::Lost);

        let pushed = sync_lead(&state, &imported.sheet.id, &lead_id).await.unwrap();
        assert_eq!(pushed.synced, Some(false));
    }
}
