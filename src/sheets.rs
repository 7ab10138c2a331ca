//! Google Sheets CSV fetcher
//!
//! Pulls a shared spreadsheet through its public CSV endpoints:
//!
//! 1. **Published CSV** (`/gviz/tq?tqx=out:csv`): works for most "anyone with
//!    the link" sheets.
//! 2. **Export** (`/export?format=csv`): used when the first endpoint answers
//!    with an HTML sign-in page instead of CSV.
//!
//! With [`FetchStrategy::Direct`] only the export endpoint is tried and any
//! non-success status fails the import.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::config::{FetchStrategy, SheetsConfig};
use crate::ingest::{parse_csv, require_leads};
use crate::models::Lead;
use crate::types::{AppError, AppResult};

static SHEET_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/d/([a-zA-Z0-9_-]+)").expect("valid sheet id pattern"));

/// The opaque spreadsheet identifier between `/d/` and the next `/`.
pub fn extract_sheet_id(url: &str) -> Option<String> {
    SHEET_ID_PATTERN
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Heuristic for "this is an HTML page, not CSV" (login walls, error pages).
pub fn looks_like_sign_in_page(body: &str) -> bool {
    body.to_lowercase().contains("<!doctype html") || body.contains("google-signin")
}

#[derive(Clone)]
pub struct SheetsClient {
    client: Client,
    base_url: String,
    strategy: FetchStrategy,
}

impl SheetsClient {
    pub fn new(base_url: impl Into<String>, strategy: FetchStrategy) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            strategy,
        }
    }

    pub fn from_config(config: &SheetsConfig) -> Self {
        Self::new(config.base_url.clone(), config.fetch_strategy)
    }

    fn published_csv_url(&self, sheet_id: &str) -> String {
        format!("{}/spreadsheets/d/{}/gviz/tq?tqx=out:csv", self.base_url, sheet_id)
    }

    fn export_csv_url(&self, sheet_id: &str) -> String {
        format!("{}/spreadsheets/d/{}/export?format=csv", self.base_url, sheet_id)
    }

    async fn get_text(&self, url: &str) -> AppResult<(StatusCode, String)> {
        debug!(url, "Fetching sheet CSV");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    /// Raw CSV body for a sheet id.
    pub async fn fetch_csv(&self, sheet_id: &str) -> AppResult<String> {
        match self.strategy {
            FetchStrategy::Direct => {
                let (status, body) = self.get_text(&self.export_csv_url(sheet_id)).await?;
                if !status.is_success() {
                    return Err(AppError::Network(format!(
                        "Sheet export returned HTTP {}",
                        status.as_u16()
                    )));
                }
                Ok(body)
            }
            FetchStrategy::Fallback => {
                let (status, body) = self.get_text(&self.published_csv_url(sheet_id)).await?;
                if status.is_success() && !looks_like_sign_in_page(&body) {
                    return Ok(body);
                }

                warn!(
                    sheet_id,
                    status = status.as_u16(),
                    "Published CSV unavailable, trying export endpoint"
                );
                let (status, body) = self.get_text(&self.export_csv_url(sheet_id)).await?;
                if !status.is_success() || looks_like_sign_in_page(&body) {
                    return Err(AppError::PrivateSheet);
                }
                Ok(body)
            }
        }
    }

    /// Fetches and normalizes a sheet. An empty result is an error here.
    pub async fn fetch_leads(&self, sheet_id: &str) -> AppResult<Vec<Lead>> {
        let body = self.fetch_csv(sheet_id).await?;
        let leads = require_leads(parse_csv(&body))?;
        info!(sheet_id, leads = leads.len(), "Fetched sheet");
        Ok(leads)
    }

    /// Validates the share URL before any request goes out.
    pub async fn fetch_leads_from_url(&self, url: &str) -> AppResult<Vec<Lead>> {
        let sheet_id = extract_sheet_id(url).ok_or(AppError::InvalidUrl)?;
        self.fetch_leads(&sheet_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const CSV: &str = "Name,Email\nAlice,alice@x.com\nBob,bob@y.io\n";
    const SIGN_IN: &str = "<!DOCTYPE html><html><body class=\"google-signin\">Sign in</body></html>";

    #[test]
    fn test_extract_sheet_id() {
        assert_eq!(
            extract_sheet_id("https://docs.google.com/spreadsheets/d/ABC123/edit#gid=0"),
            Some("ABC123".to_string())
        );
        assert_eq!(
            extract_sheet_id("https://docs.google.com/spreadsheets/d/1a-B_c/view"),
            Some("1a-B_c".to_string())
        );
        assert_eq!(extract_sheet_id("https://docs.google.com/spreadsheets/"), None);
        assert_eq!(extract_sheet_id("not a url"), None);
    }

    #[test]
    fn test_sign_in_heuristic() {
        assert!(looks_like_sign_in_page(SIGN_IN));
        assert!(looks_like_sign_in_page("<!doctype html><p>error</p>"));
        assert!(!looks_like_sign_in_page(CSV));
    }

    #[tokio::test]
    async fn test_published_csv_success() {
        let mut server = mockito::Server::new_async().await;
        let published = server
            .mock("GET", "/spreadsheets/d/abc/gviz/tq")
            .match_query(Matcher::UrlEncoded("tqx".into(), "out:csv".into()))
            .with_status(200)
            .with_body(CSV)
            .create_async()
            .await;

        let client = SheetsClient::new(server.url(), FetchStrategy::Fallback);
        let leads = client.fetch_leads("abc").await.unwrap();

        assert_eq!(leads.len(), 2);
        assert_eq!(leads[1].get("Name"), Some("Bob"));
        published.assert_async().await;
    }

    #[tokio::test]
    async fn test_falls_back_on_sign_in_page() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/spreadsheets/d/abc/gviz/tq")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(SIGN_IN)
            .create_async()
            .await;
        let export = server
            .mock("GET", "/spreadsheets/d/abc/export")
            .match_query(Matcher::UrlEncoded("format".into(), "csv".into()))
            .with_status(200)
            .with_body(CSV)
            .create_async()
            .await;

        let client = SheetsClient::new(server.url(), FetchStrategy::Fallback);
        let leads = client.fetch_leads("abc").await.unwrap();

        assert_eq!(leads.len(), 2);
        export.assert_async().await;
    }

    #[tokio::test]
    async fn test_private_sheet() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/spreadsheets/d/abc/gviz/tq")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(SIGN_IN)
            .create_async()
            .await;
        let _mock = server
            .mock("GET", "/spreadsheets/d/abc/export")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(SIGN_IN)
            .create_async()
            .await;

        let client = SheetsClient::new(server.url(), FetchStrategy::Fallback);
        let err = client.fetch_leads("abc").await.unwrap_err();
        assert!(matches!(err, AppError::PrivateSheet));
    }

    #[tokio::test]
    async fn test_direct_strategy_fails_on_status() {
        let mut server = mockito::Server::new_async().await;
        let published = server
            .mock("GET", "/spreadsheets/d/abc/gviz/tq")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let _mock = server
            .mock("GET", "/spreadsheets/d/abc/export")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let client = SheetsClient::new(server.url(), FetchStrategy::Direct);
        let err = client.fetch_leads("abc").await.unwrap_err();

        assert!(matches!(err, AppError::Network(_)));
        published.assert_async().await;
    }

    #[tokio::test]
    async fn test_header_only_sheet_is_no_data() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/spreadsheets/d/abc/gviz/tq")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("Name,Email\n")
            .create_async()
            .await;

        let client = SheetsClient::new(server.url(), FetchStrategy::Fallback);
        let err = client.fetch_leads("abc").await.unwrap_err();
        assert!(matches!(err, AppError::NoData));
    }

    #[tokio::test]
    async fn test_invalid_url_makes_no_request() {
        let mut server = mockito::Server::new_async().await;
        let any = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = SheetsClient::new(server.url(), FetchStrategy::Fallback);
        let err = client
            .fetch_leads_from_url("https://example.com/no-sheet-here")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidUrl));
        any.assert_async().await;
    }
}
