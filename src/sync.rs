//! Write-back to the originating Google Sheet
//!
//! The receiving side is an Apps Script web app deployed by the sheet owner.
//! Such deployments usually answer cross-origin POSTs with an opaque
//! redirect, so the response says nothing reliable about whether the row was
//! written. A push therefore reports [`PushOutcome::Dispatched`] as soon as
//! the request has left the process; it is *not* a delivery confirmation.
//! Only when `confirm_delivery` is enabled does a non-success status count as
//! undelivered.

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::models::{Lead, NOTES_COLUMN, STATUS_CALL_COLUMN, STATUS_LEAD_COLUMN};

/// Result of a push. Deliberately not a `Result`: failures are reported to
/// the caller as a flag, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PushOutcome {
    /// The request was sent. The remote write may still have failed.
    Dispatched,
    /// The request could not be sent (or was refused, when delivery is confirmed).
    Undelivered { reason: String },
}

impl PushOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PushOutcome::Dispatched)
    }
}

/// Every imported column plus `id`, the three reserved pipeline columns and a
/// `timestamp`, in the shape the Apps Script expects.
pub fn build_payload(lead: &Lead) -> Value {
    let mut payload: Map<String, Value> = lead
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    payload.insert("id".to_string(), Value::String(lead.id.clone()));
    payload.insert(
        STATUS_LEAD_COLUMN.to_string(),
        Value::String(lead.meta.status.as_str().to_string()),
    );
    payload.insert(
        STATUS_CALL_COLUMN.to_string(),
        Value::String(lead.meta.sub_status.as_str().to_string()),
    );
    payload.insert(NOTES_COLUMN.to_string(), Value::String(lead.notes_joined()));
    payload.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));

    Value::Object(payload)
}

#[derive(Clone)]
pub struct SyncClient {
    client: Client,
    confirm_delivery: bool,
}

impl SyncClient {
    pub fn new(confirm_delivery: bool) -> Self {
        Self {
            client: Client::new(),
            confirm_delivery,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.confirm_delivery)
    }

    pub async fn push_lead(&self, sync_url: &str, lead: &Lead) -> PushOutcome {
        let payload = build_payload(lead);

        let response = match self.client.post(sync_url).json(&payload).send().await {
            Ok(response) => response,
            Err(e) => {
                error!(lead_id = %lead.id, error = %e, "Sync push could not be dispatched");
                return PushOutcome::Undelivered {
                    reason: e.to_string(),
                };
            }
        };

        let status = response.status();
        if self.confirm_delivery && !status.is_success() {
            warn!(lead_id = %lead.id, status = status.as_u16(), "Sync endpoint refused the update");
            return PushOutcome::Undelivered {
                reason: format!("Sync endpoint returned HTTP {}", status.as_u16()),
            };
        }

        info!(lead_id = %lead.id, status = status.as_u16(), "Sync push dispatched");
        PushOutcome::Dispatched
    }
}
