//! Gemini-backed writing help for a single lead
//!
//! Two prompts: a cold outreach email and a short approach analysis. Both are
//! built from the lead's display columns only; pipeline metadata and the lead
//! id never leave the process. Failures come back as a readable message in the
//! reply rather than an error, with `generated: false`.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::AssistConfig;
use crate::models::Lead;
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistKind {
    ColdEmail,
    Analysis,
}

impl AssistKind {
    fn missing_key_message(&self) -> &'static str {
        match self {
            AssistKind::ColdEmail => "Error: No API Key provided. Please set GOOGLE_API_KEY.",
            AssistKind::Analysis => "API Key missing.",
        }
    }

    fn empty_message(&self) -> &'static str {
        match self {
            AssistKind::ColdEmail => "Failed to generate email.",
            AssistKind::Analysis => "No analysis available.",
        }
    }

    fn failure_message(&self) -> &'static str {
        match self {
            AssistKind::ColdEmail => "Error generating email. Please try again.",
            AssistKind::Analysis => "Error analyzing lead.",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistReply {
    pub kind: AssistKind,
    pub content: String,
    /// False when `content` is a notice instead of model output.
    pub generated: bool,
}

/// `Column: value` lines over the lead's display columns.
pub fn lead_details(lead: &Lead) -> String {
    lead.display_fields()
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(kind: AssistKind, lead: &Lead) -> String {
    let details = lead_details(lead);
    match kind {
        AssistKind::ColdEmail => format!(
            "You are an expert sales representative. Write a personalized cold outreach email for the following lead.\n\
             Keep it professional, concise, and persuasive. Focus on starting a conversation.\n\n\
             Lead Details:\n{}\n\n\
             Subject: [Generate a catchy subject line]\n\
             Body: [Generate the email body]",
            details
        ),
        AssistKind::Analysis => format!(
            "Analyze this lead and provide 3 brief bullet points on how to best approach them based on their industry, role, or company.\n\
             Lead Data:\n{}",
            details
        ),
    }
}

// Gemini generateContent wire types
#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Clone)]
pub struct AssistClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AssistClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &AssistConfig) -> Self {
        Self::new(
            config.google_api_key.clone(),
            config.base_url.clone(),
            config.model.clone(),
        )
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    async fn generate(&self, prompt: String) -> AppResult<String> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Network(format!(
                "Gemini returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }

    pub async fn assist(&self, kind: AssistKind, lead: &Lead) -> AssistReply {
        let notice = |content: &str| AssistReply {
            kind,
            content: content.to_string(),
            generated: false,
        };

        if !self.is_configured() {
            warn!(lead_id = %lead.id, ?kind, "Assist requested without GOOGLE_API_KEY");
            return notice(kind.missing_key_message());
        }

        match self.generate(build_prompt(kind, lead)).await {
            Ok(text) if text.trim().is_empty() => notice(kind.empty_message()),
            Ok(text) => {
                info!(lead_id = %lead.id, ?kind, chars = text.len(), "Assist content generated");
                AssistReply {
                    kind,
                    content: text,
                    generated: true,
                }
            }
            Err(e) => {
                error!(lead_id = %lead.id, ?kind, error = %e, "Gemini request failed");
                notice(kind.failure_message())
            }
        }
    }
}
