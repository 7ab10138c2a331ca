use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub sheets: SheetsConfig,
    pub sync: SyncConfig,
    pub library: LibraryConfig,
    pub assist: AssistConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Published CSV endpoint first, export endpoint when the first answers with HTML.
    Fallback,
    /// Export endpoint only; any non-success status fails the import.
    Direct,
}

impl std::str::FromStr for FetchStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fallback" => Ok(FetchStrategy::Fallback),
            "direct" => Ok(FetchStrategy::Direct),
            other => Err(anyhow::anyhow!("Unknown fetch strategy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
    pub base_url: String,
    pub fetch_strategy: FetchStrategy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// When false a push counts as delivered once dispatched, whatever the response.
    pub confirm_delivery: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    pub data_dir: PathBuf,
}

#[derive(Clone, Deserialize)]
pub struct AssistConfig {
    /// Empty disables generation; the assist endpoints then answer with a notice.
    pub google_api_key: String,
    pub base_url: String,
    pub model: String,
}

impl std::fmt::Debug for AssistConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistConfig")
            .field("google_api_key", &if self.google_api_key.is_empty() { "<unset>" } else { "<set>" })
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
                cors_allowed_origins: vec!["*".to_string()],
            },
            sheets: SheetsConfig {
                base_url: DEFAULT_SHEETS_BASE_URL.to_string(),
                fetch_strategy: FetchStrategy::Fallback,
            },
            sync: SyncConfig {
                confirm_delivery: false,
            },
            library: LibraryConfig {
                data_dir: default_data_dir(),
            },
            assist: AssistConfig {
                google_api_key: String::new(),
                base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
                model: DEFAULT_GEMINI_MODEL.to_string(),
            },
        }
    }
}

pub const DEFAULT_SHEETS_BASE_URL: &str = "https://docs.google.com";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            sheets: SheetsConfig {
                base_url: env::var("SHEETS_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_SHEETS_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                fetch_strategy: env::var("SHEETS_FETCH_STRATEGY")
                    .unwrap_or_else(|_| "fallback".to_string())
                    .parse()?,
            },
            sync: SyncConfig {
                confirm_delivery: env::var("SYNC_CONFIRM_DELIVERY")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()?,
            },
            library: LibraryConfig {
                data_dir: env::var("LIBRARY_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| default_data_dir()),
            },
            assist: AssistConfig {
                google_api_key: env::var("GOOGLE_API_KEY").unwrap_or_default(),
                base_url: env::var("GEMINI_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                model: env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            },
        })
    }
}

/// `$XDG_DATA_HOME/leadgenie`, falling back to `~/.local/share/leadgenie`.
fn default_data_dir() -> PathBuf {
    env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            env::var("HOME")
                .map(|h| PathBuf::from(h).join(".local/share"))
                .unwrap_or_else(|_| PathBuf::from("."))
        })
        .join("leadgenie")
}
