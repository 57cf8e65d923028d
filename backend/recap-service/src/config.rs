/// Configuration management for the recap service
///
/// This module handles loading and managing configuration from environment
/// variables.
use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Watch history provider (Tautulli)
    pub tautulli: TautulliConfig,
    /// Request tracker (Overseerr), optional
    pub overseerr: OverseerrConfig,
    /// Card narration provider, optional
    pub llm: LlmConfig,
    /// Recap period bounds
    pub period: PeriodConfig,
    /// Analysis thresholds and limits
    pub analysis: AnalysisConfig,
    /// On-disk recap storage
    pub storage: StorageConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated list of allowed origins
    pub allowed_origins: String,
}

/// Watch history provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TautulliConfig {
    /// Base URL, without the /api/v2 suffix
    pub url: String,
    pub api_key: String,
    /// Rows per history page request
    pub page_length: u32,
}

/// Request tracker configuration. Both fields must be set for request
/// stats to be collected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverseerrConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

impl OverseerrConfig {
    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.is_empty())
            && self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

/// Card narration (LLM) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    /// OpenAI-compatible chat completions endpoint base
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    /// Extra deployment-specific context folded into prompts
    pub prompt_context: Option<String>,
}

impl LlmConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled && self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

/// Recap period bounds, inclusive on both ends
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PeriodConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Analysis thresholds and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Daily watched minutes above which a day counts as a binge
    pub binge_threshold_minutes: f64,
    /// Max seconds between plays that still merge into one session
    pub session_gap_seconds: i64,
    /// Entries kept per ranked dimension
    pub top_items: usize,
    /// Flip season mapping for southern-hemisphere deployments
    pub southern_hemisphere: bool,
    /// Usernames excluded from recap generation
    pub excluded_users: Vec<String>,
    /// Build deployment-wide rankings and comparison blocks
    pub cross_user_comparison: bool,
}

/// On-disk storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for recaps, share tokens and the raw-data cache
    pub data_dir: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let period = {
            let today = Local::now().date_naive();
            let start_date = match std::env::var("RECAP_START_DATE") {
                Ok(value) => parse_date("RECAP_START_DATE", &value)?,
                Err(_) => today - Duration::days(365),
            };
            let end_date = match std::env::var("RECAP_END_DATE") {
                Ok(value) => parse_date("RECAP_END_DATE", &value)?,
                Err(_) => today,
            };
            if end_date < start_date {
                return Err(format!(
                    "RECAP_END_DATE {} is before RECAP_START_DATE {}",
                    end_date, start_date
                ));
            }
            PeriodConfig {
                start_date,
                end_date,
            }
        };

        Ok(Config {
            app: AppConfig {
                env: app_env.clone(),
                host: std::env::var("RECAP_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("RECAP_SERVICE_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8766),
            },
            cors: {
                let allowed_origins = match std::env::var("CORS_ALLOWED_ORIGINS") {
                    Ok(value) => value,
                    Err(_) if app_env.eq_ignore_ascii_case("production") => {
                        return Err("CORS_ALLOWED_ORIGINS must be set in production".to_string())
                    }
                    Err(_) => "http://localhost:3000".to_string(),
                };

                if app_env.eq_ignore_ascii_case("production") && allowed_origins.trim() == "*" {
                    return Err("CORS_ALLOWED_ORIGINS cannot be '*' in production".to_string());
                }

                CorsConfig { allowed_origins }
            },
            tautulli: TautulliConfig {
                url: std::env::var("TAUTULLI_URL").map_err(|_| "TAUTULLI_URL must be set")?,
                api_key: std::env::var("TAUTULLI_API_KEY")
                    .map_err(|_| "TAUTULLI_API_KEY must be set")?,
                page_length: std::env::var("TAUTULLI_PAGE_LENGTH")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10_000),
            },
            overseerr: OverseerrConfig {
                url: non_empty_env("OVERSEERR_URL"),
                api_key: non_empty_env("OVERSEERR_API_KEY"),
            },
            llm: LlmConfig {
                enabled: parse_bool_env("USE_LLM", true),
                api_url: std::env::var("LLM_API_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                api_key: non_empty_env("OPENAI_API_KEY"),
                model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                timeout_secs: std::env::var("LLM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
                prompt_context: non_empty_env("RECAP_PROMPT_CONTEXT"),
            },
            period,
            analysis: AnalysisConfig {
                binge_threshold_minutes: parse_env_or_default("BINGE_THRESHOLD_MINUTES", 120.0)?,
                session_gap_seconds: std::env::var("SESSION_GAP_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1_800),
                top_items: std::env::var("RECAP_TOP_ITEMS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
                southern_hemisphere: parse_bool_env("SOUTHERN_HEMISPHERE", false),
                excluded_users: std::env::var("EXCLUDED_USERS")
                    .unwrap_or_default()
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                cross_user_comparison: parse_bool_env("CROSS_USER_COMPARISON", true),
            },
            storage: StorageConfig {
                data_dir: std::env::var("RECAP_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            },
        })
    }
}

fn parse_date(key: &str, value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("Failed to parse {}='{}': {}", key, value, e))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn parse_env_or_default(key: &str, default: f64) -> Result<f64, String> {
    match std::env::var(key) {
        Ok(val) => val
            .parse()
            .map_err(|e| format!("Failed to parse {}='{}': {}", key, val, e)),
        Err(_) => Ok(default),
    }
}
