// ============================================
// Tautulli Client
// ============================================
//
// Watch history provider. Every call goes through the single /api/v2
// endpoint with an apikey + cmd query. Responses arrive wrapped in a
// { response: { result, message, data } } envelope, and the shape of
// `data` varies by command, so rows stay as raw JSON for the
// normalizer to interpret.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{LocalResult, NaiveDate, TimeZone};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::clients::metadata::{ContentMetadata, MetadataLookup};
use crate::config::TautulliConfig;
use crate::error::{RecapError, Result};
use crate::models::MediaUser;
use crate::services::analyzer::HistorySource;

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    response: ApiResponse,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    result: Option<String>,
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Clone)]
pub struct TautulliClient {
    config: TautulliConfig,
    http: Client,
}

impl TautulliClient {
    pub fn new(config: TautulliConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, http }
    }

    async fn request(&self, cmd: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/api/v2", self.config.url.trim_end_matches('/'));
        let mut query: Vec<(&str, String)> = vec![
            ("apikey", self.config.api_key.clone()),
            ("cmd", cmd.to_string()),
        ];
        query.extend_from_slice(params);

        let response = self.http.get(&url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RecapError::Upstream(format!(
                "tautulli {} returned {}",
                cmd, status
            )));
        }

        let envelope: ApiEnvelope = response.json().await?;
        if envelope.response.result.as_deref() == Some("success") {
            Ok(envelope.response.data)
        } else {
            Err(RecapError::Upstream(format!(
                "tautulli {} failed: {}",
                cmd,
                envelope
                    .response
                    .message
                    .unwrap_or_else(|| "unknown error".to_string())
            )))
        }
    }

    pub async fn get_users(&self) -> Result<Vec<MediaUser>> {
        let data = self.request("get_users", &[]).await?;
        let users: Vec<MediaUser> = extract_rows(&data).iter().filter_map(parse_user).collect();
        debug!(count = users.len(), "fetched tautulli users");
        Ok(users)
    }

    /// Full history for one user, filtered to the period here because
    /// Tautulli's own date filtering is unreliable.
    pub async fn get_history(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Value>> {
        let params = [
            ("user_id", user_id.to_string()),
            ("length", self.config.page_length.to_string()),
            ("media_info", "1".to_string()),
        ];
        let data = self.request("get_history", &params).await?;
        let rows = extract_rows(&data);

        let start_ts = day_bound_ts(start, false);
        let end_ts = day_bound_ts(end, true);
        let filtered = filter_by_period(rows, start_ts, end_ts);
        debug!(user_id, rows = filtered.len(), "fetched tautulli history");
        Ok(filtered)
    }
}

#[async_trait]
impl HistorySource for TautulliClient {
    async fn fetch_users(&self) -> Result<Vec<MediaUser>> {
        self.get_users().await
    }

    async fn fetch_history(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Value>> {
        self.get_history(user_id, start, end).await
    }
}

#[async_trait]
impl MetadataLookup for TautulliClient {
    /// Fetches genres, actors and directors for one rating key. Lookup
    /// failures degrade to `None` so enrichment never blocks analysis.
    async fn lookup(&self, content_id: &str) -> Result<Option<ContentMetadata>> {
        let params = [("rating_key", content_id.to_string())];
        let data = match self.request("get_metadata", &params).await {
            Ok(data) => data,
            Err(err) => {
                debug!(error = %err, rating_key = content_id, "metadata fetch failed");
                return Ok(None);
            }
        };

        let Some(object) = data.as_object().filter(|object| !object.is_empty()) else {
            return Ok(None);
        };
        Ok(Some(ContentMetadata {
            genres: object.get("genres").cloned().unwrap_or(Value::Null),
            actors: object.get("actors").cloned().unwrap_or(Value::Null),
            directors: object.get("directors").cloned().unwrap_or(Value::Null),
        }))
    }
}

/// `data` is either the row array itself or a pagination wrapper with
/// the rows nested under `data`.
fn extract_rows(data: &Value) -> Vec<Value> {
    match data {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn parse_user(value: &Value) -> Option<MediaUser> {
    let id = match value.get("user_id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return None,
    };
    let username = string_field(value, "username").or_else(|| string_field(value, "friendly_name"))?;
    Some(MediaUser {
        id,
        username,
        friendly_name: string_field(value, "friendly_name"),
        thumb: string_field(value, "thumb"),
    })
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Local-midnight (or end-of-day) epoch for a period bound. `None` when
/// the local timezone has no such instant, which disables that bound.
fn day_bound_ts(date: NaiveDate, end_of_day: bool) -> Option<i64> {
    let (hour, minute, second) = if end_of_day { (23, 59, 59) } else { (0, 0, 0) };
    let naive = date.and_hms_opt(hour, minute, second)?;
    match chrono::Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.timestamp()),
        LocalResult::None => None,
    }
}

/// Keeps rows whose `date` (falling back to `started`) sits inside the
/// period bounds. Rows with neither field only survive when no start
/// bound applies.
fn filter_by_period(rows: Vec<Value>, start_ts: Option<i64>, end_ts: Option<i64>) -> Vec<Value> {
    if start_ts.is_none() && end_ts.is_none() {
        return rows;
    }
    rows.into_iter()
        .filter(|item| {
            let ts = item
                .get("date")
                .and_then(Value::as_i64)
                .filter(|v| *v > 0)
                .or_else(|| item.get("started").and_then(Value::as_i64).filter(|v| *v > 0));
            match ts {
                Some(ts) => {
                    start_ts.map_or(true, |s| ts >= s) && end_ts.map_or(true, |e| ts <= e)
                }
                None => start_ts.is_none(),
            }
        })
        .collect()
}
