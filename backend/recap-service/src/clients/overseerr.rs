// ============================================
// Overseerr Client
// ============================================
//
// Optional request-tracker integration. Accounts are matched to media
// users by username or email. Request counts cover the account's whole
// request history; the favorite requested genre only counts requests
// created inside the recap period.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::OverseerrConfig;
use crate::error::{RecapError, Result};
use crate::models::RequestStats;

#[derive(Clone)]
pub struct OverseerrClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl OverseerrClient {
    /// `None` when the tracker is not configured, which disables
    /// request stats entirely.
    pub fn new(config: &OverseerrConfig) -> Option<Self> {
        if !config.is_configured() {
            info!("overseerr integration disabled");
            return None;
        }
        let base_url = config.url.clone()?;
        let api_key = config.api_key.clone()?;

        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        })
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/api/v1{}", self.base_url, endpoint);
        let response = self
            .http
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RecapError::Upstream(format!(
                "overseerr {} returned {}",
                endpoint, status
            )));
        }
        Ok(response.json().await?)
    }

    pub async fn get_users(&self) -> Result<Vec<Value>> {
        let data = self.get("/user", &[]).await?;
        Ok(data
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn get_user_requests(&self, user_id: i64) -> Result<Vec<Value>> {
        let params = [
            ("take", "1000".to_string()),
            ("requestedBy", user_id.to_string()),
        ];
        let data = self.get("/request", &params).await?;
        Ok(data
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Request stats for one media user. `None` when no Overseerr
    /// account matches the username.
    pub async fn stats_for_user(
        &self,
        username: &str,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Option<RequestStats>> {
        let users = self.get_users().await?;
        let Some(user_id) = users.iter().find_map(|user| {
            let matches =
                field_eq(user, "username", username) || field_eq(user, "email", username);
            if matches {
                user.get("id").and_then(Value::as_i64)
            } else {
                None
            }
        }) else {
            debug!(username, "no overseerr account");
            return Ok(None);
        };

        let requests = self.get_user_requests(user_id).await?;
        let period_requests =
            filter_by_created(requests.clone(), Some(period_start), Some(period_end));

        Ok(Some(RequestStats {
            total_requests: requests.len() as u64,
            approved_requests: count_status(&requests, 2),
            pending_requests: count_status(&requests, 1),
            available_requests: requests
                .iter()
                .filter(|request| {
                    request
                        .get("media")
                        .and_then(|media| media.get("status"))
                        .and_then(Value::as_i64)
                        == Some(5)
                })
                .count() as u64,
            most_requested_genre: most_requested_genre(&period_requests),
        }))
    }
}

fn field_eq(value: &Value, key: &str, expected: &str) -> bool {
    value
        .get(key)
        .and_then(Value::as_str)
        .is_some_and(|v| v == expected)
}

fn count_status(requests: &[Value], code: i64) -> u64 {
    requests
        .iter()
        .filter(|request| request.get("status").and_then(Value::as_i64) == Some(code))
        .count() as u64
}

/// Keeps requests whose creation date falls inside the bounds,
/// inclusive. Requests without a parseable creation date are dropped.
fn filter_by_created(
    requests: Vec<Value>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<Value> {
    if start.is_none() && end.is_none() {
        return requests;
    }
    requests
        .into_iter()
        .filter(|request| {
            let Some(created) = request
                .get("createdAt")
                .and_then(Value::as_str)
                .and_then(created_date)
            else {
                return false;
            };
            start.map_or(true, |s| created >= s) && end.map_or(true, |e| created <= e)
        })
        .collect()
}

fn created_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

/// Most common genre across the given requests; ties keep the first
/// genre encountered.
fn most_requested_genre(requests: &[Value]) -> Option<String> {
    let mut counts: Vec<(String, u64)> = Vec::new();
    for request in requests {
        let Some(genres) = request
            .get("media")
            .and_then(|media| media.get("genres"))
            .and_then(Value::as_array)
        else {
            continue;
        };
        for genre in genres {
            let Some(name) = genre
                .get("name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
            else {
                continue;
            };
            if let Some(entry) = counts.iter_mut().find(|(existing, _)| existing == name) {
                entry.1 += 1;
            } else {
                counts.push((name.to_string(), 1));
            }
        }
    }

    let mut best: Option<&(String, u64)> = None;
    for entry in &counts {
        if best.map_or(true, |b| entry.1 > b.1) {
            best = Some(entry);
        }
    }
    best.map(|(name, _)| name.clone())
}
