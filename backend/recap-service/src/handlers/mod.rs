/// Recap read surface - HTTP endpoints serving pregenerated recaps
///
/// Recaps are produced offline by the pregenerate job; these handlers
/// only ever read finished files, so there are no mutation endpoints.
use crate::clients::TautulliClient;
use crate::error::{RecapError, Result};
use crate::storage::RecapStore;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

/// Shared state for the read surface.
pub struct AppState {
    pub tautulli: Arc<TautulliClient>,
    pub store: RecapStore,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    /// Display name: friendly name when set, else the username.
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub username: String,
    pub token: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    storage: String,
    timestamp: String,
}

/// Upstream health: report whether the history source still answers.
pub async fn api_health(state: web::Data<AppState>) -> HttpResponse {
    match state.tautulli.get_users().await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "services": { "tautulli": "connected" }
        })),
        Err(err) => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "unhealthy",
            "error": err.to_string()
        })),
    }
}

/// List media-server users for the recap picker.
pub async fn list_users(state: web::Data<AppState>) -> Result<HttpResponse> {
    let users = state.tautulli.get_users().await?;
    let summaries: Vec<UserSummary> = users
        .iter()
        .map(|user| UserSummary {
            id: user.id.clone(),
            username: user.username.clone(),
            title: user.display_name().to_string(),
            thumb: user.thumb.clone(),
        })
        .collect();
    Ok(HttpResponse::Ok().json(summaries))
}

/// Serve a pregenerated recap by username.
pub async fn get_recap(
    state: web::Data<AppState>,
    username: web::Path<String>,
) -> Result<HttpResponse> {
    match state.store.load(&username)? {
        Some(recap) => Ok(HttpResponse::Ok().json(recap)),
        None => Err(no_recap(&username)),
    }
}

/// Serve a recap through its share token.
pub async fn get_recap_by_token(
    state: web::Data<AppState>,
    token: web::Path<String>,
) -> Result<HttpResponse> {
    match state.store.load_by_token(&token)? {
        Some(recap) => Ok(HttpResponse::Ok().json(recap)),
        None => Err(RecapError::NotFound("invalid share token".to_string())),
    }
}

/// Share token for a user, once their recap exists.
pub async fn get_token(
    state: web::Data<AppState>,
    username: web::Path<String>,
) -> Result<HttpResponse> {
    if !state.store.has_recap(&username) {
        return Err(no_recap(&username));
    }

    let token = state.store.token_for(&username)?;
    Ok(HttpResponse::Ok().json(TokenResponse {
        username: username.into_inner(),
        token,
    }))
}

/// Liveness probe.
pub async fn health_live() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"alive": true}))
}

/// Readiness probe: the data directory must be readable.
pub async fn health_ready(state: web::Data<AppState>) -> HttpResponse {
    let (ready, storage) = match state.store.list() {
        Ok(_) => (true, "ok".to_string()),
        Err(err) => (false, err.to_string()),
    };

    let response = ReadinessResponse {
        ready,
        storage,
        timestamp: Utc::now().to_rfc3339(),
    };

    if ready {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

fn no_recap(username: &str) -> RecapError {
    RecapError::NotFound(format!(
        "no recap for {username}; run the pregenerate job first"
    ))
}
