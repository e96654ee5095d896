use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub provider: String,
}

#[derive(Deserialize)]
pub struct Login {
    pub email: String,
    #[serde(default = "default_provider")]
    pub provider: String,
}

fn default_provider() -> String {
    "email".to_string()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Refresh {
    pub refresh_token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub email: String,
    pub provider: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(rename = "domainCode", skip_serializing_if = "Option::is_none")]
    pub domain_code: Option<i64>,
}

#[derive(Deserialize)]
pub struct ErrorParams {
    #[serde(rename = "domainCode")]
    pub domain_code: Option<i64>,
}

/// Issued credentials. Refreshing rotates both tokens.
#[derive(Default)]
pub struct Sessions {
    access: HashMap<String, Profile>,
    refresh: HashMap<String, Profile>,
    revoked: HashSet<String>,
    refresh_count: usize,
}

impl Sessions {
    fn issue(&mut self, profile: Profile) -> TokenPair {
        let pair = TokenPair {
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Uuid::new_v4().to_string(),
            provider: profile.provider.clone(),
        };
        self.access.insert(pair.access_token.clone(), profile.clone());
        self.refresh.insert(pair.refresh_token.clone(), profile);
        pair
    }
}

pub type Db = Arc<RwLock<Sessions>>;

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
            domain_code: None,
        }),
    )
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Sessions::default()));
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/expire", post(expire))
        .route("/auth/stats", get(stats))
        .route("/profile", get(profile).delete(logout))
        .route("/echo", get(echo_query).post(echo_body).put(echo_body).patch(echo_body).delete(echo_query))
        .route("/headers", get(echo_headers))
        .route("/errors/{status}", get(domain_error))
        .route("/errors/{status}/raw", get(raw_error))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn login(State(db): State<Db>, Json(input): Json<Login>) -> Json<TokenPair> {
    let profile = Profile {
        email: input.email,
        provider: input.provider,
    };
    tracing::info!(email = %profile.email, "login");
    Json(db.write().await.issue(profile))
}

async fn refresh(State(db): State<Db>, Json(input): Json<Refresh>) -> Result<Json<TokenPair>, ApiError> {
    let mut sessions = db.write().await;
    let profile = sessions
        .refresh
        .remove(&input.refresh_token)
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "invalid refresh token"))?;
    sessions.refresh_count += 1;
    Ok(Json(sessions.issue(profile)))
}

/// Revoke every access token, keeping refresh tokens valid.
async fn expire(State(db): State<Db>) -> StatusCode {
    let mut sessions = db.write().await;
    let expired: Vec<String> = sessions.access.drain().map(|(token, _)| token).collect();
    sessions.revoked.extend(expired);
    StatusCode::NO_CONTENT
}

async fn stats(State(db): State<Db>) -> Json<serde_json::Value> {
    let sessions = db.read().await;
    Json(serde_json::json!({
        "activeSessions": sessions.access.len(),
        "refreshCount": sessions.refresh_count,
    }))
}

async fn authenticate(db: &Db, headers: &HeaderMap) -> Result<(String, Profile), ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "missing bearer token"))?;
    let sessions = db.read().await;
    if sessions.revoked.contains(token) {
        return Err(api_error(StatusCode::UNAUTHORIZED, "token expired"));
    }
    sessions
        .access
        .get(token)
        .cloned()
        .map(|profile| (token.to_string(), profile))
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "invalid token"))
}

async fn profile(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Profile>, ApiError> {
    let (_, profile) = authenticate(&db, &headers).await?;
    Ok(Json(profile))
}

async fn logout(State(db): State<Db>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    let (token, _) = authenticate(&db, &headers).await?;
    let mut sessions = db.write().await;
    sessions.access.remove(&token);
    sessions.revoked.insert(token);
    Ok(StatusCode::NO_CONTENT)
}

async fn echo_query(Query(params): Query<HashMap<String, String>>) -> Json<HashMap<String, String>> {
    Json(params)
}

async fn echo_body(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(body)
}

async fn echo_headers(headers: HeaderMap) -> Json<HashMap<String, String>> {
    Json(
        headers
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect(),
    )
}

async fn domain_error(Path(status): Path<u16>, Query(params): Query<ErrorParams>) -> ApiError {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorBody {
            error: status.canonical_reason().unwrap_or("error").to_lowercase(),
            domain_code: params.domain_code,
        }),
    )
}

async fn raw_error(Path(status): Path<u16>) -> (StatusCode, &'static str) {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, "<html>upstream failure</html>")
}
