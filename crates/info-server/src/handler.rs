use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Json, Response};
use info_core::{DocumentHandler, HandlerResult};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;

/// Shared state handed to every route.
pub struct AppState {
    pub handler: Arc<DocumentHandler>,
}

impl AppState {
    pub fn new(handler: Arc<DocumentHandler>) -> Self {
        Self { handler }
    }
}

type ApiResult<T> = Result<T, ApiError>;

const DEFAULT_TOKEN_LEN: usize = 8;
const MAX_TOKEN_LEN: usize = 64;

/// Run a document handler call on the blocking pool.
async fn run_blocking<T, F>(op: &'static str, key: &str, f: F) -> ApiResult<T>
where
    F: FnOnce() -> HandlerResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ApiError::from_handler(op, key, err)),
        Err(err) => {
            tracing::error!(op, key, error = %err, "document worker failed");
            Err(ApiError::Internal(format!("worker failed: {err}")))
        }
    }
}

/// Reject bodies declared as anything but JSON or plain text.
/// A missing `Content-Type` is accepted.
fn check_content_type(headers: &HeaderMap) -> ApiResult<()> {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return Ok(());
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::UnsupportedMediaType("unreadable content type".into()))?;
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "application/json" | "text/plain" => Ok(()),
        _ => Err(ApiError::UnsupportedMediaType(essence)),
    }
}

fn json_text(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn message(text: String) -> Json<Value> {
    Json(json!({ "message": text }))
}

/// `GET /`
pub async fn index() -> Json<Value> {
    Json(json!({ "message": "Nothing to see. Go to /info" }))
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let handler = state.handler.clone();
    let documents = run_blocking("health", "", move || handler.document_count()).await?;
    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "documents": documents,
    })))
}

#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    pub length: Option<usize>,
}

/// `GET /generate?length=N`
pub async fn generate(Query(params): Query<GenerateParams>) -> Json<Value> {
    let length = params
        .length
        .unwrap_or(DEFAULT_TOKEN_LEN)
        .clamp(1, MAX_TOKEN_LEN);
    let mut rng = rand::thread_rng();
    let token: String = (0..length)
        .map(|_| format!("{:x}", rng.gen_range(0u8..16)))
        .collect();
    Json(json!({ "token": token }))
}

#[derive(Debug, Deserialize)]
pub struct GetParams {
    pub pairingcode: Option<String>,
}

/// `GET /info/{key}` and `GET /info/{key}?pairingcode=CODE`
pub async fn get_info(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<GetParams>,
) -> ApiResult<Response> {
    let handler = state.handler.clone();
    match params.pairingcode {
        Some(code) => {
            let k = key.clone();
            let entry = run_blocking("get_pairing", &key, move || handler.get_pairing(&k, &code))
                .await?;
            Ok(Json(entry.unwrap_or_else(|| json!({}))).into_response())
        }
        None => {
            let k = key.clone();
            let body = run_blocking("get_document", &key, move || handler.get_document(&k)).await?;
            Ok(json_text(body))
        }
    }
}

/// `PUT /info/{key}`: merge the body into the stored document.
pub async fn put_info(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<Value>> {
    check_content_type(&headers)?;
    let handler = state.handler.clone();
    let k = key.clone();
    run_blocking("merge_document", &key, move || handler.merge_document(&k, &body)).await?;
    Ok(message(format!("Document merged for key {key}")))
}

/// `POST /info/{key}`: replace the stored document.
pub async fn post_info(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<Value>> {
    check_content_type(&headers)?;
    let handler = state.handler.clone();
    let k = key.clone();
    run_blocking("store_document", &key, move || handler.store_document(&k, &body)).await?;
    Ok(message(format!("Document stored for key {key}")))
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub path: Option<String>,
}

/// `DELETE /info/{key}?path=NAME`
pub async fn delete_info(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<Json<Value>> {
    let name = params
        .path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing `path` parameter".into()))?;
    delete_entry(state, key, name).await
}

/// `DELETE /info/{key}/{name}`
pub async fn delete_info_entry(
    State(state): State<Arc<AppState>>,
    Path((key, name)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    delete_entry(state, key, name).await
}

async fn delete_entry(state: Arc<AppState>, key: String, name: String) -> ApiResult<Json<Value>> {
    let handler = state.handler.clone();
    let (k, n) = (key.clone(), name.clone());
    let removed =
        run_blocking("delete_subtree", &key, move || handler.delete_subtree(&k, &n)).await?;
    Ok(message(format!("Deleted {removed} entry(s) named {name} from {key}")))
}

#[derive(Debug, Deserialize)]
struct PairingRequest {
    commonname: String,
}

/// `POST /pairing` with `{"commonname": "<cn>"}`.
pub async fn request_pairing(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<Value>> {
    check_content_type(&headers)?;
    let request: PairingRequest = serde_json::from_str(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid pairing request: {e}")))?;
    let handler = state.handler.clone();
    let code = run_blocking("request_pairing", info_core::PAIRING_KEY, move || {
        handler.request_pairing(&request.commonname)
    })
    .await?;
    Ok(Json(json!({ "pairingcode": code })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(content_type: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        h
    }

    #[test]
    fn content_type_rules() {
        assert!(check_content_type(&HeaderMap::new()).is_ok());
        assert!(check_content_type(&headers("application/json")).is_ok());
        assert!(check_content_type(&headers("application/json; charset=utf-8")).is_ok());
        assert!(check_content_type(&headers("Text/Plain")).is_ok());
        assert!(matches!(
            check_content_type(&headers("application/xml")),
            Err(ApiError::UnsupportedMediaType(_))
        ));
    }

    #[tokio::test]
    async fn generate_clamps_length() {
        let Json(v) = generate(Query(GenerateParams { length: None })).await;
        assert_eq!(v["token"].as_str().unwrap().len(), DEFAULT_TOKEN_LEN);

        let Json(v) = generate(Query(GenerateParams { length: Some(1000) })).await;
        let token = v["token"].as_str().unwrap();
        assert_eq!(token.len(), MAX_TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        let Json(v) = generate(Query(GenerateParams { length: Some(0) })).await;
        assert_eq!(v["token"].as_str().unwrap().len(), 1);
    }
}
