use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::auth::CredentialStore;
use crate::deletion::{BulkDeleter, DeletionOutcome};
use crate::email::MessageRef;
use crate::error::PurgeError;
use crate::index::{SenderIndexBuilder, SenderRecord};
use crate::mailbox::MailboxProvider;

/// Shared state behind every route
pub struct AppState<P, C> {
    pub builder: SenderIndexBuilder<P>,
    pub deleter: BulkDeleter<P>,
    pub credentials: C,
    /// Cap used when a request does not name one
    pub max_messages: usize,
}

// --- Error Handling ---
pub enum ApiError {
    Engine(PurgeError),
    BadRequest(String),
    /// Nothing could be deleted
    DeleteFailed { reauthorize: bool, message: String },
}

impl From<PurgeError> for ApiError {
    fn from(err: PurgeError) -> Self {
        ApiError::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Engine(err) => {
                let status = match &err {
                    PurgeError::Auth(_) => StatusCode::UNAUTHORIZED,
                    PurgeError::Provider(_) => StatusCode::BAD_GATEWAY,
                    PurgeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                };
                tracing::warn!(error = %err, "request failed");
                (status, err.user_message())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::DeleteFailed {
                reauthorize: true, ..
            } => (
                StatusCode::UNAUTHORIZED,
                PurgeError::Auth(String::new()).user_message(),
            ),
            ApiError::DeleteFailed { message, .. } => (StatusCode::BAD_GATEWAY, message),
        };
        (status, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct SenderJson {
    sender: String,
    email: String,
    count: usize,
    #[serde(rename = "messageIds")]
    message_ids: Vec<MessageRef>,
}

impl From<SenderRecord> for SenderJson {
    fn from(record: SenderRecord) -> Self {
        Self {
            count: record.count(),
            sender: record.display_name().to_string(),
            email: record.identity().to_string(),
            message_ids: record.messages().to_vec(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendersQuery {
    #[serde(rename = "maxMessages")]
    max_messages: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    #[serde(rename = "messageIds")]
    message_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    success: bool,
    message: String,
    #[serde(rename = "deletedIds")]
    deleted_ids: Vec<String>,
    #[serde(rename = "failedIds")]
    failed_ids: Vec<String>,
}

impl From<DeletionOutcome> for DeleteResponse {
    fn from(outcome: DeletionOutcome) -> Self {
        Self {
            success: outcome.is_complete(),
            message: outcome.summary(),
            deleted_ids: outcome.succeeded.into_iter().collect(),
            failed_ids: outcome.failed.into_iter().collect(),
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "MailPurge API is running",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_senders<P, C>(
    State(state): State<Arc<AppState<P, C>>>,
    query: Result<Query<SendersQuery>, QueryRejection>,
) -> Result<Json<Vec<SenderJson>>, ApiError>
where
    P: MailboxProvider,
    C: CredentialStore,
{
    let Query(params) =
        query.map_err(|_| ApiError::BadRequest("Invalid maxMessages parameter".to_string()))?;
    let credential = state.credentials.credential().await?;
    let max_messages = params.max_messages.unwrap_or(state.max_messages);
    let index = state.builder.build_index(&credential, max_messages).await?;

    Ok(Json(
        index.into_senders().into_iter().map(SenderJson::from).collect(),
    ))
}

async fn delete_messages<P, C>(
    State(state): State<Arc<AppState<P, C>>>,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<DeleteResponse>, ApiError>
where
    P: MailboxProvider,
    C: CredentialStore,
{
    let Json(request) = body.map_err(|_| ApiError::BadRequest("Invalid message IDs".to_string()))?;

    let credential = state.credentials.credential().await?;
    let outcome = state
        .deleter
        .delete_messages(&credential, &request.message_ids)
        .await?;

    if outcome.succeeded.is_empty() {
        return Err(ApiError::DeleteFailed {
            reauthorize: outcome.needs_reauthorization,
            message: outcome.summary(),
        });
    }

    Ok(Json(DeleteResponse::from(outcome)))
}

/// Builds the HTTP routes over the given state
pub fn router<P, C>(state: Arc<AppState<P, C>>) -> Router
where
    P: MailboxProvider + 'static,
    C: CredentialStore + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/emails/senders", get(list_senders::<P, C>))
        .route("/emails/delete", post(delete_messages::<P, C>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serves the API until ctrl-c
pub async fn run_server<P, C>(listen_addr: &str, state: Arc<AppState<P, C>>) -> anyhow::Result<()>
where
    P: MailboxProvider + 'static,
    C: CredentialStore + 'static,
{
    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address {listen_addr}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(%addr, "MailPurge API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down gracefully");
        })
        .await
        .context("Server error")?;

    Ok(())
}
