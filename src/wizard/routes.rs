//! REST endpoints driving the signup wizard.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};
use uuid::Uuid;

use super::forms::StepInput;
use super::model::{SharingConnectionId, SharingPermissions, SignupRecord};
use super::orchestrator::{Anchor, WizardOrchestrator};
use crate::error::WizardError;

/// Shared state for signup routes.
#[derive(Clone)]
pub struct SignupRouteState {
    pub orchestrator: Arc<WizardOrchestrator>,
}

/// Build the signup REST routes. `cors_any` opens them to every origin.
pub fn signup_routes(state: SignupRouteState, cors_any: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/api/signup", get(mount))
        .route("/api/signup/state", get(get_state))
        .route("/api/signup/steps/current", post(submit_step))
        .route("/api/signup/validity", post(report_validity))
        .route("/api/signup/next", post(next))
        .route("/api/signup/previous", post(previous))
        .route("/api/signup/sharing", post(add_sharing))
        .route("/api/signup/sharing/{id}", delete(remove_sharing))
        .route("/api/signup/verification/paste", post(paste_code))
        .with_state(state);

    if cors_any {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}

// ── Errors ──────────────────────────────────────────────────────────────

impl WizardError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            Self::StepMismatch { .. }
            | Self::AlreadyFinished
            | Self::NotOnSharingStep
            | Self::MissingIdentity(_)
            | Self::TermsNotAccepted => StatusCode::CONFLICT,
            Self::Database(_) | Self::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WizardError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Signup request failed: {}", self);
        } else {
            debug!(%status, "Signup request rejected: {}", self);
        }
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "signup-wizard"
    }))
}

// ── Navigation ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MountQuery {
    step: Option<String>,
}

/// GET /api/signup?step=N
///
/// (Re)mounts the wizard, rehydrating the stored record.
async fn mount(
    State(state): State<SignupRouteState>,
    Query(query): Query<MountQuery>,
) -> impl IntoResponse {
    Json(state.orchestrator.mount(query.step.as_deref()).await)
}

/// GET /api/signup/state
///
/// Current view plus the in-progress record, password excluded.
async fn get_state(State(state): State<SignupRouteState>) -> impl IntoResponse {
    let view = state.orchestrator.view().await;
    let record = state.orchestrator.record().await;
    Json(serde_json::json!({
        "view": view,
        "record": public_record(record),
    }))
}

fn public_record(record: SignupRecord) -> serde_json::Value {
    let mut value = serde_json::to_value(record).unwrap_or_default();
    if let Some(obj) = value.as_object_mut() {
        obj.remove("password");
    }
    value
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NextRequest {
    anchor: Option<Anchor>,
}

async fn next(
    State(state): State<SignupRouteState>,
    body: Bytes,
) -> Result<Response, WizardError> {
    let request = if body.is_empty() {
        NextRequest::default()
    } else {
        match serde_json::from_slice::<NextRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                return Ok((
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": format!("Invalid body: {e}")})),
                )
                    .into_response());
            }
        }
    };
    let outcome = state.orchestrator.next(request.anchor).await?;
    Ok(Json(outcome).into_response())
}

async fn previous(State(state): State<SignupRouteState>) -> Result<Response, WizardError> {
    let outcome = state.orchestrator.previous().await?;
    Ok(Json(outcome).into_response())
}

// ── Step input ──────────────────────────────────────────────────────────

async fn submit_step(
    State(state): State<SignupRouteState>,
    Json(input): Json<StepInput>,
) -> Result<Response, WizardError> {
    let outcome = state.orchestrator.submit(input).await?;
    Ok(Json(outcome).into_response())
}

#[derive(Debug, Deserialize)]
struct ValidityRequest {
    valid: bool,
}

async fn report_validity(
    State(state): State<SignupRouteState>,
    Json(req): Json<ValidityRequest>,
) -> Result<Response, WizardError> {
    let view = state.orchestrator.report_validity(req.valid).await?;
    Ok(Json(view).into_response())
}

#[derive(Debug, Deserialize)]
struct PasteRequest {
    text: String,
}

/// POST /api/signup/verification/paste
///
/// `filled: false` when the clipboard text held no code; the client then
/// shows its generic fallback.
async fn paste_code(
    State(state): State<SignupRouteState>,
    Json(req): Json<PasteRequest>,
) -> Result<Response, WizardError> {
    let outcome = state.orchestrator.paste_verification_code(&req.text).await?;
    Ok(Json(serde_json::json!({
        "filled": outcome.is_some(),
        "outcome": outcome,
    }))
    .into_response())
}

// ── Sharing ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AddSharingRequest {
    contact: String,
    #[serde(default)]
    permissions: SharingPermissions,
}

async fn add_sharing(
    State(state): State<SignupRouteState>,
    Json(req): Json<AddSharingRequest>,
) -> Result<Response, WizardError> {
    let connection = state
        .orchestrator
        .add_sharing_connection(&req.contact, req.permissions)
        .await?;
    Ok((StatusCode::CREATED, Json(connection)).into_response())
}

async fn remove_sharing(
    State(state): State<SignupRouteState>,
    Path(id): Path<Uuid>,
) -> Result<Response, WizardError> {
    state
        .orchestrator
        .remove_sharing_connection(SharingConnectionId::from(id))
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
