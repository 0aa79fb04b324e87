//! REST endpoints for the classification dashboard.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::error::Error;
use crate::pipeline::processor::{EmailClassifier, assigned_team_for_label};
use crate::pipeline::types::{ClassificationResult, EmailInput};
use crate::tickets::TicketService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<EmailClassifier>,
    pub tickets: Arc<TicketService>,
}

/// Build the Axum router with classification and ticket routes.
pub fn api_routes(classifier: Arc<EmailClassifier>, tickets: Arc<TicketService>) -> Router {
    let state = AppState {
        classifier,
        tickets,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/classify", post(classify_email))
        .route("/api/teams/{request_type}", get(team_for_request_type))
        .route("/api/tickets", post(create_ticket))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "email-triage"
    }))
}

async fn classify_email(
    State(state): State<AppState>,
    Json(input): Json<EmailInput>,
) -> Result<Json<ClassificationResult>, ApiError> {
    info!(
        attachments = input.attachments.len(),
        has_subject = !input.subject.is_empty(),
        "Classification requested"
    );
    let result = state.classifier.classify(input).await?;
    Ok(Json(result))
}

async fn team_for_request_type(Path(request_type): Path<String>) -> impl IntoResponse {
    Json(serde_json::json!({
        "requestType": request_type,
        "assignedTeam": assigned_team_for_label(&request_type),
    }))
}

async fn create_ticket(
    State(state): State<AppState>,
    Json(result): Json<ClassificationResult>,
) -> impl IntoResponse {
    Json(state.tickets.create_ticket(&result).await)
}

/// Error wrapper mapping pipeline failures onto HTTP responses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            Error::Model(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        error!(error = %self.0, status = status.as_u16(), "Request failed");
        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}
