use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use cohort_domain::EvidenceBundle;
use cohort_service::{
	Error as ServiceError, HistoryRequest, HistoryResponse, SearchRequest, SearchResponse,
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/patients/search", post(search))
		.route("/v1/patients/{patient_id}/records", get(patient_records))
		.route("/v1/patients/{patient_id}/history", post(generate_history))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search(
	State(state): State<AppState>,
	Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	let response = state.service.search(payload).await?;

	Ok(Json(response))
}

async fn patient_records(
	State(state): State<AppState>,
	Path(patient_id): Path<String>,
) -> Result<Json<EvidenceBundle>, ApiError> {
	let response = state.service.patient_records(&patient_id).await?;

	Ok(Json(response))
}

async fn generate_history(
	State(state): State<AppState>,
	Path(patient_id): Path<String>,
	Json(payload): Json<HistoryRequest>,
) -> Result<Json<HistoryResponse>, ApiError> {
	let response = state.service.generate_history(&patient_id, payload).await?;

	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

/// Wire-level error: the service taxonomy mapped onto HTTP statuses, with
/// an `error_code` naming the stage that failed so callers can decide on
/// retry.
#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: &'static str,
	message: String,
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let message = err.to_string();
		let (status, error_code) = match err {
			ServiceError::InvalidFilter { .. } => (StatusCode::BAD_REQUEST, "invalid_filter"),
			ServiceError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
			ServiceError::EmbeddingUnavailable { .. } =>
				(StatusCode::BAD_GATEWAY, "embedding_unavailable"),
			ServiceError::PatientNotFound { .. } => (StatusCode::NOT_FOUND, "patient_not_found"),
			ServiceError::GenerationBackend { .. } =>
				(StatusCode::BAD_GATEWAY, "generation_backend"),
			ServiceError::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
		};

		Self { status, error_code, message }
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code.to_string(), message: self.message };

		(self.status, Json(body)).into_response()
	}
}
