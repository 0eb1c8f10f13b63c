//! HTTP server for the RadOrder intake API.
//!
//! This module provides the session API surface: creating intake sessions
//! and driving them through dictation, validation, override, signature, and
//! submission. All workflow logic lives in the engine; handlers only
//! translate between HTTP shapes and engine operations.

use axum::{
	extract::{Path, State},
	response::Json,
	routing::{get, post},
	Router,
};
use intake_config::ApiConfig;
use intake_core::IntakeEngine;
use intake_types::APIError;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::apis::session::{
	self, DictationRequest, OverrideRequest, SessionResponse, SignRequest, SubmitResponse,
};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the intake engine for processing requests.
	pub engine: Arc<IntakeEngine>,
}

/// Starts the HTTP server for the intake API.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<IntakeEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app_state = AppState { engine };

	// Build the router with /api base path
	let app = Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/sessions", post(handle_create_session))
				.route("/sessions/{id}", get(handle_get_session))
				.route("/sessions/{id}/dictation", post(handle_update_dictation))
				.route(
					"/sessions/{id}/clarification",
					post(handle_append_clarification),
				)
				.route("/sessions/{id}/validate", post(handle_validate))
				.route("/sessions/{id}/override", post(handle_override))
				.route("/sessions/{id}/back", post(handle_back))
				.route("/sessions/{id}/sign", post(handle_sign))
				.route("/sessions/{id}/submit", post(handle_submit))
				.route("/sessions/{id}/speech/start", post(handle_speech_start))
				.route("/sessions/{id}/speech/stop", post(handle_speech_stop)),
		)
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(app_state);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("RadOrder intake API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Handles POST /api/sessions requests.
async fn handle_create_session(
	State(state): State<AppState>,
) -> Result<Json<SessionResponse>, APIError> {
	session::create_session(&state.engine).await.map(Json)
}

/// Handles GET /api/sessions/{id} requests.
async fn handle_get_session(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<SessionResponse>, APIError> {
	session::get_session(&state.engine, &id).await.map(Json)
}

/// Handles POST /api/sessions/{id}/dictation requests.
async fn handle_update_dictation(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<DictationRequest>,
) -> Result<Json<SessionResponse>, APIError> {
	session::update_dictation(&state.engine, &id, request)
		.await
		.map(Json)
}

/// Handles POST /api/sessions/{id}/clarification requests.
async fn handle_append_clarification(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<SessionResponse>, APIError> {
	session::append_clarification(&state.engine, &id)
		.await
		.map(Json)
}

/// Handles POST /api/sessions/{id}/validate requests.
async fn handle_validate(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<SessionResponse>, APIError> {
	session::validate(&state.engine, &id).await.map(Json)
}

/// Handles POST /api/sessions/{id}/override requests.
async fn handle_override(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<OverrideRequest>,
) -> Result<Json<SessionResponse>, APIError> {
	session::force_override(&state.engine, &id, request)
		.await
		.map(Json)
}

/// Handles POST /api/sessions/{id}/back requests.
async fn handle_back(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<SessionResponse>, APIError> {
	session::back(&state.engine, &id).await.map(Json)
}

/// Handles POST /api/sessions/{id}/sign requests.
async fn handle_sign(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(request): Json<SignRequest>,
) -> Result<Json<SessionResponse>, APIError> {
	session::sign(&state.engine, &id, request).await.map(Json)
}

/// Handles POST /api/sessions/{id}/submit requests.
async fn handle_submit(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<SubmitResponse>, APIError> {
	session::submit(&state.engine, &id).await.map(Json)
}

/// Handles POST /api/sessions/{id}/speech/start requests.
async fn handle_speech_start(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<SessionResponse>, APIError> {
	session::start_speech(&state.engine, &id).await.map(Json)
}

/// Handles POST /api/sessions/{id}/speech/stop requests.
async fn handle_speech_stop(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<SessionResponse>, APIError> {
	session::stop_speech(&state.engine, &id).await.map(Json)
}
