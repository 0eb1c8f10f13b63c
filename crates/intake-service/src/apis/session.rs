//! Session API handlers.
//!
//! Translates between the HTTP surface and engine operations: request DTOs
//! in, a session view out. Engine failures are mapped onto the structured
//! API error type, carrying the same inline feedback the workflow would show
//! attached to the dictation step.

use intake_core::{EngineError, IntakeEngine};
use intake_types::{
	APIError, SubmissionReceipt, ValidationResult, WorkflowState, WorkflowStep,
};
use serde::{Deserialize, Serialize};

/// Request body for updating the dictation draft.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictationRequest {
	/// The full replacement dictation text.
	pub text: String,
}

/// Request body for the physician override.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequest {
	/// Mandatory physician justification.
	pub justification: String,
}

/// Request body for signing an order.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
	/// Display name of the signing physician.
	pub signed_by: String,
	/// Attestation statement accepted at signing time.
	pub attestation: String,
}

/// Session view returned by every session endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
	/// Session identifier.
	pub session_id: String,
	/// Current workflow step.
	pub step: WorkflowStep,
	/// Current dictation text.
	pub dictation_text: String,
	/// Character count of the draft.
	pub character_count: usize,
	/// Number of non-valid verdicts accumulated so far.
	pub attempt_number: u32,
	/// Whether the override path is open.
	pub override_available: bool,
	/// Remaining trial credits, for trial-tier sessions.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub remaining_credits: Option<u32>,
	/// The most recent validation verdict, when one exists.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub latest_result: Option<ValidationResult>,
}

/// Response body for a successful order submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
	/// The submission service's receipt.
	pub receipt: SubmissionReceipt,
	/// The reset session, back at the dictation step.
	pub session: SessionResponse,
}

/// Builds the session view from workflow state.
fn session_response(engine: &IntakeEngine, state: WorkflowState) -> SessionResponse {
	let override_after = engine.config().intake.override_after_attempts;
	let attempt_number = state.attempt_number();
	let latest_result = state.latest_result().cloned();

	SessionResponse {
		session_id: state.session_id.clone(),
		step: state.step,
		character_count: state.draft.character_count(),
		dictation_text: state.draft.text,
		attempt_number,
		override_available: state.step == WorkflowStep::Dictation
			&& attempt_number >= override_after,
		remaining_credits: state.remaining_credits,
		latest_result,
	}
}

/// Maps an engine failure onto the structured API error type.
fn map_engine_error(error: EngineError) -> APIError {
	let message = error.user_feedback();
	match error {
		EngineError::SessionNotFound(_) => APIError::NotFound {
			error_type: "session_not_found".to_string(),
			message,
		},
		EngineError::InputTooShort { .. } => APIError::BadRequest {
			error_type: "input_too_short".to_string(),
			message,
			details: None,
		},
		EngineError::JustificationRequired => APIError::BadRequest {
			error_type: "justification_required".to_string(),
			message,
			details: None,
		},
		EngineError::ValidationInFlight => APIError::Conflict {
			error_type: "validation_in_flight".to_string(),
			message,
		},
		EngineError::WrongStep { .. } | EngineError::InvalidTransition { .. } => {
			APIError::Conflict {
				error_type: "invalid_step".to_string(),
				message,
			}
		},
		EngineError::MissingCredential => APIError::UnprocessableEntity {
			error_type: "missing_credential".to_string(),
			message,
			details: None,
		},
		EngineError::CreditsExhausted => APIError::UnprocessableEntity {
			error_type: "credits_exhausted".to_string(),
			message,
			details: None,
		},
		EngineError::OverrideUnavailable { required, attempts } => {
			APIError::UnprocessableEntity {
				error_type: "override_unavailable".to_string(),
				message,
				details: Some(serde_json::json!({
					"requiredAttempts": required,
					"failedAttempts": attempts,
				})),
			}
		},
		EngineError::SubmissionNotPermitted => APIError::UnprocessableEntity {
			error_type: "submission_not_permitted".to_string(),
			message,
			details: None,
		},
		EngineError::MissingAcceptedResult => APIError::Conflict {
			error_type: "missing_accepted_result".to_string(),
			message,
		},
		EngineError::Gateway(_) => APIError::UnprocessableEntity {
			error_type: "validation_failed".to_string(),
			message,
			details: None,
		},
		EngineError::Submission(_) => APIError::UnprocessableEntity {
			error_type: "submission_failed".to_string(),
			message,
			details: None,
		},
		EngineError::SpeechUnavailable => APIError::UnprocessableEntity {
			error_type: "speech_unavailable".to_string(),
			message,
			details: None,
		},
		EngineError::Speech(_)
		| EngineError::Storage(_)
		| EngineError::Config(_) => APIError::InternalServerError {
			error_type: "internal_error".to_string(),
			message,
		},
	}
}

/// Creates a new intake session.
pub async fn create_session(engine: &IntakeEngine) -> Result<SessionResponse, APIError> {
	engine
		.create_session()
		.await
		.map(|state| session_response(engine, state))
		.map_err(map_engine_error)
}

/// Fetches an existing session.
pub async fn get_session(engine: &IntakeEngine, id: &str) -> Result<SessionResponse, APIError> {
	engine
		.get_session(id)
		.await
		.map(|state| session_response(engine, state))
		.map_err(map_engine_error)
}

/// Replaces the dictation draft text.
pub async fn update_dictation(
	engine: &IntakeEngine,
	id: &str,
	request: DictationRequest,
) -> Result<SessionResponse, APIError> {
	engine
		.update_dictation(id, request.text)
		.await
		.map(|state| session_response(engine, state))
		.map_err(map_engine_error)
}

/// Appends a clarification delimiter block to the draft.
pub async fn append_clarification(
	engine: &IntakeEngine,
	id: &str,
) -> Result<SessionResponse, APIError> {
	engine
		.append_clarification(id)
		.await
		.map(|state| session_response(engine, state))
		.map_err(map_engine_error)
}

/// Submits the draft for validation.
pub async fn validate(engine: &IntakeEngine, id: &str) -> Result<SessionResponse, APIError> {
	engine
		.submit_dictation(id)
		.await
		.map(|state| session_response(engine, state))
		.map_err(map_engine_error)
}

/// Applies a physician override.
pub async fn force_override(
	engine: &IntakeEngine,
	id: &str,
	request: OverrideRequest,
) -> Result<SessionResponse, APIError> {
	engine
		.force_override(id, &request.justification)
		.await
		.map(|state| session_response(engine, state))
		.map_err(map_engine_error)
}

/// Returns to the dictation step.
pub async fn back(engine: &IntakeEngine, id: &str) -> Result<SessionResponse, APIError> {
	engine
		.back(id)
		.await
		.map(|state| session_response(engine, state))
		.map_err(map_engine_error)
}

/// Signs the order and moves to the signature step.
pub async fn sign(
	engine: &IntakeEngine,
	id: &str,
	request: SignRequest,
) -> Result<SessionResponse, APIError> {
	engine
		.sign(id, &request.signed_by, &request.attestation)
		.await
		.map(|state| session_response(engine, state))
		.map_err(map_engine_error)
}

/// Submits the signed order and resets the session.
pub async fn submit(engine: &IntakeEngine, id: &str) -> Result<SubmitResponse, APIError> {
	let receipt = engine.submit_order(id).await.map_err(map_engine_error)?;
	let session = engine
		.get_session(id)
		.await
		.map(|state| session_response(engine, state))
		.map_err(map_engine_error)?;

	Ok(SubmitResponse { receipt, session })
}

/// Starts speech capture for the session.
pub async fn start_speech(engine: &IntakeEngine, id: &str) -> Result<SessionResponse, APIError> {
	engine.start_speech(id).await.map_err(map_engine_error)?;
	get_session(engine, id).await
}

/// Stops speech capture for the session.
pub async fn stop_speech(engine: &IntakeEngine, id: &str) -> Result<SessionResponse, APIError> {
	engine.stop_speech(id).await.map_err(map_engine_error)?;
	get_session(engine, id).await
}
