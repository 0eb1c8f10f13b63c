//! Order-intake engine orchestrating the workflow lifecycle.
//!
//! This module contains the main IntakeEngine struct which drives sessions
//! through dictation, validation, and signature. It owns all workflow state
//! mutation: presentation layers call operations here and never touch
//! counters or steps directly.

use crate::event_bus::EventBus;
use crate::state::{SessionStateError, WorkflowStateMachine};
use dashmap::DashMap;
use intake_config::Config;
use intake_gateway::{GatewayError, GatewayService};
use intake_speech::{SpeechError, SpeechService};
use intake_storage::StorageService;
use intake_submission::{SubmissionError, SubmissionService};
use intake_types::{
	current_timestamp, truncate_id, AuthContext, GatewayRequest, IntakeEvent, PhysicianSignature,
	SignedOrder, StorageNamespace, SubmissionEvent, SubmissionReceipt, ValidationAttempt,
	ValidationEvent, ValidationResult, ValidationStatus, WorkflowEvent, WorkflowState,
	WorkflowStep,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::instrument;

/// Errors that can occur during intake engine operations.
///
/// The first group mirrors the user-facing failure classes of the dictation
/// step; every variant maps to stable inline feedback via [`EngineError::user_feedback`].
#[derive(Debug, Error)]
pub enum EngineError {
	/// The dictation is too short to validate; no network call was made.
	#[error("Dictation too short: {actual} of {required} required characters")]
	InputTooShort { required: usize, actual: usize },
	/// No access credential was resolved; no network call was made.
	#[error("No access credential available")]
	MissingCredential,
	/// A trial session has no validation credits left.
	#[error("No validation credits remaining")]
	CreditsExhausted,
	/// A gateway call is already in flight for this session.
	#[error("A validation is already in flight for this session")]
	ValidationInFlight,
	/// The override path is not open yet.
	#[error("Override unavailable after {attempts} of {required} failed attempts")]
	OverrideUnavailable { required: u32, attempts: u32 },
	/// An override was requested without a justification.
	#[error("Override justification is required")]
	JustificationRequired,
	/// Trial-tier sessions cannot submit orders.
	#[error("Trial accounts cannot submit orders")]
	SubmissionNotPermitted,
	/// The operation is not valid in the session's current step.
	#[error("Operation requires the {required} step (currently {actual})")]
	WrongStep {
		required: WorkflowStep,
		actual: WorkflowStep,
	},
	/// The requested step transition is not in the transition table.
	#[error("Invalid step transition from {from} to {to}")]
	InvalidTransition {
		from: WorkflowStep,
		to: WorkflowStep,
	},
	/// The session does not exist or has expired.
	#[error("Session not found: {0}")]
	SessionNotFound(String),
	/// A signature-step operation found no accepted verdict.
	#[error("Session has no accepted validation result")]
	MissingAcceptedResult,
	/// No speech capability is configured.
	#[error("Speech capability is not configured")]
	SpeechUnavailable,
	/// Error from the session storage backend.
	#[error("Storage error: {0}")]
	Storage(String),
	/// Error from the validation gateway.
	#[error("Gateway error: {0}")]
	Gateway(#[from] GatewayError),
	/// Error from the submission service.
	#[error("Submission error: {0}")]
	Submission(#[from] SubmissionError),
	/// Error from the speech capability.
	#[error("Speech error: {0}")]
	Speech(#[from] SpeechError),
	/// Error building the engine from configuration.
	#[error("Configuration error: {0}")]
	Config(String),
}

impl From<SessionStateError> for EngineError {
	fn from(err: SessionStateError) -> Self {
		match err {
			SessionStateError::SessionNotFound(id) => EngineError::SessionNotFound(id),
			SessionStateError::InvalidTransition { from, to } => {
				EngineError::InvalidTransition { from, to }
			},
			SessionStateError::Storage(msg) => EngineError::Storage(msg),
		}
	}
}

impl EngineError {
	/// Human-readable inline feedback for this failure.
	///
	/// None of these are fatal to the session; the user can retype, clarify,
	/// retry, or override.
	pub fn user_feedback(&self) -> String {
		match self {
			EngineError::InputTooShort { required, .. } => format!(
				"Please provide at least {} characters of clinical detail before validating.",
				required
			),
			EngineError::MissingCredential => {
				"No access credential is available. Please sign in again.".to_string()
			},
			EngineError::CreditsExhausted => {
				"All trial validation credits have been used.".to_string()
			},
			EngineError::ValidationInFlight => {
				"A validation is already running for this order. Please wait for it to finish."
					.to_string()
			},
			EngineError::Gateway(e) => e.user_feedback().to_string(),
			EngineError::Submission(e) => e.user_feedback().to_string(),
			other => other.to_string(),
		}
	}
}

/// Main intake engine driving the order-intake workflow.
///
/// The engine coordinates between injected services:
/// - Gateway: clinical validation of dictation text
/// - Submission: finalization of signed orders
/// - Storage: per-session workflow state
/// - Speech (optional): finalized-phrase dictation capture
///
/// Each session is mutated only under its own lock, so attempt counters and
/// step transitions never race even when operations arrive concurrently.
#[derive(Clone)]
pub struct IntakeEngine {
	/// Intake configuration.
	config: Config,
	/// Storage service for persisting session state.
	storage: Arc<StorageService>,
	/// Resolved credential and tier for this engine instance.
	auth: AuthContext,
	/// Validation gateway client.
	gateway: Arc<GatewayService>,
	/// Submission service client.
	submission: Arc<SubmissionService>,
	/// Optional speech capability.
	speech: Option<Arc<SpeechService>>,
	/// Event bus for observers.
	event_bus: EventBus,
	/// Session state machine.
	state_machine: Arc<WorkflowStateMachine>,
	/// Per-session operation locks.
	session_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
	/// Background speech-forwarding tasks, keyed by session id.
	speech_tasks: Arc<DashMap<String, tokio::task::JoinHandle<()>>>,
}

impl IntakeEngine {
	/// Creates a new intake engine with the given services.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		auth: AuthContext,
		gateway: Arc<GatewayService>,
		submission: Arc<SubmissionService>,
		speech: Option<Arc<SpeechService>>,
		event_bus: EventBus,
	) -> Self {
		let state_machine = Arc::new(WorkflowStateMachine::new(
			storage.clone(),
			Duration::from_secs(config.storage.session_ttl_seconds),
		));

		Self {
			config,
			storage,
			auth,
			gateway,
			submission,
			speech,
			event_bus,
			state_machine,
			session_locks: Arc::new(DashMap::new()),
			speech_tasks: Arc::new(DashMap::new()),
		}
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// The lock serializing operations for one session.
	fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
		self.session_locks
			.entry(session_id.to_string())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone()
	}

	/// Creates a fresh workflow session in the initial dictation step.
	///
	/// Trial-tier engines grant the configured validation-credit budget.
	pub async fn create_session(&self) -> Result<WorkflowState, EngineError> {
		let session_id = uuid::Uuid::new_v4().to_string();
		let credits = self
			.auth
			.is_trial()
			.then_some(self.config.intake.trial_credits);

		let session = WorkflowState::new(&session_id, credits, current_timestamp());
		self.state_machine.store_session(&session).await?;

		tracing::info!(session_id = %truncate_id(&session_id), tier = %self.auth.tier(), "Session created");
		self.event_bus
			.publish(IntakeEvent::Workflow(WorkflowEvent::SessionCreated {
				session_id,
			}))
			.ok();

		Ok(session)
	}

	/// Gets a session by ID.
	pub async fn get_session(&self, session_id: &str) -> Result<WorkflowState, EngineError> {
		Ok(self.state_machine.get_session(session_id).await?)
	}

	/// Replaces the dictation draft with a fresh edit.
	///
	/// Only allowed in the dictation step.
	pub async fn update_dictation(
		&self,
		session_id: &str,
		text: impl Into<String>,
	) -> Result<WorkflowState, EngineError> {
		let lock = self.session_lock(session_id);
		let _guard = lock.lock().await;

		let session = self.state_machine.get_session(session_id).await?;
		Self::require_step(&session, WorkflowStep::Dictation)?;

		let text = text.into();
		let updated = self
			.state_machine
			.update_session_with(session_id, |s| {
				s.draft.replace(text);
			})
			.await?;

		self.publish_draft_updated(&updated);
		Ok(updated)
	}

	/// Appends the clarification delimiter block to the draft.
	///
	/// Intentionally non-idempotent: each call appends another block. No
	/// step transition occurs.
	pub async fn append_clarification(
		&self,
		session_id: &str,
	) -> Result<WorkflowState, EngineError> {
		let lock = self.session_lock(session_id);
		let _guard = lock.lock().await;

		let session = self.state_machine.get_session(session_id).await?;
		Self::require_step(&session, WorkflowStep::Dictation)?;

		let updated = self
			.state_machine
			.update_session_with(session_id, |s| {
				s.draft.append_clarification();
			})
			.await?;

		self.publish_draft_updated(&updated);
		Ok(updated)
	}

	/// Submits the current draft for validation.
	///
	/// This is the sole gateway path for non-override validation. Local
	/// checks run before any network call: step, in-flight guard, minimum
	/// length, credential presence, and trial credit budget. A completed
	/// gateway call (either verdict) consumes one trial credit; transport
	/// and HTTP failures consume nothing and leave the session unchanged
	/// apart from the audit row.
	#[instrument(skip_all, fields(session_id = %truncate_id(session_id)))]
	pub async fn submit_dictation(&self, session_id: &str) -> Result<WorkflowState, EngineError> {
		let lock = self.session_lock(session_id);
		let guard = lock.lock().await;

		let session = self.state_machine.get_session(session_id).await?;
		Self::require_step(&session, WorkflowStep::Dictation)?;
		if session.validation_in_flight {
			return Err(EngineError::ValidationInFlight);
		}

		let required = self.config.intake.dictation_min_chars;
		let actual = session.draft.trimmed_len();
		if actual < required {
			return Err(EngineError::InputTooShort { required, actual });
		}

		let token = self.auth.token().ok_or(EngineError::MissingCredential)?.clone();
		self.check_credits(&session)?;

		let attempt_number = session.attempt_number();
		let request = GatewayRequest {
			dictation_text: session.draft.text.clone(),
			is_override_validation: attempt_number > 0,
			override_justification: None,
		};

		self.state_machine
			.update_session_with(session_id, |s| {
				s.validation_in_flight = true;
			})
			.await?;
		drop(guard);

		let outcome = self
			.gateway
			.validate_dictation(&request, &token, self.auth.tier())
			.await;

		self.record_validation_outcome(session_id, request, attempt_number, outcome)
			.await
	}

	/// Forces local acceptance of the dictation after repeated rejections.
	///
	/// Available only once the configured number of non-valid verdicts has
	/// accumulated. One final gateway call is made; a now-valid verdict is
	/// accepted normally, while a still-invalid verdict is converted into an
	/// overridden result carrying the physician's justification. The
	/// override is a local decision: the server-side verdict is unchanged.
	#[instrument(skip_all, fields(session_id = %truncate_id(session_id)))]
	pub async fn force_override(
		&self,
		session_id: &str,
		justification: &str,
	) -> Result<WorkflowState, EngineError> {
		if justification.trim().is_empty() {
			return Err(EngineError::JustificationRequired);
		}

		let lock = self.session_lock(session_id);
		let guard = lock.lock().await;

		let session = self.state_machine.get_session(session_id).await?;
		Self::require_step(&session, WorkflowStep::Dictation)?;
		if session.validation_in_flight {
			return Err(EngineError::ValidationInFlight);
		}

		let required = self.config.intake.override_after_attempts;
		let attempts = session.attempt_number();
		if attempts < required {
			return Err(EngineError::OverrideUnavailable { required, attempts });
		}

		let token = self.auth.token().ok_or(EngineError::MissingCredential)?.clone();
		self.check_credits(&session)?;

		let request = GatewayRequest {
			dictation_text: session.draft.text.clone(),
			is_override_validation: true,
			override_justification: Some(justification.to_string()),
		};

		self.state_machine
			.update_session_with(session_id, |s| {
				s.validation_in_flight = true;
			})
			.await?;
		drop(guard);

		let outcome = self
			.gateway
			.validate_dictation(&request, &token, self.auth.tier())
			.await
			.map(|result| match result.status {
				// The gateway relented; accept its verdict as-is.
				ValidationStatus::Valid => result,
				// Still inappropriate: force local acceptance.
				ValidationStatus::Invalid => result.into_overridden(justification),
			});

		if let Ok(result) = &outcome {
			if result.overridden {
				tracing::warn!(
					session_id = %truncate_id(session_id),
					justification = %justification,
					"Physician override applied despite non-valid gateway verdict"
				);
				self.event_bus
					.publish(IntakeEvent::Validation(ValidationEvent::OverrideApplied {
						session_id: session_id.to_string(),
						justification: justification.to_string(),
					}))
					.ok();
			}
		}

		self.record_validation_outcome(session_id, request, attempts, outcome)
			.await
	}

	/// Returns the session to the dictation step from review or signature.
	///
	/// The attempt count is preserved, never reset: returning to the editor
	/// does not grant fresh attempts.
	pub async fn back(&self, session_id: &str) -> Result<WorkflowState, EngineError> {
		let lock = self.session_lock(session_id);
		let _guard = lock.lock().await;

		let from = self.state_machine.get_session(session_id).await?.step;
		let updated = self
			.state_machine
			.transition_step(session_id, WorkflowStep::Dictation)
			.await?;

		self.publish_step_changed(session_id, from, WorkflowStep::Dictation);
		Ok(updated)
	}

	/// Attaches the physician's signature and moves to the signature step.
	pub async fn sign(
		&self,
		session_id: &str,
		signed_by: &str,
		attestation: &str,
	) -> Result<WorkflowState, EngineError> {
		let lock = self.session_lock(session_id);
		let _guard = lock.lock().await;

		let session = self.state_machine.get_session(session_id).await?;
		Self::require_step(&session, WorkflowStep::Validation)?;
		if session.accepted_result().is_none() {
			return Err(EngineError::MissingAcceptedResult);
		}

		let signature = PhysicianSignature {
			signed_by: signed_by.to_string(),
			attestation: attestation.to_string(),
			signed_at: current_timestamp(),
		};

		let updated = self
			.state_machine
			.update_session_with(session_id, |s| {
				s.signature = Some(signature);
				s.step = WorkflowStep::Signature;
			})
			.await?;

		self.publish_step_changed(session_id, WorkflowStep::Validation, WorkflowStep::Signature);
		Ok(updated)
	}

	/// Submits the signed order and resets the session.
	///
	/// On success the whole session returns to the initial dictation state
	/// with an empty draft, ready for the next order. A submission failure
	/// leaves the session in the signature step for retry.
	#[instrument(skip_all, fields(session_id = %truncate_id(session_id)))]
	pub async fn submit_order(&self, session_id: &str) -> Result<SubmissionReceipt, EngineError> {
		let lock = self.session_lock(session_id);
		let _guard = lock.lock().await;

		let session = self.state_machine.get_session(session_id).await?;
		Self::require_step(&session, WorkflowStep::Signature)?;
		if self.auth.is_trial() {
			return Err(EngineError::SubmissionNotPermitted);
		}
		let token = self.auth.token().ok_or(EngineError::MissingCredential)?;

		let validation = session
			.accepted_result()
			.cloned()
			.ok_or(EngineError::MissingAcceptedResult)?;
		let signature = session
			.signature
			.clone()
			.ok_or(EngineError::MissingAcceptedResult)?;

		let order = SignedOrder {
			order_id: uuid::Uuid::new_v4().to_string(),
			session_id: session_id.to_string(),
			dictation: session.draft.text.clone(),
			validation,
			signature,
		};

		let receipt = self.submission.finalize(&order, token).await?;

		self.storage
			.store(
				StorageNamespace::Receipts.as_str(),
				&receipt.order_id,
				&receipt,
			)
			.await
			.map_err(|e| EngineError::Storage(e.to_string()))?;

		self.state_machine.reset_session(session_id).await?;

		tracing::info!(
			session_id = %truncate_id(session_id),
			order_id = %truncate_id(&receipt.order_id),
			"Order submitted"
		);
		self.event_bus
			.publish(IntakeEvent::Submission(SubmissionEvent::OrderSubmitted {
				session_id: session_id.to_string(),
				order_id: receipt.order_id.clone(),
			}))
			.ok();
		if receipt.routed_to_radiology {
			self.event_bus
				.publish(IntakeEvent::Submission(SubmissionEvent::RoutedToRadiology {
					order_id: receipt.order_id.clone(),
				}))
				.ok();
		}
		self.event_bus
			.publish(IntakeEvent::Workflow(WorkflowEvent::SessionReset {
				session_id: session_id.to_string(),
			}))
			.ok();

		Ok(receipt)
	}

	/// Starts the speech capability for a session.
	///
	/// Finalized phrases are appended to the session's draft as they arrive.
	/// The listener keeps running until `stop_speech` is called.
	pub async fn start_speech(&self, session_id: &str) -> Result<(), EngineError> {
		let speech = self.speech.clone().ok_or(EngineError::SpeechUnavailable)?;

		let session = self.state_machine.get_session(session_id).await?;
		Self::require_step(&session, WorkflowStep::Dictation)?;

		let (tx, mut rx) = mpsc::unbounded_channel();
		speech.start(tx).await?;

		let engine = self.clone();
		let sid = session_id.to_string();
		let handle = tokio::spawn(async move {
			while let Some(phrase) = rx.recv().await {
				if let Err(e) = engine.append_phrase(&sid, &phrase.text).await {
					tracing::warn!(
						session_id = %truncate_id(&sid),
						error = %e,
						"Failed to append finalized phrase"
					);
				}
			}
		});
		self.speech_tasks.insert(session_id.to_string(), handle);

		Ok(())
	}

	/// Stops the speech capability for a session.
	///
	/// Finalized phrases already emitted are drained into the draft; any
	/// interim phrase in flight is discarded by the listener.
	pub async fn stop_speech(&self, session_id: &str) -> Result<(), EngineError> {
		let speech = self.speech.clone().ok_or(EngineError::SpeechUnavailable)?;
		speech.stop().await?;

		if let Some((_, handle)) = self.speech_tasks.remove(session_id) {
			// The listener drops its sender on stop, which ends the
			// forwarding task after it drains buffered phrases.
			handle.await.ok();
		}

		Ok(())
	}

	/// Appends one finalized phrase to the session draft.
	async fn append_phrase(&self, session_id: &str, phrase: &str) -> Result<(), EngineError> {
		let lock = self.session_lock(session_id);
		let _guard = lock.lock().await;

		let session = self.state_machine.get_session(session_id).await?;
		if session.step != WorkflowStep::Dictation {
			// The session moved on while the phrase was in flight.
			return Ok(());
		}

		let phrase = phrase.to_string();
		let updated = self
			.state_machine
			.update_session_with(session_id, |s| {
				s.draft.append_phrase(&phrase);
			})
			.await?;

		self.publish_draft_updated(&updated);
		Ok(())
	}

	/// Main run loop: logs events and cleans up expired sessions until
	/// interrupted.
	pub async fn run(&self) -> Result<(), EngineError> {
		let mut event_receiver = self.event_bus.subscribe();

		// Start storage cleanup task
		let storage = self.storage.clone();
		let cleanup_interval = Duration::from_secs(self.config.storage.cleanup_interval_seconds);
		let cleanup_handle = tokio::spawn(async move {
			let mut interval = tokio::time::interval(cleanup_interval);
			loop {
				interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Storage cleanup: removed {} expired sessions", count);
					},
					Err(e) => {
						tracing::warn!("Storage cleanup failed: {}", e);
					},
					_ => {},
				}
			}
		});

		loop {
			tokio::select! {
				Ok(event) = event_receiver.recv() => {
					tracing::debug!(event = ?event, "Intake event");
				}

				// Shutdown signal
				_ = tokio::signal::ctrl_c() => {
					break;
				}
			}
		}

		cleanup_handle.abort();
		Ok(())
	}

	/// Rejects the operation unless the session is in the required step.
	fn require_step(session: &WorkflowState, required: WorkflowStep) -> Result<(), EngineError> {
		if session.step != required {
			return Err(EngineError::WrongStep {
				required,
				actual: session.step,
			});
		}
		Ok(())
	}

	/// Rejects a gateway call when a trial session has no credits left.
	fn check_credits(&self, session: &WorkflowState) -> Result<(), EngineError> {
		if session.remaining_credits == Some(0) {
			return Err(EngineError::CreditsExhausted);
		}
		Ok(())
	}

	/// Records the outcome of one gateway round-trip.
	///
	/// On a completed call the attempt row is stored with its verdict, a
	/// trial credit is consumed, and a valid verdict advances the session to
	/// review. On a failed call the attempt row is stored without a result
	/// so nothing is counted: the attempt number, step, and credits are all
	/// unchanged and the error propagates with its feedback class.
	async fn record_validation_outcome(
		&self,
		session_id: &str,
		request: GatewayRequest,
		attempt_number: u32,
		outcome: Result<ValidationResult, GatewayError>,
	) -> Result<WorkflowState, EngineError> {
		let lock = self.session_lock(session_id);
		let _guard = lock.lock().await;

		match outcome {
			Ok(result) => {
				let accepted = result.status == ValidationStatus::Valid;
				let attempt = ValidationAttempt {
					dictation_snapshot: request.dictation_text,
					attempt_number,
					is_override: request.is_override_validation,
					result: Some(result.clone()),
				};

				let updated = self
					.state_machine
					.update_session_with(session_id, |s| {
						s.validation_in_flight = false;
						if let Some(credits) = s.remaining_credits.as_mut() {
							*credits = credits.saturating_sub(1);
						}
						s.attempts.push(attempt);
						if accepted {
							s.step = WorkflowStep::Validation;
						}
					})
					.await?;

				if let Some(remaining) = updated.remaining_credits {
					self.event_bus
						.publish(IntakeEvent::Validation(ValidationEvent::CreditConsumed {
							session_id: session_id.to_string(),
							remaining,
						}))
						.ok();
				}

				if accepted {
					tracing::info!(
						session_id = %truncate_id(session_id),
						attempt = attempt_number,
						overridden = result.overridden,
						"Verdict accepted"
					);
					self.event_bus
						.publish(IntakeEvent::Validation(ValidationEvent::VerdictAccepted {
							session_id: session_id.to_string(),
							attempt_number,
						}))
						.ok();
					self.publish_step_changed(
						session_id,
						WorkflowStep::Dictation,
						WorkflowStep::Validation,
					);
				} else {
					tracing::info!(
						session_id = %truncate_id(session_id),
						attempt = attempt_number,
						"Verdict rejected"
					);
					self.event_bus
						.publish(IntakeEvent::Validation(ValidationEvent::VerdictRejected {
							session_id: session_id.to_string(),
							attempt_number,
							feedback: result.feedback.clone(),
						}))
						.ok();
				}

				Ok(updated)
			},
			Err(error) => {
				self.state_machine
					.update_session_with(session_id, |s| {
						s.validation_in_flight = false;
						s.attempts.push(ValidationAttempt {
							dictation_snapshot: request.dictation_text,
							attempt_number,
							is_override: request.is_override_validation,
							result: None,
						});
					})
					.await?;

				tracing::warn!(
					session_id = %truncate_id(session_id),
					error = %error,
					"Validation call failed before a verdict was produced"
				);
				Err(error.into())
			},
		}
	}

	fn publish_draft_updated(&self, session: &WorkflowState) {
		self.event_bus
			.publish(IntakeEvent::Workflow(WorkflowEvent::DraftUpdated {
				session_id: session.session_id.clone(),
				character_count: session.draft.character_count(),
			}))
			.ok();
	}

	fn publish_step_changed(&self, session_id: &str, from: WorkflowStep, to: WorkflowStep) {
		self.event_bus
			.publish(IntakeEvent::Workflow(WorkflowEvent::StepChanged {
				session_id: session_id.to_string(),
				from,
				to,
			}))
			.ok();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use intake_gateway::implementations::mock::{MockOutcome, MockValidationGateway};
	use intake_storage::implementations::memory::MemoryStorage;
	use intake_submission::implementations::mock::MockSubmission;
	use intake_types::{AuthContext, UserTier, CLARIFICATION_DELIMITER};

	const STAGING_DICTATION: &str = "55-year-old female with newly diagnosed breast cancer. \
		Request CT chest, abdomen and pelvis for staging.";

	fn test_config(extra_intake: &str) -> Config {
		format!(
			r#"
[intake]
id = "test-intake"
{extra_intake}

[storage]
primary = "memory"
[storage.implementations.memory]

[auth]
primary = "static_token"
[auth.implementations.static_token]
token = "test-token"

[gateway]
primary = "mock"
[gateway.implementations.mock]

[submission]
primary = "mock"
[submission.implementations.mock]
"#
		)
		.parse()
		.unwrap()
	}

	struct Harness {
		engine: IntakeEngine,
		gateway: MockValidationGateway,
		submission: MockSubmission,
	}

	fn harness_with(outcomes: Vec<MockOutcome>, auth: AuthContext, extra_intake: &str) -> Harness {
		let gateway = MockValidationGateway::with_outcomes(outcomes);
		let submission = MockSubmission::new();
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));

		let engine = IntakeEngine::new(
			test_config(extra_intake),
			storage,
			auth,
			Arc::new(GatewayService::new(Box::new(gateway.clone()))),
			Arc::new(SubmissionService::new(Box::new(submission.clone()))),
			None,
			EventBus::new(64),
		);

		Harness {
			engine,
			gateway,
			submission,
		}
	}

	fn harness(outcomes: Vec<MockOutcome>) -> Harness {
		harness_with(outcomes, standard_auth(), "")
	}

	fn standard_auth() -> AuthContext {
		AuthContext::new(Some("test-token".into()), UserTier::Standard)
	}

	fn trial_auth() -> AuthContext {
		AuthContext::new(Some("trial-token".into()), UserTier::Trial)
	}

	fn invalid_verdict() -> MockOutcome {
		Ok(ValidationResult::invalid("insufficient clinical detail"))
	}

	async fn session_with_text(harness: &Harness, text: &str) -> String {
		let session = harness.engine.create_session().await.unwrap();
		harness
			.engine
			.update_dictation(&session.session_id, text)
			.await
			.unwrap();
		session.session_id
	}

	#[tokio::test]
	async fn test_appropriate_dictation_advances_to_validation() {
		let h = harness(vec![Ok(MockValidationGateway::appropriate_verdict(
			"C50.911", "74178",
		))]);
		let sid = session_with_text(&h, STAGING_DICTATION).await;

		let state = h.engine.submit_dictation(&sid).await.unwrap();

		assert_eq!(state.step, WorkflowStep::Validation);
		assert_eq!(state.attempt_number(), 0);
		let result = state.latest_result().unwrap();
		assert_eq!(result.suggested_codes.len(), 2);
		assert_eq!(
			result.suggested_codes[0].code_type,
			intake_types::CodeType::Icd10
		);
		assert_eq!(result.primary_diagnosis().unwrap().code, "C50.911");
		assert!(!h.gateway.requests()[0].is_override_validation);
	}

	#[tokio::test]
	async fn test_invalid_verdict_stays_in_dictation_with_verbatim_feedback() {
		let h = harness(vec![invalid_verdict()]);
		// Short but over the 10-character floor, like "knee pain" plus detail.
		let sid = session_with_text(&h, "knee pain for two weeks").await;

		let state = h.engine.submit_dictation(&sid).await.unwrap();

		assert_eq!(state.step, WorkflowStep::Dictation);
		assert_eq!(state.attempt_number(), 1);
		assert_eq!(
			state.latest_result().unwrap().feedback,
			"insufficient clinical detail"
		);
	}

	#[tokio::test]
	async fn test_retries_are_flagged_as_override_validations() {
		let h = harness(vec![invalid_verdict(), invalid_verdict()]);
		let sid = session_with_text(&h, STAGING_DICTATION).await;

		h.engine.submit_dictation(&sid).await.unwrap();
		h.engine.submit_dictation(&sid).await.unwrap();

		let requests = h.gateway.requests();
		assert!(!requests[0].is_override_validation);
		assert!(requests[1].is_override_validation);
	}

	#[tokio::test]
	async fn test_short_dictation_never_reaches_the_gateway() {
		let h = harness(vec![]);
		let sid = session_with_text(&h, "knee pain").await; // 9 chars

		let err = h.engine.submit_dictation(&sid).await.unwrap_err();

		assert!(matches!(
			err,
			EngineError::InputTooShort {
				required: 10,
				actual: 9,
			}
		));
		assert_eq!(h.gateway.call_count(), 0);
		let state = h.engine.get_session(&sid).await.unwrap();
		assert_eq!(state.step, WorkflowStep::Dictation);
		assert_eq!(state.attempt_number(), 0);
	}

	#[tokio::test]
	async fn test_whitespace_does_not_count_toward_the_length_floor() {
		let h = harness(vec![]);
		let sid = session_with_text(&h, "   knee pain   ").await;

		let err = h.engine.submit_dictation(&sid).await.unwrap_err();
		assert!(matches!(err, EngineError::InputTooShort { .. }));
		assert_eq!(h.gateway.call_count(), 0);
	}

	#[tokio::test]
	async fn test_missing_credential_short_circuits_before_any_network_call() {
		let h = harness_with(
			vec![],
			AuthContext::new(None, UserTier::Standard),
			"",
		);
		let sid = session_with_text(&h, "valid enough dictation text here").await;

		let err = h.engine.submit_dictation(&sid).await.unwrap_err();

		assert!(matches!(err, EngineError::MissingCredential));
		assert_eq!(h.gateway.call_count(), 0);
		let state = h.engine.get_session(&sid).await.unwrap();
		assert_eq!(state.attempt_number(), 0);
	}

	#[tokio::test]
	async fn test_transport_failure_leaves_workflow_state_unchanged() {
		let h = harness_with(
			vec![Err(GatewayError::Transport("connection refused".into()))],
			trial_auth(),
			"",
		);
		let sid = session_with_text(&h, STAGING_DICTATION).await;
		let credits_before = h.engine.get_session(&sid).await.unwrap().remaining_credits;

		let err = h.engine.submit_dictation(&sid).await.unwrap_err();

		assert!(matches!(err, EngineError::Gateway(GatewayError::Transport(_))));
		assert!(err.user_feedback().contains("Unable to reach"));
		let state = h.engine.get_session(&sid).await.unwrap();
		assert_eq!(state.step, WorkflowStep::Dictation);
		assert_eq!(state.attempt_number(), 0);
		assert_eq!(state.remaining_credits, credits_before);
		assert!(!state.validation_in_flight);
	}

	#[tokio::test]
	async fn test_three_failures_open_the_override_path() {
		let h = harness(vec![
			invalid_verdict(),
			invalid_verdict(),
			invalid_verdict(),
			invalid_verdict(),
		]);
		let sid = session_with_text(&h, "acute knee trauma, rule out fracture").await;

		for expected in 1..=3u32 {
			let early = h
				.engine
				.force_override(&sid, "clinical judgment, trauma confirmed on exam")
				.await;
			assert!(
				matches!(early, Err(EngineError::OverrideUnavailable { .. })),
				"override must stay closed before three failures"
			);
			let state = h.engine.submit_dictation(&sid).await.unwrap();
			assert_eq!(state.attempt_number(), expected);
		}

		let state = h
			.engine
			.force_override(&sid, "clinical judgment, trauma confirmed on exam")
			.await
			.unwrap();

		assert_eq!(state.step, WorkflowStep::Validation);
		let result = state.latest_result().unwrap();
		assert!(result.overridden);
		assert_eq!(result.status, ValidationStatus::Valid);
		assert_eq!(
			result.override_justification.as_deref(),
			Some("clinical judgment, trauma confirmed on exam")
		);

		let last_request = h.gateway.requests().pop().unwrap();
		assert!(last_request.is_override_validation);
		assert_eq!(
			last_request.override_justification.as_deref(),
			Some("clinical judgment, trauma confirmed on exam")
		);
	}

	#[tokio::test]
	async fn test_override_accepts_a_relenting_gateway_verdict_as_is() {
		let h = harness(vec![
			invalid_verdict(),
			invalid_verdict(),
			invalid_verdict(),
			Ok(MockValidationGateway::appropriate_verdict("S83.511", "73721")),
		]);
		let sid = session_with_text(&h, "acute knee trauma, rule out fracture").await;

		for _ in 0..3 {
			h.engine.submit_dictation(&sid).await.unwrap();
		}
		let state = h.engine.force_override(&sid, "trauma on exam").await.unwrap();

		let result = state.latest_result().unwrap();
		assert!(!result.overridden, "a valid verdict needs no override");
		assert_eq!(result.status, ValidationStatus::Valid);
		assert_eq!(state.step, WorkflowStep::Validation);
	}

	#[tokio::test]
	async fn test_override_requires_a_justification() {
		let h = harness(vec![]);
		let sid = session_with_text(&h, STAGING_DICTATION).await;

		let err = h.engine.force_override(&sid, "   ").await.unwrap_err();
		assert!(matches!(err, EngineError::JustificationRequired));
		assert_eq!(h.gateway.call_count(), 0);
	}

	#[tokio::test]
	async fn test_clarification_appends_exactly_k_blocks() {
		let h = harness(vec![]);
		let sid = session_with_text(&h, "CT chest for staging").await;

		for _ in 0..3 {
			h.engine.append_clarification(&sid).await.unwrap();
		}

		let state = h.engine.get_session(&sid).await.unwrap();
		assert_eq!(
			state.draft.text.matches(CLARIFICATION_DELIMITER).count(),
			3
		);
		assert_eq!(state.step, WorkflowStep::Dictation);
	}

	#[tokio::test]
	async fn test_trial_credits_decrement_on_completed_calls_only() {
		let h = harness_with(
			vec![
				invalid_verdict(),
				Err(GatewayError::ServerFault { status: Some(502) }),
				Ok(MockValidationGateway::appropriate_verdict("C50.911", "74178")),
			],
			trial_auth(),
			"trial_credits = 2",
		);
		let sid = session_with_text(&h, STAGING_DICTATION).await;

		let state = h.engine.submit_dictation(&sid).await.unwrap();
		assert_eq!(state.remaining_credits, Some(1));

		// A server fault completes no call, so no credit is consumed.
		let err = h.engine.submit_dictation(&sid).await.unwrap_err();
		assert!(matches!(
			err,
			EngineError::Gateway(GatewayError::ServerFault { .. })
		));
		let state = h.engine.get_session(&sid).await.unwrap();
		assert_eq!(state.remaining_credits, Some(1));

		let state = h.engine.submit_dictation(&sid).await.unwrap();
		assert_eq!(state.remaining_credits, Some(0));
	}

	#[tokio::test]
	async fn test_exhausted_trial_credits_block_validation_locally() {
		let h = harness_with(vec![invalid_verdict()], trial_auth(), "trial_credits = 1");
		let sid = session_with_text(&h, STAGING_DICTATION).await;

		h.engine.submit_dictation(&sid).await.unwrap();
		assert_eq!(h.gateway.call_count(), 1);

		let err = h.engine.submit_dictation(&sid).await.unwrap_err();
		assert!(matches!(err, EngineError::CreditsExhausted));
		assert_eq!(h.gateway.call_count(), 1, "no further gateway call");
	}

	#[tokio::test]
	async fn test_back_from_review_preserves_attempt_count() {
		let h = harness(vec![
			invalid_verdict(),
			Ok(MockValidationGateway::appropriate_verdict("C50.911", "74178")),
		]);
		let sid = session_with_text(&h, STAGING_DICTATION).await;

		h.engine.submit_dictation(&sid).await.unwrap();
		let state = h.engine.submit_dictation(&sid).await.unwrap();
		assert_eq!(state.step, WorkflowStep::Validation);

		let state = h.engine.back(&sid).await.unwrap();
		assert_eq!(state.step, WorkflowStep::Dictation);
		assert_eq!(state.attempt_number(), 1, "attempts survive back()");
	}

	#[tokio::test]
	async fn test_back_is_rejected_in_the_dictation_step() {
		let h = harness(vec![]);
		let sid = session_with_text(&h, STAGING_DICTATION).await;

		let err = h.engine.back(&sid).await.unwrap_err();
		assert!(matches!(err, EngineError::InvalidTransition { .. }));
	}

	#[tokio::test]
	async fn test_sign_and_submit_resets_the_whole_session() {
		let h = harness(vec![Ok(MockValidationGateway::appropriate_verdict(
			"C50.911", "74178",
		))]);
		let sid = session_with_text(&h, STAGING_DICTATION).await;

		h.engine.submit_dictation(&sid).await.unwrap();
		let state = h
			.engine
			.sign(&sid, "Dr. Reyes", "I attest this order is clinically appropriate")
			.await
			.unwrap();
		assert_eq!(state.step, WorkflowStep::Signature);
		assert!(state.signature.is_some());

		let receipt = h.engine.submit_order(&sid).await.unwrap();
		assert!(receipt.routed_to_radiology);
		assert_eq!(h.submission.accepted_orders().len(), 1);
		assert_eq!(h.submission.routed_orders(), vec![receipt.order_id.clone()]);

		let accepted = &h.submission.accepted_orders()[0];
		assert_eq!(accepted.dictation, STAGING_DICTATION);
		assert_eq!(accepted.validation.primary_diagnosis().unwrap().code, "C50.911");

		// Terminal transition loops back to a fresh dictation state.
		let state = h.engine.get_session(&sid).await.unwrap();
		assert_eq!(state.step, WorkflowStep::Dictation);
		assert!(state.draft.text.is_empty());
		assert!(state.attempts.is_empty());
		assert!(state.signature.is_none());
	}

	#[tokio::test]
	async fn test_submission_failure_keeps_the_signature_step() {
		let h = harness(vec![Ok(MockValidationGateway::appropriate_verdict(
			"C50.911", "74178",
		))]);
		h.submission
			.push_failure(SubmissionError::Rejected { status: 422 });
		let sid = session_with_text(&h, STAGING_DICTATION).await;

		h.engine.submit_dictation(&sid).await.unwrap();
		h.engine.sign(&sid, "Dr. Reyes", "attested").await.unwrap();

		let err = h.engine.submit_order(&sid).await.unwrap_err();
		assert!(matches!(
			err,
			EngineError::Submission(SubmissionError::Rejected { status: 422 })
		));

		let state = h.engine.get_session(&sid).await.unwrap();
		assert_eq!(state.step, WorkflowStep::Signature, "session stays for retry");
	}

	#[tokio::test]
	async fn test_trial_sessions_cannot_submit_orders() {
		let h = harness_with(
			vec![Ok(MockValidationGateway::appropriate_verdict("C50.911", "74178"))],
			trial_auth(),
			"",
		);
		let sid = session_with_text(&h, STAGING_DICTATION).await;

		h.engine.submit_dictation(&sid).await.unwrap();
		h.engine.sign(&sid, "Dr. Reyes", "attested").await.unwrap();

		let err = h.engine.submit_order(&sid).await.unwrap_err();
		assert!(matches!(err, EngineError::SubmissionNotPermitted));
		assert!(h.submission.accepted_orders().is_empty());
	}

	#[tokio::test]
	async fn test_concurrent_validation_is_rejected_not_interleaved() {
		let h = harness(vec![]);
		let sid = session_with_text(&h, STAGING_DICTATION).await;

		// Simulate a call left in flight.
		h.engine
			.state_machine
			.update_session_with(&sid, |s| {
				s.validation_in_flight = true;
			})
			.await
			.unwrap();

		let err = h.engine.submit_dictation(&sid).await.unwrap_err();
		assert!(matches!(err, EngineError::ValidationInFlight));
		assert_eq!(h.gateway.call_count(), 0);
	}

	#[tokio::test]
	async fn test_signing_requires_the_validation_step() {
		let h = harness(vec![]);
		let sid = session_with_text(&h, STAGING_DICTATION).await;

		let err = h.engine.sign(&sid, "Dr. Reyes", "attested").await.unwrap_err();
		assert!(matches!(
			err,
			EngineError::WrongStep {
				required: WorkflowStep::Validation,
				actual: WorkflowStep::Dictation,
			}
		));
	}

	#[tokio::test]
	async fn test_unknown_session_is_reported_as_not_found() {
		let h = harness(vec![]);
		let err = h.engine.get_session("missing").await.unwrap_err();
		assert!(matches!(err, EngineError::SessionNotFound(id) if id == "missing"));
	}
}
