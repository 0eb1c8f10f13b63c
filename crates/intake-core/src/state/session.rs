//! Workflow session state machine implementation.
//!
//! Manages session step transitions with validation, ensuring sessions move
//! only along allowed edges: dictation -> validation -> signature, with
//! back-edges to dictation and the post-submission reset. Also provides
//! utilities for updating session fields with automatic persistence.

use intake_storage::StorageService;
use intake_types::{current_timestamp, StorageNamespace, WorkflowState, WorkflowStep};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during session state management.
#[derive(Debug, Error)]
pub enum SessionStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid step transition from {from} to {to}")]
	InvalidTransition {
		from: WorkflowStep,
		to: WorkflowStep,
	},
	#[error("Session not found: {0}")]
	SessionNotFound(String),
}

/// Allowed workflow step transitions.
///
/// The reset edge (signature -> dictation after submission) is not in this
/// table: a reset replaces the whole session state rather than transitioning
/// it, so it goes through `WorkflowState::reset`.
static TRANSITIONS: Lazy<HashMap<WorkflowStep, HashSet<WorkflowStep>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		WorkflowStep::Dictation,
		HashSet::from([WorkflowStep::Validation]),
	);
	m.insert(
		WorkflowStep::Validation,
		HashSet::from([WorkflowStep::Dictation, WorkflowStep::Signature]),
	);
	m.insert(
		WorkflowStep::Signature,
		HashSet::from([WorkflowStep::Dictation]),
	);
	m
});

/// Manages session state transitions and persistence.
pub struct WorkflowStateMachine {
	storage: Arc<StorageService>,
	/// TTL applied to every stored session so idle sessions expire.
	session_ttl: Duration,
}

impl WorkflowStateMachine {
	pub fn new(storage: Arc<StorageService>, session_ttl: Duration) -> Self {
		Self {
			storage,
			session_ttl,
		}
	}

	/// Gets a session by ID.
	pub async fn get_session(&self, session_id: &str) -> Result<WorkflowState, SessionStateError> {
		self.storage
			.retrieve(StorageNamespace::Sessions.as_str(), session_id)
			.await
			.map_err(|e| match e {
				intake_storage::StorageError::NotFound => {
					SessionStateError::SessionNotFound(session_id.to_string())
				},
				other => SessionStateError::Storage(other.to_string()),
			})
	}

	/// Stores a session, refreshing its idle TTL.
	pub async fn store_session(&self, session: &WorkflowState) -> Result<(), SessionStateError> {
		self.storage
			.store_with_ttl(
				StorageNamespace::Sessions.as_str(),
				&session.session_id,
				session,
				Some(self.session_ttl),
			)
			.await
			.map_err(|e| SessionStateError::Storage(e.to_string()))
	}

	/// Updates a session with a closure and persists it.
	///
	/// The `updated_at` timestamp is set automatically.
	pub async fn update_session_with<F>(
		&self,
		session_id: &str,
		updater: F,
	) -> Result<WorkflowState, SessionStateError>
	where
		F: FnOnce(&mut WorkflowState),
	{
		let mut session = self.get_session(session_id).await?;

		updater(&mut session);
		session.updated_at = current_timestamp();

		self.store_session(&session).await?;
		Ok(session)
	}

	/// Transitions a session to a new step with validation.
	pub async fn transition_step(
		&self,
		session_id: &str,
		to: WorkflowStep,
	) -> Result<WorkflowState, SessionStateError> {
		let session = self.get_session(session_id).await?;

		if !Self::is_valid_transition(session.step, to) {
			return Err(SessionStateError::InvalidTransition {
				from: session.step,
				to,
			});
		}

		self.update_session_with(session_id, |s| {
			s.step = to;
		})
		.await
	}

	/// Checks if a step transition is allowed.
	pub fn is_valid_transition(from: WorkflowStep, to: WorkflowStep) -> bool {
		TRANSITIONS.get(&from).is_some_and(|set| set.contains(&to))
	}

	/// Resets a session to the initial dictation state after submission.
	pub async fn reset_session(
		&self,
		session_id: &str,
	) -> Result<WorkflowState, SessionStateError> {
		self.update_session_with(session_id, |s| {
			s.reset(current_timestamp());
		})
		.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use intake_storage::implementations::memory::MemoryStorage;

	fn machine() -> WorkflowStateMachine {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		WorkflowStateMachine::new(storage, Duration::from_secs(3600))
	}

	#[tokio::test]
	async fn test_transition_table_allows_only_workflow_edges() {
		use WorkflowStep::*;
		assert!(WorkflowStateMachine::is_valid_transition(Dictation, Validation));
		assert!(WorkflowStateMachine::is_valid_transition(Validation, Dictation));
		assert!(WorkflowStateMachine::is_valid_transition(Validation, Signature));
		assert!(WorkflowStateMachine::is_valid_transition(Signature, Dictation));

		assert!(!WorkflowStateMachine::is_valid_transition(Dictation, Signature));
		assert!(!WorkflowStateMachine::is_valid_transition(Signature, Validation));
		assert!(!WorkflowStateMachine::is_valid_transition(Dictation, Dictation));
	}

	#[tokio::test]
	async fn test_invalid_transition_is_rejected_and_not_persisted() {
		let machine = machine();
		let session = WorkflowState::new("s1", None, 0);
		machine.store_session(&session).await.unwrap();

		let result = machine
			.transition_step("s1", WorkflowStep::Signature)
			.await;
		assert!(matches!(
			result,
			Err(SessionStateError::InvalidTransition {
				from: WorkflowStep::Dictation,
				to: WorkflowStep::Signature,
			})
		));

		let stored = machine.get_session("s1").await.unwrap();
		assert_eq!(stored.step, WorkflowStep::Dictation);
	}

	#[tokio::test]
	async fn test_missing_session_maps_to_not_found() {
		let machine = machine();
		let result = machine.get_session("nope").await;
		assert!(matches!(
			result,
			Err(SessionStateError::SessionNotFound(id)) if id == "nope"
		));
	}
}
