//! Workflow session state for the order-intake state machine.
//!
//! This module defines the top-level session object owned by the intake
//! engine, the step enumeration it moves through, and the mutable dictation
//! draft the clinician composes.

use crate::order::PhysicianSignature;
use crate::verdict::{ValidationAttempt, ValidationResult, ValidationStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delimiter block appended to the draft when the clinician adds a
/// clarification round. Appending is intentionally non-idempotent: each call
/// adds another block.
pub const CLARIFICATION_DELIMITER: &str = "--------Additional Clarification----------";

/// Steps of the order-intake workflow.
///
/// A session starts in `Dictation`, moves to `Validation` once a verdict is
/// accepted, and finishes in `Signature`. Successful submission resets the
/// session back to `Dictation` rather than entering a terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum WorkflowStep {
	/// Free-text dictation is being composed and validated.
	Dictation,
	/// Read-only review of the accepted validation verdict.
	Validation,
	/// Final review, attestation, and submission.
	Signature,
}

impl fmt::Display for WorkflowStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			WorkflowStep::Dictation => write!(f, "dictation"),
			WorkflowStep::Validation => write!(f, "validation"),
			WorkflowStep::Signature => write!(f, "signature"),
		}
	}
}

/// The mutable clinical narrative being composed.
///
/// Owned exclusively by one workflow session. Mutated by user edits, by
/// appended clarification blocks, and by finalized speech phrases. Cleared on
/// the post-submission reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DictationDraft {
	/// The dictation text.
	pub text: String,
}

impl DictationDraft {
	/// Creates an empty draft.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of characters in the draft, derived from the text.
	pub fn character_count(&self) -> usize {
		self.text.chars().count()
	}

	/// Length of the draft after trimming surrounding whitespace.
	pub fn trimmed_len(&self) -> usize {
		self.text.trim().chars().count()
	}

	/// Replaces the draft text with a fresh edit from the clinician.
	pub fn replace(&mut self, text: impl Into<String>) {
		self.text = text.into();
	}

	/// Appends a finalized speech phrase, separated by a single space.
	pub fn append_phrase(&mut self, phrase: &str) {
		if phrase.is_empty() {
			return;
		}
		if !self.text.is_empty() && !self.text.ends_with(char::is_whitespace) {
			self.text.push(' ');
		}
		self.text.push_str(phrase);
	}

	/// Appends the clarification delimiter block on its own lines.
	pub fn append_clarification(&mut self) {
		if !self.text.is_empty() && !self.text.ends_with('\n') {
			self.text.push('\n');
		}
		self.text.push_str(CLARIFICATION_DELIMITER);
		self.text.push('\n');
	}

	/// Clears the draft back to empty.
	pub fn clear(&mut self) {
		self.text.clear();
	}
}

/// Top-level session object for one order-intake workflow instance.
///
/// Each client session owns exactly one `WorkflowState`; there is no shared
/// mutable state between sessions. Step transitions and counters are mutated
/// only by the state machine in `intake-core`, never by presentation code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
	/// Unique identifier for this session.
	pub session_id: String,
	/// Current workflow step.
	pub step: WorkflowStep,
	/// The dictation draft being composed.
	pub draft: DictationDraft,
	/// Every completed gateway round-trip, in order.
	pub attempts: Vec<ValidationAttempt>,
	/// Remaining validation credits for trial-tier sessions.
	/// `None` for standard-tier sessions. Monotonically non-increasing,
	/// floored at zero; decremented once per completed gateway call.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub remaining_credits: Option<u32>,
	/// Whether a gateway call is currently in flight for this session.
	/// A second validation submitted while this is set is rejected.
	#[serde(default)]
	pub validation_in_flight: bool,
	/// Physician signature, present once the session reaches `Signature`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub signature: Option<PhysicianSignature>,
	/// Timestamp when this session was created.
	pub created_at: u64,
	/// Timestamp when this session was last updated.
	pub updated_at: u64,
}

impl WorkflowState {
	/// Creates a fresh session in the initial `Dictation` step.
	pub fn new(session_id: impl Into<String>, remaining_credits: Option<u32>, now: u64) -> Self {
		Self {
			session_id: session_id.into(),
			step: WorkflowStep::Dictation,
			draft: DictationDraft::new(),
			attempts: Vec::new(),
			remaining_credits,
			validation_in_flight: false,
			signature: None,
			created_at: now,
			updated_at: now,
		}
	}

	/// Number of semantically-invalid verdicts accumulated so far.
	///
	/// This is the 0-based attempt number assigned to the next gateway call:
	/// it increments only on `Invalid` verdicts, never on transport-class
	/// failures, and resets only with the whole session.
	pub fn attempt_number(&self) -> u32 {
		self.attempts
			.iter()
			.filter(|a| {
				matches!(
					a.result.as_ref().map(|r| r.status),
					Some(ValidationStatus::Invalid)
				)
			})
			.count() as u32
	}

	/// The result of the most recent completed gateway round-trip.
	pub fn latest_result(&self) -> Option<&ValidationResult> {
		self.attempts.iter().rev().find_map(|a| a.result.as_ref())
	}

	/// The accepted (valid) verdict that advanced the session, if any.
	pub fn accepted_result(&self) -> Option<&ValidationResult> {
		self.attempts
			.iter()
			.rev()
			.find_map(|a| a.result.as_ref())
			.filter(|r| r.status == ValidationStatus::Valid)
	}

	/// Resets the session to the initial dictation state after submission.
	///
	/// The draft is emptied and attempts are discarded; remaining trial
	/// credits carry over since they are an account-level budget.
	pub fn reset(&mut self, now: u64) {
		self.step = WorkflowStep::Dictation;
		self.draft.clear();
		self.attempts.clear();
		self.validation_in_flight = false;
		self.signature = None;
		self.updated_at = now;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::verdict::ValidationResult;

	fn invalid_attempt(n: u32) -> ValidationAttempt {
		ValidationAttempt {
			dictation_snapshot: "knee pain, please advise".into(),
			attempt_number: n,
			is_override: n > 0,
			result: Some(ValidationResult::invalid("insufficient clinical detail")),
		}
	}

	#[test]
	fn test_clarification_appends_every_time() {
		let mut draft = DictationDraft::new();
		draft.replace("CT chest for staging");
		for _ in 0..3 {
			draft.append_clarification();
		}
		assert_eq!(draft.text.matches(CLARIFICATION_DELIMITER).count(), 3);
	}

	#[test]
	fn test_phrase_append_inserts_separator() {
		let mut draft = DictationDraft::new();
		draft.append_phrase("55-year-old female");
		draft.append_phrase("with newly diagnosed breast cancer");
		assert_eq!(
			draft.text,
			"55-year-old female with newly diagnosed breast cancer"
		);
	}

	#[test]
	fn test_attempt_number_counts_only_invalid_verdicts() {
		let mut state = WorkflowState::new("s1", None, 0);
		assert_eq!(state.attempt_number(), 0);
		state.attempts.push(invalid_attempt(0));
		state.attempts.push(invalid_attempt(1));
		assert_eq!(state.attempt_number(), 2);

		// A transport failure records no result and consumes no attempt.
		state.attempts.push(ValidationAttempt {
			dictation_snapshot: "knee pain, please advise".into(),
			attempt_number: 2,
			is_override: true,
			result: None,
		});
		assert_eq!(state.attempt_number(), 2);
	}

	#[test]
	fn test_reset_returns_to_initial_dictation() {
		let mut state = WorkflowState::new("s1", Some(5), 0);
		state.step = WorkflowStep::Signature;
		state.draft.replace("some dictation");
		state.attempts.push(invalid_attempt(0));
		state.reset(10);
		assert_eq!(state.step, WorkflowStep::Dictation);
		assert!(state.draft.text.is_empty());
		assert!(state.attempts.is_empty());
		assert_eq!(state.remaining_credits, Some(5));
	}
}
