//! Event types for inter-service communication.
//!
//! This module defines the event system used by the intake engine for
//! asynchronous communication between components. Events flow through a
//! broadcast bus so observers (logging, the speech bridge, the API layer)
//! can react to workflow changes without coupling to the engine.

use crate::workflow::WorkflowStep;
use serde::{Deserialize, Serialize};

/// Main event type encompassing all intake events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IntakeEvent {
	/// Events about session lifecycle and step movement.
	Workflow(WorkflowEvent),
	/// Events about gateway validation outcomes.
	Validation(ValidationEvent),
	/// Events about order finalization.
	Submission(SubmissionEvent),
}

/// Events related to session lifecycle and step movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
	/// A new intake session has been created.
	SessionCreated { session_id: String },
	/// The session moved between workflow steps.
	StepChanged {
		session_id: String,
		from: WorkflowStep,
		to: WorkflowStep,
	},
	/// The dictation draft changed (edit, clarification, or speech phrase).
	DraftUpdated {
		session_id: String,
		character_count: usize,
	},
	/// The session was reset to the initial state after submission.
	SessionReset { session_id: String },
}

/// Events related to gateway validation outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ValidationEvent {
	/// A valid verdict was accepted and the session advanced.
	VerdictAccepted {
		session_id: String,
		attempt_number: u32,
	},
	/// An invalid verdict was recorded; the session stays in dictation.
	VerdictRejected {
		session_id: String,
		attempt_number: u32,
		feedback: String,
	},
	/// A physician override forced local acceptance.
	OverrideApplied {
		session_id: String,
		justification: String,
	},
	/// A trial credit was consumed by a completed gateway call.
	CreditConsumed {
		session_id: String,
		remaining: u32,
	},
}

/// Events related to order finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SubmissionEvent {
	/// A signed order was accepted by the submission service.
	OrderSubmitted {
		session_id: String,
		order_id: String,
	},
	/// The submitted order was routed to a radiology organization.
	RoutedToRadiology { order_id: String },
}
