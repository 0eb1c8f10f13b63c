//! Signed order and submission receipt types.
//!
//! These shapes travel the finalization path: a signed order is built from
//! the accepted validation verdict and the physician's attestation, posted
//! to the admin submission service, and acknowledged with a receipt.

use crate::verdict::ValidationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Physician attestation attached at the signature step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicianSignature {
	/// Display name of the signing physician.
	pub signed_by: String,
	/// Attestation statement accepted at signing time.
	pub attestation: String,
	/// Unix timestamp of the signature.
	pub signed_at: u64,
}

/// A finalized order ready for submission.
///
/// Carries the dictation exactly as validated, the accepted verdict with its
/// code suggestions in gateway order, and the signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
	/// Identifier assigned by the intake engine at signing time.
	pub order_id: String,
	/// The session that produced this order.
	pub session_id: String,
	/// The validated dictation text.
	pub dictation: String,
	/// The accepted validation verdict, including any override record.
	pub validation: ValidationResult,
	/// The physician's signature and attestation.
	pub signature: PhysicianSignature,
}

/// Acknowledgment returned by the submission service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
	/// The order identifier as recorded by the submission service.
	pub order_id: String,
	/// Whether the order was also routed to a radiology organization.
	#[serde(default)]
	pub routed_to_radiology: bool,
	/// When the submission service accepted the order.
	pub accepted_at: DateTime<Utc>,
}
