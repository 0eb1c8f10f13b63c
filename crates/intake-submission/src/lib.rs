//! Submission service client module for the RadOrder intake system.
//!
//! This module handles the finalization path: posting a signed order to the
//! admin submission service and routing the accepted order to a radiology
//! organization. The workflow engine treats both steps as one submission;
//! a failure in either leaves the session in the signature step for retry.

use async_trait::async_trait;
use intake_types::{ConfigSchema, ImplementationRegistry, SecretString, SignedOrder, SubmissionReceipt};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod mock;
}

/// Errors that can occur during order submission.
#[derive(Debug, Error)]
pub enum SubmissionError {
	/// The submission service could not be reached.
	#[error("Network error: {0}")]
	Transport(String),
	/// The service rejected the credential (HTTP 401).
	#[error("Authentication rejected")]
	Unauthorized,
	/// The credential lacks permission to submit orders (HTTP 403).
	#[error("Authorization rejected")]
	Forbidden,
	/// The service rejected the order (any other non-success status).
	#[error("Submission rejected (status {status})")]
	Rejected { status: u16 },
}

impl SubmissionError {
	/// Human-readable inline feedback for this failure class.
	pub fn user_feedback(&self) -> &'static str {
		match self {
			SubmissionError::Transport(_) => {
				"Unable to reach the order service. Check your connection and try again."
			},
			SubmissionError::Unauthorized => {
				"Your session is no longer authenticated. Please sign in again."
			},
			SubmissionError::Forbidden => {
				"Your account is not authorized to submit orders."
			},
			SubmissionError::Rejected { .. } => {
				"The order could not be submitted. Please try again."
			},
		}
	}
}

/// Trait defining the interface for submission service implementations.
#[async_trait]
pub trait SubmissionInterface: Send + Sync {
	/// Returns the configuration schema for this submission implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Posts a signed order to the submission service.
	async fn submit_order(
		&self,
		order: &SignedOrder,
		token: &SecretString,
	) -> Result<SubmissionReceipt, SubmissionError>;

	/// Routes an accepted order to a radiology organization.
	async fn send_to_radiology(
		&self,
		order_id: &str,
		token: &SecretString,
	) -> Result<(), SubmissionError>;
}

/// Type alias for submission factory functions.
pub type SubmissionFactory =
	fn(&toml::Value) -> Result<Box<dyn SubmissionInterface>, SubmissionError>;

/// Registry trait for submission implementations.
pub trait SubmissionRegistry: ImplementationRegistry<Factory = SubmissionFactory> {}

/// Get all registered submission implementations.
pub fn get_all_implementations() -> Vec<(&'static str, SubmissionFactory)> {
	use implementations::{http, mock};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}

/// Service that manages order finalization.
///
/// Submits the signed order and immediately routes it to radiology; the
/// returned receipt records whether routing completed.
pub struct SubmissionService {
	/// The underlying submission implementation.
	implementation: Box<dyn SubmissionInterface>,
}

impl SubmissionService {
	/// Creates a new SubmissionService with the specified implementation.
	pub fn new(implementation: Box<dyn SubmissionInterface>) -> Self {
		Self { implementation }
	}

	/// Submits a signed order and routes it to radiology.
	pub async fn finalize(
		&self,
		order: &SignedOrder,
		token: &SecretString,
	) -> Result<SubmissionReceipt, SubmissionError> {
		let mut receipt = self.implementation.submit_order(order, token).await?;
		self.implementation
			.send_to_radiology(&receipt.order_id, token)
			.await?;
		receipt.routed_to_radiology = true;
		Ok(receipt)
	}
}
