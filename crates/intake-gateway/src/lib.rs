//! Validation gateway client module for the RadOrder intake system.
//!
//! This module handles the round-trip to the clinical validation gateway:
//! posting dictation text, mapping transport and HTTP failures into the
//! intake error taxonomy, and normalizing the gateway's loosely-typed
//! response envelope into the internal `ValidationResult`.

use async_trait::async_trait;
use intake_types::{
	ConfigSchema, GatewayRequest, ImplementationRegistry, SecretString, UserTier, ValidationResult,
};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod mock;
}

/// Errors that can occur while calling the validation gateway.
///
/// A semantically-invalid verdict is NOT an error: the gateway was reached
/// and produced a verdict, so the call succeeds with an `Invalid` result.
/// These variants cover failures where no verdict was produced; none of them
/// consume a validation attempt or a trial credit.
#[derive(Debug, Error)]
pub enum GatewayError {
	/// The gateway could not be reached at all.
	#[error("Network error: {0}")]
	Transport(String),
	/// The gateway rejected the credential (HTTP 401).
	#[error("Authentication rejected")]
	Unauthorized,
	/// The credential lacks permission for this operation (HTTP 403).
	#[error("Authorization rejected")]
	Forbidden,
	/// The gateway failed server-side (HTTP 5xx) or timed out.
	#[error("Gateway fault (status {status:?})")]
	ServerFault { status: Option<u16> },
	/// The response body did not match any known envelope shape.
	/// Surfaced to the user like a server fault, logged distinctly.
	#[error("Unparseable gateway response: {0}")]
	Parse(String),
	/// Any other non-success status.
	#[error("Gateway rejected the request (status {status})")]
	Rejected { status: u16 },
}

impl GatewayError {
	/// Human-readable inline feedback for this failure class.
	///
	/// Every class maps to a stable message; the workflow surfaces it as
	/// dismissible feedback attached to the dictation step.
	pub fn user_feedback(&self) -> &'static str {
		match self {
			GatewayError::Transport(_) => {
				"Unable to reach the validation service. Check your connection and try again."
			},
			GatewayError::Unauthorized => {
				"Your session is no longer authenticated. Please sign in again."
			},
			GatewayError::Forbidden => {
				"Your account is not authorized to validate orders for this organization."
			},
			GatewayError::ServerFault { .. } | GatewayError::Parse(_) => {
				"The validation service is temporarily unavailable. Please try again."
			},
			GatewayError::Rejected { .. } => {
				"Validation could not be completed. Please try again."
			},
		}
	}
}

/// Trait defining the interface for validation gateway implementations.
///
/// This trait must be implemented by any gateway client that wants to
/// integrate with the intake system. The tier selects the trial endpoint for
/// trial-tier callers; the resolved token is always supplied by the engine,
/// which has already short-circuited missing credentials.
#[async_trait]
pub trait ValidationGatewayInterface: Send + Sync {
	/// Returns the configuration schema for this gateway implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Sends one dictation for validation and returns the normalized verdict.
	async fn validate_dictation(
		&self,
		request: &GatewayRequest,
		token: &SecretString,
		tier: UserTier,
	) -> Result<ValidationResult, GatewayError>;
}

/// Type alias for gateway factory functions.
pub type GatewayFactory = fn(&toml::Value) -> Result<Box<dyn ValidationGatewayInterface>, GatewayError>;

/// Registry trait for gateway implementations.
pub trait GatewayRegistry: ImplementationRegistry<Factory = GatewayFactory> {}

/// Get all registered gateway implementations.
pub fn get_all_implementations() -> Vec<(&'static str, GatewayFactory)> {
	use implementations::{http, mock};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}

/// Service that manages validation gateway calls.
///
/// Wraps the configured gateway implementation behind a stable interface for
/// the workflow engine.
pub struct GatewayService {
	/// The underlying gateway implementation.
	implementation: Box<dyn ValidationGatewayInterface>,
}

impl GatewayService {
	/// Creates a new GatewayService with the specified implementation.
	pub fn new(implementation: Box<dyn ValidationGatewayInterface>) -> Self {
		Self { implementation }
	}

	/// Sends one dictation for validation.
	pub async fn validate_dictation(
		&self,
		request: &GatewayRequest,
		token: &SecretString,
		tier: UserTier,
	) -> Result<ValidationResult, GatewayError> {
		self.implementation
			.validate_dictation(request, token, tier)
			.await
	}
}
