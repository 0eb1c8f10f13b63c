//! Credential management module for the RadOrder intake system.
//!
//! This module provides abstractions for resolving the access credential and
//! user tier the workflow engine operates with. The engine never reaches into
//! ambient storage itself: a credential implementation resolves the token
//! once and the engine receives a ready `AuthContext`.

use async_trait::async_trait;
use intake_types::{AuthContext, ConfigSchema, ImplementationRegistry, SecretString, UserTier};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod static_token;
}

/// Errors that can occur during credential operations.
#[derive(Debug, Error)]
pub enum AuthError {
	/// Error that occurs when credential resolution fails.
	#[error("Resolution failed: {0}")]
	ResolutionFailed(String),
	/// Error that occurs when the configured tier is not recognized.
	#[error("Invalid tier: {0}")]
	InvalidTier(String),
}

/// Trait defining the interface for credential implementations.
///
/// Implementations resolve the bearer token presented to the validation
/// gateway and submission service. A resolved `None` token is a valid
/// outcome: the engine surfaces it as a missing-credential error before any
/// network call is attempted.
#[async_trait]
pub trait CredentialInterface: Send + Sync {
	/// Returns the configuration schema for this credential implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Resolves the access token, if one is available.
	async fn resolve_token(&self) -> Result<Option<SecretString>, AuthError>;

	/// The user tier this credential belongs to.
	fn tier(&self) -> UserTier;
}

/// Type alias for credential factory functions.
pub type CredentialFactory = fn(&toml::Value) -> Result<Box<dyn CredentialInterface>, AuthError>;

/// Registry trait for credential implementations.
pub trait CredentialRegistry: ImplementationRegistry<Factory = CredentialFactory> {}

/// Get all registered credential implementations.
pub fn get_all_implementations() -> Vec<(&'static str, CredentialFactory)> {
	use implementations::static_token;

	vec![(static_token::Registry::NAME, static_token::Registry::factory())]
}

/// Service that manages credential resolution.
///
/// Wraps an underlying credential implementation and builds the
/// `AuthContext` injected into the workflow engine.
pub struct CredentialService {
	/// The underlying credential implementation.
	implementation: Box<dyn CredentialInterface>,
}

impl CredentialService {
	/// Creates a new CredentialService with the specified implementation.
	pub fn new(implementation: Box<dyn CredentialInterface>) -> Self {
		Self { implementation }
	}

	/// Resolves the credential into an `AuthContext`.
	pub async fn resolve(&self) -> Result<AuthContext, AuthError> {
		let token = self.implementation.resolve_token().await?;
		Ok(AuthContext::new(token, self.implementation.tier()))
	}
}
