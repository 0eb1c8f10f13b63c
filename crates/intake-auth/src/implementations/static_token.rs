//! Static token credential implementation.
//!
//! Resolves the access token from configuration, with optional indirection
//! through an environment variable. Intended for service deployments where
//! the token is provisioned out of band; an unset token resolves to `None`
//! so the engine can surface the missing-credential class without attempting
//! a network call.

use crate::{AuthError, CredentialFactory, CredentialInterface, CredentialRegistry};
use async_trait::async_trait;
use intake_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString, UserTier,
	ValidationError,
};

/// Credential implementation backed by static configuration.
pub struct StaticTokenCredential {
	token: Option<SecretString>,
	tier: UserTier,
}

impl StaticTokenCredential {
	/// Creates a new static credential.
	pub fn new(token: Option<SecretString>, tier: UserTier) -> Self {
		Self { token, tier }
	}
}

#[async_trait]
impl CredentialInterface for StaticTokenCredential {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(StaticTokenSchema)
	}

	async fn resolve_token(&self) -> Result<Option<SecretString>, AuthError> {
		Ok(self.token.clone())
	}

	fn tier(&self) -> UserTier {
		self.tier
	}
}

/// Configuration schema for StaticTokenCredential.
pub struct StaticTokenSchema;

impl ConfigSchema for StaticTokenSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("token", FieldType::String),
				Field::new("token_env", FieldType::String),
				Field::new("tier", FieldType::String).with_validator(|v| {
					match v.as_str().unwrap_or_default() {
						"standard" | "trial" => Ok(()),
						other => Err(format!("unknown tier '{}'", other)),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Registry for the static token credential implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "static_token";
	type Factory = CredentialFactory;

	fn factory() -> Self::Factory {
		create_credential
	}
}

impl CredentialRegistry for Registry {}

/// Factory function to create a static credential from configuration.
///
/// Configuration parameters:
/// - `token`: The access token value (optional)
/// - `token_env`: Environment variable to read the token from when `token`
///   is not set (optional)
/// - `tier`: "standard" (default) or "trial"
pub fn create_credential(config: &toml::Value) -> Result<Box<dyn CredentialInterface>, AuthError> {
	let configured = config
		.get("token")
		.and_then(|v| v.as_str())
		.filter(|s| !s.is_empty())
		.map(SecretString::from);

	let token = match configured {
		Some(token) => Some(token),
		None => config
			.get("token_env")
			.and_then(|v| v.as_str())
			.and_then(|name| std::env::var(name).ok())
			.filter(|s| !s.is_empty())
			.map(SecretString::new),
	};

	let tier = match config.get("tier").and_then(|v| v.as_str()) {
		None | Some("standard") => UserTier::Standard,
		Some("trial") => UserTier::Trial,
		Some(other) => return Err(AuthError::InvalidTier(other.to_string())),
	};

	Ok(Box::new(StaticTokenCredential::new(token, tier)))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(s: &str) -> toml::Value {
		toml::from_str(s).unwrap()
	}

	#[tokio::test]
	async fn test_resolves_configured_token_and_tier() {
		let credential = create_credential(&parse("token = \"abc\"\ntier = \"trial\"")).unwrap();
		let token = credential.resolve_token().await.unwrap().unwrap();
		assert_eq!(token.expose_secret(), "abc");
		assert_eq!(credential.tier(), UserTier::Trial);
	}

	#[tokio::test]
	async fn test_missing_token_resolves_to_none() {
		let credential = create_credential(&parse("tier = \"standard\"")).unwrap();
		assert!(credential.resolve_token().await.unwrap().is_none());
	}

	#[test]
	fn test_unknown_tier_is_rejected() {
		let result = create_credential(&parse("tier = \"vip\""));
		assert!(matches!(result, Err(AuthError::InvalidTier(t)) if t == "vip"));
	}
}
