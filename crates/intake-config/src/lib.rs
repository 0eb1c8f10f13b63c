//! Configuration module for the RadOrder intake service.
//!
//! This module provides structures and utilities for managing intake
//! configuration. It supports loading configuration from TOML files with
//! environment-variable resolution and provides validation to ensure all
//! required configuration values are properly set.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the intake service.
///
/// Contains all configuration sections required for the service to operate:
/// workflow policy, session storage, credential resolution, the validation
/// gateway, the submission service, the optional speech capability, and the
/// HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Workflow policy configuration for the intake engine.
	pub intake: IntakeConfig,
	/// Configuration for the session storage backend.
	pub storage: StorageConfig,
	/// Configuration for credential resolution.
	pub auth: AuthConfig,
	/// Configuration for the validation gateway client.
	pub gateway: GatewayConfig,
	/// Configuration for the signature/submission service client.
	pub submission: SubmissionConfig,
	/// Configuration for the optional speech-to-text capability.
	pub speech: Option<SpeechConfig>,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Workflow policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntakeConfig {
	/// Unique identifier for this intake service instance.
	pub id: String,
	/// Minimum trimmed dictation length accepted for validation.
	#[serde(default = "default_dictation_min_chars")]
	pub dictation_min_chars: usize,
	/// Number of non-valid verdicts after which the override path opens.
	#[serde(default = "default_override_after_attempts")]
	pub override_after_attempts: u32,
	/// Validation-call budget granted to trial-tier sessions.
	#[serde(default = "default_trial_credits")]
	pub trial_credits: u32,
}

/// Returns the default minimum dictation length in characters.
fn default_dictation_min_chars() -> usize {
	10
}

/// Returns the default number of failed attempts before override opens.
fn default_override_after_attempts() -> u32 {
	3
}

/// Returns the default trial validation-call budget.
fn default_trial_credits() -> u32 {
	10
}

/// Configuration for the session storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	#[serde(default = "default_cleanup_interval")]
	pub cleanup_interval_seconds: u64,
	/// Time-to-live for idle sessions, in seconds.
	#[serde(default = "default_session_ttl")]
	pub session_ttl_seconds: u64,
}

/// Returns the default storage cleanup interval in seconds.
fn default_cleanup_interval() -> u64 {
	3600
}

/// Returns the default idle-session TTL in seconds (24 hours).
fn default_session_ttl() -> u64 {
	86400
}

/// Configuration for credential resolution.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of credential implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the validation gateway client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of gateway implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the submission service client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmissionConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of submission implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the speech-to-text capability.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeechConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of speech implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
}

/// Returns the default API host.
fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

/// Returns the default API port.
fn default_api_port() -> u16 {
	3000
}

/// Returns the default API timeout in seconds.
fn default_api_timeout() -> u64 {
	30
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file with environment variable resolution.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let contents = tokio::fs::read_to_string(path).await?;
		contents.parse()
	}

	/// Validates the configuration to ensure all required fields are set.
	///
	/// This method performs validation across all configuration sections:
	/// - Ensures the intake id is not empty and policy values are sane
	/// - Validates that each pluggable section names a configured primary
	/// - Checks storage cleanup and TTL bounds
	fn validate(&self) -> Result<(), ConfigError> {
		if self.intake.id.is_empty() {
			return Err(ConfigError::Validation("Intake ID cannot be empty".into()));
		}
		if self.intake.dictation_min_chars == 0 {
			return Err(ConfigError::Validation(
				"dictation_min_chars must be at least 1".into(),
			));
		}
		if self.intake.override_after_attempts == 0 {
			return Err(ConfigError::Validation(
				"override_after_attempts must be at least 1".into(),
			));
		}

		validate_section("storage", &self.storage.primary, &self.storage.implementations)?;
		validate_section("auth", &self.auth.primary, &self.auth.implementations)?;
		validate_section("gateway", &self.gateway.primary, &self.gateway.implementations)?;
		validate_section(
			"submission",
			&self.submission.primary,
			&self.submission.implementations,
		)?;
		if let Some(ref speech) = self.speech {
			validate_section("speech", &speech.primary, &speech.implementations)?;
		}

		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}
		if self.storage.session_ttl_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage session_ttl_seconds must be greater than 0".into(),
			));
		}

		Ok(())
	}
}

/// Validates that a pluggable section has implementations and that the
/// configured primary is among them.
fn validate_section(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is automatically
/// validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const BASE_CONFIG: &str = r#"
[intake]
id = "radorder-intake"

[storage]
primary = "memory"
[storage.implementations.memory]

[auth]
primary = "static_token"
[auth.implementations.static_token]
token = "test-token"
tier = "standard"

[gateway]
primary = "http"
[gateway.implementations.http]
base_url = "http://localhost:8080"

[submission]
primary = "http"
[submission.implementations.http]
base_url = "http://localhost:8080"
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TEST_GATEWAY_HOST", "localhost");
		std::env::set_var("TEST_GATEWAY_PORT", "8080");

		let input = "base_url = \"http://${TEST_GATEWAY_HOST}:${TEST_GATEWAY_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "base_url = \"http://localhost:8080\"");

		std::env::remove_var("TEST_GATEWAY_HOST");
		std::env::remove_var("TEST_GATEWAY_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("MISSING_VAR"));
	}

	#[test]
	fn test_base_config_parses_with_defaults() {
		let config: Config = BASE_CONFIG.parse().unwrap();
		assert_eq!(config.intake.id, "radorder-intake");
		assert_eq!(config.intake.dictation_min_chars, 10);
		assert_eq!(config.intake.override_after_attempts, 3);
		assert_eq!(config.storage.cleanup_interval_seconds, 3600);
		assert!(config.speech.is_none());
		assert!(config.api.is_none());
	}

	#[test]
	fn test_unknown_primary_rejected() {
		let config_str = BASE_CONFIG.replace("primary = \"memory\"", "primary = \"redis\"");
		let result = Config::from_str(&config_str);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("Primary storage 'redis' not found"));
	}

	#[test]
	fn test_empty_intake_id_rejected() {
		let config_str = BASE_CONFIG.replace("id = \"radorder-intake\"", "id = \"\"");
		let result = Config::from_str(&config_str);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("Intake ID"));
	}

	#[test]
	fn test_zero_override_threshold_rejected() {
		let config_str = format!("{}\n", BASE_CONFIG)
			.replace("id = \"radorder-intake\"", "id = \"x\"\noverride_after_attempts = 0");
		let result = Config::from_str(&config_str);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("override_after_attempts"));
	}
}
