//! HTTP validation gateway implementation.
//!
//! Posts dictation text to the REST validation endpoint with bearer
//! authentication and an enforced client-side timeout. Trial-tier callers
//! are routed to the trial endpoint. Response bodies are normalized through
//! the shared envelope adapter; bodies matching neither envelope shape are a
//! parse failure logged distinctly from server faults.

use crate::{GatewayError, GatewayFactory, GatewayRegistry, ValidationGatewayInterface};
use async_trait::async_trait;
use intake_types::{
	extract_raw_result, ConfigSchema, Field, FieldType, GatewayRequest, ImplementationRegistry,
	Schema, SecretString, UserTier, ValidationError, ValidationResult,
};
use std::time::Duration;

/// Path of the standard validation endpoint, relative to the base URL.
const VALIDATE_PATH: &str = "/api/orders/validate";
/// Path of the trial-tier validation endpoint, relative to the base URL.
const VALIDATE_TRIAL_PATH: &str = "/api/orders/validate/trial";

/// HTTP client for the validation gateway.
pub struct HttpValidationGateway {
	/// Reusable HTTP client with pooling and timeout.
	client: reqwest::Client,
	/// Base URL of the gateway, without a trailing slash.
	base_url: String,
}

impl HttpValidationGateway {
	/// Creates a new HTTP gateway client.
	///
	/// The timeout is enforced client-side; an elapsed timeout surfaces as
	/// the server-fault class so the user retries with the same input.
	pub fn new(base_url: String, timeout: Duration) -> Result<Self, GatewayError> {
		let client = reqwest::Client::builder()
			.pool_idle_timeout(Duration::from_secs(90))
			.timeout(timeout)
			.build()
			.map_err(|e| GatewayError::Transport(e.to_string()))?;

		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
		})
	}

	/// Endpoint URL for the given tier.
	fn endpoint(&self, tier: UserTier) -> String {
		match tier {
			UserTier::Standard => format!("{}{}", self.base_url, VALIDATE_PATH),
			UserTier::Trial => format!("{}{}", self.base_url, VALIDATE_TRIAL_PATH),
		}
	}
}

#[async_trait]
impl ValidationGatewayInterface for HttpValidationGateway {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpGatewaySchema)
	}

	async fn validate_dictation(
		&self,
		request: &GatewayRequest,
		token: &SecretString,
		tier: UserTier,
	) -> Result<ValidationResult, GatewayError> {
		let url = self.endpoint(tier);

		let response = self
			.client
			.post(&url)
			.bearer_auth(token.expose_secret())
			.json(request)
			.send()
			.await
			.map_err(|e| {
				if e.is_timeout() {
					GatewayError::ServerFault { status: None }
				} else {
					GatewayError::Transport(e.to_string())
				}
			})?;

		let status = response.status();
		match status.as_u16() {
			200..=299 => {},
			401 => return Err(GatewayError::Unauthorized),
			403 => return Err(GatewayError::Forbidden),
			s if status.is_server_error() => {
				return Err(GatewayError::ServerFault { status: Some(s) })
			},
			s => return Err(GatewayError::Rejected { status: s }),
		}

		let body: serde_json::Value = response.json().await.map_err(|e| {
			if e.is_timeout() {
				GatewayError::ServerFault { status: None }
			} else {
				GatewayError::Transport(e.to_string())
			}
		})?;

		let raw = extract_raw_result(body).map_err(|e| {
			tracing::warn!(
				component = "gateway",
				error = %e,
				"Gateway response did not match any known envelope shape"
			);
			GatewayError::Parse(e.to_string())
		})?;

		Ok(raw.normalize())
	}
}

/// Configuration schema for HttpValidationGateway.
pub struct HttpGatewaySchema;

impl ConfigSchema for HttpGatewaySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("base_url", FieldType::String).with_validator(|v| {
				let url = v.as_str().unwrap_or_default();
				if url.starts_with("http://") || url.starts_with("https://") {
					Ok(())
				} else {
					Err("must start with http:// or https://".to_string())
				}
			})],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(300),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Registry for the HTTP gateway implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = GatewayFactory;

	fn factory() -> Self::Factory {
		create_gateway
	}
}

impl GatewayRegistry for Registry {}

/// Factory function to create an HTTP gateway client from configuration.
///
/// Configuration parameters:
/// - `base_url`: Base URL of the validation gateway (required)
/// - `timeout_seconds`: Client-side request timeout (default: 30)
pub fn create_gateway(
	config: &toml::Value,
) -> Result<Box<dyn ValidationGatewayInterface>, GatewayError> {
	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| GatewayError::Transport("base_url missing".to_string()))?
		.to_string();

	let timeout_seconds = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(30) as u64;

	Ok(Box::new(HttpValidationGateway::new(
		base_url,
		Duration::from_secs(timeout_seconds),
	)?))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_endpoint_selection_follows_tier() {
		let gateway = HttpValidationGateway::new(
			"https://api.radorderpad.example/".to_string(),
			Duration::from_secs(30),
		)
		.unwrap();

		assert_eq!(
			gateway.endpoint(UserTier::Standard),
			"https://api.radorderpad.example/api/orders/validate"
		);
		assert_eq!(
			gateway.endpoint(UserTier::Trial),
			"https://api.radorderpad.example/api/orders/validate/trial"
		);
	}

	#[test]
	fn test_schema_requires_http_base_url() {
		let schema = HttpGatewaySchema;
		assert!(schema
			.validate(&toml::from_str("base_url = \"https://api.example.org\"").unwrap())
			.is_ok());
		assert!(schema
			.validate(&toml::from_str("base_url = \"not-a-url\"").unwrap())
			.is_err());
		assert!(schema
			.validate(&toml::from_str("timeout_seconds = 30").unwrap())
			.is_err());
	}
}
