//! HTTP submission service implementation.
//!
//! Posts signed orders to the admin finalization endpoints with bearer
//! authentication:
//!
//! - `POST {base}/api/admin/orders/{orderId}` - persist the signed order
//! - `POST {base}/api/admin/orders/{orderId}/send-to-radiology` - route it
//!
//! The service's acknowledgment body is parsed when it matches the receipt
//! shape; older deployments answer with a bare success flag, in which case a
//! receipt is constructed locally.

use crate::{SubmissionError, SubmissionFactory, SubmissionInterface, SubmissionRegistry};
use async_trait::async_trait;
use intake_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString, SignedOrder,
	SubmissionReceipt, ValidationError,
};
use std::time::Duration;

/// HTTP client for the admin submission service.
pub struct HttpSubmission {
	/// Reusable HTTP client with pooling and timeout.
	client: reqwest::Client,
	/// Base URL of the submission service, without a trailing slash.
	base_url: String,
}

impl HttpSubmission {
	/// Creates a new HTTP submission client.
	pub fn new(base_url: String, timeout: Duration) -> Result<Self, SubmissionError> {
		let client = reqwest::Client::builder()
			.pool_idle_timeout(Duration::from_secs(90))
			.timeout(timeout)
			.build()
			.map_err(|e| SubmissionError::Transport(e.to_string()))?;

		Ok(Self {
			client,
			base_url: base_url.trim_end_matches('/').to_string(),
		})
	}

	/// Maps a non-success status into the submission error taxonomy.
	fn map_status(status: reqwest::StatusCode) -> Option<SubmissionError> {
		match status.as_u16() {
			200..=299 => None,
			401 => Some(SubmissionError::Unauthorized),
			403 => Some(SubmissionError::Forbidden),
			s => Some(SubmissionError::Rejected { status: s }),
		}
	}
}

#[async_trait]
impl SubmissionInterface for HttpSubmission {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpSubmissionSchema)
	}

	async fn submit_order(
		&self,
		order: &SignedOrder,
		token: &SecretString,
	) -> Result<SubmissionReceipt, SubmissionError> {
		let url = format!("{}/api/admin/orders/{}", self.base_url, order.order_id);

		let response = self
			.client
			.post(&url)
			.bearer_auth(token.expose_secret())
			.json(order)
			.send()
			.await
			.map_err(|e| SubmissionError::Transport(e.to_string()))?;

		if let Some(err) = Self::map_status(response.status()) {
			return Err(err);
		}

		tracing::info!(order_id = %order.order_id, "Order accepted by submission service");

		// Newer deployments acknowledge with a receipt body; older ones with
		// a bare success flag. Fall back to a locally constructed receipt.
		match response.json::<SubmissionReceipt>().await {
			Ok(receipt) => Ok(receipt),
			Err(_) => Ok(SubmissionReceipt {
				order_id: order.order_id.clone(),
				routed_to_radiology: false,
				accepted_at: chrono::Utc::now(),
			}),
		}
	}

	async fn send_to_radiology(
		&self,
		order_id: &str,
		token: &SecretString,
	) -> Result<(), SubmissionError> {
		let url = format!(
			"{}/api/admin/orders/{}/send-to-radiology",
			self.base_url, order_id
		);

		let response = self
			.client
			.post(&url)
			.bearer_auth(token.expose_secret())
			.send()
			.await
			.map_err(|e| SubmissionError::Transport(e.to_string()))?;

		if let Some(err) = Self::map_status(response.status()) {
			return Err(err);
		}

		Ok(())
	}
}

/// Configuration schema for HttpSubmission.
pub struct HttpSubmissionSchema;

impl ConfigSchema for HttpSubmissionSchema {
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

/// Registry for the HTTP submission implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = SubmissionFactory;

	fn factory() -> Self::Factory {
		create_submission
	}
}

impl SubmissionRegistry for Registry {}

/// Factory function to create an HTTP submission client from configuration.
///
/// Configuration parameters:
/// - `base_url`: Base URL of the submission service (required)
/// - `timeout_seconds`: Client-side request timeout (default: 30)
pub fn create_submission(
	config: &toml::Value,
) -> Result<Box<dyn SubmissionInterface>, SubmissionError> {
	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| SubmissionError::Transport("base_url missing".to_string()))?
		.to_string();

	let timeout_seconds = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(30) as u64;

	Ok(Box::new(HttpSubmission::new(
		base_url,
		Duration::from_secs(timeout_seconds),
	)?))
}
