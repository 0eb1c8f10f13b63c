//! Mock submission service implementation for testing and development.
//!
//! Accepts every order, records what it received, and can be scripted to
//! fail so engine tests can exercise the submission error paths.

use crate::{SubmissionError, SubmissionFactory, SubmissionInterface, SubmissionRegistry};
use async_trait::async_trait;
use intake_types::{
	ConfigSchema, ImplementationRegistry, Schema, SecretString, SignedOrder, SubmissionReceipt,
	ValidationError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock submission service.
///
/// Clones share state, so a test can keep a handle while the engine owns the
/// boxed implementation.
#[derive(Clone)]
pub struct MockSubmission {
	/// Scripted failures consumed before orders start succeeding.
	failures: Arc<Mutex<VecDeque<SubmissionError>>>,
	/// Orders accepted so far.
	accepted: Arc<Mutex<Vec<SignedOrder>>>,
	/// Order ids routed to radiology so far.
	routed: Arc<Mutex<Vec<String>>>,
}

impl MockSubmission {
	/// Creates a mock submission service that accepts everything.
	pub fn new() -> Self {
		Self {
			failures: Arc::new(Mutex::new(VecDeque::new())),
			accepted: Arc::new(Mutex::new(Vec::new())),
			routed: Arc::new(Mutex::new(Vec::new())),
		}
	}

	/// Scripts the next submission to fail with the given error.
	pub fn push_failure(&self, error: SubmissionError) {
		self.failures.lock().unwrap().push_back(error);
	}

	/// Orders accepted so far, in submission order.
	pub fn accepted_orders(&self) -> Vec<SignedOrder> {
		self.accepted.lock().unwrap().clone()
	}

	/// Order ids routed to radiology so far.
	pub fn routed_orders(&self) -> Vec<String> {
		self.routed.lock().unwrap().clone()
	}
}

impl Default for MockSubmission {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl SubmissionInterface for MockSubmission {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockSubmissionSchema)
	}

	async fn submit_order(
		&self,
		order: &SignedOrder,
		_token: &SecretString,
	) -> Result<SubmissionReceipt, SubmissionError> {
		if let Some(error) = self.failures.lock().unwrap().pop_front() {
			return Err(error);
		}

		self.accepted.lock().unwrap().push(order.clone());
		Ok(SubmissionReceipt {
			order_id: order.order_id.clone(),
			routed_to_radiology: false,
			accepted_at: chrono::Utc::now(),
		})
	}

	async fn send_to_radiology(
		&self,
		order_id: &str,
		_token: &SecretString,
	) -> Result<(), SubmissionError> {
		self.routed.lock().unwrap().push(order_id.to_string());
		Ok(())
	}
}

/// Configuration schema for the mock submission service.
pub struct MockSubmissionSchema;

impl ConfigSchema for MockSubmissionSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(vec![], vec![]);
		schema.validate(config)
	}
}

/// Registry for the mock submission implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = SubmissionFactory;

	fn factory() -> Self::Factory {
		create_submission
	}
}

impl SubmissionRegistry for Registry {}

/// Factory function to create a mock submission service from configuration.
pub fn create_submission(
	_config: &toml::Value,
) -> Result<Box<dyn SubmissionInterface>, SubmissionError> {
	Ok(Box::new(MockSubmission::new()))
}
