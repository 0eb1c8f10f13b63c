//! Mock validation gateway implementation for testing and development.
//!
//! Plays back a scripted sequence of verdicts and failures, recording every
//! request it receives. Used by the engine tests and by local development
//! configurations where no live gateway is available.

use crate::{GatewayError, GatewayFactory, GatewayRegistry, ValidationGatewayInterface};
use async_trait::async_trait;
use intake_types::{
	CodeSuggestion, CodeType, ConfigSchema, GatewayRequest, ImplementationRegistry, Schema,
	SecretString, UserTier, ValidationError, ValidationResult, ValidationStatus,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One scripted outcome for the mock gateway.
pub type MockOutcome = Result<ValidationResult, GatewayError>;

/// Mock gateway that plays back scripted outcomes in order.
///
/// Once the script is exhausted every further call returns an appropriate
/// verdict with no code suggestions. Clones share the script and the request
/// log, so a test can keep a handle while the engine owns the boxed gateway.
#[derive(Clone)]
pub struct MockValidationGateway {
	script: Arc<Mutex<VecDeque<MockOutcome>>>,
	requests: Arc<Mutex<Vec<GatewayRequest>>>,
}

impl MockValidationGateway {
	/// Creates a mock gateway with an empty script.
	pub fn new() -> Self {
		Self::with_outcomes(Vec::new())
	}

	/// Creates a mock gateway that plays back the given outcomes in order.
	pub fn with_outcomes(outcomes: Vec<MockOutcome>) -> Self {
		Self {
			script: Arc::new(Mutex::new(outcomes.into())),
			requests: Arc::new(Mutex::new(Vec::new())),
		}
	}

	/// Appends an outcome to the playback script.
	pub fn push_outcome(&self, outcome: MockOutcome) {
		self.script.lock().unwrap().push_back(outcome);
	}

	/// Requests received so far, in call order.
	pub fn requests(&self) -> Vec<GatewayRequest> {
		self.requests.lock().unwrap().clone()
	}

	/// Number of calls that reached this gateway.
	pub fn call_count(&self) -> usize {
		self.requests.lock().unwrap().len()
	}

	/// Convenience constructor for an appropriate verdict with one ICD-10
	/// and one CPT suggestion.
	pub fn appropriate_verdict(icd10: &str, cpt: &str) -> ValidationResult {
		ValidationResult {
			status: ValidationStatus::Valid,
			feedback: "Order is appropriate".to_string(),
			compliance_score: Some(8.0),
			suggested_codes: vec![
				CodeSuggestion {
					code: icd10.to_string(),
					description: String::new(),
					code_type: CodeType::Icd10,
					confidence: 1.0,
					is_primary: true,
				},
				CodeSuggestion {
					code: cpt.to_string(),
					description: String::new(),
					code_type: CodeType::Cpt,
					confidence: 1.0,
					is_primary: false,
				},
			],
			overridden: false,
			override_justification: None,
		}
	}
}

impl Default for MockValidationGateway {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl ValidationGatewayInterface for MockValidationGateway {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockGatewaySchema)
	}

	async fn validate_dictation(
		&self,
		request: &GatewayRequest,
		_token: &SecretString,
		_tier: UserTier,
	) -> Result<ValidationResult, GatewayError> {
		self.requests.lock().unwrap().push(request.clone());

		match self.script.lock().unwrap().pop_front() {
			Some(outcome) => outcome,
			None => Ok(ValidationResult {
				status: ValidationStatus::Valid,
				feedback: "Order is appropriate".to_string(),
				compliance_score: None,
				suggested_codes: Vec::new(),
				overridden: false,
				override_justification: None,
			}),
		}
	}
}

/// Configuration schema for the mock gateway.
pub struct MockGatewaySchema;

impl ConfigSchema for MockGatewaySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// The mock gateway has no required configuration
		let schema = Schema::new(vec![], vec![]);
		schema.validate(config)
	}
}

/// Registry for the mock gateway implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = GatewayFactory;

	fn factory() -> Self::Factory {
		create_gateway
	}
}

impl GatewayRegistry for Registry {}

/// Factory function to create a mock gateway from configuration.
pub fn create_gateway(
	_config: &toml::Value,
) -> Result<Box<dyn ValidationGatewayInterface>, GatewayError> {
	Ok(Box::new(MockValidationGateway::new()))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request(text: &str) -> GatewayRequest {
		GatewayRequest {
			dictation_text: text.to_string(),
			is_override_validation: false,
			override_justification: None,
		}
	}

	#[tokio::test]
	async fn test_plays_back_script_in_order() {
		let gateway = MockValidationGateway::with_outcomes(vec![
			Ok(ValidationResult::invalid("insufficient clinical detail")),
			Err(GatewayError::Unauthorized),
		]);
		let token = SecretString::from("t");

		let first = gateway
			.validate_dictation(&request("knee pain"), &token, UserTier::Standard)
			.await
			.unwrap();
		assert_eq!(first.status, ValidationStatus::Invalid);

		let second = gateway
			.validate_dictation(&request("knee pain"), &token, UserTier::Standard)
			.await;
		assert!(matches!(second, Err(GatewayError::Unauthorized)));

		// Exhausted script falls back to an appropriate verdict.
		let third = gateway
			.validate_dictation(&request("knee pain"), &token, UserTier::Standard)
			.await
			.unwrap();
		assert_eq!(third.status, ValidationStatus::Valid);
		assert_eq!(gateway.call_count(), 3);
	}
}
