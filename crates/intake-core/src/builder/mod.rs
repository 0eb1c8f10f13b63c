//! Builder for constructing an IntakeEngine with pluggable implementations.
//!
//! The builder resolves each configured section (storage, auth, gateway,
//! submission, optional speech) to a registered implementation factory,
//! validates the implementation's configuration against its schema, and
//! wires the resulting services into an engine. Factories are preloaded from
//! each crate's registry; callers can override or extend them before
//! building (tests inject mocks this way).

use crate::engine::{EngineError, IntakeEngine};
use crate::event_bus::EventBus;
use intake_auth::{CredentialFactory, CredentialService};
use intake_config::Config;
use intake_gateway::{GatewayFactory, GatewayService};
use intake_speech::{SpeechFactory, SpeechService};
use intake_storage::{StorageFactory, StorageService};
use intake_submission::{SubmissionFactory, SubmissionService};
use std::collections::HashMap;
use std::sync::Arc;

/// Capacity of the engine's broadcast event bus.
const EVENT_BUS_CAPACITY: usize = 1000;

/// Builder assembling an IntakeEngine from configuration.
pub struct IntakeBuilder {
	config: Config,
	storage_factories: HashMap<String, StorageFactory>,
	credential_factories: HashMap<String, CredentialFactory>,
	gateway_factories: HashMap<String, GatewayFactory>,
	submission_factories: HashMap<String, SubmissionFactory>,
	speech_factories: HashMap<String, SpeechFactory>,
}

impl IntakeBuilder {
	/// Creates a new builder preloaded with every registered implementation.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage_factories: intake_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			credential_factories: intake_auth::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			gateway_factories: intake_gateway::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			submission_factories: intake_submission::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			speech_factories: intake_speech::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	/// Adds or replaces a storage factory.
	pub fn with_storage_factory(mut self, name: &str, factory: StorageFactory) -> Self {
		self.storage_factories.insert(name.to_string(), factory);
		self
	}

	/// Adds or replaces a credential factory.
	pub fn with_credential_factory(mut self, name: &str, factory: CredentialFactory) -> Self {
		self.credential_factories.insert(name.to_string(), factory);
		self
	}

	/// Adds or replaces a gateway factory.
	pub fn with_gateway_factory(mut self, name: &str, factory: GatewayFactory) -> Self {
		self.gateway_factories.insert(name.to_string(), factory);
		self
	}

	/// Adds or replaces a submission factory.
	pub fn with_submission_factory(mut self, name: &str, factory: SubmissionFactory) -> Self {
		self.submission_factories.insert(name.to_string(), factory);
		self
	}

	/// Adds or replaces a speech factory.
	pub fn with_speech_factory(mut self, name: &str, factory: SpeechFactory) -> Self {
		self.speech_factories.insert(name.to_string(), factory);
		self
	}

	/// Builds the IntakeEngine using the configured factories.
	///
	/// This method:
	/// 1. Creates each service from its configured primary implementation
	/// 2. Validates every implementation's configuration against its schema
	/// 3. Resolves the credential into the engine's auth context
	/// 4. Returns a fully wired engine ready to serve sessions
	pub async fn build(self) -> Result<IntakeEngine, EngineError> {
		let config = self.config;

		// Storage backend
		let storage_name = &config.storage.primary;
		let storage_config = section_config(
			"storage",
			storage_name,
			&config.storage.implementations,
		)?;
		let storage_factory = self
			.storage_factories
			.get(storage_name.as_str())
			.ok_or_else(|| {
				EngineError::Config(format!("Unknown storage implementation '{}'", storage_name))
			})?;
		let storage_backend = storage_factory(storage_config).map_err(|e| {
			EngineError::Config(format!("Failed to create storage '{}': {}", storage_name, e))
		})?;
		storage_backend
			.config_schema()
			.validate(storage_config)
			.map_err(|e| {
				EngineError::Config(format!("Invalid storage configuration '{}': {}", storage_name, e))
			})?;
		let storage = Arc::new(StorageService::new(storage_backend));
		tracing::info!(component = "storage", implementation = %storage_name, "Loaded");

		// Credential resolution
		let auth_name = &config.auth.primary;
		let auth_config = section_config("auth", auth_name, &config.auth.implementations)?;
		let credential_factory = self
			.credential_factories
			.get(auth_name.as_str())
			.ok_or_else(|| {
				EngineError::Config(format!("Unknown auth implementation '{}'", auth_name))
			})?;
		let credential = credential_factory(auth_config).map_err(|e| {
			EngineError::Config(format!("Failed to create credential '{}': {}", auth_name, e))
		})?;
		credential
			.config_schema()
			.validate(auth_config)
			.map_err(|e| {
				EngineError::Config(format!("Invalid auth configuration '{}': {}", auth_name, e))
			})?;
		let auth = CredentialService::new(credential)
			.resolve()
			.await
			.map_err(|e| EngineError::Config(format!("Credential resolution failed: {}", e)))?;
		tracing::info!(component = "auth", implementation = %auth_name, tier = %auth.tier(), "Loaded");

		// Validation gateway
		let gateway_name = &config.gateway.primary;
		let gateway_config = section_config(
			"gateway",
			gateway_name,
			&config.gateway.implementations,
		)?;
		let gateway_factory = self
			.gateway_factories
			.get(gateway_name.as_str())
			.ok_or_else(|| {
				EngineError::Config(format!("Unknown gateway implementation '{}'", gateway_name))
			})?;
		let gateway_impl = gateway_factory(gateway_config).map_err(|e| {
			EngineError::Config(format!("Failed to create gateway '{}': {}", gateway_name, e))
		})?;
		gateway_impl
			.config_schema()
			.validate(gateway_config)
			.map_err(|e| {
				EngineError::Config(format!(
					"Invalid gateway configuration '{}': {}",
					gateway_name, e
				))
			})?;
		let gateway = Arc::new(GatewayService::new(gateway_impl));
		tracing::info!(component = "gateway", implementation = %gateway_name, "Loaded");

		// Submission service
		let submission_name = &config.submission.primary;
		let submission_config = section_config(
			"submission",
			submission_name,
			&config.submission.implementations,
		)?;
		let submission_factory = self
			.submission_factories
			.get(submission_name.as_str())
			.ok_or_else(|| {
				EngineError::Config(format!(
					"Unknown submission implementation '{}'",
					submission_name
				))
			})?;
		let submission_impl = submission_factory(submission_config).map_err(|e| {
			EngineError::Config(format!(
				"Failed to create submission '{}': {}",
				submission_name, e
			))
		})?;
		submission_impl
			.config_schema()
			.validate(submission_config)
			.map_err(|e| {
				EngineError::Config(format!(
					"Invalid submission configuration '{}': {}",
					submission_name, e
				))
			})?;
		let submission = Arc::new(SubmissionService::new(submission_impl));
		tracing::info!(component = "submission", implementation = %submission_name, "Loaded");

		// Optional speech capability
		let speech = match &config.speech {
			Some(speech_section) => {
				let speech_name = &speech_section.primary;
				let speech_config = section_config(
					"speech",
					speech_name,
					&speech_section.implementations,
				)?;
				let speech_factory = self
					.speech_factories
					.get(speech_name.as_str())
					.ok_or_else(|| {
						EngineError::Config(format!(
							"Unknown speech implementation '{}'",
							speech_name
						))
					})?;
				let speech_impl = speech_factory(speech_config).map_err(|e| {
					EngineError::Config(format!(
						"Failed to create speech '{}': {}",
						speech_name, e
					))
				})?;
				speech_impl
					.config_schema()
					.validate(speech_config)
					.map_err(|e| {
						EngineError::Config(format!(
							"Invalid speech configuration '{}': {}",
							speech_name, e
						))
					})?;
				tracing::info!(component = "speech", implementation = %speech_name, "Loaded");
				Some(Arc::new(SpeechService::new(speech_impl)))
			},
			None => None,
		};

		Ok(IntakeEngine::new(
			config,
			storage,
			auth,
			gateway,
			submission,
			speech,
			EventBus::new(EVENT_BUS_CAPACITY),
		))
	}
}

/// Looks up the configuration block for a section's primary implementation.
fn section_config<'a>(
	section: &str,
	primary: &str,
	implementations: &'a HashMap<String, toml::Value>,
) -> Result<&'a toml::Value, EngineError> {
	implementations.get(primary).ok_or_else(|| {
		EngineError::Config(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		))
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	const MOCK_CONFIG: &str = r#"
[intake]
id = "builder-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[auth]
primary = "static_token"
[auth.implementations.static_token]
token = "test-token"
tier = "trial"

[gateway]
primary = "mock"
[gateway.implementations.mock]

[submission]
primary = "mock"
[submission.implementations.mock]

[speech]
primary = "scripted"
[speech.implementations.scripted]
phrases = ["CT chest"]
"#;

	#[tokio::test]
	async fn test_builds_an_engine_from_registered_implementations() {
		let config: Config = MOCK_CONFIG.parse().unwrap();
		let engine = IntakeBuilder::new(config).build().await.unwrap();

		let session = engine.create_session().await.unwrap();
		// Trial tier grants the default credit budget.
		assert_eq!(session.remaining_credits, Some(10));
	}

	#[tokio::test]
	async fn test_unknown_gateway_implementation_fails_the_build() {
		let config: Config = MOCK_CONFIG
			.replace("primary = \"mock\"\n[gateway.implementations.mock]",
				"primary = \"grpc\"\n[gateway.implementations.grpc]")
			.parse()
			.unwrap();

		let result = IntakeBuilder::new(config).build().await;
		assert!(matches!(result, Err(EngineError::Config(msg)) if msg.contains("grpc")));
	}
}
