//! Speech-to-text capability module for the RadOrder intake system.
//!
//! This module abstracts the continuous dictation capability behind a small
//! interface: a listener is started with a channel, emits only *finalized*
//! phrases, restarts itself after each phrase, and stops synchronously when
//! asked. The workflow engine consumes finalized phrases and appends them to
//! the dictation draft; it never depends on a concrete speech provider.

use async_trait::async_trait;
use intake_types::{ConfigSchema, ImplementationRegistry};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Re-export implementations
pub mod implementations {
	pub mod scripted;
}

/// Errors that can occur during speech capture operations.
#[derive(Debug, Error)]
pub enum SpeechError {
	/// Error that occurs when the capture device/provider fails to start.
	#[error("Capture error: {0}")]
	Capture(String),
	/// Error that occurs when starting an already listening capability.
	#[error("Already listening")]
	AlreadyListening,
}

/// A finalized phrase emitted by a speech listener.
///
/// Interim/partial phrases never cross this boundary: a listener only emits
/// text it has committed to, so stopping discards at most an in-flight
/// partial, never a finalized phrase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedPhrase {
	/// The recognized text.
	pub text: String,
	/// Recognition confidence in [0, 1], when the provider reports one.
	pub confidence: Option<f64>,
}

/// Trait defining the interface for speech capture implementations.
///
/// Implementations run as independent, cancelable background listeners.
/// After emitting a finalized phrase the listener restarts itself; it keeps
/// listening until `stop_listening` is called. Stopping is synchronous from
/// the caller's perspective: it sets a flag and tears down the listener.
#[async_trait]
pub trait SpeechInterface: Send + Sync {
	/// Returns the configuration schema for this speech implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Starts the background listener.
	///
	/// Finalized phrases are sent through the provided channel until the
	/// listener is stopped.
	async fn start_listening(
		&self,
		sender: mpsc::UnboundedSender<FinalizedPhrase>,
	) -> Result<(), SpeechError>;

	/// Stops the background listener.
	///
	/// Any interim phrase in flight is discarded; finalized phrases already
	/// emitted are not affected.
	async fn stop_listening(&self) -> Result<(), SpeechError>;
}

/// Type alias for speech factory functions.
pub type SpeechFactory = fn(&toml::Value) -> Result<Box<dyn SpeechInterface>, SpeechError>;

/// Registry trait for speech implementations.
pub trait SpeechProviderRegistry: ImplementationRegistry<Factory = SpeechFactory> {}

/// Get all registered speech implementations.
pub fn get_all_implementations() -> Vec<(&'static str, SpeechFactory)> {
	use implementations::scripted;

	vec![(scripted::Registry::NAME, scripted::Registry::factory())]
}

/// Service that manages the configured speech capability.
pub struct SpeechService {
	/// The underlying speech implementation.
	implementation: Box<dyn SpeechInterface>,
}

impl SpeechService {
	/// Creates a new SpeechService with the specified implementation.
	pub fn new(implementation: Box<dyn SpeechInterface>) -> Self {
		Self { implementation }
	}

	/// Starts the background listener.
	pub async fn start(
		&self,
		sender: mpsc::UnboundedSender<FinalizedPhrase>,
	) -> Result<(), SpeechError> {
		self.implementation.start_listening(sender).await
	}

	/// Stops the background listener.
	pub async fn stop(&self) -> Result<(), SpeechError> {
		self.implementation.stop_listening().await
	}
}
