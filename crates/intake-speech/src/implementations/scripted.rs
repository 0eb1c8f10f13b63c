//! Scripted speech implementation for testing and development.
//!
//! Emits a configured sequence of finalized phrases on a fixed cadence,
//! re-arming itself after each phrase the way a real continuous recognizer
//! restarts after committing a result. Used where no live speech provider is
//! available; the workflow engine cannot tell the difference.

use crate::{FinalizedPhrase, SpeechError, SpeechFactory, SpeechInterface, SpeechProviderRegistry};
use async_trait::async_trait;
use intake_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted speech listener.
pub struct ScriptedSpeech {
	/// Phrases emitted in order once listening starts.
	phrases: Vec<String>,
	/// Delay between emitted phrases.
	interval: Duration,
	/// Listener-active flag; cleared synchronously on stop.
	running: Arc<AtomicBool>,
}

impl ScriptedSpeech {
	/// Creates a scripted listener emitting the given phrases.
	pub fn new(phrases: Vec<String>, interval: Duration) -> Self {
		Self {
			phrases,
			interval,
			running: Arc::new(AtomicBool::new(false)),
		}
	}
}

#[async_trait]
impl SpeechInterface for ScriptedSpeech {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(ScriptedSpeechSchema)
	}

	async fn start_listening(
		&self,
		sender: tokio::sync::mpsc::UnboundedSender<FinalizedPhrase>,
	) -> Result<(), SpeechError> {
		if self.running.swap(true, Ordering::SeqCst) {
			return Err(SpeechError::AlreadyListening);
		}

		let running = self.running.clone();
		let phrases = self.phrases.clone();
		let interval = self.interval;

		tokio::spawn(async move {
			for phrase in phrases {
				tokio::time::sleep(interval).await;

				// Stop discards the phrase still being "recognized"; phrases
				// already sent through the channel are unaffected.
				if !running.load(Ordering::SeqCst) {
					break;
				}
				if sender
					.send(FinalizedPhrase {
						text: phrase,
						confidence: Some(1.0),
					})
					.is_err()
				{
					break;
				}
				// Listener re-arms here for the next phrase.
			}
			running.store(false, Ordering::SeqCst);
			tracing::debug!(component = "speech", "Scripted listener finished");
		});

		Ok(())
	}

	async fn stop_listening(&self) -> Result<(), SpeechError> {
		self.running.store(false, Ordering::SeqCst);
		Ok(())
	}
}

/// Configuration schema for ScriptedSpeech.
pub struct ScriptedSpeechSchema;

impl ConfigSchema for ScriptedSpeechSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("phrases", FieldType::Array(Box::new(FieldType::String))),
				Field::new(
					"interval_ms",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Registry for the scripted speech implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "scripted";
	type Factory = SpeechFactory;

	fn factory() -> Self::Factory {
		create_speech
	}
}

impl SpeechProviderRegistry for Registry {}

/// Factory function to create a scripted speech listener from configuration.
///
/// Configuration parameters:
/// - `phrases`: Phrases to emit, in order (default: empty)
/// - `interval_ms`: Delay between phrases in milliseconds (default: 250)
pub fn create_speech(config: &toml::Value) -> Result<Box<dyn SpeechInterface>, SpeechError> {
	let phrases = config
		.get("phrases")
		.and_then(|v| v.as_array())
		.map(|arr| {
			arr.iter()
				.filter_map(|v| v.as_str().map(str::to_string))
				.collect()
		})
		.unwrap_or_default();

	let interval_ms = config
		.get("interval_ms")
		.and_then(|v| v.as_integer())
		.unwrap_or(250) as u64;

	Ok(Box::new(ScriptedSpeech::new(
		phrases,
		Duration::from_millis(interval_ms),
	)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::sync::mpsc;

	#[tokio::test]
	async fn test_emits_phrases_in_order_then_finishes() {
		let speech = ScriptedSpeech::new(
			vec!["CT chest".into(), "with contrast".into()],
			Duration::from_millis(1),
		);
		let (tx, mut rx) = mpsc::unbounded_channel();
		speech.start_listening(tx).await.unwrap();

		assert_eq!(rx.recv().await.unwrap().text, "CT chest");
		assert_eq!(rx.recv().await.unwrap().text, "with contrast");
		assert!(rx.recv().await.is_none());
	}

	#[tokio::test]
	async fn test_double_start_is_rejected() {
		let speech = ScriptedSpeech::new(vec!["a".into()], Duration::from_millis(50));
		let (tx, _rx) = mpsc::unbounded_channel();
		speech.start_listening(tx.clone()).await.unwrap();
		assert!(matches!(
			speech.start_listening(tx).await,
			Err(SpeechError::AlreadyListening)
		));
	}

	#[tokio::test]
	async fn test_stop_discards_pending_phrases() {
		let speech = ScriptedSpeech::new(
			vec!["first".into(), "second".into()],
			Duration::from_millis(20),
		);
		let (tx, mut rx) = mpsc::unbounded_channel();
		speech.start_listening(tx).await.unwrap();

		assert_eq!(rx.recv().await.unwrap().text, "first");
		speech.stop_listening().await.unwrap();
		assert!(rx.recv().await.is_none());
	}
}
