//! Registry trait for self-registering implementations.
//!
//! This module provides the base trait that all intake implementations must
//! implement to register themselves with their configuration name and
//! factory function.

/// Base trait for implementation registries.
///
/// Each pluggable module (storage, gateway, auth, speech, submission) must
/// provide a Registry struct that implements this trait, declaring its
/// configuration name and factory function.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	///
	/// This should match the key used in the TOML configuration, for example:
	/// - "http" for gateway.implementations.http
	/// - "memory" for storage.implementations.memory
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
