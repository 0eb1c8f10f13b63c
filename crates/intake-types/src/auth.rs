//! Resolved authentication context for the intake workflow.
//!
//! The workflow core never reaches into ambient storage for credentials.
//! The caller resolves the access token and user tier once, builds an
//! `AuthContext`, and injects it; a missing token short-circuits gateway
//! calls before any network request is attempted.

use crate::secret_string::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// User tier determining validation-call budgeting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
	/// Full-access physician account.
	Standard,
	/// Trial account with a capped number of validation calls and no
	/// order-submission capability.
	Trial,
}

impl fmt::Display for UserTier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			UserTier::Standard => write!(f, "standard"),
			UserTier::Trial => write!(f, "trial"),
		}
	}
}

/// Resolved credential and tier for one workflow session.
#[derive(Debug, Clone)]
pub struct AuthContext {
	token: Option<SecretString>,
	tier: UserTier,
}

impl AuthContext {
	/// Creates a context from a resolved token and tier.
	pub fn new(token: Option<SecretString>, tier: UserTier) -> Self {
		Self { token, tier }
	}

	/// The access token, when one was resolved.
	pub fn token(&self) -> Option<&SecretString> {
		self.token.as_ref()
	}

	/// The user tier.
	pub fn tier(&self) -> UserTier {
		self.tier
	}

	/// Whether this context belongs to a trial-tier user.
	pub fn is_trial(&self) -> bool {
		self.tier == UserTier::Trial
	}
}
