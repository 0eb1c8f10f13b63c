//! Clinical validation verdict types.
//!
//! This module defines the normalized verdict returned by the validation
//! gateway, the coded suggestions attached to it, and the per-round-trip
//! attempt record kept by the workflow session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized appropriateness verdict for a dictation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ValidationStatus {
	/// The gateway judged the dictation appropriate, or an override forced
	/// local acceptance.
	Valid,
	/// The gateway judged the dictation inappropriate or incomplete.
	Invalid,
}

impl fmt::Display for ValidationStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ValidationStatus::Valid => write!(f, "valid"),
			ValidationStatus::Invalid => write!(f, "invalid"),
		}
	}
}

/// Coding standard a suggested code belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CodeType {
	/// ICD-10 diagnosis code.
	#[serde(rename = "ICD-10")]
	Icd10,
	/// CPT procedure code.
	#[serde(rename = "CPT")]
	Cpt,
}

impl fmt::Display for CodeType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CodeType::Icd10 => write!(f, "ICD-10"),
			CodeType::Cpt => write!(f, "CPT"),
		}
	}
}

/// One coded entity suggested by the gateway.
///
/// Suggestions belong to exactly one `ValidationResult` and their order is
/// significant: the first ICD-10 entry is the primary diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeSuggestion {
	/// The code itself (e.g. "C50.911" or "74178").
	pub code: String,
	/// Human-readable description of the code.
	pub description: String,
	/// Which coding standard the code belongs to.
	pub code_type: CodeType,
	/// Gateway confidence in the suggestion, clamped to [0, 1].
	pub confidence: f64,
	/// Whether this entry is the primary diagnosis/procedure.
	pub is_primary: bool,
}

/// Normalized verdict for one dictation, as consumed by the workflow.
///
/// Invariant: `overridden == true` implies `status == Valid`. An override is
/// a local decision to proceed; it never changes the server-side verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
	/// The appropriateness verdict.
	pub status: ValidationStatus,
	/// Feedback text surfaced verbatim to the clinician.
	pub feedback: String,
	/// Optional compliance score reported by the gateway.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub compliance_score: Option<f64>,
	/// Suggested codes in gateway order, ICD-10 entries first.
	pub suggested_codes: Vec<CodeSuggestion>,
	/// Whether this result was produced by a physician override.
	pub overridden: bool,
	/// Mandatory justification when `overridden` is set.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub override_justification: Option<String>,
}

impl ValidationResult {
	/// Creates an `Invalid` verdict carrying only feedback.
	pub fn invalid(feedback: impl Into<String>) -> Self {
		Self {
			status: ValidationStatus::Invalid,
			feedback: feedback.into(),
			compliance_score: None,
			suggested_codes: Vec::new(),
			overridden: false,
			override_justification: None,
		}
	}

	/// Converts a (possibly still invalid) result into an overridden one.
	///
	/// The status is forced to `Valid` regardless of the gateway verdict and
	/// the physician's justification is attached. This mirrors the intake
	/// policy that an override is a local attestation, not a re-validation.
	pub fn into_overridden(mut self, justification: impl Into<String>) -> Self {
		self.status = ValidationStatus::Valid;
		self.overridden = true;
		self.override_justification = Some(justification.into());
		self
	}

	/// The primary diagnosis: the first ICD-10 entry, when present.
	pub fn primary_diagnosis(&self) -> Option<&CodeSuggestion> {
		self.suggested_codes
			.iter()
			.find(|c| c.code_type == CodeType::Icd10)
	}

	/// All ICD-10 entries after the primary, in gateway order.
	pub fn secondary_diagnoses(&self) -> Vec<&CodeSuggestion> {
		self.suggested_codes
			.iter()
			.filter(|c| c.code_type == CodeType::Icd10)
			.skip(1)
			.collect()
	}
}

/// One round-trip to the validation gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationAttempt {
	/// The dictation text exactly as sent to the gateway.
	pub dictation_snapshot: String,
	/// 0-based attempt number at the time of the call. Strictly increasing
	/// within one session; reset only with the whole session.
	pub attempt_number: u32,
	/// Whether this call was flagged as an override validation
	/// (any retry after a non-valid verdict, or an explicit override).
	pub is_override: bool,
	/// The normalized verdict, or `None` when the call failed before a
	/// verdict was produced (transport-class failures).
	pub result: Option<ValidationResult>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn code(code: &str, code_type: CodeType, is_primary: bool) -> CodeSuggestion {
		CodeSuggestion {
			code: code.into(),
			description: String::new(),
			code_type,
			confidence: 1.0,
			is_primary,
		}
	}

	#[test]
	fn test_override_forces_valid_status() {
		let result = ValidationResult::invalid("still not appropriate")
			.into_overridden("clinical judgment, trauma confirmed on exam");
		assert_eq!(result.status, ValidationStatus::Valid);
		assert!(result.overridden);
		assert_eq!(
			result.override_justification.as_deref(),
			Some("clinical judgment, trauma confirmed on exam")
		);
	}

	#[test]
	fn test_primary_diagnosis_is_first_icd10() {
		let mut result = ValidationResult::invalid("");
		result.suggested_codes = vec![
			code("C50.911", CodeType::Icd10, true),
			code("Z12.31", CodeType::Icd10, false),
			code("74178", CodeType::Cpt, false),
		];
		assert_eq!(result.primary_diagnosis().unwrap().code, "C50.911");
		let secondary = result.secondary_diagnoses();
		assert_eq!(secondary.len(), 1);
		assert_eq!(secondary[0].code, "Z12.31");
	}
}
