//! API types for the intake HTTP surface and the validation gateway wire.
//!
//! This module defines the request/response shapes exchanged with the
//! validation gateway, the single normalization boundary that maps the
//! gateway's loosely-typed envelope into the internal `ValidationResult`,
//! and the structured error type returned by the intake HTTP API.

use crate::verdict::{CodeSuggestion, CodeType, ValidationResult, ValidationStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gateway verdict string that maps to the internal `Valid` status.
/// Every other verdict string maps to `Invalid`.
const APPROPRIATE_VERDICT: &str = "appropriate";

/// Request body for `POST /api/orders/validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
	/// The dictation text to validate.
	pub dictation_text: String,
	/// Set on every retry after a non-valid verdict and on explicit overrides.
	pub is_override_validation: bool,
	/// Physician justification, present only on explicit overrides.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub override_justification: Option<String>,
}

/// One raw code suggestion as the gateway ships it.
///
/// `confidence` and `isPrimary` are frequently omitted by older gateway
/// versions; normalization fills them in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCodeSuggestion {
	pub code: String,
	#[serde(default)]
	pub description: String,
	pub confidence: Option<f64>,
	pub is_primary: Option<bool>,
}

/// The gateway's raw validation result, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawValidationResult {
	/// Raw verdict string; "appropriate" means valid, anything else invalid.
	pub validation_status: String,
	/// Feedback text for the clinician.
	#[serde(default)]
	pub feedback: String,
	/// Optional compliance score.
	pub compliance_score: Option<f64>,
	/// Suggested ICD-10 diagnosis codes, in gateway order.
	#[serde(rename = "suggestedICD10Codes")]
	pub suggested_icd10_codes: Option<Vec<RawCodeSuggestion>>,
	/// Suggested CPT procedure codes, in gateway order.
	#[serde(rename = "suggestedCPTCodes")]
	pub suggested_cpt_codes: Option<Vec<RawCodeSuggestion>>,
}

/// Response envelope for the validation endpoints.
///
/// Current gateways wrap the result in a `validationResult` key; older ones
/// return the result object at the top level. `extract_raw_result` handles
/// both shapes so no other code needs to know the difference.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEnvelope {
	pub validation_result: Option<RawValidationResult>,
}

/// Extracts the raw result from a gateway response body.
///
/// Tries the enveloped shape first and falls back to treating the top-level
/// object as the result directly. A body matching neither shape is a parse
/// failure the caller maps into its error taxonomy.
pub fn extract_raw_result(body: serde_json::Value) -> Result<RawValidationResult, serde_json::Error> {
	if let Ok(GatewayEnvelope {
		validation_result: Some(raw),
	}) = serde_json::from_value::<GatewayEnvelope>(body.clone())
	{
		return Ok(raw);
	}
	serde_json::from_value(body)
}

impl RawValidationResult {
	/// Normalizes the raw gateway result into the internal verdict shape.
	///
	/// Mapping table:
	/// - `validationStatus == "appropriate"` (case-insensitive) => `Valid`;
	///   any other string => `Invalid`.
	/// - ICD-10 suggestions precede CPT suggestions in the merged sequence;
	///   each group keeps its response order.
	/// - Missing `confidence` defaults to 1.0; values are clamped to [0, 1].
	/// - When no ICD-10 entry carries `isPrimary`, the first ICD-10 entry
	///   becomes the primary diagnosis.
	pub fn normalize(self) -> ValidationResult {
		let status = if self.validation_status.eq_ignore_ascii_case(APPROPRIATE_VERDICT) {
			ValidationStatus::Valid
		} else {
			ValidationStatus::Invalid
		};

		let icd10 = self.suggested_icd10_codes.unwrap_or_default();
		let has_primary_flag = icd10.iter().any(|c| c.is_primary == Some(true));

		let mut suggested_codes = Vec::with_capacity(icd10.len());
		for (index, raw) in icd10.into_iter().enumerate() {
			let is_primary = match raw.is_primary {
				Some(flag) => flag,
				None => !has_primary_flag && index == 0,
			};
			suggested_codes.push(normalize_code(raw, CodeType::Icd10, is_primary));
		}
		for raw in self.suggested_cpt_codes.unwrap_or_default() {
			let is_primary = raw.is_primary.unwrap_or(false);
			suggested_codes.push(normalize_code(raw, CodeType::Cpt, is_primary));
		}

		ValidationResult {
			status,
			feedback: self.feedback,
			compliance_score: self.compliance_score,
			suggested_codes,
			overridden: false,
			override_justification: None,
		}
	}
}

fn normalize_code(raw: RawCodeSuggestion, code_type: CodeType, is_primary: bool) -> CodeSuggestion {
	CodeSuggestion {
		code: raw.code,
		description: raw.description,
		code_type,
		confidence: raw.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
		is_primary,
	}
}

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code.
	pub error: String,
	/// Human-readable description.
	pub message: String,
	/// Additional error context.
	pub details: Option<serde_json::Value>,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Bad request with validation errors (400).
	BadRequest {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Resource not found (404).
	NotFound { error_type: String, message: String },
	/// Conflict with the current workflow state (409).
	Conflict { error_type: String, message: String },
	/// Unprocessable entity for business logic failures (422).
	UnprocessableEntity {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Internal server error (500).
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::UnprocessableEntity { .. } => 422,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		match self {
			APIError::BadRequest {
				error_type,
				message,
				details,
			}
			| APIError::UnprocessableEntity {
				error_type,
				message,
				details,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: details.clone(),
			},
			APIError::NotFound {
				error_type,
				message,
			}
			| APIError::Conflict {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: None,
			},
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let response = self.to_error_response();
		write!(f, "{}: {}", response.error, response.message)
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_enveloped_response_is_extracted() {
		let body = json!({
			"validationResult": {
				"validationStatus": "appropriate",
				"feedback": "order is appropriate",
				"complianceScore": 8.5,
				"suggestedICD10Codes": [
					{"code": "C50.911", "description": "Malignant neoplasm of breast"}
				],
				"suggestedCPTCodes": [
					{"code": "74178", "description": "CT abd/pelvis with contrast"}
				]
			}
		});

		let result = extract_raw_result(body).unwrap().normalize();
		assert_eq!(result.status, ValidationStatus::Valid);
		assert_eq!(result.compliance_score, Some(8.5));
		assert_eq!(result.suggested_codes.len(), 2);
		assert_eq!(result.suggested_codes[0].code_type, CodeType::Icd10);
		assert!(result.suggested_codes[0].is_primary);
		assert_eq!(result.suggested_codes[1].code_type, CodeType::Cpt);
	}

	#[test]
	fn test_bare_response_falls_back_to_top_level() {
		let body = json!({
			"validationStatus": "inappropriate",
			"feedback": "insufficient clinical detail"
		});

		let result = extract_raw_result(body).unwrap().normalize();
		assert_eq!(result.status, ValidationStatus::Invalid);
		assert_eq!(result.feedback, "insufficient clinical detail");
		assert!(result.suggested_codes.is_empty());
	}

	#[test]
	fn test_unknown_shape_is_a_parse_error() {
		let body = json!({"message": "totally unrelated payload"});
		assert!(extract_raw_result(body).is_err());
	}

	#[test]
	fn test_unknown_verdict_strings_map_to_invalid() {
		for verdict in ["needs_review", "INAPPROPRIATE", ""] {
			let body = json!({"validationStatus": verdict, "feedback": "x"});
			let result = extract_raw_result(body).unwrap().normalize();
			assert_eq!(result.status, ValidationStatus::Invalid, "verdict {verdict:?}");
		}
		let body = json!({"validationStatus": "Appropriate", "feedback": "x"});
		let result = extract_raw_result(body).unwrap().normalize();
		assert_eq!(result.status, ValidationStatus::Valid);
	}

	#[test]
	fn test_code_ordering_survives_normalization() {
		let body = json!({
			"validationStatus": "appropriate",
			"feedback": "",
			"suggestedICD10Codes": [
				{"code": "S83.511", "description": "Sprain of ACL", "isPrimary": false},
				{"code": "M25.561", "description": "Pain in right knee", "isPrimary": true},
				{"code": "Z98.890", "description": "Other specified postprocedural states"}
			],
			"suggestedCPTCodes": [
				{"code": "73721", "description": "MRI knee without contrast", "confidence": 0.9}
			]
		});

		let result = extract_raw_result(body).unwrap().normalize();
		let codes: Vec<&str> = result.suggested_codes.iter().map(|c| c.code.as_str()).collect();
		assert_eq!(codes, vec!["S83.511", "M25.561", "Z98.890", "73721"]);
		// Explicit isPrimary flags win over the first-entry default.
		assert!(!result.suggested_codes[0].is_primary);
		assert!(result.suggested_codes[1].is_primary);
		assert_eq!(result.suggested_codes[3].confidence, 0.9);
	}

	#[test]
	fn test_confidence_is_clamped_and_defaulted() {
		let body = json!({
			"validationStatus": "appropriate",
			"suggestedICD10Codes": [
				{"code": "A", "confidence": 1.7},
				{"code": "B", "confidence": -0.2},
				{"code": "C"}
			]
		});

		let result = extract_raw_result(body).unwrap().normalize();
		let confidences: Vec<f64> = result.suggested_codes.iter().map(|c| c.confidence).collect();
		assert_eq!(confidences, vec![1.0, 0.0, 1.0]);
	}

	#[test]
	fn test_request_serializes_with_camel_case_keys() {
		let request = GatewayRequest {
			dictation_text: "knee pain".into(),
			is_override_validation: true,
			override_justification: None,
		};
		let value = serde_json::to_value(&request).unwrap();
		assert_eq!(value["dictationText"], "knee pain");
		assert_eq!(value["isOverrideValidation"], true);
		assert!(value.get("overrideJustification").is_none());
	}
}
