use std::io::Read;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

use crate::json;
use crate::llm::types::messages::typed::MessagesErrorResponse;
use crate::llm::types::{bedrock, gemini};
use crate::llm::{
	AIError, AMZN_ERROR_TYPE_HEADER, ErrorMutation, HeaderMutation, JSON_CONTENT_TYPE, header_str,
	is_json_content, read_body,
};

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

pub const AWS_BEDROCK_BACKEND_ERROR: &str = "AWSBedrockBackendError";
pub const AWS_INVOKE_MODEL_BACKEND_ERROR: &str = "AWSInvokeModelBackendError";
pub const GCP_ANTHROPIC_BACKEND_ERROR: &str = "GCPAnthropicBackendError";
pub const GCP_VERTEX_AI_BACKEND_ERROR: &str = "GCPVertexAIBackendError";
pub const OPENAI_BACKEND_ERROR: &str = "OpenAIBackendError";
pub const COHERE_BACKEND_ERROR: &str = "CohereBackendError";
pub const ANTHROPIC_BACKEND_ERROR: &str = "AnthropicBackendError";

/// The error envelope returned to canonical clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
	pub r#type: String,
	pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
	pub r#type: String,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
}

impl ErrorEnvelope {
	pub fn new(kind: impl Into<String>, message: impl Into<String>, status: StatusCode) -> Self {
		ErrorEnvelope {
			r#type: "error".to_string(),
			error: ErrorBody {
				r#type: kind.into(),
				message: message.into(),
				code: Some(status.as_u16().to_string()),
			},
		}
	}
}

// Anything with a non-empty `error.message` is already in the canonical shape.
#[derive(Deserialize)]
struct CanonicalProbe {
	error: CanonicalProbeBody,
}

#[derive(Deserialize)]
struct CanonicalProbeBody {
	message: String,
}

/// A provider error body shape the normalizer knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorShape {
	/// Already canonical; forwarded unchanged.
	Canonical,
	/// `{"message"|"Message": ..., "__type"?: ...}`, as returned by AWS services.
	AwsMessage,
	/// `{"type":"error","error":{"type","message"}}`
	Anthropic,
	/// `{"error":{"code","message","status"}}`
	Google,
}

enum Normalized {
	Unchanged,
	Mapped(ErrorEnvelope),
}

/// ErrorDialect describes how one backend reports errors: the shapes to try, in order, and the
/// type used when wrapping a body that matches none of them.
#[derive(Debug, Clone, Copy)]
pub struct ErrorDialect {
	pub shapes: &'static [ErrorShape],
	pub backend_type: &'static str,
}

pub const OPENAI: ErrorDialect = ErrorDialect {
	shapes: &[ErrorShape::Canonical],
	backend_type: OPENAI_BACKEND_ERROR,
};
pub const AWS_BEDROCK: ErrorDialect = ErrorDialect {
	shapes: &[ErrorShape::AwsMessage],
	backend_type: AWS_BEDROCK_BACKEND_ERROR,
};
pub const AWS_INVOKE_OPENAI: ErrorDialect = ErrorDialect {
	shapes: &[ErrorShape::Canonical, ErrorShape::AwsMessage],
	backend_type: AWS_BEDROCK_BACKEND_ERROR,
};
pub const AWS_ANTHROPIC: ErrorDialect = ErrorDialect {
	shapes: &[ErrorShape::Anthropic, ErrorShape::AwsMessage],
	backend_type: AWS_INVOKE_MODEL_BACKEND_ERROR,
};
pub const GCP_VERTEX_AI: ErrorDialect = ErrorDialect {
	shapes: &[ErrorShape::Google],
	backend_type: GCP_VERTEX_AI_BACKEND_ERROR,
};
pub const GCP_ANTHROPIC: ErrorDialect = ErrorDialect {
	shapes: &[ErrorShape::Anthropic, ErrorShape::Google],
	backend_type: GCP_ANTHROPIC_BACKEND_ERROR,
};
pub const ANTHROPIC: ErrorDialect = ErrorDialect {
	shapes: &[ErrorShape::Anthropic],
	backend_type: ANTHROPIC_BACKEND_ERROR,
};
pub const COHERE: ErrorDialect = ErrorDialect {
	shapes: &[ErrorShape::Canonical, ErrorShape::AwsMessage],
	backend_type: COHERE_BACKEND_ERROR,
};

impl ErrorDialect {
	/// Normalizes an upstream error into the canonical envelope.
	pub fn normalize(
		&self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &mut dyn Read,
	) -> Result<ErrorMutation, AIError> {
		let raw = read_body(body)?;
		tracing::trace!(%status, body=%String::from_utf8_lossy(&raw), "upstream error");
		let env = if is_json_content(headers) {
			match self.classify(status, headers, &raw) {
				Some(Normalized::Unchanged) => return Ok(error_mutation(Bytes::from(raw))),
				Some(Normalized::Mapped(env)) => env,
				None => self.wrap(status, &raw),
			}
		} else {
			self.wrap(status, &raw)
		};
		let body = json::to_bytes(&env).map_err(AIError::ResponseMarshal)?;
		Ok(error_mutation(body))
	}

	/// Normalizes an upstream error into the Anthropic error shape, for Messages clients.
	/// Anthropic-shaped bodies are forwarded unchanged.
	pub fn normalize_anthropic(
		&self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &mut dyn Read,
	) -> Result<ErrorMutation, AIError> {
		let raw = read_body(body)?;
		if is_json_content(headers)
			&& serde_json::from_slice::<MessagesErrorResponse>(&raw).is_ok_and(|e| !e.error.message.is_empty())
		{
			return Ok(error_mutation(Bytes::from(raw)));
		}
		let env = if is_json_content(headers) {
			match self.classify(status, headers, &raw) {
				Some(Normalized::Mapped(env)) => env,
				_ => self.wrap(status, &raw),
			}
		} else {
			self.wrap(status, &raw)
		};
		// The Anthropic shape has no code.
		let out = MessagesErrorResponse {
			r#type: env.r#type,
			error: crate::llm::types::messages::typed::MessagesError {
				r#type: env.error.r#type,
				message: env.error.message,
			},
		};
		let body = json::to_bytes(&out).map_err(AIError::ResponseMarshal)?;
		Ok(error_mutation(body))
	}

	fn classify(&self, status: StatusCode, headers: &HeaderMap, raw: &[u8]) -> Option<Normalized> {
		self.shapes.iter().find_map(|shape| match shape {
			ErrorShape::Canonical => serde_json::from_slice::<CanonicalProbe>(raw)
				.ok()
				.filter(|p| !p.error.message.is_empty())
				.map(|_| Normalized::Unchanged),
			ErrorShape::AwsMessage => {
				let e = serde_json::from_slice::<bedrock::ConverseErrorResponse>(raw).ok()?;
				if e.message.is_empty() {
					return None;
				}
				let kind = header_str(headers, AMZN_ERROR_TYPE_HEADER)
					.map(ToOwned::to_owned)
					.or(e.kind)
					.unwrap_or_else(|| self.backend_type.to_string());
				Some(Normalized::Mapped(ErrorEnvelope::new(kind, e.message, status)))
			},
			ErrorShape::Anthropic => {
				let e = serde_json::from_slice::<MessagesErrorResponse>(raw).ok()?;
				if e.error.message.is_empty() {
					return None;
				}
				Some(Normalized::Mapped(ErrorEnvelope::new(
					e.error.r#type,
					e.error.message,
					status,
				)))
			},
			ErrorShape::Google => {
				let e = serde_json::from_slice::<gemini::ErrorResponse>(raw).ok()?;
				let kind = e
					.error
					.status
					.filter(|s| !s.is_empty())
					.unwrap_or_else(|| self.backend_type.to_string());
				Some(Normalized::Mapped(ErrorEnvelope::new(
					kind,
					e.error.message,
					status,
				)))
			},
		})
	}

	fn wrap(&self, status: StatusCode, raw: &[u8]) -> ErrorEnvelope {
		ErrorEnvelope::new(self.backend_type, String::from_utf8_lossy(raw), status)
	}
}

fn error_mutation(body: Bytes) -> ErrorMutation {
	ErrorMutation {
		headers: vec![
			HeaderMutation::content_type(JSON_CONTENT_TYPE),
			HeaderMutation::content_length(body.len()),
		],
		body: Some(body),
	}
}
