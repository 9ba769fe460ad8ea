use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::AIError;
use crate::llm::types::completions::RequestMessage;
use crate::strng;

#[derive(Debug, Serialize, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
	#[default]
	Float,
	Base64,
}

/// The input of an embedding request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EmbeddingInput {
	String(String),
	StringArray(Vec<String>),
	Tokens(Vec<u32>),
	TokenArrays(Vec<Vec<u32>>),
}

impl EmbeddingInput {
	/// The input as text, or `None` when the input is pre-tokenized.
	pub fn texts(&self) -> Option<Vec<&str>> {
		match self {
			EmbeddingInput::String(s) => Some(vec![s.as_str()]),
			EmbeddingInput::StringArray(v) => Some(v.iter().map(String::as_str).collect()),
			EmbeddingInput::Tokens(_) | EmbeddingInput::TokenArrays(_) => None,
		}
	}
}

/// An embedding request. Exactly one of `input` (the OpenAI shape) or `messages` (the chat
/// shape accepted by some serving stacks) is set; see [`Request::validate`].
#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct Request {
	#[serde(default)]
	pub model: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub input: Option<EmbeddingInput>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub messages: Option<Vec<RequestMessage>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub encoding_format: Option<EncodingFormat>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dimensions: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<String>,
	/// Vertex AI vendor field, e.g. `RETRIEVAL_DOCUMENT`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub task_type: Option<String>,

	// Everything else - passthrough
	#[serde(flatten, default)]
	pub rest: Map<String, Value>,
}

impl Request {
	pub fn validate(&self) -> Result<(), AIError> {
		match (&self.input, &self.messages) {
			(Some(_), Some(_)) => Err(AIError::InvalidRequest(strng::literal!(
				"embedding request must set exactly one of input or messages, got both"
			))),
			(None, None) => Err(AIError::InvalidRequest(strng::literal!(
				"embedding request must set one of input or messages"
			))),
			_ => Ok(()),
		}
	}
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Response {
	pub object: String,
	pub data: Vec<Embedding>,
	pub model: String,
	pub usage: Usage,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Embedding {
	pub object: String,
	pub index: u32,
	/// A float vector, or a base64 string when `encoding_format` is `base64`.
	pub embedding: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
	#[serde(default)]
	pub prompt_tokens: u32,
	#[serde(default)]
	pub total_tokens: u32,
}

/// The subset of an OpenAI embedding response needed for accounting.
#[derive(Debug, Deserialize, Default)]
pub struct UsageEnvelope {
	#[serde(default)]
	pub model: Option<String>,
	#[serde(default)]
	pub usage: Option<Usage>,
}
