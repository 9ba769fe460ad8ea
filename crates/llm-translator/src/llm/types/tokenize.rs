use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::AIError;
use crate::llm::types::completions::{RequestMessage, Tool};
use crate::serdes::is_default;
use crate::strng;

/// Tokenize a raw prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
	#[serde(default)]
	pub model: String,
	pub prompt: String,
	#[serde(default, skip_serializing_if = "is_default")]
	pub add_special_tokens: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub return_token_strs: Option<bool>,
	#[serde(flatten, default)]
	pub rest: Map<String, Value>,
}

/// Tokenize a conversation, as it would be rendered by the chat template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
	#[serde(default)]
	pub model: String,
	pub messages: Vec<RequestMessage>,
	#[serde(default, skip_serializing_if = "is_default")]
	pub add_generation_prompt: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub return_token_strs: Option<bool>,
	#[serde(default, skip_serializing_if = "is_default")]
	pub continue_final_message: bool,
	#[serde(default, skip_serializing_if = "is_default")]
	pub add_special_tokens: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub chat_template: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
	#[serde(flatten, default)]
	pub rest: Map<String, Value>,
}

impl ChatRequest {
	pub fn validate(&self) -> Result<(), AIError> {
		if self.continue_final_message && self.add_generation_prompt {
			return Err(AIError::InvalidRequest(strng::literal!(
				"cannot set both continue_final_message and add_generation_prompt to true"
			)));
		}
		Ok(())
	}
}

/// A tokenize request is exactly one of the chat or completion shapes.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Request {
	Chat(ChatRequest),
	Completion(CompletionRequest),
}

impl Request {
	/// Classifies a raw body by the fields it carries, rejecting bodies that carry both shapes
	/// or neither.
	pub fn parse(raw: &[u8]) -> Result<Self, AIError> {
		let value: Value = serde_json::from_slice(raw).map_err(AIError::RequestParsing)?;
		let Some(obj) = value.as_object() else {
			return Err(AIError::InvalidRequest(strng::literal!(
				"tokenize request must be a JSON object"
			)));
		};
		let req = match (obj.contains_key("messages"), obj.contains_key("prompt")) {
			(true, true) => {
				return Err(AIError::InvalidRequest(strng::literal!(
					"only one request type can be set"
				)));
			},
			(false, false) => {
				return Err(AIError::InvalidRequest(strng::literal!(
					"one request type must be set"
				)));
			},
			(true, false) => Request::Chat(serde_json::from_value(value).map_err(AIError::RequestParsing)?),
			(false, true) => {
				Request::Completion(serde_json::from_value(value).map_err(AIError::RequestParsing)?)
			},
		};
		req.validate()?;
		Ok(req)
	}

	pub fn validate(&self) -> Result<(), AIError> {
		match self {
			Request::Chat(c) => c.validate(),
			Request::Completion(_) => Ok(()),
		}
	}

	pub fn model(&self) -> &str {
		match self {
			Request::Chat(c) => &c.model,
			Request::Completion(c) => &c.model,
		}
	}

	pub fn as_chat(&self) -> Option<&ChatRequest> {
		match self {
			Request::Chat(c) => Some(c),
			Request::Completion(_) => None,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
	pub count: u32,
	#[serde(default)]
	pub max_model_len: u32,
	#[serde(default)]
	pub tokens: Vec<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_strs: Option<Vec<String>>,
}

impl Response {
	/// A response carrying only a count, for providers that do not return token ids.
	pub fn count_only(count: u32) -> Self {
		Response {
			count,
			..Default::default()
		}
	}
}

/// Converts token ids back into text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetokenizeRequest {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	pub tokens: Vec<i64>,
	#[serde(flatten, default)]
	pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetokenizeResponse {
	pub prompt: String,
	#[serde(flatten, default)]
	pub rest: Map<String, Value>,
}

/// The tokenizer configuration, as found in `tokenizer_config.json`. Only the class is typed;
/// every other setting is kept in `rest`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenizerInfoResponse {
	#[serde(default)]
	pub tokenizer_class: String,
	#[serde(flatten, default)]
	pub rest: Map<String, Value>,
}
