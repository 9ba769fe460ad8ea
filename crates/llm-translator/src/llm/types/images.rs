use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::TokenUsage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	#[serde(default)]
	pub model: String,
	pub prompt: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub n: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub size: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response_format: Option<String>,

	#[serde(flatten, default)]
	pub rest: Map<String, Value>,
}

/// The parts of an image generation response the gateway reads. `gpt-image` models report
/// usage; DALL-E models do not.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Response {
	#[serde(default)]
	pub model: Option<String>,
	#[serde(default)]
	pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Usage {
	#[serde(default)]
	pub input_tokens: u32,
	#[serde(default)]
	pub output_tokens: u32,
	#[serde(default)]
	pub total_tokens: u32,
}

impl Usage {
	pub fn to_token_usage(&self) -> TokenUsage {
		TokenUsage::from_openai(self.input_tokens, self.output_tokens, None)
	}
}
