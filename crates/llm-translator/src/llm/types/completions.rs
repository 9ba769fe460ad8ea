//! Canonical OpenAI-compatible chat completion and legacy completion types.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::TokenUsage;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	System,
	Developer,
	#[default]
	User,
	Assistant,
	Tool,
	Function,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
	#[serde(default)]
	pub model: String,
	pub messages: Vec<RequestMessage>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stream_options: Option<StreamOptions>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_completion_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	/// Not part of the OpenAI API; honored by backends that support it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_k: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub n: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop: Option<Stop>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub seed: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub presence_penalty: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frequency_penalty: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoiceOption>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reasoning_effort: Option<ReasoningEffort>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response_format: Option<Value>,

	// Everything else - passthrough
	#[serde(flatten, default)]
	pub rest: Map<String, Value>,
}

impl Request {
	pub fn is_streaming(&self) -> bool {
		self.stream.unwrap_or_default()
	}

	pub fn include_usage(&self) -> bool {
		self
			.stream_options
			.as_ref()
			.and_then(|o| o.include_usage)
			.unwrap_or_default()
	}

	/// `max_completion_tokens` supersedes the deprecated `max_tokens`.
	pub fn max_tokens(&self) -> Option<u32> {
		self.max_completion_tokens.or(self.max_tokens)
	}

	pub fn stop_sequences(&self) -> Vec<String> {
		match &self.stop {
			Some(Stop::String(s)) => vec![s.clone()],
			Some(Stop::StringArray(v)) => v.clone(),
			None => Vec::new(),
		}
	}

	/// System and developer messages, joined by newlines.
	pub fn system_prompt(&self) -> Option<String> {
		let text = self
			.messages
			.iter()
			.filter(|m| m.is_system())
			.filter_map(RequestMessage::text)
			.join("\n");
		if text.is_empty() { None } else { Some(text) }
	}

	/// Named `vendor` fields that are not part of the typed request.
	pub fn vendor_field(&self, name: &str) -> Option<&Value> {
		self.rest.get(name)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamOptions {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub include_usage: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Stop {
	String(String),
	StringArray(Vec<String>),
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
	None,
	Minimal,
	Low,
	Medium,
	High,
	Xhigh,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMessage {
	pub role: Role,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<Content>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<MessageToolCall>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_call_id: Option<String>,
}

impl RequestMessage {
	pub fn is_system(&self) -> bool {
		matches!(self.role, Role::System | Role::Developer)
	}

	/// The text of the message. Text parts are concatenated; other parts are ignored.
	pub fn text(&self) -> Option<String> {
		match self.content.as_ref()? {
			Content::Text(t) => Some(t.clone()),
			Content::Parts(parts) => {
				let text = parts
					.iter()
					.filter_map(|p| match p {
						ContentPart::Text { text } => Some(text.as_str()),
						_ => None,
					})
					.collect::<String>();
				Some(text)
			},
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
	Text(String),
	Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
	Text { text: String },
	ImageUrl { image_url: ImageUrl },
	InputAudio { input_audio: Value },
	File { file: Value },
	Refusal { refusal: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
}

impl ImageUrl {
	/// Splits a `data:<mime>;base64,<data>` URL into its media type and payload.
	pub fn as_data_url(&self) -> Option<(&str, &str)> {
		let rest = self.url.strip_prefix("data:")?;
		let (meta, data) = rest.split_once(',')?;
		let mime = meta.strip_suffix(";base64")?;
		Some((mime, data))
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
	Function {
		function: FunctionObject,
	},
	#[serde(other)]
	Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionObject {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parameters: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub strict: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ToolChoiceOption {
	Mode(ToolChoiceMode),
	Named(NamedToolChoice),
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
	None,
	Auto,
	Required,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedToolChoice {
	pub function: FunctionName,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionName {
	pub name: String,
}

#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
	#[default]
	Function,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageToolCall {
	pub id: String,
	#[serde(rename = "type", default)]
	pub kind: ToolType,
	pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
	pub name: String,
	/// JSON encoded arguments.
	pub arguments: String,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
	Stop,
	Length,
	ToolCalls,
	ContentFilter,
	FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	pub id: String,
	pub object: String,
	pub created: u32,
	pub model: String,
	pub choices: Vec<ChatChoice>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub system_fingerprint: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub service_tier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
	pub index: u32,
	pub message: ResponseMessage,
	pub finish_reason: Option<FinishReason>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub logprobs: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMessage {
	pub role: Role,
	#[serde(default)]
	pub content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<MessageToolCall>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reasoning_content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refusal: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
	#[serde(default)]
	pub prompt_tokens: u32,
	#[serde(default)]
	pub completion_tokens: u32,
	#[serde(default)]
	pub total_tokens: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prompt_tokens_details: Option<PromptTokensDetails>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptTokensDetails {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cached_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_creation_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub audio_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionTokensDetails {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reasoning_tokens: Option<u32>,
}

impl Usage {
	pub fn to_token_usage(&self) -> TokenUsage {
		TokenUsage::from_openai(
			self.prompt_tokens,
			self.completion_tokens,
			self
				.prompt_tokens_details
				.as_ref()
				.and_then(|d| d.cached_tokens),
		)
	}

	/// Renders accounted usage in the canonical shape. Cached input is only reported when the
	/// provider reported cache activity.
	pub fn from_token_usage(u: &TokenUsage) -> Self {
		let cached = u.cached_input_tokens().filter(|c| *c > 0);
		let creation = u.cache_creation_input_tokens().filter(|c| *c > 0);
		let details = (cached.is_some() || creation.is_some()).then(|| PromptTokensDetails {
			cached_tokens: cached,
			cache_creation_tokens: creation,
			audio_tokens: None,
		});
		Usage {
			prompt_tokens: u.input_tokens().unwrap_or_default(),
			completion_tokens: u.output_tokens().unwrap_or_default(),
			total_tokens: u.total_tokens().unwrap_or_default(),
			prompt_tokens_details: details,
			completion_tokens_details: None,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamResponse {
	pub id: String,
	pub object: String,
	pub created: u32,
	pub model: String,
	pub choices: Vec<ChatChoiceStream>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub system_fingerprint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChoiceStream {
	pub index: u32,
	pub delta: StreamResponseDelta,
	#[serde(default)]
	pub finish_reason: Option<FinishReason>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub logprobs: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamResponseDelta {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<Role>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCallChunk>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reasoning_content: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refusal: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallChunk {
	pub index: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
	pub kind: Option<ToolType>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function: Option<FunctionCallStream>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCallStream {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arguments: Option<String>,
}

/// The subset of any OpenAI-family response (full or chunk) needed for accounting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageEnvelope {
	#[serde(default)]
	pub id: Option<String>,
	#[serde(default)]
	pub model: Option<String>,
	#[serde(default)]
	pub usage: Option<Usage>,
}

/// Legacy `/v1/completions` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
	#[serde(default)]
	pub model: String,
	pub prompt: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stream_options: Option<StreamOptions>,
	#[serde(flatten, default)]
	pub rest: Map<String, Value>,
}

pub(crate) fn unix_now() -> u32 {
	chrono::Utc::now().timestamp() as u32
}
