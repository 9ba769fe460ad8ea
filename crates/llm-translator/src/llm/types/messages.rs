use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A native Anthropic Messages request, as received from the client.
///
/// Only the fields the gateway needs are typed; the rest of the body is forwarded untouched.
#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct Request {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	pub messages: Vec<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,

	#[serde(flatten, default)]
	pub rest: Map<String, Value>,
}

impl Request {
	pub fn is_streaming(&self) -> bool {
		self.stream.unwrap_or_default()
	}
}

// 'typed' provides a typed accessor
pub mod typed {
	use serde::{Deserialize, Deserializer, Serialize};
	use serde_json::Value;

	use crate::llm::TokenUsage;
	use crate::serdes::is_default;

	#[derive(Copy, Clone, Deserialize, Serialize, Debug, PartialEq, Eq, Default)]
	#[serde(rename_all = "snake_case")]
	pub enum Role {
		#[default]
		User,
		Assistant,
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	#[serde(rename_all = "snake_case", tag = "type")]
	pub enum ContentBlock {
		Text {
			text: String,
		},
		Image {
			source: ImageSource,
		},
		Thinking {
			thinking: String,
			#[serde(default)]
			signature: String,
		},
		RedactedThinking {
			data: String,
		},
		ToolUse {
			id: String,
			name: String,
			input: Value,
		},
		ToolResult {
			tool_use_id: String,
			content: ToolResultContent,
			#[serde(default, skip_serializing_if = "Option::is_none")]
			is_error: Option<bool>,
		},
		// Server tools, documents, search results... are not produced by conversions.
		#[serde(other)]
		Unknown,
	}

	impl ContentBlock {
		pub fn text(text: impl Into<String>) -> Self {
			ContentBlock::Text { text: text.into() }
		}
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	#[serde(rename_all = "snake_case", tag = "type")]
	pub enum ImageSource {
		Base64 { media_type: String, data: String },
		Url { url: String },
	}

	#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
	#[serde(untagged)]
	pub enum ToolResultContent {
		Text(String),
		Array(Vec<Value>),
	}

	#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
	pub struct Message {
		pub role: Role,
		#[serde(deserialize_with = "deserialize_content")]
		pub content: Vec<ContentBlock>,
	}

	// Content may be a bare string or an array of blocks.
	fn deserialize_content<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
	where
		D: Deserializer<'de>,
	{
		use serde::de::Error;

		let value = Value::deserialize(deserializer)?;
		match value {
			Value::String(text) => Ok(vec![ContentBlock::Text { text }]),
			Value::Array(_) => Vec::<ContentBlock>::deserialize(value).map_err(D::Error::custom),
			_ => Err(D::Error::custom(
				"content must be either a string or an array",
			)),
		}
	}

	#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
	#[serde(untagged)]
	pub enum SystemPrompt {
		Text(String),
		Blocks(Vec<SystemContentBlock>),
	}

	#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
	#[serde(tag = "type", rename_all = "snake_case")]
	pub enum SystemContentBlock {
		Text { text: String },
	}

	/// A Messages request built from a canonical chat request.
	///
	/// `model` is omitted for providers that carry the model in the path, and
	/// `anthropic_version` is only set for those same providers.
	#[derive(Deserialize, Serialize, Default, Debug, PartialEq)]
	pub struct Request {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub anthropic_version: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub model: Option<String>,
		pub messages: Vec<Message>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub system: Option<SystemPrompt>,
		pub max_tokens: u32,
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		pub stop_sequences: Vec<String>,
		#[serde(default, skip_serializing_if = "is_default")]
		pub stream: bool,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub temperature: Option<f32>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub top_p: Option<f32>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub top_k: Option<u32>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub tools: Option<Vec<Tool>>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub tool_choice: Option<ToolChoice>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub metadata: Option<Metadata>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub thinking: Option<ThinkingInput>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
	#[serde(rename_all = "snake_case", tag = "type")]
	pub enum ThinkingInput {
		Enabled { budget_tokens: u32 },
		Disabled {},
	}

	#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
	pub struct Metadata {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub user_id: Option<String>,
	}

	/// Response body for the Messages API. `type`, `content` and `usage` are required so that an
	/// unrelated JSON object is rejected rather than read as an empty message.
	#[derive(Debug, Serialize, Deserialize, Clone)]
	pub struct MessagesResponse {
		#[serde(default)]
		pub id: String,
		#[serde(deserialize_with = "message_type")]
		pub r#type: String,
		#[serde(default)]
		pub role: Role,
		pub content: Vec<ContentBlock>,
		#[serde(default)]
		pub model: String,
		/// Null in `message_start` events, set otherwise.
		#[serde(default)]
		pub stop_reason: Option<StopReason>,
		#[serde(default)]
		pub stop_sequence: Option<String>,
		pub usage: Usage,
	}

	fn message_type<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
		let t = String::deserialize(d)?;
		if t != "message" {
			return Err(serde::de::Error::invalid_value(
				serde::de::Unexpected::Str(&t),
				&"\"message\"",
			));
		}
		Ok(t)
	}

	#[derive(Clone, Serialize, Deserialize, Debug)]
	#[serde(rename_all = "snake_case", tag = "type")]
	pub enum MessagesStreamEvent {
		MessageStart {
			message: MessagesResponse,
		},
		ContentBlockStart {
			index: usize,
			content_block: ContentBlock,
		},
		ContentBlockDelta {
			index: usize,
			delta: ContentBlockDelta,
		},
		ContentBlockStop {
			index: usize,
		},
		MessageDelta {
			delta: MessageDelta,
			#[serde(default)]
			usage: MessageDeltaUsage,
		},
		MessageStop,
		Ping,
		Error {
			error: MessagesError,
		},
	}

	impl MessagesStreamEvent {
		/// The SSE event name for this event type.
		pub fn event_name(&self) -> &'static str {
			match self {
				Self::MessageStart { .. } => "message_start",
				Self::ContentBlockStart { .. } => "content_block_start",
				Self::ContentBlockDelta { .. } => "content_block_delta",
				Self::ContentBlockStop { .. } => "content_block_stop",
				Self::MessageDelta { .. } => "message_delta",
				Self::MessageStop => "message_stop",
				Self::Ping => "ping",
				Self::Error { .. } => "error",
			}
		}
	}

	#[derive(Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
	#[serde(rename_all = "snake_case", tag = "type")]
	#[allow(clippy::enum_variant_names)]
	pub enum ContentBlockDelta {
		TextDelta {
			text: String,
		},
		InputJsonDelta {
			partial_json: String,
		},
		ThinkingDelta {
			thinking: String,
		},
		SignatureDelta {
			signature: String,
		},
		CitationsDelta {
			#[serde(default)]
			citation: Value,
		},
	}

	/// Cumulative usage reported by `message_delta`. Only `output_tokens` is guaranteed.
	#[derive(Clone, Serialize, Deserialize, Debug, Default, Eq, PartialEq)]
	pub struct MessageDeltaUsage {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub input_tokens: Option<u32>,
		#[serde(default)]
		pub output_tokens: u32,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub cache_creation_input_tokens: Option<u32>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub cache_read_input_tokens: Option<u32>,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
	pub struct MessageDelta {
		#[serde(default)]
		pub stop_reason: Option<StopReason>,
		#[serde(default)]
		pub stop_sequence: Option<String>,
	}

	#[derive(Debug, Deserialize, Serialize, Clone)]
	pub struct MessagesErrorResponse {
		pub r#type: String,
		pub error: MessagesError,
	}

	#[derive(Clone, Serialize, Deserialize, Debug, Eq, PartialEq)]
	pub struct MessagesError {
		pub r#type: String,
		pub message: String,
	}

	#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
	#[serde(rename_all = "snake_case")]
	pub enum StopReason {
		EndTurn,
		MaxTokens,
		StopSequence,
		ToolUse,
		Refusal,
		PauseTurn,
		ModelContextWindowExceeded,
	}

	#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
	pub struct Usage {
		#[serde(default)]
		pub input_tokens: u32,
		#[serde(default)]
		pub output_tokens: u32,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub cache_creation_input_tokens: Option<u32>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub cache_read_input_tokens: Option<u32>,
	}

	impl Usage {
		pub fn to_token_usage(&self) -> TokenUsage {
			TokenUsage::from_anthropic(
				self.input_tokens,
				self.output_tokens,
				self.cache_read_input_tokens,
				self.cache_creation_input_tokens,
			)
		}
	}

	impl MessageDeltaUsage {
		/// `message_delta` only carries the counters that changed; missing input counters keep
		/// the values from `message_start`.
		pub fn apply_to(&self, start: &Usage) -> TokenUsage {
			TokenUsage::from_anthropic(
				self.input_tokens.unwrap_or(start.input_tokens),
				self.output_tokens,
				self.cache_read_input_tokens.or(start.cache_read_input_tokens),
				self
					.cache_creation_input_tokens
					.or(start.cache_creation_input_tokens),
			)
		}
	}

	#[derive(Debug, Serialize, Deserialize, PartialEq)]
	pub struct Tool {
		pub name: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		pub description: Option<String>,
		pub input_schema: Value,
	}

	#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
	#[serde(tag = "type", rename_all = "snake_case")]
	pub enum ToolChoice {
		Auto,
		Any,
		Tool { name: String },
		None,
	}

	/// The `count_tokens` response.
	#[derive(Debug, Deserialize, Clone, Copy)]
	pub struct CountTokensResponse {
		pub input_tokens: u32,
	}
}
