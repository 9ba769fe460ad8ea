use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::TokenUsage as Usage;
use crate::parse::aws_sse::{self, Message as EventMessage};

#[derive(Copy, Clone, Deserialize, Serialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Role {
	#[default]
	User,
	Assistant,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ContentBlock {
	Text(String),
	Image(ImageBlock),
	ToolResult(ToolResultBlock),
	ToolUse(ToolUseBlock),
	ReasoningContent(ReasoningContentBlock),
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageBlock {
	pub format: String,
	pub source: ImageSource,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSource {
	pub bytes: String,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum ReasoningContentBlock {
	Structured {
		#[serde(rename = "reasoningText")]
		reasoning_text: ReasoningText,
	},
	Simple {
		text: String,
	},
}

impl ReasoningContentBlock {
	pub fn text(&self) -> &str {
		match self {
			ReasoningContentBlock::Structured { reasoning_text } => &reasoning_text.text,
			ReasoningContentBlock::Simple { text } => text,
		}
	}
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningText {
	pub text: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub signature: Option<String>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultBlock {
	pub tool_use_id: String,
	pub content: Vec<ToolResultContentBlock>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<ToolResultStatus>,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ToolResultStatus {
	Error,
	Success,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseBlock {
	pub tool_use_id: String,
	pub name: String,
	pub input: Value,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ToolResultContentBlock {
	Text(String),
	Json(Value),
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct SystemContentBlock {
	pub text: String,
}

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq)]
pub struct Message {
	pub role: Role,
	pub content: Vec<ContentBlock>,
}

#[derive(Clone, Serialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfiguration {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub stop_sequences: Vec<String>,
}

impl InferenceConfiguration {
	pub fn is_empty(&self) -> bool {
		self == &InferenceConfiguration::default()
	}
}

/// The Converse request body. The model is carried in the path, not the body.
#[derive(Clone, Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest {
	pub messages: Vec<Message>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub system: Option<Vec<SystemContentBlock>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub inference_config: Option<InferenceConfiguration>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_config: Option<ToolConfiguration>,
	/// Model specific fields, such as `top_k` or Anthropic `thinking`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub additional_model_request_fields: Option<Value>,
}

#[derive(Clone, Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfiguration {
	pub tools: Vec<Tool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoice>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
	ToolSpec(ToolSpecification),
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpecification {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub input_schema: ToolInputSchema,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ToolInputSchema {
	Json(Value),
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ToolChoice {
	Any {},
	Auto {},
	Tool { name: String },
}

/// The CountTokens request wraps a Converse input.
#[derive(Clone, Serialize, Debug)]
pub struct CountTokensRequest {
	pub input: CountTokensInput,
}

#[derive(Clone, Serialize, Debug)]
pub struct CountTokensInput {
	pub converse: ConverseInput,
}

#[derive(Clone, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConverseInput {
	pub messages: Vec<Message>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub system: Option<Vec<SystemContentBlock>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_config: Option<ToolConfiguration>,
}

#[derive(Clone, Copy, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CountTokensResponse {
	pub input_tokens: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConverseResponse {
	pub output: Option<ConverseOutput>,
	pub stop_reason: StopReason,
	pub usage: Option<TokenUsage>,
	#[serde(default)]
	pub metrics: Option<ConverseMetrics>,
}

/// Bedrock error bodies. The key is sometimes capitalized.
#[derive(Debug, Deserialize, Clone)]
pub struct ConverseErrorResponse {
	#[serde(alias = "Message")]
	pub message: String,
	#[serde(rename = "__type", default)]
	pub kind: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub enum ConverseOutput {
	Message(Message),
	#[serde(other)]
	Unknown,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
	pub input_tokens: u32,
	pub output_tokens: u32,
	#[serde(default)]
	pub total_tokens: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_read_input_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cache_write_input_tokens: Option<u32>,
}

impl TokenUsage {
	pub fn to_token_usage(&self) -> Usage {
		Usage::from_bedrock(
			self.input_tokens,
			self.output_tokens,
			self.cache_read_input_tokens,
			self.cache_write_input_tokens,
		)
	}
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseMetrics {
	pub latency_ms: u64,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
	ContentFiltered,
	EndTurn,
	GuardrailIntervened,
	MaxTokens,
	ModelContextWindowExceeded,
	StopSequence,
	ToolUse,
}

// This is NOT deserialized directly, see the associated method
#[derive(Clone, Debug)]
pub enum ConverseStreamOutput {
	ContentBlockDelta(ContentBlockDeltaEvent),
	ContentBlockStart(ContentBlockStartEvent),
	ContentBlockStop(ContentBlockStopEvent),
	MessageStart(MessageStartEvent),
	MessageStop(MessageStopEvent),
	Metadata(ConverseStreamMetadataEvent),
}

impl ConverseStreamOutput {
	pub fn deserialize(m: &EventMessage) -> anyhow::Result<Self> {
		// Exceptions are distinguished from events by the `:message-type` header.
		if let Some((kind, message)) = aws_sse::exception(m) {
			anyhow::bail!("{kind}: {message}");
		}
		let Some(event_type) = aws_sse::header(m, ":event-type") else {
			anyhow::bail!("no event type header")
		};

		let payload = m.payload();
		Ok(match event_type.as_str() {
			"contentBlockDelta" => {
				ConverseStreamOutput::ContentBlockDelta(serde_json::from_slice(payload)?)
			},
			"contentBlockStart" => {
				ConverseStreamOutput::ContentBlockStart(serde_json::from_slice(payload)?)
			},
			"contentBlockStop" => ConverseStreamOutput::ContentBlockStop(serde_json::from_slice(payload)?),
			"messageStart" => ConverseStreamOutput::MessageStart(serde_json::from_slice(payload)?),
			"messageStop" => ConverseStreamOutput::MessageStop(serde_json::from_slice(payload)?),
			"metadata" => ConverseStreamOutput::Metadata(serde_json::from_slice(payload)?),
			other => anyhow::bail!("unexpected event type: {other}"),
		})
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockDeltaEvent {
	pub delta: Option<ContentBlockDelta>,
	#[serde(default)]
	pub content_block_index: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockStartEvent {
	pub start: Option<ContentBlockStart>,
	#[serde(default)]
	pub content_block_index: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockStopEvent {
	#[serde(default)]
	pub content_block_index: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStartEvent {
	pub role: Role,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStopEvent {
	pub stop_reason: StopReason,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseStreamMetadataEvent {
	pub usage: Option<TokenUsage>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentBlockDelta {
	ReasoningContent(ReasoningContentBlockDelta),
	Text(String),
	ToolUse(ToolUseBlockDelta),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseBlockDelta {
	pub input: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReasoningContentBlockDelta {
	RedactedContent(String),
	Signature(String),
	Text(String),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentBlockStart {
	ToolUse(ToolUseBlockStart),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseBlockStart {
	pub tool_use_id: String,
	pub name: String,
}
