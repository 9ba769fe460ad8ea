//! Gemini (Vertex AI `publishers/google`) wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::TokenUsage;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
	pub contents: Vec<Content>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub system_instruction: Option<Content>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub generation_config: Option<GenerationConfig>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tools: Vec<Tool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_config: Option<ToolConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Content {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	#[serde(default)]
	pub parts: Vec<Part>,
}

impl Content {
	pub fn text(role: Option<&str>, text: impl Into<String>) -> Self {
		Content {
			role: role.map(ToOwned::to_owned),
			parts: vec![Part::text(text)],
		}
	}
}

/// A Part holds exactly one kind of data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	/// Marks `text` as a thought summary.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub thought: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub inline_data: Option<Blob>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub file_data: Option<FileData>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function_call: Option<FunctionCall>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function_response: Option<FunctionResponse>,
}

impl Part {
	pub fn text(text: impl Into<String>) -> Self {
		Part {
			text: Some(text.into()),
			..Default::default()
		}
	}

	pub fn is_thought(&self) -> bool {
		self.thought.unwrap_or_default()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
	pub mime_type: String,
	pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mime_type: Option<String>,
	pub file_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub name: String,
	#[serde(default)]
	pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
	pub name: String,
	pub response: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_k: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub candidate_count: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_output_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub stop_sequences: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub presence_penalty: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frequency_penalty: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub seed: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response_mime_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response_schema: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub thinking_config: Option<ThinkingConfig>,
}

impl GenerationConfig {
	pub fn is_empty(&self) -> bool {
		self == &GenerationConfig::default()
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub include_thoughts: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub thinking_budget: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// An OpenAPI-subset schema; see `llm::jsonschema::sanitize`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
	pub function_calling_config: FunctionCallingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
	pub mode: FunctionCallingMode,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub allowed_function_names: Vec<String>,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionCallingMode {
	Auto,
	Any,
	None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
	#[serde(default)]
	pub candidates: Vec<Candidate>,
	#[serde(default)]
	pub usage_metadata: Option<UsageMetadata>,
	#[serde(default)]
	pub model_version: Option<String>,
	#[serde(default)]
	pub response_id: Option<String>,
	#[serde(default)]
	pub prompt_feedback: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
	#[serde(default)]
	pub content: Option<Content>,
	#[serde(default)]
	pub finish_reason: Option<FinishReason>,
	#[serde(default)]
	pub index: Option<u32>,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
	FinishReasonUnspecified,
	Stop,
	MaxTokens,
	Safety,
	Recitation,
	Language,
	Other,
	Blocklist,
	ProhibitedContent,
	Spii,
	MalformedFunctionCall,
	ImageSafety,
	UnexpectedToolCall,
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
	#[serde(default)]
	pub prompt_token_count: u32,
	#[serde(default)]
	pub candidates_token_count: u32,
	#[serde(default)]
	pub thoughts_token_count: u32,
	#[serde(default)]
	pub cached_content_token_count: Option<u32>,
	#[serde(default)]
	pub total_token_count: u32,
}

impl UsageMetadata {
	pub fn to_token_usage(&self) -> TokenUsage {
		TokenUsage::from_gemini(
			self.prompt_token_count,
			self.candidates_token_count,
			self.thoughts_token_count,
			self.cached_content_token_count,
		)
	}
}

/// The `countTokens` request. Unlike `generateContent` it takes no generation config.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountTokensRequest {
	pub contents: Vec<Content>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub system_instruction: Option<Content>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub tools: Vec<Tool>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountTokensResponse {
	#[serde(default)]
	pub total_tokens: u32,
}

/// The `embedContent` request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedContentRequest {
	pub content: Content,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub config: Option<EmbedContentConfig>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbedContentConfig {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub task_type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub output_dimensionality: Option<u32>,
}

impl EmbedContentConfig {
	pub fn is_empty(&self) -> bool {
		self == &EmbedContentConfig::default()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedContentResponse {
	#[serde(default)]
	pub embedding: Option<ContentEmbedding>,
	#[serde(default)]
	pub embeddings: Vec<ContentEmbedding>,
	#[serde(default)]
	pub token_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentEmbedding {
	#[serde(default)]
	pub values: Vec<f32>,
	#[serde(default)]
	pub statistics: Option<EmbeddingStatistics>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct EmbeddingStatistics {
	#[serde(default)]
	pub token_count: f64,
	#[serde(default)]
	pub truncated: bool,
}

/// The Google error envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
	pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
	#[serde(default)]
	pub code: Option<i64>,
	pub message: String,
	#[serde(default)]
	pub status: Option<String>,
}
