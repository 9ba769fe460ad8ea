//! Tokenize requests answered by provider token counting APIs.
//!
//! These APIs only count; the response carries the count and no token ids.

use std::io::Read;

use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

use crate::json;
use crate::llm::conversion::anthropic::to_messages;
use crate::llm::conversion::bedrock::{ConverseParts, converse_parts};
use crate::llm::conversion::vertex::{GeminiParts, gemini_parts};
use crate::llm::conversion::{body_mutation, held_fragment, upstream_model};
use crate::llm::errors;
use crate::llm::types::messages::typed as messages;
use crate::llm::types::{bedrock as bedrock_types, completions, gemini, tokenize};
use crate::llm::{
	AIError, BodyBuffer, ErrorMutation, RequestMutation, ResponseMutation, TokenUsage, Translator,
	bedrock, vertex,
};
use crate::strng;
use crate::strng::Strng;

#[cfg(test)]
#[path = "tokenize_count_tests.rs"]
mod tests;

/// Vertex AI names the Anthropic counting endpoint as if it were a model.
pub const GCP_ANTHROPIC_COUNT_TOKENS_MODEL: &str = "count-tokens";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
	/// Bedrock `CountTokens`, over a Converse input.
	Bedrock,
	/// Gemini `countTokens`.
	Vertex,
	/// Anthropic `count_tokens`, via Vertex AI `rawPredict`.
	GcpAnthropic,
}

pub struct TokenizeToCount {
	counter: Counter,
	model_name_override: Option<Strng>,
	request_model: Strng,
	body: BodyBuffer,
}

impl TokenizeToCount {
	pub fn new(counter: Counter, model_name_override: Option<Strng>) -> Self {
		TokenizeToCount {
			counter,
			model_name_override,
			request_model: Strng::default(),
			body: BodyBuffer::default(),
		}
	}
}

#[derive(Serialize)]
struct AnthropicCountTokens {
	anthropic_version: &'static str,
	model: String,
	messages: Vec<messages::Message>,
	#[serde(skip_serializing_if = "Option::is_none")]
	system: Option<messages::SystemPrompt>,
	#[serde(skip_serializing_if = "Option::is_none")]
	tools: Option<Vec<messages::Tool>>,
}

#[derive(Deserialize)]
struct AnthropicTokenCount {
	input_tokens: u32,
}

// The chat shape is converted with the same rules as chat completions.
fn as_chat_request(req: &tokenize::ChatRequest, model: &Strng) -> completions::Request {
	completions::Request {
		model: model.to_string(),
		messages: req.messages.clone(),
		tools: req.tools.clone(),
		..Default::default()
	}
}

impl Translator<tokenize::Request> for TokenizeToCount {
	fn request_body(
		&mut self,
		_raw: &[u8],
		req: &tokenize::Request,
		_force_body_mutation: bool,
	) -> Result<RequestMutation, AIError> {
		req.validate()?;
		let Some(chat) = req.as_chat() else {
			return Err(AIError::UnsupportedConversion(strng::format!(
				"only chat tokenize requests are supported by {:?}",
				self.counter
			)));
		};
		self.request_model = upstream_model(&chat.model, self.model_name_override.as_ref());
		let chat = as_chat_request(chat, &self.request_model);

		let (path, body) = match self.counter {
			Counter::Bedrock => {
				let ConverseParts {
					messages,
					system,
					tool_config,
				} = converse_parts(&chat)?;
				let body = bedrock_types::CountTokensRequest {
					input: bedrock_types::CountTokensInput {
						converse: bedrock_types::ConverseInput {
							messages,
							system,
							tool_config,
						},
					},
				};
				(
					bedrock::count_tokens_path(&self.request_model),
					json::to_bytes(&body),
				)
			},
			Counter::Vertex => {
				let GeminiParts {
					contents,
					system_instruction,
					tools,
				} = gemini_parts(&chat)?;
				let body = gemini::CountTokensRequest {
					contents,
					system_instruction,
					tools,
				};
				(
					vertex::model_path(
						vertex::PUBLISHER_GOOGLE,
						&self.request_model,
						vertex::METHOD_COUNT_TOKENS,
					),
					json::to_bytes(&body),
				)
			},
			Counter::GcpAnthropic => {
				let converted = to_messages(&chat)?;
				let body = AnthropicCountTokens {
					anthropic_version: vertex::ANTHROPIC_VERSION,
					model: self.request_model.to_string(),
					messages: converted.messages,
					system: converted.system,
					tools: converted.tools,
				};
				(
					vertex::model_path(
						vertex::PUBLISHER_ANTHROPIC,
						GCP_ANTHROPIC_COUNT_TOKENS_MODEL,
						vertex::METHOD_RAW_PREDICT,
					),
					json::to_bytes(&body),
				)
			},
		};
		let body = body.map_err(AIError::RequestMarshal)?;
		Ok(RequestMutation::route(path).with_body(body))
	}

	fn response_body(
		&mut self,
		_headers: &HeaderMap,
		body: &mut dyn Read,
		end_of_stream: bool,
	) -> Result<ResponseMutation, AIError> {
		let Some(raw) = self.body.collect(body, end_of_stream)? else {
			return Ok(held_fragment());
		};
		let parse_err = AIError::MalformedUpstreamResponse;
		let count = match self.counter {
			Counter::Bedrock => {
				serde_json::from_slice::<bedrock_types::CountTokensResponse>(&raw)
					.map_err(parse_err)?
					.input_tokens
			},
			Counter::Vertex => {
				serde_json::from_slice::<gemini::CountTokensResponse>(&raw)
					.map_err(parse_err)?
					.total_tokens
			},
			Counter::GcpAnthropic => {
				serde_json::from_slice::<AnthropicTokenCount>(&raw)
					.map_err(parse_err)?
					.input_tokens
			},
		};
		let out = tokenize::Response::count_only(count);
		let body = json::to_bytes(&out).map_err(AIError::ResponseMarshal)?;
		Ok(body_mutation(
			body,
			TokenUsage::from_input_only(count),
			self.request_model.clone(),
		))
	}

	fn response_error(
		&mut self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &mut dyn Read,
	) -> Result<ErrorMutation, AIError> {
		let dialect = match self.counter {
			Counter::Bedrock => errors::AWS_BEDROCK,
			Counter::Vertex => errors::GCP_VERTEX_AI,
			Counter::GcpAnthropic => errors::GCP_ANTHROPIC,
		};
		dialect.normalize(status, headers, body)
	}
}
