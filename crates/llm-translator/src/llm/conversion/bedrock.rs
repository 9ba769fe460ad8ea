//! Chat completions over the Bedrock Converse API.

use std::collections::HashMap;
use std::io::Read;

use bytes::BytesMut;
use http::{HeaderMap, StatusCode};
use serde_json::{Map, Value, json};

use crate::json;
use crate::llm::conversion::anthropic::tool_arguments;
use crate::llm::conversion::{
	body_mutation, completion_id, held_fragment, stream_mutation, upstream_model,
};
use crate::llm::errors::{self, ErrorBody, ErrorEnvelope};
use crate::llm::streaming::StreamState;
use crate::llm::types::{bedrock, completions};
use crate::llm::{
	AIError, AMZN_REQUEST_ID_HEADER, BodyBuffer, ErrorMutation, RequestMutation, ResponseMutation,
	Translator, bedrock as paths, header_str,
};
use crate::parse::aws_sse::{self, EventStreamCodec};
use crate::strng::Strng;

#[cfg(test)]
#[path = "bedrock_tests.rs"]
mod tests;

pub struct ChatToConverse {
	model_name_override: Option<Strng>,
	request_model: Strng,
	streaming: bool,
	include_usage: bool,
	stream: StreamState,
	decoder: EventStreamCodec,
	body: BodyBuffer,
	id: String,
	created: u32,
	// Content block index to tool call index.
	tool_calls: HashMap<u32, u32>,
}

impl ChatToConverse {
	pub fn new(model_name_override: Option<Strng>) -> Self {
		ChatToConverse {
			model_name_override,
			request_model: Strng::default(),
			streaming: false,
			include_usage: false,
			stream: StreamState::new(),
			decoder: EventStreamCodec::new(),
			body: BodyBuffer::default(),
			id: completion_id(),
			created: completions::unix_now(),
			tool_calls: HashMap::new(),
		}
	}

	fn chunk(
		&self,
		delta: completions::StreamResponseDelta,
		finish_reason: Option<completions::FinishReason>,
	) -> completions::StreamResponse {
		completions::StreamResponse {
			id: self.id.clone(),
			object: "chat.completion.chunk".to_string(),
			created: self.created,
			model: self.request_model.to_string(),
			choices: vec![completions::ChatChoiceStream {
				index: 0,
				delta,
				finish_reason,
				logprobs: None,
			}],
			usage: None,
			system_fingerprint: None,
		}
	}

	fn write_event(
		&mut self,
		ev: bedrock::ConverseStreamOutput,
		out: &mut BytesMut,
	) -> Result<(), AIError> {
		let delta = match ev {
			bedrock::ConverseStreamOutput::MessageStart(start) => completions::StreamResponseDelta {
				role: Some(match start.role {
					bedrock::Role::Assistant => completions::Role::Assistant,
					bedrock::Role::User => completions::Role::User,
				}),
				content: Some(String::new()),
				..Default::default()
			},
			bedrock::ConverseStreamOutput::ContentBlockStart(start) => {
				let Some(bedrock::ContentBlockStart::ToolUse(tu)) = start.start else {
					return Ok(());
				};
				let index = self.tool_calls.len() as u32;
				self.tool_calls.insert(start.content_block_index, index);
				completions::StreamResponseDelta {
					tool_calls: Some(vec![completions::ToolCallChunk {
						index,
						id: Some(tu.tool_use_id),
						kind: Some(completions::ToolType::Function),
						function: Some(completions::FunctionCallStream {
							name: Some(tu.name),
							arguments: Some(String::new()),
						}),
					}]),
					..Default::default()
				}
			},
			bedrock::ConverseStreamOutput::ContentBlockDelta(d) => match d.delta {
				Some(bedrock::ContentBlockDelta::Text(t)) => completions::StreamResponseDelta {
					content: Some(t),
					..Default::default()
				},
				Some(bedrock::ContentBlockDelta::ReasoningContent(
					bedrock::ReasoningContentBlockDelta::Text(t),
				)) => completions::StreamResponseDelta {
					reasoning_content: Some(t),
					..Default::default()
				},
				Some(bedrock::ContentBlockDelta::ReasoningContent(
					bedrock::ReasoningContentBlockDelta::RedactedContent(_),
				)) => completions::StreamResponseDelta {
					reasoning_content: Some("[REDACTED]".to_string()),
					..Default::default()
				},
				Some(bedrock::ContentBlockDelta::ToolUse(tu)) => {
					let Some(index) = self.tool_calls.get(&d.content_block_index).copied() else {
						tracing::debug!(
							index = d.content_block_index,
							"tool input for unknown content block"
						);
						return Ok(());
					};
					completions::StreamResponseDelta {
						tool_calls: Some(vec![completions::ToolCallChunk {
							index,
							function: Some(completions::FunctionCallStream {
								name: None,
								arguments: Some(tu.input),
							}),
							..Default::default()
						}]),
						..Default::default()
					}
				},
				Some(bedrock::ContentBlockDelta::ReasoningContent(
					bedrock::ReasoningContentBlockDelta::Signature(_),
				))
				| None => return Ok(()),
			},
			bedrock::ConverseStreamOutput::ContentBlockStop(_) => return Ok(()),
			bedrock::ConverseStreamOutput::MessageStop(stop) => {
				let chunk = self.chunk(Default::default(), Some(finish_reason(stop.stop_reason)));
				return self.stream.emit(out, &chunk);
			},
			bedrock::ConverseStreamOutput::Metadata(metadata) => {
				let Some(usage) = metadata.usage else {
					return Ok(());
				};
				let usage = usage.to_token_usage();
				self.stream.record_usage(&usage);
				if self.include_usage {
					let mut chunk = self.chunk(Default::default(), None);
					chunk.choices.clear();
					chunk.usage = Some(completions::Usage::from_token_usage(&usage));
					self.stream.emit(out, &chunk)?;
				}
				return Ok(());
			},
		};
		let chunk = self.chunk(delta, None);
		self.stream.emit(out, &chunk)
	}
}

impl Translator<completions::Request> for ChatToConverse {
	fn request_body(
		&mut self,
		_raw: &[u8],
		req: &completions::Request,
		_force_body_mutation: bool,
	) -> Result<RequestMutation, AIError> {
		self.request_model = upstream_model(&req.model, self.model_name_override.as_ref());
		self.streaming = req.is_streaming();
		self.include_usage = req.include_usage();

		let body = to_converse(req)?;
		let body = json::to_bytes(&body).map_err(AIError::RequestMarshal)?;
		Ok(
			RequestMutation::route(paths::converse_path(&self.request_model, self.streaming))
				.with_body(body),
		)
	}

	fn response_body(
		&mut self,
		headers: &HeaderMap,
		body: &mut dyn Read,
		end_of_stream: bool,
	) -> Result<ResponseMutation, AIError> {
		if !self.streaming {
			let Some(raw) = self.body.collect(body, end_of_stream)? else {
				return Ok(held_fragment());
			};
			let resp: bedrock::ConverseResponse =
				serde_json::from_slice(&raw).map_err(AIError::MalformedUpstreamResponse)?;
			let usage = resp.usage.map(|u| u.to_token_usage()).unwrap_or_default();
			let id = header_str(headers, AMZN_REQUEST_ID_HEADER)
				.map(ToOwned::to_owned)
				.unwrap_or_else(|| self.id.clone());
			let out = to_completion(resp, id, &self.request_model)?;
			let body = json::to_bytes(&out).map_err(AIError::ResponseMarshal)?;
			return Ok(body_mutation(body, usage, self.request_model.clone()));
		}

		self.stream.feed(body)?;
		let mut out = BytesMut::new();
		for m in self.stream.frames(&mut self.decoder, end_of_stream) {
			if let Some((kind, message)) = aws_sse::exception(&m) {
				tracing::debug!(%kind, "exception in converse stream");
				let env = ErrorEnvelope {
					r#type: "error".to_string(),
					error: ErrorBody {
						r#type: kind,
						message,
						code: None,
					},
				};
				self.stream.emit(&mut out, &env)?;
				continue;
			}
			match bedrock::ConverseStreamOutput::deserialize(&m) {
				Ok(ev) => self.write_event(ev, &mut out)?,
				Err(e) => tracing::debug!("dropping converse stream event: {e}"),
			}
		}
		self.stream.finish(&mut out, end_of_stream, true);
		Ok(stream_mutation(
			out,
			&self.stream,
			end_of_stream,
			&self.request_model,
		))
	}

	fn response_error(
		&mut self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &mut dyn Read,
	) -> Result<ErrorMutation, AIError> {
		errors::AWS_BEDROCK.normalize(status, headers, body)
	}
}

/// The conversation part of a Converse request, shared with token counting.
pub(crate) struct ConverseParts {
	pub messages: Vec<bedrock::Message>,
	pub system: Option<Vec<bedrock::SystemContentBlock>>,
	pub tool_config: Option<bedrock::ToolConfiguration>,
}

pub(crate) fn converse_parts(req: &completions::Request) -> Result<ConverseParts, AIError> {
	let mut messages: Vec<bedrock::Message> = Vec::new();
	for msg in req.messages.iter().filter(|m| !m.is_system()) {
		let (role, content) = match msg.role {
			completions::Role::Assistant => (bedrock::Role::Assistant, assistant_blocks(msg)?),
			completions::Role::Tool | completions::Role::Function => {
				let tool_use_id = msg
					.tool_call_id
					.clone()
					.ok_or_else(|| AIError::MissingField(crate::strng::literal!("tool_call_id")))?;
				let block = bedrock::ContentBlock::ToolResult(bedrock::ToolResultBlock {
					tool_use_id,
					content: vec![bedrock::ToolResultContentBlock::Text(
						msg.text().unwrap_or_default(),
					)],
					status: None,
				});
				(bedrock::Role::User, vec![block])
			},
			_ => (bedrock::Role::User, user_blocks(msg)),
		};
		if content.is_empty() {
			continue;
		}
		match messages.last_mut() {
			Some(prev) if prev.role == role => prev.content.extend(content),
			_ => messages.push(bedrock::Message { role, content }),
		}
	}

	let system = req
		.system_prompt()
		.map(|text| vec![bedrock::SystemContentBlock { text }]);

	let tool_choice = match &req.tool_choice {
		Some(completions::ToolChoiceOption::Named(n)) => Some(bedrock::ToolChoice::Tool {
			name: n.function.name.clone(),
		}),
		Some(completions::ToolChoiceOption::Mode(completions::ToolChoiceMode::Auto)) => {
			Some(bedrock::ToolChoice::Auto {})
		},
		Some(completions::ToolChoiceOption::Mode(completions::ToolChoiceMode::Required)) => {
			Some(bedrock::ToolChoice::Any {})
		},
		Some(completions::ToolChoiceOption::Mode(completions::ToolChoiceMode::None)) | None => None,
	};
	// Converse has no way to disable tools other than not sending them.
	let tools_disabled = matches!(
		req.tool_choice,
		Some(completions::ToolChoiceOption::Mode(completions::ToolChoiceMode::None))
	);
	let tool_config = req.tools.as_ref().filter(|_| !tools_disabled).map(|tools| {
		let tools = tools
			.iter()
			.filter_map(|tool| match tool {
				completions::Tool::Function { function } => {
					Some(bedrock::Tool::ToolSpec(bedrock::ToolSpecification {
						name: function.name.clone(),
						description: function.description.clone(),
						input_schema: bedrock::ToolInputSchema::Json(
							function
								.parameters
								.clone()
								.unwrap_or_else(|| json!({"type": "object", "properties": {}})),
						),
					}))
				},
				completions::Tool::Unsupported => {
					tracing::warn!("unsupported tool type in Bedrock conversion");
					None
				},
			})
			.collect();
		bedrock::ToolConfiguration { tools, tool_choice }
	});

	Ok(ConverseParts {
		messages,
		system,
		tool_config,
	})
}

pub(crate) fn to_converse(req: &completions::Request) -> Result<bedrock::ConverseRequest, AIError> {
	let ConverseParts {
		messages,
		system,
		tool_config,
	} = converse_parts(req)?;

	let inference_config = bedrock::InferenceConfiguration {
		max_tokens: req.max_tokens(),
		temperature: req.temperature,
		top_p: req.top_p,
		stop_sequences: req.stop_sequences(),
	};

	// Fields outside the Converse schema are passed to the model as is.
	let mut additional = Map::new();
	if let Some(top_k) = req.top_k {
		additional.insert("top_k".to_string(), json!(top_k));
	}
	if let Some(budget) = thinking_budget(req) {
		additional.insert(
			"thinking".to_string(),
			json!({"type": "enabled", "budget_tokens": budget}),
		);
	}

	Ok(bedrock::ConverseRequest {
		messages,
		system,
		inference_config: (!inference_config.is_empty()).then_some(inference_config),
		tool_config,
		additional_model_request_fields: (!additional.is_empty()).then_some(Value::Object(additional)),
	})
}

fn thinking_budget(req: &completions::Request) -> Option<u64> {
	if let Some(budget) = req
		.vendor_field("thinking_budget_tokens")
		.and_then(Value::as_u64)
	{
		return Some(budget);
	}
	match req.reasoning_effort? {
		completions::ReasoningEffort::Minimal | completions::ReasoningEffort::Low => Some(1024),
		completions::ReasoningEffort::Medium => Some(2048),
		completions::ReasoningEffort::High | completions::ReasoningEffort::Xhigh => Some(4096),
		completions::ReasoningEffort::None => None,
	}
}

fn user_blocks(msg: &completions::RequestMessage) -> Vec<bedrock::ContentBlock> {
	match &msg.content {
		None => Vec::new(),
		Some(completions::Content::Text(t)) if t.trim().is_empty() => Vec::new(),
		Some(completions::Content::Text(t)) => vec![bedrock::ContentBlock::Text(t.clone())],
		Some(completions::Content::Parts(parts)) => parts
			.iter()
			.filter_map(|p| match p {
				completions::ContentPart::Text { text } => Some(bedrock::ContentBlock::Text(text.clone())),
				completions::ContentPart::ImageUrl { image_url } => {
					let Some((mime, data)) = image_url.as_data_url() else {
						tracing::warn!("Bedrock only accepts inline images, dropping image URL");
						return None;
					};
					let format = mime.strip_prefix("image/").unwrap_or(mime);
					Some(bedrock::ContentBlock::Image(bedrock::ImageBlock {
						format: format.to_string(),
						source: bedrock::ImageSource {
							bytes: data.to_string(),
						},
					}))
				},
				other => {
					tracing::warn!(part = ?other, "content part is not supported by Bedrock, dropping");
					None
				},
			})
			.collect(),
	}
}

fn assistant_blocks(
	msg: &completions::RequestMessage,
) -> Result<Vec<bedrock::ContentBlock>, AIError> {
	let mut blocks = Vec::new();
	if let Some(text) = msg.text().filter(|t| !t.trim().is_empty()) {
		blocks.push(bedrock::ContentBlock::Text(text));
	}
	for call in msg.tool_calls.iter().flatten() {
		blocks.push(bedrock::ContentBlock::ToolUse(bedrock::ToolUseBlock {
			tool_use_id: call.id.clone(),
			name: call.function.name.clone(),
			input: tool_arguments(&call.function)?,
		}));
	}
	Ok(blocks)
}

pub(crate) fn finish_reason(r: bedrock::StopReason) -> completions::FinishReason {
	match r {
		bedrock::StopReason::EndTurn | bedrock::StopReason::StopSequence => {
			completions::FinishReason::Stop
		},
		bedrock::StopReason::MaxTokens | bedrock::StopReason::ModelContextWindowExceeded => {
			completions::FinishReason::Length
		},
		bedrock::StopReason::ContentFiltered | bedrock::StopReason::GuardrailIntervened => {
			completions::FinishReason::ContentFilter
		},
		bedrock::StopReason::ToolUse => completions::FinishReason::ToolCalls,
	}
}

fn to_completion(
	resp: bedrock::ConverseResponse,
	id: String,
	model: &str,
) -> Result<completions::Response, AIError> {
	let Some(bedrock::ConverseOutput::Message(message)) = resp.output else {
		return Err(AIError::IncompleteResponse);
	};
	let mut content: Option<String> = None;
	let mut reasoning: Option<String> = None;
	let mut tool_calls = Vec::new();
	for block in message.content {
		match block {
			bedrock::ContentBlock::Text(text) => content.get_or_insert_default().push_str(&text),
			bedrock::ContentBlock::ReasoningContent(r) => {
				reasoning.get_or_insert_default().push_str(r.text())
			},
			bedrock::ContentBlock::ToolUse(tu) => tool_calls.push(completions::MessageToolCall {
				id: tu.tool_use_id,
				kind: completions::ToolType::Function,
				function: completions::FunctionCall {
					name: tu.name,
					arguments: tu.input.to_string(),
				},
			}),
			bedrock::ContentBlock::Image(_) | bedrock::ContentBlock::ToolResult(_) => {},
		}
	}
	Ok(completions::Response {
		id,
		object: "chat.completion".to_string(),
		created: completions::unix_now(),
		model: model.to_string(),
		choices: vec![completions::ChatChoice {
			index: 0,
			message: completions::ResponseMessage {
				role: completions::Role::Assistant,
				content,
				tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
				reasoning_content: reasoning,
				refusal: None,
			},
			finish_reason: Some(finish_reason(resp.stop_reason)),
			logprobs: None,
		}],
		usage: resp
			.usage
			.map(|u| completions::Usage::from_token_usage(&u.to_token_usage())),
		system_fingerprint: None,
		service_tier: None,
	})
}
