//! Chat completions served by Claude models hosted on Vertex AI (`rawPredict`) or Bedrock
//! (`InvokeModel`).

use std::collections::HashMap;
use std::io::Read;

use bytes::BytesMut;
use http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::json;
use crate::llm::conversion::{
	InvokeFrame, body_mutation, completion_id, held_fragment, invoke_frames, stream_mutation,
	upstream_model,
};
use crate::llm::errors::{self, ErrorBody, ErrorEnvelope};
use crate::llm::streaming::StreamState;
use crate::llm::types::completions;
use crate::llm::types::messages::typed as messages;
use crate::llm::{
	AIError, BodyBuffer, ErrorMutation, HeaderMutation, RequestMutation, ResponseMutation,
	SSE_CONTENT_TYPE, Translator, anthropic, bedrock, jsonschema, response_model, vertex,
};
use crate::parse::aws_sse::EventStreamCodec;
use crate::strng;
use crate::strng::Strng;

#[cfg(test)]
#[path = "anthropic_tests.rs"]
mod tests;

/// Where the Claude model is hosted. Both carry the model in the path and the API version in
/// the body, but frame their streams differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cloud {
	/// Vertex AI `rawPredict`, streamed as Anthropic SSE.
	Gcp,
	/// Bedrock `InvokeModel`, streamed as EventStream frames wrapping Anthropic events.
	Aws { version: Option<Strng> },
}

impl Cloud {
	fn version(&self) -> &str {
		match self {
			Cloud::Gcp => vertex::ANTHROPIC_VERSION,
			Cloud::Aws { version } => version
				.as_deref()
				.filter(|v| !v.is_empty())
				.unwrap_or(anthropic::DEFAULT_BEDROCK_VERSION),
		}
	}

	fn path(&self, model: &str, streaming: bool) -> Strng {
		match self {
			Cloud::Gcp => vertex::raw_predict_path(model, streaming),
			Cloud::Aws { .. } => bedrock::invoke_path(model, streaming),
		}
	}
}

pub struct ChatToAnthropic {
	cloud: Cloud,
	model_name_override: Option<Strng>,
	request_model: Strng,
	streaming: bool,
	stream: StreamState,
	decoder: EventStreamCodec,
	chunks: ChunkWriter,
	body: BodyBuffer,
}

impl ChatToAnthropic {
	pub fn new(cloud: Cloud, model_name_override: Option<Strng>) -> Self {
		ChatToAnthropic {
			cloud,
			model_name_override,
			request_model: Strng::default(),
			streaming: false,
			stream: StreamState::new(),
			decoder: EventStreamCodec::new(),
			chunks: ChunkWriter::default(),
			body: BodyBuffer::default(),
		}
	}

	fn decode_events(&mut self, end_of_stream: bool) -> Vec<messages::MessagesStreamEvent> {
		let parse = |data: &[u8]| match serde_json::from_slice::<messages::MessagesStreamEvent>(data) {
			Ok(ev) => Some(ev),
			Err(e) => {
				tracing::debug!("skipping unparsable messages event: {e}");
				None
			},
		};
		match self.cloud {
			Cloud::Gcp => self
				.stream
				.sse_events(end_of_stream)
				.into_iter()
				.filter_map(|ev| parse(ev.data.as_bytes()))
				.collect(),
			Cloud::Aws { .. } => invoke_frames(&mut self.stream, &mut self.decoder, end_of_stream)
				.into_iter()
				.filter_map(|f| match f {
					InvokeFrame::Chunk(b) => parse(&b),
					InvokeFrame::Exception { kind, message } => {
						Some(messages::MessagesStreamEvent::Error {
							error: messages::MessagesError {
								r#type: kind,
								message,
							},
						})
					},
				})
				.collect(),
		}
	}
}

impl Translator<completions::Request> for ChatToAnthropic {
	fn request_body(
		&mut self,
		_raw: &[u8],
		req: &completions::Request,
		_force_body_mutation: bool,
	) -> Result<RequestMutation, AIError> {
		self.request_model = upstream_model(&req.model, self.model_name_override.as_ref());
		self.streaming = req.is_streaming();
		self.chunks = ChunkWriter::new(req.include_usage());

		let mut body = to_messages(req)?;
		body.anthropic_version = Some(self.cloud.version().to_string());
		let body = json::to_bytes(&body).map_err(AIError::RequestMarshal)?;
		Ok(RequestMutation::route(self.cloud.path(&self.request_model, self.streaming)).with_body(body))
	}

	fn response_headers(&mut self, _headers: &HeaderMap) -> Result<Vec<HeaderMutation>, AIError> {
		if self.streaming && matches!(self.cloud, Cloud::Aws { .. }) {
			return Ok(vec![HeaderMutation::content_type(SSE_CONTENT_TYPE)]);
		}
		Ok(Vec::new())
	}

	fn response_body(
		&mut self,
		_headers: &HeaderMap,
		body: &mut dyn Read,
		end_of_stream: bool,
	) -> Result<ResponseMutation, AIError> {
		if !self.streaming {
			let Some(raw) = self.body.collect(body, end_of_stream)? else {
				return Ok(held_fragment());
			};
			let resp: messages::MessagesResponse =
				serde_json::from_slice(&raw).map_err(AIError::MalformedUpstreamResponse)?;
			let usage = resp.usage.to_token_usage();
			let model = response_model(Some(resp.model.as_str()), &self.request_model);
			let out = to_completion(resp, &model);
			let body = json::to_bytes(&out).map_err(AIError::ResponseMarshal)?;
			return Ok(body_mutation(body, usage, model));
		}

		self.stream.feed(body)?;
		let mut out = BytesMut::new();
		for ev in self.decode_events(end_of_stream) {
			self.chunks.write(ev, &mut self.stream, &mut out)?;
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
		match self.cloud {
			Cloud::Gcp => errors::GCP_ANTHROPIC.normalize(status, headers, body),
			Cloud::Aws { .. } => errors::AWS_ANTHROPIC.normalize(status, headers, body),
		}
	}
}

/// Converts a chat request into a Messages request. The model and API version are left for the
/// caller, since the hosted variants carry them elsewhere.
pub(crate) fn to_messages(req: &completions::Request) -> Result<messages::Request, AIError> {
	let mut out: Vec<messages::Message> = Vec::new();
	for msg in req.messages.iter().filter(|m| !m.is_system()) {
		let (role, content) = match msg.role {
			completions::Role::Assistant => (messages::Role::Assistant, assistant_blocks(msg)?),
			completions::Role::Tool | completions::Role::Function => {
				(messages::Role::User, vec![tool_result(msg)?])
			},
			_ => (messages::Role::User, user_blocks(msg)),
		};
		if content.is_empty() {
			continue;
		}
		// Messages must alternate, so consecutive turns of the same role are merged.
		match out.last_mut() {
			Some(prev) if prev.role == role => prev.content.extend(content),
			_ => out.push(messages::Message { role, content }),
		}
	}

	let tools = req.tools.as_deref().map(tools).transpose()?;
	let tool_choice = req.tool_choice.as_ref().map(|c| match c {
		completions::ToolChoiceOption::Named(n) => messages::ToolChoice::Tool {
			name: n.function.name.clone(),
		},
		completions::ToolChoiceOption::Mode(completions::ToolChoiceMode::Auto) => {
			messages::ToolChoice::Auto
		},
		completions::ToolChoiceOption::Mode(completions::ToolChoiceMode::Required) => {
			messages::ToolChoice::Any
		},
		completions::ToolChoiceOption::Mode(completions::ToolChoiceMode::None) => {
			messages::ToolChoice::None
		},
	});

	Ok(messages::Request {
		anthropic_version: None,
		model: None,
		messages: out,
		system: req.system_prompt().map(messages::SystemPrompt::Text),
		max_tokens: req.max_tokens().unwrap_or(anthropic::DEFAULT_MAX_TOKENS),
		stop_sequences: req.stop_sequences(),
		stream: req.is_streaming(),
		temperature: req.temperature,
		top_p: req.top_p,
		top_k: req.top_k,
		tools,
		tool_choice,
		metadata: req.user.clone().map(|u| messages::Metadata { user_id: Some(u) }),
		thinking: thinking(req)?,
	})
}

fn thinking(req: &completions::Request) -> Result<Option<messages::ThinkingInput>, AIError> {
	if let Some(budget) = req
		.vendor_field("thinking_budget_tokens")
		.and_then(Value::as_u64)
	{
		let budget_tokens = u32::try_from(budget).map_err(|_| {
			AIError::InvalidRequest(strng::format!("thinking_budget_tokens {budget} is out of range"))
		})?;
		return Ok(Some(messages::ThinkingInput::Enabled { budget_tokens }));
	}
	let Some(effort) = req.reasoning_effort else {
		return Ok(None);
	};
	// Anthropic's minimum budget is 1024.
	let budget_tokens = match effort {
		completions::ReasoningEffort::Minimal | completions::ReasoningEffort::Low => 1024,
		completions::ReasoningEffort::Medium => 2048,
		completions::ReasoningEffort::High | completions::ReasoningEffort::Xhigh => 4096,
		completions::ReasoningEffort::None => return Ok(None),
	};
	Ok(Some(messages::ThinkingInput::Enabled { budget_tokens }))
}

fn user_blocks(msg: &completions::RequestMessage) -> Vec<messages::ContentBlock> {
	match &msg.content {
		None => Vec::new(),
		Some(completions::Content::Text(t)) => vec![messages::ContentBlock::text(t.clone())],
		Some(completions::Content::Parts(parts)) => parts
			.iter()
			.filter_map(|p| match p {
				completions::ContentPart::Text { text } => Some(messages::ContentBlock::text(text.clone())),
				completions::ContentPart::ImageUrl { image_url } => {
					let source = match image_url.as_data_url() {
						Some((media_type, data)) => messages::ImageSource::Base64 {
							media_type: media_type.to_string(),
							data: data.to_string(),
						},
						None => messages::ImageSource::Url {
							url: image_url.url.clone(),
						},
					};
					Some(messages::ContentBlock::Image { source })
				},
				completions::ContentPart::Refusal { refusal } => {
					Some(messages::ContentBlock::text(refusal.clone()))
				},
				other => {
					tracing::warn!(part = ?other, "content part is not supported by Anthropic, dropping");
					None
				},
			})
			.collect(),
	}
}

fn assistant_blocks(
	msg: &completions::RequestMessage,
) -> Result<Vec<messages::ContentBlock>, AIError> {
	let mut blocks = Vec::new();
	if let Some(text) = msg.text().filter(|t| !t.is_empty()) {
		blocks.push(messages::ContentBlock::text(text));
	}
	for call in msg.tool_calls.iter().flatten() {
		blocks.push(messages::ContentBlock::ToolUse {
			id: call.id.clone(),
			name: call.function.name.clone(),
			input: tool_arguments(&call.function)?,
		});
	}
	Ok(blocks)
}

pub(crate) fn tool_arguments(call: &completions::FunctionCall) -> Result<Value, AIError> {
	if call.arguments.trim().is_empty() {
		return Ok(Value::Object(Default::default()));
	}
	serde_json::from_str(&call.arguments).map_err(|e| {
		AIError::InvalidRequest(strng::format!(
			"arguments of tool call {} are not valid JSON: {e}",
			call.name
		))
	})
}

fn tool_result(msg: &completions::RequestMessage) -> Result<messages::ContentBlock, AIError> {
	let tool_use_id = msg
		.tool_call_id
		.clone()
		.ok_or_else(|| AIError::MissingField(strng::literal!("tool_call_id")))?;
	Ok(messages::ContentBlock::ToolResult {
		tool_use_id,
		content: messages::ToolResultContent::Text(msg.text().unwrap_or_default()),
		is_error: None,
	})
}

fn empty_object_schema() -> Value {
	serde_json::json!({"type": "object", "properties": {}})
}

fn tools(tools: &[completions::Tool]) -> Result<Vec<messages::Tool>, AIError> {
	let mut out = Vec::with_capacity(tools.len());
	for tool in tools {
		let completions::Tool::Function { function } = tool else {
			tracing::warn!("only function tools are supported by Anthropic, dropping tool");
			continue;
		};
		let schema_err = |source| AIError::ToolSchema {
			tool: strng::new(&function.name),
			source,
		};
		// Anthropic accepts full JSON Schema, but not references.
		let input_schema = match &function.parameters {
			Some(p) => jsonschema::dereference(p, p).map_err(schema_err)?,
			None => empty_object_schema(),
		};
		if !input_schema.is_object() {
			return Err(schema_err(jsonschema::SchemaError::InvalidSchema(
				"parameters must be an object".to_string(),
			)));
		}
		out.push(messages::Tool {
			name: function.name.clone(),
			description: function.description.clone(),
			input_schema,
		});
	}
	Ok(out)
}

pub(crate) fn finish_reason(r: messages::StopReason) -> completions::FinishReason {
	match r {
		messages::StopReason::EndTurn
		| messages::StopReason::StopSequence
		| messages::StopReason::PauseTurn => completions::FinishReason::Stop,
		messages::StopReason::MaxTokens | messages::StopReason::ModelContextWindowExceeded => {
			completions::FinishReason::Length
		},
		messages::StopReason::ToolUse => completions::FinishReason::ToolCalls,
		messages::StopReason::Refusal => completions::FinishReason::ContentFilter,
	}
}

/// Converts a Messages response into a chat completion.
pub(crate) fn to_completion(resp: messages::MessagesResponse, model: &str) -> completions::Response {
	let mut content: Option<String> = None;
	let mut reasoning: Option<String> = None;
	let mut tool_calls = Vec::new();
	for block in resp.content {
		match block {
			messages::ContentBlock::Text { text } => content.get_or_insert_default().push_str(&text),
			messages::ContentBlock::Thinking { thinking, .. } => {
				reasoning.get_or_insert_default().push_str(&thinking)
			},
			messages::ContentBlock::ToolUse { id, name, input } => {
				tool_calls.push(completions::MessageToolCall {
					id,
					kind: completions::ToolType::Function,
					function: completions::FunctionCall {
						name,
						arguments: input.to_string(),
					},
				})
			},
			_ => {},
		}
	}
	let usage = completions::Usage::from_token_usage(&resp.usage.to_token_usage());
	completions::Response {
		id: resp.id,
		object: "chat.completion".to_string(),
		// Messages responses carry no timestamp.
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
			finish_reason: resp.stop_reason.map(finish_reason),
			logprobs: None,
		}],
		usage: Some(usage),
		system_fingerprint: None,
		service_tier: None,
	}
}

/// ChunkWriter turns Messages stream events into chat completion chunks.
#[derive(Debug, Default)]
pub(crate) struct ChunkWriter {
	id: String,
	created: u32,
	model: String,
	include_usage: bool,
	start_usage: messages::Usage,
	// Content block index to tool call index.
	tool_calls: HashMap<usize, u32>,
}

impl ChunkWriter {
	pub(crate) fn new(include_usage: bool) -> Self {
		ChunkWriter {
			id: completion_id(),
			created: completions::unix_now(),
			include_usage,
			..Default::default()
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
			model: self.model.clone(),
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

	fn tool_chunk(&self, call: completions::ToolCallChunk) -> completions::StreamResponse {
		self.chunk(
			completions::StreamResponseDelta {
				tool_calls: Some(vec![call]),
				..Default::default()
			},
			None,
		)
	}

	pub(crate) fn write(
		&mut self,
		ev: messages::MessagesStreamEvent,
		stream: &mut StreamState,
		out: &mut BytesMut,
	) -> Result<(), AIError> {
		match ev {
			messages::MessagesStreamEvent::MessageStart { message } => {
				if !message.id.is_empty() {
					self.id = message.id;
				}
				self.model = message.model;
				stream.observe_model(Some(&self.model));
				self.start_usage = message.usage;
				stream.record_usage(&message.usage.to_token_usage());
				let delta = completions::StreamResponseDelta {
					role: Some(completions::Role::Assistant),
					content: Some(String::new()),
					..Default::default()
				};
				stream.emit(out, &self.chunk(delta, None))?;
			},
			messages::MessagesStreamEvent::ContentBlockStart {
				index,
				content_block,
			} => match content_block {
				messages::ContentBlock::ToolUse { id, name, .. } => {
					let call_index = self.tool_calls.len() as u32;
					self.tool_calls.insert(index, call_index);
					let call = completions::ToolCallChunk {
						index: call_index,
						id: Some(id),
						kind: Some(completions::ToolType::Function),
						function: Some(completions::FunctionCallStream {
							name: Some(name),
							arguments: Some(String::new()),
						}),
					};
					stream.emit(out, &self.tool_chunk(call))?;
				},
				messages::ContentBlock::Text { text } if !text.is_empty() => {
					let delta = completions::StreamResponseDelta {
						content: Some(text),
						..Default::default()
					};
					stream.emit(out, &self.chunk(delta, None))?;
				},
				_ => {},
			},
			messages::MessagesStreamEvent::ContentBlockDelta { index, delta } => {
				let delta = match delta {
					messages::ContentBlockDelta::TextDelta { text } => completions::StreamResponseDelta {
						content: Some(text),
						..Default::default()
					},
					messages::ContentBlockDelta::ThinkingDelta { thinking } => {
						completions::StreamResponseDelta {
							reasoning_content: Some(thinking),
							..Default::default()
						}
					},
					messages::ContentBlockDelta::InputJsonDelta { partial_json } => {
						let Some(call_index) = self.tool_calls.get(&index).copied() else {
							tracing::debug!(index, "input delta for unknown content block");
							return Ok(());
						};
						let call = completions::ToolCallChunk {
							index: call_index,
							function: Some(completions::FunctionCallStream {
								name: None,
								arguments: Some(partial_json),
							}),
							..Default::default()
						};
						return stream.emit(out, &self.tool_chunk(call));
					},
					messages::ContentBlockDelta::SignatureDelta { .. }
					| messages::ContentBlockDelta::CitationsDelta { .. } => return Ok(()),
				};
				stream.emit(out, &self.chunk(delta, None))?;
			},
			messages::MessagesStreamEvent::MessageDelta { delta, usage } => {
				let usage = usage.apply_to(&self.start_usage);
				stream.record_usage(&usage);
				let finish = delta.stop_reason.map(finish_reason);
				stream.emit(out, &self.chunk(Default::default(), finish))?;
				if self.include_usage {
					let mut chunk = self.chunk(Default::default(), None);
					chunk.choices.clear();
					chunk.usage = Some(completions::Usage::from_token_usage(&usage));
					stream.emit(out, &chunk)?;
				}
			},
			messages::MessagesStreamEvent::Error { error } => {
				tracing::debug!(kind = %error.r#type, "error event in stream");
				let env = ErrorEnvelope {
					r#type: "error".to_string(),
					error: ErrorBody {
						r#type: error.r#type,
						message: error.message,
						code: None,
					},
				};
				stream.emit(out, &env)?;
			},
			messages::MessagesStreamEvent::ContentBlockStop { .. }
			| messages::MessagesStreamEvent::MessageStop
			| messages::MessagesStreamEvent::Ping => {},
		}
		Ok(())
	}
}
