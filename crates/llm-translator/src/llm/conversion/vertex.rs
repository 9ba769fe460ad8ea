//! Gemini models on Vertex AI: chat completions over `generateContent` and embeddings over
//! `embedContent`.

use std::collections::HashMap;
use std::io::Read;

use bytes::BytesMut;
use http::{HeaderMap, StatusCode};
use itertools::Itertools;
use serde_json::{Value, json};

use crate::json;
use crate::llm::conversion::anthropic::tool_arguments;
use crate::llm::conversion::{
	body_mutation, completion_id, held_fragment, stream_mutation, upstream_model,
};
use crate::llm::errors;
use crate::llm::streaming::StreamState;
use crate::llm::types::{completions, embeddings, gemini};
use crate::llm::{
	AIError, BodyBuffer, ErrorMutation, RequestMutation, ResponseMutation, TokenUsage, Translator,
	jsonschema, response_model, vertex,
};
use crate::strng;
use crate::strng::Strng;

#[cfg(test)]
#[path = "vertex_tests.rs"]
mod tests;

pub const TASK_TYPE_RETRIEVAL_DOCUMENT: &str = "RETRIEVAL_DOCUMENT";

const ROLE_USER: &str = "user";
const ROLE_MODEL: &str = "model";

pub struct ChatToGemini {
	model_name_override: Option<Strng>,
	request_model: Strng,
	streaming: bool,
	include_usage: bool,
	stream: StreamState,
	body: BodyBuffer,
	id: String,
	created: u32,
	tool_calls: u32,
}

impl ChatToGemini {
	pub fn new(model_name_override: Option<Strng>) -> Self {
		ChatToGemini {
			model_name_override,
			request_model: Strng::default(),
			streaming: false,
			include_usage: false,
			stream: StreamState::new(),
			body: BodyBuffer::default(),
			id: completion_id(),
			created: completions::unix_now(),
			tool_calls: 0,
		}
	}

	fn write_chunk(
		&mut self,
		resp: gemini::GenerateContentResponse,
		out: &mut BytesMut,
	) -> Result<(), AIError> {
		self.stream.observe_model(resp.model_version.as_deref());
		if let Some(id) = resp.response_id.as_ref().filter(|id| !id.is_empty()) {
			self.id.clone_from(id);
		}
		let usage = resp.usage_metadata.map(|u| u.to_token_usage());
		if let Some(u) = &usage {
			self.stream.record_usage(u);
		}
		let model = self
			.stream
			.response_model(&self.request_model)
			.to_string();

		let mut choices = Vec::with_capacity(resp.candidates.len());
		let mut finished = false;
		for candidate in resp.candidates {
			let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
			let mut delta = completions::StreamResponseDelta::default();
			let mut calls = Vec::new();
			for part in parts {
				if let Some(call) = part.function_call {
					let index = self.tool_calls;
					self.tool_calls += 1;
					calls.push(completions::ToolCallChunk {
						index,
						id: Some(call.id.unwrap_or_else(|| format!("call_{index}"))),
						kind: Some(completions::ToolType::Function),
						function: Some(completions::FunctionCallStream {
							name: Some(call.name),
							arguments: Some(call.args.to_string()),
						}),
					});
				} else if let Some(text) = part.text {
					let target = if part.thought.unwrap_or_default() {
						&mut delta.reasoning_content
					} else {
						&mut delta.content
					};
					target.get_or_insert_default().push_str(&text);
				}
			}
			let finish_reason = candidate
				.finish_reason
				.map(|r| finish_reason(r, !calls.is_empty() || self.tool_calls > 0));
			finished |= finish_reason.is_some();
			if !calls.is_empty() {
				delta.tool_calls = Some(calls);
			}
			choices.push(completions::ChatChoiceStream {
				index: candidate.index.unwrap_or_default(),
				delta,
				finish_reason,
				logprobs: None,
			});
		}

		let chunk = completions::StreamResponse {
			id: self.id.clone(),
			object: "chat.completion.chunk".to_string(),
			created: self.created,
			model,
			choices,
			usage: None,
			system_fingerprint: None,
		};
		if !chunk.choices.is_empty() {
			self.stream.emit(out, &chunk)?;
		}
		// Gemini reports usage on every chunk; it is only forwarded once the candidates finish.
		if finished && self.include_usage {
			let mut chunk = chunk;
			chunk.choices.clear();
			chunk.usage = Some(completions::Usage::from_token_usage(&self.stream.usage()));
			self.stream.emit(out, &chunk)?;
		}
		Ok(())
	}
}

impl Translator<completions::Request> for ChatToGemini {
	fn request_body(
		&mut self,
		_raw: &[u8],
		req: &completions::Request,
		_force_body_mutation: bool,
	) -> Result<RequestMutation, AIError> {
		self.request_model = upstream_model(&req.model, self.model_name_override.as_ref());
		self.streaming = req.is_streaming();
		self.include_usage = req.include_usage();

		let body = to_generate_content(req)?;
		let body = json::to_bytes(&body).map_err(AIError::RequestMarshal)?;
		Ok(
			RequestMutation::route(vertex::generate_content_path(
				&self.request_model,
				self.streaming,
			))
			.with_body(body),
		)
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
			let resp: gemini::GenerateContentResponse =
				serde_json::from_slice(&raw).map_err(AIError::MalformedUpstreamResponse)?;
			let usage = resp
				.usage_metadata
				.map(|u| u.to_token_usage())
				.unwrap_or_default();
			let model = response_model(resp.model_version.as_deref(), &self.request_model);
			let out = to_completion(resp, &model, &usage);
			let body = json::to_bytes(&out).map_err(AIError::ResponseMarshal)?;
			return Ok(body_mutation(body, usage, model));
		}

		self.stream.feed(body)?;
		let mut out = BytesMut::new();
		for ev in self.stream.sse_events(end_of_stream) {
			match serde_json::from_str::<gemini::GenerateContentResponse>(&ev.data) {
				Ok(resp) => self.write_chunk(resp, &mut out)?,
				Err(e) => tracing::debug!("skipping unparsable gemini chunk: {e}"),
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
		errors::GCP_VERTEX_AI.normalize(status, headers, body)
	}
}

/// The parts shared by `generateContent` and `countTokens`.
pub(crate) struct GeminiParts {
	pub contents: Vec<gemini::Content>,
	pub system_instruction: Option<gemini::Content>,
	pub tools: Vec<gemini::Tool>,
}

pub(crate) fn gemini_parts(req: &completions::Request) -> Result<GeminiParts, AIError> {
	// Function responses are keyed by name, which only the preceding call carries.
	let mut call_names: HashMap<&str, &str> = HashMap::new();
	let mut contents: Vec<gemini::Content> = Vec::new();
	for msg in req.messages.iter().filter(|m| !m.is_system()) {
		let (role, parts) = match msg.role {
			completions::Role::Assistant => {
				let mut parts = Vec::new();
				if let Some(text) = msg.text().filter(|t| !t.is_empty()) {
					parts.push(gemini::Part::text(text));
				}
				for call in msg.tool_calls.iter().flatten() {
					call_names.insert(&call.id, &call.function.name);
					parts.push(gemini::Part {
						function_call: Some(gemini::FunctionCall {
							id: Some(call.id.clone()),
							name: call.function.name.clone(),
							args: tool_arguments(&call.function)?,
						}),
						..Default::default()
					});
				}
				(ROLE_MODEL, parts)
			},
			completions::Role::Tool | completions::Role::Function => {
				let id = msg
					.tool_call_id
					.as_deref()
					.ok_or_else(|| AIError::MissingField(strng::literal!("tool_call_id")))?;
				let name = call_names
					.get(id)
					.copied()
					.or(msg.name.as_deref())
					.ok_or_else(|| {
						AIError::InvalidRequest(strng::format!("no tool call with id {id} precedes its result"))
					})?;
				let part = gemini::Part {
					function_response: Some(gemini::FunctionResponse {
						name: name.to_string(),
						response: function_response(msg.text().unwrap_or_default()),
					}),
					..Default::default()
				};
				(ROLE_USER, vec![part])
			},
			_ => (ROLE_USER, user_parts(msg)),
		};
		if parts.is_empty() {
			continue;
		}
		match contents.last_mut() {
			Some(prev) if prev.role.as_deref() == Some(role) => prev.parts.extend(parts),
			_ => contents.push(gemini::Content {
				role: Some(role.to_string()),
				parts,
			}),
		}
	}

	let tools = match req.tools.as_deref() {
		Some(tools) => function_declarations(tools)?,
		None => Vec::new(),
	};
	Ok(GeminiParts {
		contents,
		system_instruction: req
			.system_prompt()
			.map(|s| gemini::Content::text(None, s)),
		tools,
	})
}

/// Converts a chat request into a `generateContent` request.
pub(crate) fn to_generate_content(
	req: &completions::Request,
) -> Result<gemini::GenerateContentRequest, AIError> {
	let GeminiParts {
		contents,
		system_instruction,
		tools,
	} = gemini_parts(req)?;

	let tool_config = req.tool_choice.as_ref().map(|c| {
		let (mode, allowed_function_names) = match c {
			completions::ToolChoiceOption::Named(n) => {
				(gemini::FunctionCallingMode::Any, vec![n.function.name.clone()])
			},
			completions::ToolChoiceOption::Mode(completions::ToolChoiceMode::Required) => {
				(gemini::FunctionCallingMode::Any, Vec::new())
			},
			completions::ToolChoiceOption::Mode(completions::ToolChoiceMode::Auto) => {
				(gemini::FunctionCallingMode::Auto, Vec::new())
			},
			completions::ToolChoiceOption::Mode(completions::ToolChoiceMode::None) => {
				(gemini::FunctionCallingMode::None, Vec::new())
			},
		};
		gemini::ToolConfig {
			function_calling_config: gemini::FunctionCallingConfig {
				mode,
				allowed_function_names,
			},
		}
	});

	let (response_mime_type, response_schema) = response_format(req)?;
	let config = gemini::GenerationConfig {
		temperature: req.temperature,
		top_p: req.top_p,
		top_k: req.top_k,
		candidate_count: req.n,
		max_output_tokens: req.max_tokens(),
		stop_sequences: req.stop_sequences(),
		presence_penalty: req.presence_penalty,
		frequency_penalty: req.frequency_penalty,
		seed: req.seed,
		response_mime_type,
		response_schema,
		thinking_config: thinking(req)?,
	};

	Ok(gemini::GenerateContentRequest {
		contents,
		system_instruction,
		generation_config: (!config.is_empty()).then_some(config),
		tools,
		tool_config,
	})
}

fn user_parts(msg: &completions::RequestMessage) -> Vec<gemini::Part> {
	match &msg.content {
		None => Vec::new(),
		Some(completions::Content::Text(t)) => vec![gemini::Part::text(t.clone())],
		Some(completions::Content::Parts(parts)) => parts
			.iter()
			.filter_map(|p| match p {
				completions::ContentPart::Text { text } => Some(gemini::Part::text(text.clone())),
				completions::ContentPart::ImageUrl { image_url } => {
					Some(match image_url.as_data_url() {
						Some((mime_type, data)) => gemini::Part {
							inline_data: Some(gemini::Blob {
								mime_type: mime_type.to_string(),
								data: data.to_string(),
							}),
							..Default::default()
						},
						None => gemini::Part {
							file_data: Some(gemini::FileData {
								mime_type: None,
								file_uri: image_url.url.clone(),
							}),
							..Default::default()
						},
					})
				},
				other => {
					tracing::warn!(part = ?other, "content part is not supported by Gemini, dropping");
					None
				},
			})
			.collect(),
	}
}

// Gemini wants an object; JSON object results are forwarded as is.
fn function_response(text: String) -> Value {
	match serde_json::from_str::<Value>(&text) {
		Ok(v @ Value::Object(_)) => v,
		_ => json!({ "content": text }),
	}
}

fn function_declarations(tools: &[completions::Tool]) -> Result<Vec<gemini::Tool>, AIError> {
	let mut declarations = Vec::with_capacity(tools.len());
	for tool in tools {
		let completions::Tool::Function { function } = tool else {
			tracing::warn!("only function tools are supported by Gemini, dropping tool");
			continue;
		};
		let parameters = function
			.parameters
			.as_ref()
			.map(|p| jsonschema::sanitize(p, p))
			.transpose()
			.map_err(|source| AIError::ToolSchema {
				tool: strng::new(&function.name),
				source,
			})?;
		declarations.push(gemini::FunctionDeclaration {
			name: function.name.clone(),
			description: function.description.clone(),
			parameters,
		});
	}
	if declarations.is_empty() {
		return Ok(Vec::new());
	}
	Ok(vec![gemini::Tool {
		function_declarations: declarations,
	}])
}

fn response_format(req: &completions::Request) -> Result<(Option<String>, Option<Value>), AIError> {
	let Some(format) = &req.response_format else {
		return Ok((None, None));
	};
	match format.get("type").and_then(Value::as_str) {
		Some("json_object") => Ok((Some("application/json".to_string()), None)),
		Some("json_schema") => {
			let schema = format
				.pointer("/json_schema/schema")
				.ok_or_else(|| AIError::MissingField(strng::literal!("response_format.json_schema.schema")))?;
			let schema = jsonschema::sanitize(schema, schema).map_err(|source| AIError::ToolSchema {
				tool: strng::literal!("response_format"),
				source,
			})?;
			Ok((Some("application/json".to_string()), Some(schema)))
		},
		_ => Ok((None, None)),
	}
}

fn thinking(req: &completions::Request) -> Result<Option<gemini::ThinkingConfig>, AIError> {
	if let Some(budget) = req
		.vendor_field("thinking_budget_tokens")
		.and_then(Value::as_i64)
	{
		let budget = i32::try_from(budget).map_err(|_| {
			AIError::InvalidRequest(strng::format!("thinking_budget_tokens {budget} is out of range"))
		})?;
		return Ok(Some(gemini::ThinkingConfig {
			include_thoughts: Some(true),
			thinking_budget: Some(budget),
		}));
	}
	let Some(effort) = req.reasoning_effort else {
		return Ok(None);
	};
	let budget = match effort {
		completions::ReasoningEffort::None => {
			return Ok(Some(gemini::ThinkingConfig {
				include_thoughts: None,
				thinking_budget: Some(0),
			}));
		},
		completions::ReasoningEffort::Minimal | completions::ReasoningEffort::Low => 1024,
		completions::ReasoningEffort::Medium => 8192,
		completions::ReasoningEffort::High | completions::ReasoningEffort::Xhigh => 24576,
	};
	Ok(Some(gemini::ThinkingConfig {
		include_thoughts: Some(true),
		thinking_budget: Some(budget),
	}))
}

pub(crate) fn finish_reason(r: gemini::FinishReason, has_tool_calls: bool) -> completions::FinishReason {
	match r {
		gemini::FinishReason::MaxTokens => completions::FinishReason::Length,
		gemini::FinishReason::Safety
		| gemini::FinishReason::Recitation
		| gemini::FinishReason::Blocklist
		| gemini::FinishReason::ProhibitedContent
		| gemini::FinishReason::Spii
		| gemini::FinishReason::ImageSafety => completions::FinishReason::ContentFilter,
		_ if has_tool_calls => completions::FinishReason::ToolCalls,
		_ => completions::FinishReason::Stop,
	}
}

fn to_completion(
	resp: gemini::GenerateContentResponse,
	model: &str,
	usage: &TokenUsage,
) -> completions::Response {
	let mut choices = Vec::with_capacity(resp.candidates.len());
	for (i, candidate) in resp.candidates.into_iter().enumerate() {
		let mut content: Option<String> = None;
		let mut reasoning: Option<String> = None;
		let mut tool_calls = Vec::new();
		for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
			if let Some(call) = part.function_call {
				let id = call
					.id
					.unwrap_or_else(|| format!("call_{}", tool_calls.len()));
				tool_calls.push(completions::MessageToolCall {
					id,
					kind: completions::ToolType::Function,
					function: completions::FunctionCall {
						name: call.name,
						arguments: call.args.to_string(),
					},
				});
			} else if let Some(text) = part.text {
				let target = if part.thought.unwrap_or_default() {
					&mut reasoning
				} else {
					&mut content
				};
				target.get_or_insert_default().push_str(&text);
			}
		}
		let finish_reason = candidate
			.finish_reason
			.map(|r| finish_reason(r, !tool_calls.is_empty()));
		choices.push(completions::ChatChoice {
			index: candidate.index.unwrap_or(i as u32),
			message: completions::ResponseMessage {
				role: completions::Role::Assistant,
				content,
				tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
				reasoning_content: reasoning,
				refusal: None,
			},
			finish_reason,
			logprobs: None,
		});
	}
	completions::Response {
		id: resp
			.response_id
			.filter(|id| !id.is_empty())
			.unwrap_or_else(completion_id),
		object: "chat.completion".to_string(),
		created: completions::unix_now(),
		model: model.to_string(),
		choices,
		usage: Some(completions::Usage::from_token_usage(usage)),
		system_fingerprint: None,
		service_tier: None,
	}
}

pub struct EmbeddingsToVertex {
	model_name_override: Option<Strng>,
	request_model: Strng,
	body: BodyBuffer,
}

impl EmbeddingsToVertex {
	pub fn new(model_name_override: Option<Strng>) -> Self {
		EmbeddingsToVertex {
			model_name_override,
			request_model: Strng::default(),
			body: BodyBuffer::default(),
		}
	}
}

impl Translator<embeddings::Request> for EmbeddingsToVertex {
	fn request_body(
		&mut self,
		_raw: &[u8],
		req: &embeddings::Request,
		_force_body_mutation: bool,
	) -> Result<RequestMutation, AIError> {
		self.request_model = upstream_model(&req.model, self.model_name_override.as_ref());
		let body = to_embed_content(req)?;
		let body = json::to_bytes(&body).map_err(AIError::RequestMarshal)?;
		Ok(
			RequestMutation::route(vertex::model_path(
				vertex::PUBLISHER_GOOGLE,
				&self.request_model,
				vertex::METHOD_EMBED_CONTENT,
			))
			.with_body(body),
		)
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
		let resp: gemini::EmbedContentResponse =
			serde_json::from_slice(&raw).map_err(AIError::MalformedUpstreamResponse)?;
		let out = from_embed_content(resp, &self.request_model)?;
		let usage = TokenUsage::from_input_only(out.usage.prompt_tokens);
		let body = json::to_bytes(&out).map_err(AIError::ResponseMarshal)?;
		Ok(body_mutation(body, usage, self.request_model.clone()))
	}

	fn response_error(
		&mut self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &mut dyn Read,
	) -> Result<ErrorMutation, AIError> {
		errors::GCP_VERTEX_AI.normalize(status, headers, body)
	}
}

pub(crate) fn to_embed_content(
	req: &embeddings::Request,
) -> Result<gemini::EmbedContentRequest, AIError> {
	req.validate()?;
	let content = match (&req.input, &req.messages) {
		(Some(input), _) => {
			let texts = input.texts().ok_or_else(|| {
				AIError::InvalidRequest(strng::literal!(
					"token array inputs are not supported by Vertex AI embeddings"
				))
			})?;
			gemini::Content {
				role: None,
				parts: texts.into_iter().map(gemini::Part::text).collect(),
			}
		},
		(None, Some(messages)) => {
			let text = messages
				.iter()
				.map(|m| m.text().unwrap_or_default())
				.join("\n");
			gemini::Content::text(None, text)
		},
		(None, None) => return Err(AIError::MissingField(strng::literal!("input"))),
	};

	let task_type = req.task_type.clone().or_else(|| {
		req
			.rest
			.get("task_type")
			.and_then(Value::as_str)
			.map(ToOwned::to_owned)
	});
	let title = if task_type.as_deref() == Some(TASK_TYPE_RETRIEVAL_DOCUMENT) {
		let text = content
			.parts
			.iter()
			.filter_map(|p| p.text.as_deref())
			.filter(|t| !t.is_empty())
			.join(" ");
		document_title(&text)
	} else {
		None
	};
	let config = gemini::EmbedContentConfig {
		task_type,
		title,
		output_dimensionality: req.dimensions.filter(|d| *d > 0),
	};
	Ok(gemini::EmbedContentRequest {
		content,
		config: (!config.is_empty()).then_some(config),
	})
}

/// The first line of a document, when it reads like a heading.
pub(crate) fn document_title(content: &str) -> Option<String> {
	let first = content.trim().lines().next()?.trim();
	if first.is_empty() || first.len() >= 100 || first.ends_with(['.', '!', '?']) {
		return None;
	}
	Some(first.to_string())
}

fn from_embed_content(
	resp: gemini::EmbedContentResponse,
	model: &str,
) -> Result<embeddings::Response, AIError> {
	let gemini::EmbedContentResponse {
		embedding,
		embeddings: mut all,
		token_count,
	} = resp;
	if let Some(e) = embedding {
		all.insert(0, e);
	}
	let from_statistics: f64 = all
		.iter()
		.filter_map(|e| e.statistics.map(|s| s.token_count))
		.sum();
	let tokens = match token_count {
		Some(n) if n > 0 => n,
		_ => from_statistics as u32,
	};
	let data = all
		.into_iter()
		.enumerate()
		.map(|(index, e)| {
			Ok(embeddings::Embedding {
				object: "embedding".to_string(),
				index: index as u32,
				embedding: serde_json::to_value(e.values).map_err(AIError::ResponseMarshal)?,
			})
		})
		.collect::<Result<Vec<_>, AIError>>()?;
	Ok(embeddings::Response {
		object: "list".to_string(),
		data,
		model: model.to_string(),
		usage: embeddings::Usage {
			prompt_tokens: tokens,
			total_tokens: tokens,
		},
	})
}
