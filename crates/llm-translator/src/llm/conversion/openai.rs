//! Passthrough translators, for backends that already speak the client's API.
//!
//! The body is forwarded as is (apart from the model override), but responses are still
//! parsed so usage and the response model can be reported.

use std::io::Read;

use bytes::BytesMut;
use http::{HeaderMap, StatusCode};
use serde_json::{Map, Value};

use crate::json;
use crate::llm::conversion::{WireRequest, stream_mutation, upstream_model};
use crate::llm::errors::ErrorDialect;
use crate::llm::streaming::StreamState;
use crate::llm::types::messages::typed::{MessagesStreamEvent, Usage as AnthropicUsage};
use crate::llm::types::{completions, embeddings, images, messages, rerank, tokenize};
use crate::llm::{
	AIError, BodyBuffer, ErrorMutation, RequestMutation, ResponseMutation, TokenUsage, Translator,
	response_model,
};
use crate::parse::sse;
use crate::strng::Strng;

#[cfg(test)]
#[path = "openai_tests.rs"]
mod tests;

/// How usage is read from a passthrough response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageRule {
	/// Chat and legacy completions: `usage.{prompt,completion}_tokens`.
	Completions,
	/// `usage.prompt_tokens` only.
	Embeddings,
	/// `usage.{input,output}_tokens` of `gpt-image` models.
	Images,
	/// `count` is the input token count.
	Tokenize,
	/// `meta.tokens.input_tokens`.
	Rerank,
	/// Anthropic Messages, with cache reads and writes folded into the input.
	Anthropic,
}

impl UsageRule {
	fn from_body(self, raw: &[u8]) -> Result<(TokenUsage, Option<String>), AIError> {
		let parse_err = AIError::MalformedUpstreamResponse;
		Ok(match self {
			UsageRule::Completions => {
				let r: completions::UsageEnvelope = serde_json::from_slice(raw).map_err(parse_err)?;
				(
					r.usage.map(|u| u.to_token_usage()).unwrap_or_default(),
					r.model,
				)
			},
			UsageRule::Embeddings => {
				let r: embeddings::UsageEnvelope = serde_json::from_slice(raw).map_err(parse_err)?;
				(
					r.usage
						.map(|u| TokenUsage::from_input_only(u.prompt_tokens))
						.unwrap_or_default(),
					r.model,
				)
			},
			UsageRule::Images => {
				let r: images::Response = serde_json::from_slice(raw).map_err(parse_err)?;
				(
					r.usage.map(|u| u.to_token_usage()).unwrap_or_default(),
					r.model,
				)
			},
			UsageRule::Tokenize => {
				let r: tokenize::Response = serde_json::from_slice(raw).map_err(parse_err)?;
				(TokenUsage::from_input_only(r.count), None)
			},
			UsageRule::Rerank => {
				let r: rerank::Response = serde_json::from_slice(raw).map_err(parse_err)?;
				(r.token_usage(), None)
			},
			UsageRule::Anthropic => {
				let r: messages::typed::MessagesResponse =
					serde_json::from_slice(raw).map_err(parse_err)?;
				(r.usage.to_token_usage(), Some(r.model))
			},
		})
	}
}

type RouteFn = Box<dyn Fn(&str, bool) -> Strng + Send>;
type BodyFn = Box<dyn Fn(&mut Map<String, Value>) + Send>;

/// Passthrough forwards the client body to a backend that speaks the same API.
pub struct Passthrough {
	route: RouteFn,
	rewrite: Option<BodyFn>,
	model_name_override: Option<Strng>,
	usage: UsageRule,
	errors: ErrorDialect,
	request_model: Strng,
	streaming: bool,
	stream: StreamState,
	body: BodyBuffer,
	// Anthropic streams report input usage once, in message_start.
	start_usage: AnthropicUsage,
}

impl Passthrough {
	pub fn new(
		route: impl Fn(&str, bool) -> Strng + Send + 'static,
		usage: UsageRule,
		errors: ErrorDialect,
		model_name_override: Option<Strng>,
	) -> Self {
		Passthrough {
			route: Box::new(route),
			rewrite: None,
			model_name_override,
			usage,
			errors,
			request_model: Strng::default(),
			streaming: false,
			stream: StreamState::new(),
			body: BodyBuffer::default(),
			start_usage: AnthropicUsage::default(),
		}
	}

	/// Applies `f` to the body before it is forwarded.
	pub fn with_rewrite(mut self, f: impl Fn(&mut Map<String, Value>) + Send + 'static) -> Self {
		self.rewrite = Some(Box::new(f));
		self
	}

	fn observe_event(&mut self, name: Option<&str>, data: &str) {
		if self.usage == UsageRule::Anthropic {
			let Ok(ev) = serde_json::from_str::<MessagesStreamEvent>(data) else {
				tracing::debug!(event = name, "skipping unrecognized messages event");
				return;
			};
			match ev {
				MessagesStreamEvent::MessageStart { message } => {
					self.stream.observe_model(Some(&message.model));
					self.start_usage = message.usage;
					self.stream.record_usage(&message.usage.to_token_usage());
				},
				MessagesStreamEvent::MessageDelta { usage, .. } => {
					let u = usage.apply_to(&self.start_usage);
					self.stream.record_usage(&u);
				},
				_ => {},
			}
			return;
		}
		let Ok(chunk) = serde_json::from_str::<completions::UsageEnvelope>(data) else {
			tracing::debug!("skipping unparsable chunk");
			return;
		};
		self.stream.observe_model(chunk.model.as_deref());
		if let Some(u) = chunk.usage {
			self.stream.record_usage(&u.to_token_usage());
		}
	}
}

impl<Req: WireRequest> Translator<Req> for Passthrough {
	fn request_body(
		&mut self,
		raw: &[u8],
		req: &Req,
		force_body_mutation: bool,
	) -> Result<RequestMutation, AIError> {
		self.request_model = upstream_model(req.model(), self.model_name_override.as_ref());
		self.streaming = req.is_streaming();
		let mutation = RequestMutation::route((self.route)(&self.request_model, self.streaming));

		let override_model = self.model_name_override.is_some();
		if !override_model && self.rewrite.is_none() {
			if force_body_mutation {
				return Ok(mutation.with_body(bytes::Bytes::copy_from_slice(raw)));
			}
			return Ok(mutation);
		}
		let model = self.request_model.to_string();
		let body = json::rewrite_object(raw, |obj| {
			if override_model {
				obj.insert("model".to_string(), Value::String(model));
			}
			if let Some(f) = &self.rewrite {
				f(obj);
			}
		})
		.map_err(AIError::RequestParsing)?;
		Ok(mutation.with_body(body))
	}

	fn response_body(
		&mut self,
		_headers: &HeaderMap,
		body: &mut dyn Read,
		end_of_stream: bool,
	) -> Result<ResponseMutation, AIError> {
		if !self.streaming {
			let Some(raw) = self.body.collect(body, end_of_stream)? else {
				return Ok(ResponseMutation::default());
			};
			let (usage, model) = self.usage.from_body(&raw)?;
			return Ok(ResponseMutation {
				usage,
				response_model: response_model(model.as_deref(), &self.request_model),
				..Default::default()
			});
		}

		self.stream.feed(body)?;
		for ev in self.stream.sse_events(end_of_stream) {
			if sse::is_done(&ev) {
				continue;
			}
			self.observe_event(sse::event_name(&ev), &ev.data);
		}
		let mut out = BytesMut::new();
		self.stream.finish(&mut out, end_of_stream, false);
		let mut m = stream_mutation(out, &self.stream, end_of_stream, &self.request_model);
		// The original bytes are forwarded
		m.body = None;
		Ok(m)
	}

	fn response_error(
		&mut self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &mut dyn Read,
	) -> Result<ErrorMutation, AIError> {
		if self.usage == UsageRule::Anthropic {
			self.errors.normalize_anthropic(status, headers, body)
		} else {
			self.errors.normalize(status, headers, body)
		}
	}
}
