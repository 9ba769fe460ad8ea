//! Native Anthropic Messages requests, forwarded to Anthropic, Vertex AI or Bedrock.

use std::io::Read;

use bytes::BytesMut;
use http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::json;
use crate::llm::conversion::openai::{Passthrough, UsageRule};
use crate::llm::conversion::{InvokeFrame, invoke_frames, stream_mutation, upstream_model};
use crate::llm::errors;
use crate::llm::streaming::StreamState;
use crate::llm::types::messages::typed::{MessagesError, MessagesStreamEvent, Usage};
use crate::llm::types::messages::{self, typed};
use crate::llm::{
	AIError, BodyBuffer, ErrorMutation, HeaderMutation, RequestMutation, ResponseMutation,
	SSE_CONTENT_TYPE, Translator, anthropic, bedrock, response_model, vertex,
};
use crate::parse::aws_sse::EventStreamCodec;
use crate::strng::Strng;

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;

/// Anthropic's own API.
pub fn anthropic(model_name_override: Option<Strng>) -> Passthrough {
	Passthrough::new(
		|_, _| anthropic::messages_path(),
		UsageRule::Anthropic,
		errors::ANTHROPIC,
		model_name_override,
	)
}

/// Claude on Vertex AI. The stream is already Anthropic SSE, so only the body changes.
pub fn gcp_anthropic(model_name_override: Option<Strng>) -> Passthrough {
	Passthrough::new(
		vertex::raw_predict_path,
		UsageRule::Anthropic,
		errors::GCP_ANTHROPIC,
		model_name_override,
	)
	.with_rewrite(|body| anthropic::prepare_cloud_body(body, vertex::ANTHROPIC_VERSION))
}

/// Claude on Bedrock `InvokeModel`. Streams are re-framed from EventStream into Anthropic SSE.
pub struct MessagesToBedrock {
	version: Option<Strng>,
	model_name_override: Option<Strng>,
	request_model: Strng,
	streaming: bool,
	stream: StreamState,
	decoder: EventStreamCodec,
	start_usage: Usage,
	body: BodyBuffer,
}

impl MessagesToBedrock {
	pub fn new(version: Option<Strng>, model_name_override: Option<Strng>) -> Self {
		MessagesToBedrock {
			version,
			model_name_override,
			request_model: Strng::default(),
			streaming: false,
			stream: StreamState::new(),
			decoder: EventStreamCodec::new(),
			start_usage: Usage::default(),
			body: BodyBuffer::default(),
		}
	}

	fn version(&self) -> &str {
		self
			.version
			.as_deref()
			.filter(|v| !v.is_empty())
			.unwrap_or(anthropic::DEFAULT_BEDROCK_VERSION)
	}

	fn observe(&mut self, ev: &MessagesStreamEvent) {
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
	}
}

impl Translator<messages::Request> for MessagesToBedrock {
	fn request_body(
		&mut self,
		raw: &[u8],
		req: &messages::Request,
		_force_body_mutation: bool,
	) -> Result<RequestMutation, AIError> {
		self.request_model = upstream_model(
			req.model.as_deref().unwrap_or_default(),
			self.model_name_override.as_ref(),
		);
		self.streaming = req.is_streaming();
		let version = self.version().to_string();
		let body = json::rewrite_object(raw, |obj| {
			anthropic::prepare_cloud_body(obj, &version);
			// Bedrock selects streaming by path and rejects the flag.
			obj.remove("stream");
		})
		.map_err(AIError::RequestParsing)?;
		Ok(
			RequestMutation::route(bedrock::invoke_path(&self.request_model, self.streaming))
				.with_body(body),
		)
	}

	fn response_headers(&mut self, _headers: &HeaderMap) -> Result<Vec<HeaderMutation>, AIError> {
		if self.streaming {
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
			// The body is forwarded as it arrives; usage is read once it is complete.
			let Some(raw) = self.body.collect(body, end_of_stream)? else {
				return Ok(ResponseMutation::default());
			};
			let resp: typed::MessagesResponse =
				serde_json::from_slice(&raw).map_err(AIError::MalformedUpstreamResponse)?;
			return Ok(ResponseMutation {
				usage: resp.usage.to_token_usage(),
				response_model: response_model(Some(resp.model.as_str()), &self.request_model),
				..Default::default()
			});
		}

		self.stream.feed(body)?;
		let mut out = BytesMut::new();
		for frame in invoke_frames(&mut self.stream, &mut self.decoder, end_of_stream) {
			match frame {
				InvokeFrame::Chunk(payload) => {
					// Forward the event as received, so fields this crate does not model survive.
					let event: Value = match serde_json::from_slice(&payload) {
						Ok(v) => v,
						Err(e) => {
							tracing::debug!("dropping undecodable messages event: {e}");
							continue;
						},
					};
					let Some(name) = event.get("type").and_then(Value::as_str).map(ToOwned::to_owned)
					else {
						tracing::debug!("dropping messages event without a type");
						continue;
					};
					if let Ok(ev) = serde_json::from_value::<MessagesStreamEvent>(event.clone()) {
						self.observe(&ev);
					}
					self.stream.emit_named(&mut out, &name, &event)?;
				},
				InvokeFrame::Exception { kind, message } => {
					tracing::debug!(%kind, "exception in messages stream");
					let ev = MessagesStreamEvent::Error {
						error: MessagesError {
							r#type: kind,
							message,
						},
					};
					self.stream.emit_named(&mut out, ev.event_name(), &ev)?;
				},
			}
		}
		self.stream.finish(&mut out, end_of_stream, false);
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
		errors::AWS_ANTHROPIC.normalize_anthropic(status, headers, body)
	}
}
