//! OpenAI-compatible models served through the Bedrock `InvokeModel` API.
//!
//! The request body is forwarded as is. Streamed responses arrive as EventStream frames wrapping
//! OpenAI chunks and are re-framed as SSE.

use std::io::Read;

use bytes::BytesMut;
use http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::json;
use crate::llm::conversion::{
	InvokeFrame, held_fragment, invoke_frames, stream_mutation, upstream_model,
};
use crate::llm::errors::{self, ErrorBody, ErrorEnvelope};
use crate::llm::streaming::StreamState;
use crate::llm::types::completions;
use crate::llm::{
	AIError, AMZN_REQUEST_ID_HEADER, BodyBuffer, CONTENT_TYPE_HEADER, EVENTSTREAM_CONTENT_TYPE,
	ErrorMutation, HeaderMutation, RequestMutation, ResponseMutation, SSE_CONTENT_TYPE, Translator,
	bedrock, header_str, response_model,
};
use crate::parse::aws_sse::EventStreamCodec;
use crate::strng::Strng;

#[cfg(test)]
#[path = "aws_invoke_tests.rs"]
mod tests;

pub struct ChatToInvokeOpenAI {
	model_name_override: Option<Strng>,
	request_model: Strng,
	streaming: bool,
	request_id: Option<String>,
	stream: StreamState,
	decoder: EventStreamCodec,
	body: BodyBuffer,
}

impl ChatToInvokeOpenAI {
	pub fn new(model_name_override: Option<Strng>) -> Self {
		ChatToInvokeOpenAI {
			model_name_override,
			request_model: Strng::default(),
			streaming: false,
			request_id: None,
			stream: StreamState::new(),
			decoder: EventStreamCodec::new(),
			body: BodyBuffer::default(),
		}
	}
}

impl Translator<completions::Request> for ChatToInvokeOpenAI {
	fn request_body(
		&mut self,
		raw: &[u8],
		req: &completions::Request,
		force_body_mutation: bool,
	) -> Result<RequestMutation, AIError> {
		self.request_model = upstream_model(&req.model, self.model_name_override.as_ref());
		self.streaming = req.is_streaming();
		let mutation = RequestMutation::route(bedrock::invoke_path(&self.request_model, self.streaming));
		if self.model_name_override.is_some() {
			let model = self.request_model.to_string();
			let body = json::rewrite_object(raw, |obj| {
				obj.insert("model".to_string(), Value::String(model));
			})
			.map_err(AIError::RequestParsing)?;
			return Ok(mutation.with_body(body));
		}
		if force_body_mutation {
			return Ok(mutation.with_body(bytes::Bytes::copy_from_slice(raw)));
		}
		Ok(mutation)
	}

	fn response_headers(&mut self, headers: &HeaderMap) -> Result<Vec<HeaderMutation>, AIError> {
		self.request_id = header_str(headers, AMZN_REQUEST_ID_HEADER)
			.filter(|id| !id.is_empty())
			.map(ToOwned::to_owned);
		if self.streaming && header_str(headers, CONTENT_TYPE_HEADER) == Some(EVENTSTREAM_CONTENT_TYPE) {
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
			// Without a request id the body is forwarded as it arrives; otherwise it is held so the
			// id can be rewritten.
			let Some(raw) = self.body.collect(body, end_of_stream)? else {
				return Ok(if self.request_id.is_some() {
					held_fragment()
				} else {
					ResponseMutation::default()
				});
			};
			let env: completions::UsageEnvelope =
				serde_json::from_slice(&raw).map_err(AIError::MalformedUpstreamResponse)?;
			let usage = env.usage.map(|u| u.to_token_usage()).unwrap_or_default();
			let m = ResponseMutation {
				usage,
				response_model: response_model(env.model.as_deref(), &self.request_model),
				..Default::default()
			};
			let Some(id) = self.request_id.clone() else {
				return Ok(m);
			};
			let body = json::rewrite_object(&raw, |obj| {
				obj.insert("id".to_string(), Value::String(id));
			})
			.map_err(AIError::MalformedUpstreamResponse)?;
			return Ok(m.with_body(body));
		}

		self.stream.feed(body)?;
		let mut out = BytesMut::new();
		for frame in invoke_frames(&mut self.stream, &mut self.decoder, end_of_stream) {
			match frame {
				InvokeFrame::Chunk(payload) => {
					let chunk: Value = match serde_json::from_slice(&payload) {
						Ok(v) => v,
						Err(e) => {
							tracing::debug!("dropping undecodable chunk: {e}");
							continue;
						},
					};
					if let Ok(env) = serde_json::from_value::<completions::UsageEnvelope>(chunk.clone()) {
						self.stream.observe_model(env.model.as_deref());
						if let Some(u) = env.usage {
							self.stream.record_usage(&u.to_token_usage());
						}
					}
					self.stream.emit(&mut out, &chunk)?;
				},
				InvokeFrame::Exception { kind, message } => {
					tracing::debug!(%kind, "exception in invoke stream");
					let env = ErrorEnvelope {
						r#type: "error".to_string(),
						error: ErrorBody {
							r#type: kind,
							message,
							code: None,
						},
					};
					self.stream.emit(&mut out, &env)?;
				},
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
		errors::AWS_INVOKE_OPENAI.normalize(status, headers, body)
	}
}
