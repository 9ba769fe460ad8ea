//! Translators between the canonical APIs and each backend's native API.

use bytes::{Bytes, BytesMut};

use crate::llm::streaming::StreamState;
use crate::llm::types::messages as messages_types;
use crate::llm::types::{completions, embeddings, images, rerank, tokenize};
use crate::llm::{ResponseMutation, TokenUsage};
use crate::strng;
use crate::parse::aws_sse::{self, EventStreamCodec};
use crate::strng::Strng;

pub mod anthropic;
pub mod aws_invoke;
pub mod bedrock;
pub mod messages;
pub mod openai;
pub mod tokenize_count;
pub mod vertex;

/// The fields every canonical request exposes to the translators.
pub trait WireRequest {
	fn model(&self) -> &str;

	fn is_streaming(&self) -> bool {
		false
	}
}

impl WireRequest for completions::Request {
	fn model(&self) -> &str {
		&self.model
	}

	fn is_streaming(&self) -> bool {
		completions::Request::is_streaming(self)
	}
}

impl WireRequest for completions::CompletionRequest {
	fn model(&self) -> &str {
		&self.model
	}

	fn is_streaming(&self) -> bool {
		self.stream.unwrap_or_default()
	}
}

impl WireRequest for embeddings::Request {
	fn model(&self) -> &str {
		&self.model
	}
}

impl WireRequest for images::Request {
	fn model(&self) -> &str {
		&self.model
	}
}

impl WireRequest for rerank::Request {
	fn model(&self) -> &str {
		&self.model
	}
}

impl WireRequest for tokenize::Request {
	fn model(&self) -> &str {
		tokenize::Request::model(self)
	}
}

impl WireRequest for messages_types::Request {
	fn model(&self) -> &str {
		self.model.as_deref().unwrap_or_default()
	}

	fn is_streaming(&self) -> bool {
		messages_types::Request::is_streaming(self)
	}
}

/// The model sent upstream: the configured override, otherwise what the client asked for.
pub(crate) fn upstream_model(requested: &str, model_name_override: Option<&Strng>) -> Strng {
	match model_name_override {
		Some(m) if !m.is_empty() => m.clone(),
		_ => strng::new(requested),
	}
}

/// Builds the mutation for one streamed call. Usage is only attached on the final call.
pub(crate) fn stream_mutation(
	out: BytesMut,
	state: &StreamState,
	end_of_stream: bool,
	request_model: &Strng,
) -> ResponseMutation {
	ResponseMutation {
		headers: Vec::new(),
		body: Some(out.freeze()),
		usage: state.final_usage(end_of_stream),
		response_model: state.response_model(request_model),
	}
}

/// Builds the mutation for a fully buffered response.
pub(crate) fn body_mutation(
	body: bytes::Bytes,
	usage: TokenUsage,
	response_model: Strng,
) -> ResponseMutation {
	ResponseMutation {
		usage,
		response_model,
		..Default::default()
	}
	.with_body(body)
}

/// Withholds a fragment of a body that is only translated once complete.
pub(crate) fn held_fragment() -> ResponseMutation {
	ResponseMutation {
		body: Some(bytes::Bytes::new()),
		..Default::default()
	}
}

/// A fresh chat completion id, in the format OpenAI uses.
pub(crate) fn completion_id() -> String {
	format!("chatcmpl-{:016x}", rand::random::<u64>())
}

/// A decoded InvokeModel stream frame.
#[derive(Debug)]
pub(crate) enum InvokeFrame {
	/// The provider payload unwrapped from its `{"bytes": ...}` envelope.
	Chunk(Bytes),
	Exception { kind: String, message: String },
}

/// Decodes the complete InvokeModel frames buffered in `stream`. Frames whose envelope cannot be
/// decoded are dropped.
pub(crate) fn invoke_frames(
	stream: &mut StreamState,
	decoder: &mut EventStreamCodec,
	end_of_stream: bool,
) -> Vec<InvokeFrame> {
	stream
		.frames(decoder, end_of_stream)
		.into_iter()
		.filter_map(|m| {
			if let Some((kind, message)) = aws_sse::exception(&m) {
				return Some(InvokeFrame::Exception { kind, message });
			}
			match aws_sse::unwrap_payload(&m) {
				Ok(b) => Some(InvokeFrame::Chunk(b)),
				Err(e) => {
					tracing::debug!("dropping event stream frame: {e}");
					None
				},
			}
		})
		.collect()
}
