use std::io::Read;

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio_util::codec::Decoder;

use crate::llm::{AIError, TokenUsage, read_body};
use crate::parse::sse::{self, SseEvent, SseEvents};
use crate::strng;
use crate::strng::Strng;

#[cfg(test)]
#[path = "streaming_tests.rs"]
mod tests;

pub const DONE: &[u8] = b"data: [DONE]\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
	/// No bytes have been seen, or everything seen so far has been emitted.
	#[default]
	Idle,
	/// A partial frame is held in the buffer.
	Buffering,
	/// The last call decoded at least one frame.
	EmittingChunks,
	/// The terminal sentinel was written. Nothing else is emitted.
	Closed,
}

/// StreamState is the decoder state of a single streamed exchange.
///
/// It owns the bytes of a partially received frame, the usage accumulated from chunks so far
/// and the first model reported by the provider. A translator creates it on the first streamed
/// chunk and passes it by reference to its decode functions.
#[derive(Debug, Default)]
pub struct StreamState {
	buffer: BytesMut,
	phase: Phase,
	usage: TokenUsage,
	model: Option<Strng>,
	sse: SseEvents,
}

impl StreamState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn phase(&self) -> Phase {
		self.phase
	}

	pub fn is_closed(&self) -> bool {
		self.phase == Phase::Closed
	}

	/// Appends everything readable from `body` to the pending buffer.
	pub fn feed(&mut self, body: &mut dyn Read) -> Result<(), AIError> {
		let bytes = read_body(body)?;
		if self.phase == Phase::Closed {
			if !bytes.is_empty() {
				tracing::debug!(len = bytes.len(), "dropping bytes received after the stream closed");
			}
			return Ok(());
		}
		if !bytes.is_empty() {
			self.buffer.extend_from_slice(&bytes);
			self.phase = Phase::Buffering;
		}
		Ok(())
	}

	/// Decodes every complete frame in the buffer. A frame that fails to decode is dropped and
	/// decoding continues with the next one. When the decoder cannot get past the damaged bytes,
	/// everything buffered is discarded and the decoder restarts on the next call's bytes.
	pub fn frames<D>(&mut self, decoder: &mut D, end_of_stream: bool) -> Vec<D::Item>
	where
		D: Decoder + Default,
		D::Error: std::fmt::Debug,
	{
		let mut out = Vec::new();
		if self.phase == Phase::Closed {
			return out;
		}
		loop {
			let before = self.buffer.len();
			let res = if end_of_stream {
				decoder.decode_eof(&mut self.buffer)
			} else {
				decoder.decode(&mut self.buffer)
			};
			match res {
				Ok(Some(item)) => out.push(item),
				Ok(None) => break,
				Err(e) => {
					tracing::debug!("skipping undecodable frame: {e:?}");
					if self.buffer.len() == before {
						tracing::debug!(len = before, "discarding bytes the decoder cannot resync past");
						self.buffer.clear();
						*decoder = D::default();
						break;
					}
				},
			}
		}
		if end_of_stream && !self.buffer.is_empty() {
			tracing::debug!(len = self.buffer.len(), "discarding partial frame at end of stream");
			self.buffer.clear();
		}
		if !out.is_empty() {
			self.phase = Phase::EmittingChunks;
		}
		out
	}

	/// Decodes the buffered bytes as server-sent events.
	pub fn sse_events(&mut self, end_of_stream: bool) -> Vec<SseEvent> {
		let mut decoder = std::mem::take(&mut self.sse);
		let events = self.frames(&mut decoder, end_of_stream);
		self.sse = decoder;
		events
	}

	/// Writes one canonical chunk as `data: <json>\n\n`.
	pub fn emit<T: Serialize>(&mut self, out: &mut BytesMut, chunk: &T) -> Result<(), AIError> {
		let json = serde_json::to_vec(chunk).map_err(AIError::ResponseMarshal)?;
		self.emit_event(out, "", json.into());
		Ok(())
	}

	/// Writes a named event, for streams that keep the Anthropic `event:` framing.
	pub fn emit_named<T: Serialize>(
		&mut self,
		out: &mut BytesMut,
		name: &str,
		chunk: &T,
	) -> Result<(), AIError> {
		let json = serde_json::to_vec(chunk).map_err(AIError::ResponseMarshal)?;
		self.emit_event(out, name, json.into());
		Ok(())
	}

	fn emit_event(&mut self, out: &mut BytesMut, name: &str, data: Bytes) {
		if self.phase == Phase::Closed {
			return;
		}
		sse::encode(out, name, data);
		self.phase = Phase::EmittingChunks;
	}

	/// Completes a call. On end of stream the `[DONE]` sentinel is appended exactly once when
	/// `sentinel` is set, and the machine is closed.
	pub fn finish(&mut self, out: &mut BytesMut, end_of_stream: bool, sentinel: bool) {
		if self.phase == Phase::Closed {
			return;
		}
		if end_of_stream {
			if sentinel {
				out.extend_from_slice(DONE);
			}
			self.phase = Phase::Closed;
			return;
		}
		self.phase = if self.buffer.is_empty() {
			Phase::Idle
		} else {
			Phase::Buffering
		};
	}

	pub fn pending(&self) -> &[u8] {
		&self.buffer
	}

	pub fn usage(&self) -> TokenUsage {
		self.usage
	}

	/// Merges a usage report carried by a chunk.
	pub fn record_usage(&mut self, usage: &TokenUsage) {
		self.usage.override_with(usage);
	}

	/// Remembers the first non-empty model reported by the stream.
	pub fn observe_model(&mut self, model: Option<&str>) {
		if self.model.is_none()
			&& let Some(m) = model.filter(|m| !m.is_empty())
		{
			self.model = Some(strng::new(m));
		}
	}

	pub fn model(&self) -> Option<&Strng> {
		self.model.as_ref()
	}

	/// The reported model, falling back to `request_model`.
	pub fn response_model(&self, request_model: &Strng) -> Strng {
		self.model.clone().unwrap_or_else(|| request_model.clone())
	}

	/// Usage is only reported once the stream completes.
	pub fn final_usage(&self, end_of_stream: bool) -> TokenUsage {
		if end_of_stream {
			self.usage
		} else {
			TokenUsage::default()
		}
	}
}
