use std::borrow::Cow;

use bytes::{Bytes, BytesMut};
pub use tokio_sse_codec::{Event, Frame, SseDecoder, SseEncoder};
use tokio_util::codec::{Decoder, Encoder};

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;

/// A decoded provider event.
pub type SseEvent = Event<String>;

/// The name the SSE format gives to events that do not set one.
const DEFAULT_EVENT_NAME: &str = "message";

/// The event name, when the provider set one.
pub fn event_name(ev: &SseEvent) -> Option<&str> {
	let name: &str = &ev.name;
	(!name.is_empty() && name != DEFAULT_EVENT_NAME).then_some(name)
}

pub fn is_done(ev: &SseEvent) -> bool {
	ev.data == "[DONE]"
}

/// SseEvents decodes a provider stream into its events. Comments and retry hints carry nothing
/// a translator needs and are skipped.
pub struct SseEvents {
	inner: SseDecoder<String>,
}

impl Default for SseEvents {
	fn default() -> Self {
		SseEvents {
			inner: SseDecoder::new(),
		}
	}
}

impl std::fmt::Debug for SseEvents {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SseEvents").finish_non_exhaustive()
	}
}

impl Decoder for SseEvents {
	type Item = SseEvent;
	type Error = <SseDecoder<String> as Decoder>::Error;

	fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		loop {
			match self.inner.decode(src)? {
				Some(Frame::Event(ev)) => return Ok(Some(ev)),
				Some(_) => continue,
				None => return Ok(None),
			}
		}
	}

	fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		loop {
			match self.inner.decode_eof(src)? {
				Some(Frame::Event(ev)) => return Ok(Some(ev)),
				Some(_) => continue,
				None => return Ok(None),
			}
		}
	}
}

/// Appends one event to `out`. An empty `name` writes a plain `data:` event.
pub fn encode(out: &mut BytesMut, name: &str, data: Bytes) {
	let frame = Frame::Event(Event::<Bytes> {
		data,
		name: Cow::Owned(name.to_string()),
		id: None,
	});
	if let Err(e) = SseEncoder::new().encode(frame, out) {
		tracing::debug!("failed to encode event: {e:?}");
	}
}
