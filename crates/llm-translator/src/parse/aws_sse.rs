use aws_smithy_eventstream::frame::{DecodedFrame, MessageFrameDecoder};
pub use aws_smithy_types::event_stream::Message;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use tokio_util::codec::Decoder;

#[cfg(test)]
#[path = "aws_sse_tests.rs"]
mod tests;

/// Error type for EventStream decoding.
///
/// Wraps AWS Smithy's eventstream errors and satisfies the `tokio_util::codec::Decoder`
/// requirement of implementing `From<io::Error>`.
#[derive(Debug)]
pub enum EventStreamError {
	/// AWS EventStream protocol error (CRC mismatch, invalid headers, etc.)
	Protocol(aws_smithy_eventstream::error::Error),
	/// I/O error during decoding
	Io(std::io::Error),
}

impl std::fmt::Display for EventStreamError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Protocol(e) => write!(f, "{e}"),
			Self::Io(e) => write!(f, "{e}"),
		}
	}
}

impl std::error::Error for EventStreamError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Protocol(e) => Some(e),
			Self::Io(e) => Some(e),
		}
	}
}

impl From<std::io::Error> for EventStreamError {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<aws_smithy_eventstream::error::Error> for EventStreamError {
	fn from(err: aws_smithy_eventstream::error::Error) -> Self {
		Self::Protocol(err)
	}
}

/// A `tokio_util::codec::Decoder` wrapper around AWS Smithy's `MessageFrameDecoder`.
///
/// Bytes of a partial frame stay in the source buffer until the rest of the frame arrives.
#[derive(Default)]
pub struct EventStreamCodec {
	inner: MessageFrameDecoder,
}

impl EventStreamCodec {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Decoder for EventStreamCodec {
	type Item = Message;
	type Error = EventStreamError;

	fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		match self.inner.decode_frame(src)? {
			DecodedFrame::Complete(message) => Ok(Some(message)),
			DecodedFrame::Incomplete => Ok(None),
		}
	}
}

/// Returns the string value of a message header.
pub fn header(m: &Message, name: &str) -> Option<String> {
	m.headers()
		.iter()
		.find(|h| h.name().as_str() == name)
		.and_then(|h| h.value().as_string().ok())
		.map(|s| s.as_str().to_owned())
}

/// Returns the exception carried by the message, if the message is an exception frame.
pub fn exception(m: &Message) -> Option<(String, String)> {
	if header(m, ":message-type").as_deref() != Some("exception") {
		return None;
	}
	let kind = header(m, ":exception-type").unwrap_or_else(|| "unknown".to_owned());
	Some((kind, String::from_utf8_lossy(m.payload()).to_string()))
}

#[derive(Deserialize)]
struct PayloadEnvelope {
	bytes: String,
}

#[derive(thiserror::Error, Debug)]
pub enum PayloadError {
	#[error("invalid payload envelope: {0}")]
	Envelope(#[from] serde_json::Error),
	#[error("invalid base64 payload: {0}")]
	Base64(#[from] base64::DecodeError),
}

/// InvokeModel streams wrap each chunk as `{"bytes":"<base64>"}`. This returns the decoded chunk.
pub fn unwrap_payload(m: &Message) -> Result<Bytes, PayloadError> {
	let envelope: PayloadEnvelope = serde_json::from_slice(m.payload())?;
	let decoded = base64::engine::general_purpose::STANDARD.decode(envelope.bytes)?;
	Ok(Bytes::from(decoded))
}

#[cfg(test)]
pub mod testing {
	use aws_smithy_types::event_stream::{Header, HeaderValue};
	use base64::Engine;
	use bytes::BytesMut;

	use super::Message;

	pub fn encode(message: &Message) -> Vec<u8> {
		let mut buf = BytesMut::new();
		aws_smithy_eventstream::frame::write_message_to(message, &mut buf).unwrap();
		buf.to_vec()
	}

	/// An event frame with a raw JSON payload, as sent by Converse streams.
	pub fn event(event_type: &'static str, payload: &str) -> Vec<u8> {
		let m = Message::new(payload.as_bytes().to_vec())
			.add_header(Header::new(":message-type", HeaderValue::String("event".into())))
			.add_header(Header::new(
				":event-type",
				HeaderValue::String(event_type.into()),
			))
			.add_header(Header::new(
				":content-type",
				HeaderValue::String("application/json".into()),
			));
		encode(&m)
	}

	/// A `chunk` frame wrapping `inner` in the base64 envelope used by InvokeModel streams.
	pub fn chunk(inner: &str) -> Vec<u8> {
		let b64 = base64::engine::general_purpose::STANDARD.encode(inner);
		event("chunk", &format!(r#"{{"bytes":"{b64}"}}"#))
	}

	pub fn exception(kind: &'static str, message: &str) -> Vec<u8> {
		let m = Message::new(message.as_bytes().to_vec())
			.add_header(Header::new(
				":message-type",
				HeaderValue::String("exception".into()),
			))
			.add_header(Header::new(":exception-type", HeaderValue::String(kind.into())));
		encode(&m)
	}
}
