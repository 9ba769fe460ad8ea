use std::io::Read;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::config::ApiSchemaName;
use crate::strng;
use crate::strng::Strng;

pub mod anthropic;
pub mod azureopenai;
pub mod bedrock;
pub mod cohere;
pub mod conversion;
pub mod endpoint;
pub mod errors;
pub mod jsonschema;
pub mod openai;
pub mod streaming;
pub mod types;
pub mod usage;
pub mod vertex;

#[cfg(test)]
mod tests;

pub use jsonschema::SchemaError;
pub use usage::TokenUsage;

use self::endpoint::Endpoint;

pub const PATH_HEADER: &str = ":path";
pub const CONTENT_TYPE_HEADER: &str = "content-type";
pub const CONTENT_LENGTH_HEADER: &str = "content-length";
pub const AMZN_ERROR_TYPE_HEADER: &str = "x-amzn-errortype";
pub const AMZN_REQUEST_ID_HEADER: &str = "x-amzn-requestid";

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const SSE_CONTENT_TYPE: &str = "text/event-stream";
pub const EVENTSTREAM_CONTENT_TYPE: &str = "application/vnd.amazon.eventstream";

#[derive(thiserror::Error, Debug)]
pub enum AIError {
	#[error("failed to parse request: {0}")]
	RequestParsing(serde_json::Error),
	#[error("invalid request: {0}")]
	InvalidRequest(Strng),
	#[error("missing field: {0}")]
	MissingField(Strng),
	#[error("invalid parameters for tool {tool}: {source}")]
	ToolSchema {
		tool: Strng,
		#[source]
		source: SchemaError,
	},
	#[error("unsupported conversion to {0}")]
	UnsupportedConversion(Strng),
	#[error("API schema {schema} is not supported for the {endpoint} endpoint")]
	UnsupportedSchema {
		schema: ApiSchemaName,
		endpoint: Endpoint,
	},
	#[error("failed to marshal request: {0}")]
	RequestMarshal(serde_json::Error),
	#[error("malformed upstream response: {0}")]
	MalformedUpstreamResponse(serde_json::Error),
	#[error("upstream response is missing its output")]
	IncompleteResponse,
	#[error("failed to marshal response: {0}")]
	ResponseMarshal(serde_json::Error),
	#[error("failed to read body: {0}")]
	BodyRead(std::io::Error),
}

impl AIError {
	/// Internal errors are caused by the proxy itself, as opposed to the client or the upstream.
	pub fn is_internal(&self) -> bool {
		matches!(
			self,
			AIError::BodyRead(_)
				| AIError::RequestMarshal(_)
				| AIError::ResponseMarshal(_)
				| AIError::UnsupportedSchema { .. }
		)
	}

	pub fn status_code(&self) -> StatusCode {
		match self {
			AIError::RequestParsing(_)
			| AIError::InvalidRequest(_)
			| AIError::MissingField(_)
			| AIError::ToolSchema { .. }
			| AIError::UnsupportedConversion(_) => StatusCode::BAD_REQUEST,
			AIError::MalformedUpstreamResponse(_) | AIError::IncompleteResponse => {
				StatusCode::BAD_GATEWAY
			},
			AIError::UnsupportedSchema { .. }
			| AIError::RequestMarshal(_)
			| AIError::ResponseMarshal(_)
			| AIError::BodyRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

/// A single header the host must set on the request or response it is forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMutation {
	pub name: Strng,
	pub value: Strng,
}

impl HeaderMutation {
	pub fn new(name: &'static str, value: impl Into<Strng>) -> Self {
		HeaderMutation {
			name: Strng::from(name),
			value: value.into(),
		}
	}

	pub fn path(path: impl Into<Strng>) -> Self {
		Self::new(PATH_HEADER, path)
	}

	pub fn content_length(len: usize) -> Self {
		Self::new(CONTENT_LENGTH_HEADER, strng::format!("{len}"))
	}

	pub fn content_type(ct: &'static str) -> Self {
		Self::new(CONTENT_TYPE_HEADER, ct)
	}
}

/// RequestMutation is the routing directive produced by translating a request.
/// A `None` body means the original bytes are forwarded unchanged.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RequestMutation {
	pub headers: Vec<HeaderMutation>,
	pub body: Option<Bytes>,
}

impl RequestMutation {
	pub fn route(path: impl Into<Strng>) -> Self {
		RequestMutation {
			headers: vec![HeaderMutation::path(path)],
			body: None,
		}
	}

	pub fn with_body(mut self, body: Bytes) -> Self {
		self.headers.push(HeaderMutation::content_length(body.len()));
		self.body = Some(body);
		self
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}
}

/// ResponseMutation is the result of translating one response body call. A `None` body means the
/// received bytes are forwarded unchanged; an empty body means nothing is sent for this call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResponseMutation {
	pub headers: Vec<HeaderMutation>,
	pub body: Option<Bytes>,
	pub usage: TokenUsage,
	pub response_model: Strng,
}

impl ResponseMutation {
	pub fn with_body(mut self, body: Bytes) -> Self {
		self.headers.push(HeaderMutation::content_length(body.len()));
		self.body = Some(body);
		self
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ErrorMutation {
	pub headers: Vec<HeaderMutation>,
	pub body: Option<Bytes>,
}

impl ErrorMutation {
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}
}

fn find_header<'a>(headers: &'a [HeaderMutation], name: &str) -> Option<&'a str> {
	headers
		.iter()
		.rev()
		.find(|h| h.name.eq_ignore_ascii_case(name))
		.map(|h| h.value.as_str())
}

/// Translator converts one exchange between a canonical API and a backend's native API.
///
/// A translator is created per request and driven sequentially: one `request_body`, then
/// `response_headers` and any number of `response_body` calls (the last one with
/// `end_of_stream` set), or a single `response_error` when the upstream status is not 2xx.
pub trait Translator<Req>: Send {
	/// Translates the canonical request. `raw` holds the original bytes; when
	/// `force_body_mutation` is set the body is always returned, even if unchanged, so a
	/// retry replays exactly the same bytes.
	fn request_body(
		&mut self,
		raw: &[u8],
		req: &Req,
		force_body_mutation: bool,
	) -> Result<RequestMutation, AIError>;

	fn response_headers(&mut self, _headers: &HeaderMap) -> Result<Vec<HeaderMutation>, AIError> {
		Ok(Vec::new())
	}

	/// Translates one fragment of the response body. Non-streamed bodies are decoded once the
	/// `end_of_stream` fragment arrives.
	fn response_body(
		&mut self,
		headers: &HeaderMap,
		body: &mut dyn Read,
		end_of_stream: bool,
	) -> Result<ResponseMutation, AIError>;

	fn response_error(
		&mut self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &mut dyn Read,
	) -> Result<ErrorMutation, AIError>;
}

pub(crate) fn read_body(body: &mut dyn Read) -> Result<Vec<u8>, AIError> {
	let mut buf = Vec::new();
	body.read_to_end(&mut buf).map_err(AIError::BodyRead)?;
	Ok(buf)
}

/// BodyBuffer accumulates the fragments of a non-streamed response body. The body is only
/// decoded once the terminal call delivers the last fragment.
#[derive(Debug, Default)]
pub(crate) struct BodyBuffer {
	buf: bytes::BytesMut,
}

impl BodyBuffer {
	/// Appends `body`, returning the complete body on the terminal call.
	pub(crate) fn collect(
		&mut self,
		body: &mut dyn Read,
		end_of_stream: bool,
	) -> Result<Option<Bytes>, AIError> {
		let bytes = read_body(body)?;
		self.buf.extend_from_slice(&bytes);
		if !end_of_stream {
			return Ok(None);
		}
		let raw = self.buf.split().freeze();
		tracing::trace!(body=%String::from_utf8_lossy(&raw), "upstream response");
		Ok(Some(raw))
	}
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|v| v.to_str().ok())
}

pub(crate) fn is_json_content(headers: &HeaderMap) -> bool {
	header_str(headers, CONTENT_TYPE_HEADER).is_some_and(|ct| ct.contains(JSON_CONTENT_TYPE))
}

// Mirrors the escaping of a single URL path segment: `/` must be escaped because model ids may
// be ARNs, while the sub-delimiters (notably `:`) are left alone.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
	.remove(b'-')
	.remove(b'_')
	.remove(b'.')
	.remove(b'~')
	.remove(b'$')
	.remove(b'&')
	.remove(b'+')
	.remove(b',')
	.remove(b':')
	.remove(b';')
	.remove(b'=')
	.remove(b'@');

pub fn path_escape(segment: &str) -> String {
	utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Picks the model reported back to the client: the wire model when present, otherwise the
/// model that was sent upstream.
pub(crate) fn response_model(wire: Option<&str>, request_model: &Strng) -> Strng {
	match wire {
		Some(m) if !m.is_empty() => strng::new(m),
		_ => request_model.clone(),
	}
}
