use std::io::Read;
use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::ApiSchemaName;
use crate::llm::endpoint::Endpoint;
use crate::llm::{
	AIError, ErrorMutation, HeaderMutation, RequestMutation, ResponseMutation, TokenUsage,
	Translator,
};

/// Recorder receives per-exchange accounting events. Implementations are supplied by the host;
/// every method defaults to doing nothing.
pub trait Recorder: Send + Sync {
	fn record_token_usage(
		&self,
		_schema: ApiSchemaName,
		_endpoint: Endpoint,
		_model: &str,
		_usage: &TokenUsage,
	) {
	}

	fn record_upstream_error(&self, _schema: ApiSchemaName, _endpoint: Endpoint, _status: StatusCode) {
	}

	fn record_translation_error(
		&self,
		_schema: ApiSchemaName,
		_endpoint: Endpoint,
		_error: &AIError,
	) {
	}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {}

/// Recorded wraps a translator and reports its outcomes to a [`Recorder`].
pub struct Recorded<Req> {
	inner: Box<dyn Translator<Req>>,
	recorder: Arc<dyn Recorder>,
	schema: ApiSchemaName,
	endpoint: Endpoint,
}

impl<Req> Recorded<Req> {
	pub fn new(
		inner: Box<dyn Translator<Req>>,
		recorder: Arc<dyn Recorder>,
		schema: ApiSchemaName,
		endpoint: Endpoint,
	) -> Self {
		Recorded {
			inner,
			recorder,
			schema,
			endpoint,
		}
	}

	fn observe<T>(&self, res: Result<T, AIError>) -> Result<T, AIError> {
		if let Err(e) = &res {
			tracing::debug!(schema=%self.schema, endpoint=%self.endpoint, "translation failed: {e}");
			self
				.recorder
				.record_translation_error(self.schema, self.endpoint, e);
		}
		res
	}
}

impl<Req> Translator<Req> for Recorded<Req> {
	fn request_body(
		&mut self,
		raw: &[u8],
		req: &Req,
		force_body_mutation: bool,
	) -> Result<RequestMutation, AIError> {
		let res = self.inner.request_body(raw, req, force_body_mutation);
		self.observe(res)
	}

	fn response_headers(&mut self, headers: &HeaderMap) -> Result<Vec<HeaderMutation>, AIError> {
		let res = self.inner.response_headers(headers);
		self.observe(res)
	}

	fn response_body(
		&mut self,
		headers: &HeaderMap,
		body: &mut dyn Read,
		end_of_stream: bool,
	) -> Result<ResponseMutation, AIError> {
		let res = self.inner.response_body(headers, body, end_of_stream);
		if let Ok(m) = &res
			&& end_of_stream
			&& !m.usage.is_empty()
		{
			self
				.recorder
				.record_token_usage(self.schema, self.endpoint, &m.response_model, &m.usage);
		}
		self.observe(res)
	}

	fn response_error(
		&mut self,
		status: StatusCode,
		headers: &HeaderMap,
		body: &mut dyn Read,
	) -> Result<ErrorMutation, AIError> {
		self
			.recorder
			.record_upstream_error(self.schema, self.endpoint, status);
		let res = self.inner.response_error(status, headers, body);
		self.observe(res)
	}
}

/// Installs a global fmt subscriber filtered by `RUST_LOG`, falling back to `default_filter`.
/// Calling it more than once is harmless.
pub fn init_logging(default_filter: &str) {
	let filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(default_filter))
		.unwrap_or_else(|_| EnvFilter::new("info"));
	let _ = tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_target(true))
		.try_init();
}

#[cfg(test)]
pub mod testing {
	use parking_lot::Mutex;

	use super::*;

	#[derive(Debug, Clone, PartialEq)]
	pub enum Event {
		Usage {
			schema: ApiSchemaName,
			endpoint: Endpoint,
			model: String,
			usage: TokenUsage,
		},
		UpstreamError(StatusCode),
		TranslationError(String),
	}

	/// MemoryRecorder keeps every event so tests can assert on them.
	#[derive(Default)]
	pub struct MemoryRecorder {
		pub events: Mutex<Vec<Event>>,
	}

	impl MemoryRecorder {
		pub fn events(&self) -> Vec<Event> {
			self.events.lock().clone()
		}
	}

	impl Recorder for MemoryRecorder {
		fn record_token_usage(
			&self,
			schema: ApiSchemaName,
			endpoint: Endpoint,
			model: &str,
			usage: &TokenUsage,
		) {
			self.events.lock().push(Event::Usage {
				schema,
				endpoint,
				model: model.to_string(),
				usage: *usage,
			});
		}

		fn record_upstream_error(&self, _: ApiSchemaName, _: Endpoint, status: StatusCode) {
			self.events.lock().push(Event::UpstreamError(status));
		}

		fn record_translation_error(&self, _: ApiSchemaName, _: Endpoint, error: &AIError) {
			self
				.events
				.lock()
				.push(Event::TranslationError(error.to_string()));
		}
	}
}
