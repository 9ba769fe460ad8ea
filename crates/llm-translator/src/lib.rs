//! Protocol translation between canonical LLM APIs (OpenAI-style chat, completions, embeddings,
//! images, tokenize, Anthropic messages and Cohere rerank) and the native wire formats of the
//! supported backends.
//!
//! The host proxy resolves an [`llm::endpoint::EndpointSpec`], parses the body, obtains a
//! [`llm::Translator`] for the configured backend schema and then drives it through the
//! request/response lifecycle of a single exchange.

pub use macro_rules_attribute::apply;

pub mod config;
pub mod json;
pub mod llm;
pub mod parse;
pub mod serdes;
pub mod strng;
pub mod telemetry;

pub use strng::Strng;

pub mod prelude {
	pub use crate::config::{ApiSchemaName, BackendConfig, VersionedApiSchema};
	pub use crate::llm::endpoint::{CanonicalRequest, Endpoint, EndpointSpec, ParsedBody};
	pub use crate::llm::{
		AIError, ErrorMutation, HeaderMutation, RequestMutation, ResponseMutation, TokenUsage,
		Translator,
	};
	pub use crate::strng::Strng;
	pub use crate::telemetry::{NoopRecorder, Recorder};
}
