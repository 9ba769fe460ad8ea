use crate::llm::endpoint::Endpoint;
use crate::strng;
use crate::strng::Strng;

pub const DEFAULT_VERSION: &str = "v1";

/// The upstream path for `endpoint`. The schema version, when configured, replaces the `v1`
/// prefix; tokenize is served outside of the versioned API.
pub fn path(endpoint: Endpoint, version: Option<&str>) -> Strng {
	let version = version.unwrap_or(DEFAULT_VERSION);
	match endpoint {
		Endpoint::Completions => strng::format!("/{version}/completions"),
		Endpoint::Embeddings => strng::format!("/{version}/embeddings"),
		Endpoint::ImageGeneration => strng::format!("/{version}/images/generations"),
		Endpoint::Tokenize => strng::literal!("/tokenize"),
		// Everything else is chat
		_ => strng::format!("/{version}/chat/completions"),
	}
}
