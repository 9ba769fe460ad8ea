use crate::llm::endpoint::Endpoint;
use crate::strng;
use crate::strng::Strng;

/// Used when the backend schema does not pin an `api-version`.
pub const DEFAULT_API_VERSION: &str = "2024-10-21";

/// Azure routes by deployment name, which is the model the client asked for (or the override).
pub fn path(endpoint: Endpoint, deployment: &str, api_version: Option<&str>) -> Strng {
	let t = match endpoint {
		Endpoint::Embeddings => "embeddings",
		_ => "chat/completions",
	};
	strng::format!(
		"/openai/deployments/{}/{t}?api-version={}",
		super::path_escape(deployment),
		api_version.unwrap_or(DEFAULT_API_VERSION)
	)
}
