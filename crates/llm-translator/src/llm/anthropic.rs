use serde_json::{Map, Value};

use crate::strng;
use crate::strng::Strng;

pub const MESSAGES_PATH: &str = "/v1/messages";
pub const DEFAULT_BEDROCK_VERSION: &str = "bedrock-2023-05-31";
/// Used when a chat request does not bound the output; the Messages API requires `max_tokens`.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

pub fn messages_path() -> Strng {
	strng::literal!(MESSAGES_PATH)
}

/// Prepares a Messages body for providers that carry the model in the path and the API
/// version in the body.
pub fn prepare_cloud_body(map: &mut Map<String, Value>, version: &str) {
	map.remove("model");
	map.insert(
		"anthropic_version".to_string(),
		Value::String(version.to_string()),
	);
}
