use crate::strng;
use crate::strng::Strng;

pub const PUBLISHER_GOOGLE: &str = "google";
pub const PUBLISHER_ANTHROPIC: &str = "anthropic";

pub const METHOD_GENERATE_CONTENT: &str = "generateContent";
pub const METHOD_STREAM_GENERATE_CONTENT: &str = "streamGenerateContent?alt=sse";
pub const METHOD_EMBED_CONTENT: &str = "embedContent";
pub const METHOD_COUNT_TOKENS: &str = "countTokens";
pub const METHOD_RAW_PREDICT: &str = "rawPredict";
pub const METHOD_STREAM_RAW_PREDICT: &str = "streamRawPredict";

pub const ANTHROPIC_VERSION: &str = "vertex-2023-10-16";

/// Paths are relative to `projects/{project}/locations/{location}`, which the host prepends.
pub fn model_path(publisher: &str, model: &str, method: &str) -> Strng {
	strng::format!("publishers/{publisher}/models/{model}:{method}")
}

pub fn generate_content_path(model: &str, streaming: bool) -> Strng {
	let method = if streaming {
		METHOD_STREAM_GENERATE_CONTENT
	} else {
		METHOD_GENERATE_CONTENT
	};
	model_path(PUBLISHER_GOOGLE, model, method)
}

pub fn raw_predict_path(model: &str, streaming: bool) -> Strng {
	let method = if streaming {
		METHOD_STREAM_RAW_PREDICT
	} else {
		METHOD_RAW_PREDICT
	};
	model_path(PUBLISHER_ANTHROPIC, model, method)
}
