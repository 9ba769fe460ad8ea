use crate::llm::path_escape;
use crate::strng;
use crate::strng::Strng;

// Model ids may be inference profile or provisioned throughput ARNs, which contain `/`.

pub fn converse_path(model: &str, streaming: bool) -> Strng {
	if streaming {
		strng::format!("/model/{}/converse-stream", path_escape(model))
	} else {
		strng::format!("/model/{}/converse", path_escape(model))
	}
}

pub fn invoke_path(model: &str, streaming: bool) -> Strng {
	if streaming {
		strng::format!("/model/{}/invoke-with-response-stream", path_escape(model))
	} else {
		strng::format!("/model/{}/invoke", path_escape(model))
	}
}

pub fn count_tokens_path(model: &str) -> Strng {
	strng::format!("/model/{}/count-tokens", path_escape(model))
}
