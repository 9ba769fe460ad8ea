use http::{HeaderMap, HeaderValue};
use serde_json::{Value, json};

use super::*;
use crate::llm::conversion::testing::{sse_data, sse_names};
use crate::parse::aws_sse::testing as frames;
use crate::strng;

fn request(body: &Value) -> messages::Request {
	serde_json::from_value(body.clone()).unwrap()
}

fn sent(m: &RequestMutation) -> Value {
	serde_json::from_slice(m.body.as_ref().unwrap()).unwrap()
}

#[test]
fn anthropic_forwards_body() {
	let body = json!({"model": "claude-sonnet-4", "max_tokens": 10, "messages": [{"role": "user", "content": "hi"}]});
	let mut t = anthropic(None);
	let m = Translator::request_body(&mut t, body.to_string().as_bytes(), &request(&body), false)
		.unwrap();
	assert_eq!(m.header(":path"), Some("/v1/messages"));
	assert_eq!(m.body, None);

	let resp = json!({
		"id": "msg_1",
		"type": "message",
		"role": "assistant",
		"model": "claude-sonnet-4-20250514",
		"content": [{"type": "text", "text": "hello"}],
		"stop_reason": "end_turn",
		"usage": {"input_tokens": 10, "output_tokens": 2, "cache_read_input_tokens": 5}
	})
	.to_string();
	let m = Translator::<messages::Request>::response_body(
		&mut t,
		&HeaderMap::new(),
		&mut resp.as_bytes(),
		true,
	)
	.unwrap();
	assert_eq!(m.body, None);
	assert_eq!(m.response_model.as_str(), "claude-sonnet-4-20250514");
	assert_eq!(m.usage.input_tokens(), Some(15));
	assert_eq!(m.usage.cached_input_tokens(), Some(5));
	assert_eq!(m.usage.total_tokens(), Some(17));
}

#[test]
fn gcp_anthropic_moves_model_into_path() {
	let body = json!({"model": "claude-3-5-haiku@20241022", "stream": true, "max_tokens": 10, "messages": []});
	let mut t = gcp_anthropic(None);
	let m = Translator::request_body(&mut t, body.to_string().as_bytes(), &request(&body), false)
		.unwrap();
	assert_eq!(
		m.header(":path"),
		Some("publishers/anthropic/models/claude-3-5-haiku@20241022:streamRawPredict")
	);
	assert_eq!(
		sent(&m),
		json!({"stream": true, "max_tokens": 10, "messages": [], "anthropic_version": "vertex-2023-10-16"})
	);

	let stream = concat!(
		"event: message_start\n",
		"data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"type\":\"message\",\"role\":\"assistant\",\"model\":\"claude-3-5-haiku\",\"content\":[],\"usage\":{\"input_tokens\":7,\"output_tokens\":1}}}\n\n",
		"event: message_delta\n",
		"data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":12}}\n\n",
		"event: message_stop\n",
		"data: {\"type\":\"message_stop\"}\n\n",
	);
	let m = Translator::<messages::Request>::response_body(
		&mut t,
		&HeaderMap::new(),
		&mut stream.as_bytes(),
		true,
	)
	.unwrap();
	// SSE is forwarded untouched.
	assert_eq!(m.body, None);
	assert_eq!(m.usage.input_tokens(), Some(7));
	assert_eq!(m.usage.output_tokens(), Some(12));
	assert_eq!(m.response_model.as_str(), "claude-3-5-haiku");
}

#[test]
fn bedrock_request_uses_configured_version() {
	let body = json!({"model": "anthropic.claude-3-haiku", "stream": true, "max_tokens": 10, "messages": []});
	let mut t = MessagesToBedrock::new(Some(strng::literal!("bedrock-2023-05-31")), None);
	let m = t
		.request_body(body.to_string().as_bytes(), &request(&body), false)
		.unwrap();
	assert_eq!(
		m.header(":path"),
		Some("/model/anthropic.claude-3-haiku/invoke-with-response-stream")
	);
	assert_eq!(
		sent(&m),
		json!({"max_tokens": 10, "messages": [], "anthropic_version": "bedrock-2023-05-31"})
	);
	assert_eq!(
		t.response_headers(&HeaderMap::new()).unwrap(),
		vec![HeaderMutation::content_type("text/event-stream")]
	);
}

#[test]
fn bedrock_non_streaming_usage_waits_for_last_fragment() {
	let body = json!({"model": "anthropic.claude-3-haiku", "max_tokens": 10, "messages": []});
	let mut t = MessagesToBedrock::new(None, None);
	t.request_body(body.to_string().as_bytes(), &request(&body), false)
		.unwrap();
	let resp = json!({
		"id": "msg_3",
		"type": "message",
		"role": "assistant",
		"model": "claude-3-haiku-20240307",
		"content": [{"type": "text", "text": "hi"}],
		"usage": {"input_tokens": 6, "output_tokens": 2}
	})
	.to_string();
	let (a, b) = resp.as_bytes().split_at(30);
	let h = HeaderMap::new();

	let first = t.response_body(&h, &mut &a[..], false).unwrap();
	assert_eq!(first, ResponseMutation::default());
	let last = t.response_body(&h, &mut &b[..], true).unwrap();
	assert_eq!(last.body, None);
	assert_eq!(last.response_model.as_str(), "claude-3-haiku-20240307");
	assert_eq!(last.usage.total_tokens(), Some(8));
}

#[test]
fn bedrock_stream_is_reframed_as_sse() {
	let body = json!({"model": "anthropic.claude-3-haiku", "stream": true, "max_tokens": 10, "messages": []});
	let mut t = MessagesToBedrock::new(None, None);
	t.request_body(body.to_string().as_bytes(), &request(&body), false)
		.unwrap();

	let mut raw = frames::chunk(
		r#"{"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","model":"claude-3-haiku-20240307","content":[],"usage":{"input_tokens":20,"output_tokens":1,"cache_creation_input_tokens":4}}}"#,
	);
	raw.extend(frames::chunk(
		r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"},"extra":"kept"}"#,
	));
	raw.extend(frames::chunk("{broken"));
	raw.extend(frames::chunk(
		r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":6}}"#,
	));
	raw.extend(frames::exception("throttlingException", "slow down"));

	let h = HeaderMap::new();
	let (a, b) = raw.split_at(raw.len() / 3);
	let first = t.response_body(&h, &mut &a[..], false).unwrap();
	let last = t.response_body(&h, &mut &b[..], true).unwrap();
	let mut out = first.body.unwrap().to_vec();
	out.extend_from_slice(&last.body.unwrap());

	assert_eq!(
		sse_names(&out),
		vec!["message_start", "content_block_delta", "message_delta", "error"]
	);
	let data = sse_data(&out);
	assert_eq!(data[1]["extra"], "kept");
	assert_eq!(
		data[3],
		json!({"type": "error", "error": {"type": "throttlingException", "message": "slow down"}})
	);
	// No [DONE] sentinel for Messages clients.
	assert_eq!(data.len(), 4);

	assert_eq!(last.usage.input_tokens(), Some(24));
	assert_eq!(last.usage.cache_creation_input_tokens(), Some(4));
	assert_eq!(last.usage.output_tokens(), Some(6));
	assert_eq!(last.response_model.as_str(), "claude-3-haiku-20240307");
}

#[test]
fn bedrock_errors_keep_anthropic_shape() {
	let mut t = MessagesToBedrock::new(None, None);
	let mut headers = HeaderMap::new();
	headers.insert("content-type", HeaderValue::from_static("application/json"));
	headers.insert("x-amzn-errortype", HeaderValue::from_static("ValidationException"));
	let m = t
		.response_error(
			StatusCode::BAD_REQUEST,
			&headers,
			&mut r#"{"message":"max_tokens is required"}"#.as_bytes(),
		)
		.unwrap();
	let v: Value = serde_json::from_slice(m.body.as_ref().unwrap()).unwrap();
	assert_eq!(
		v,
		json!({"type": "error", "error": {"type": "ValidationException", "message": "max_tokens is required"}})
	);
}
