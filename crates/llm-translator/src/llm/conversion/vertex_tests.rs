use assert_matches::assert_matches;
use http::{HeaderMap, HeaderValue};
use rstest::rstest;
use serde_json::{Value, json};

use super::*;
use crate::llm::conversion::testing::sse_data;
use crate::strng;

fn chat(body: Value) -> completions::Request {
	serde_json::from_value(body).unwrap()
}

fn request(t: &mut ChatToGemini, body: Value) -> (RequestMutation, Value) {
	let m = t.request_body(b"", &chat(body), false).unwrap();
	let sent = serde_json::from_slice(m.body.as_ref().unwrap()).unwrap();
	(m, sent)
}

#[test]
fn request_translation() {
	let mut t = ChatToGemini::new(None);
	let (m, sent) = request(
		&mut t,
		json!({
			"model": "gemini-2.0-flash",
			"temperature": 0.5,
			"max_tokens": 128,
			"messages": [
				{"role": "system", "content": "Be brief."},
				{"role": "user", "content": [
					{"type": "text", "text": "Weather?"},
					{"type": "image_url", "image_url": {"url": "gs://bucket/map.png"}}
				]},
				{"role": "assistant", "tool_calls": [{"id": "c1", "type": "function", "function": {"name": "weather", "arguments": "{\"city\":\"Paris\"}"}}]},
				{"role": "tool", "tool_call_id": "c1", "content": "Sunny"}
			],
			"tools": [{"type": "function", "function": {
				"name": "weather",
				"parameters": {
					"type": "object",
					"properties": {"city": {"$ref": "#/$defs/City"}},
					"additionalProperties": false,
					"$defs": {"City": {"type": "string", "description": "City name"}}
				}
			}}],
			"tool_choice": {"type": "function", "function": {"name": "weather"}}
		}),
	);
	assert_eq!(
		m.header(":path"),
		Some("publishers/google/models/gemini-2.0-flash:generateContent")
	);
	assert_eq!(
		sent,
		json!({
			"contents": [
				{"role": "user", "parts": [
					{"text": "Weather?"},
					{"fileData": {"fileUri": "gs://bucket/map.png"}}
				]},
				{"role": "model", "parts": [
					{"functionCall": {"id": "c1", "name": "weather", "args": {"city": "Paris"}}}
				]},
				{"role": "user", "parts": [
					{"functionResponse": {"name": "weather", "response": {"content": "Sunny"}}}
				]}
			],
			"systemInstruction": {"parts": [{"text": "Be brief."}]},
			"generationConfig": {"temperature": 0.5, "maxOutputTokens": 128},
			"tools": [{"functionDeclarations": [{
				"name": "weather",
				"parameters": {
					"type": "object",
					"properties": {"city": {"type": "string", "description": "City name"}}
				}
			}]}],
			"toolConfig": {"functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": ["weather"]}}
		})
	);
}

#[test]
fn streaming_request_with_thinking_and_json_schema() {
	let mut t = ChatToGemini::new(Some(strng::literal!("gemini-2.5-pro")));
	let (m, sent) = request(
		&mut t,
		json!({
			"model": "ignored",
			"stream": true,
			"reasoning_effort": "medium",
			"response_format": {"type": "json_schema", "json_schema": {"name": "out", "schema": {
				"type": "object",
				"properties": {"n": {"type": ["integer", "null"]}}
			}}},
			"messages": [{"role": "user", "content": "hi"}]
		}),
	);
	assert_eq!(
		m.header(":path"),
		Some("publishers/google/models/gemini-2.5-pro:streamGenerateContent?alt=sse")
	);
	assert_eq!(
		sent["generationConfig"],
		json!({
			"responseMimeType": "application/json",
			"responseSchema": {"type": "object", "properties": {"n": {"type": "integer", "nullable": true}}},
			"thinkingConfig": {"includeThoughts": true, "thinkingBudget": 8192}
		})
	);
}

#[test]
fn invalid_tool_schema_aborts_request() {
	let mut t = ChatToGemini::new(None);
	let req = chat(json!({
		"model": "gemini-2.0-flash",
		"messages": [{"role": "user", "content": "hi"}],
		"tools": [{"type": "function", "function": {"name": "broken", "parameters": {
			"type": "object",
			"properties": {"x": {"type": ["string", "integer"]}}
		}}}]
	}));
	let err = t.request_body(b"", &req, false).unwrap_err();
	assert_matches!(err, AIError::ToolSchema { tool, source: jsonschema::SchemaError::InvalidSchema(_) } if tool == "broken");
}

#[test]
fn tool_result_needs_a_preceding_call() {
	let mut t = ChatToGemini::new(None);
	let req = chat(json!({
		"model": "gemini-2.0-flash",
		"messages": [{"role": "tool", "tool_call_id": "missing", "content": "{}"}]
	}));
	assert_matches!(
		t.request_body(b"", &req, false),
		Err(AIError::InvalidRequest(_))
	);
}

#[test]
fn non_streaming_response() {
	let mut t = ChatToGemini::new(None);
	request(
		&mut t,
		json!({"model": "gemini-2.0-flash", "messages": [{"role": "user", "content": "hi"}]}),
	);
	let resp = json!({
		"candidates": [{
			"index": 0,
			"content": {"role": "model", "parts": [
				{"text": "pondering", "thought": true},
				{"text": "Let me check."},
				{"functionCall": {"name": "lookup", "args": {"q": "x"}}}
			]},
			"finishReason": "STOP"
		}],
		"usageMetadata": {
			"promptTokenCount": 10,
			"candidatesTokenCount": 5,
			"thoughtsTokenCount": 2,
			"cachedContentTokenCount": 4,
			"totalTokenCount": 17
		},
		"modelVersion": "gemini-2.0-flash-001",
		"responseId": "resp-1"
	})
	.to_string();
	let m = t
		.response_body(&HeaderMap::new(), &mut resp.as_bytes(), true)
		.unwrap();
	assert_eq!(m.response_model.as_str(), "gemini-2.0-flash-001");
	assert_eq!(m.usage.input_tokens(), Some(10));
	assert_eq!(m.usage.output_tokens(), Some(7));
	assert_eq!(m.usage.total_tokens(), Some(17));
	assert_eq!(m.usage.cached_input_tokens(), Some(4));

	let out: Value = serde_json::from_slice(m.body.as_ref().unwrap()).unwrap();
	assert_eq!(out["id"], "resp-1");
	assert_eq!(out["object"], "chat.completion");
	let choice = &out["choices"][0];
	assert_eq!(choice["finish_reason"], "tool_calls");
	assert_eq!(choice["message"]["content"], "Let me check.");
	assert_eq!(choice["message"]["reasoning_content"], "pondering");
	assert_eq!(
		choice["message"]["tool_calls"][0],
		json!({"id": "call_0", "type": "function", "function": {"name": "lookup", "arguments": "{\"q\":\"x\"}"}})
	);
	assert_eq!(out["usage"]["prompt_tokens_details"]["cached_tokens"], 4);
}

#[test]
fn non_streaming_response_split_across_calls() {
	let mut t = ChatToGemini::new(None);
	request(
		&mut t,
		json!({"model": "gemini-2.0-flash", "messages": [{"role": "user", "content": "hi"}]}),
	);
	let resp = json!({
		"candidates": [{"index": 0, "content": {"role": "model", "parts": [{"text": "Hello"}]}, "finishReason": "STOP"}],
		"usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 1, "totalTokenCount": 4}
	})
	.to_string();
	let (a, b) = resp.as_bytes().split_at(40);
	let h = HeaderMap::new();

	let first = t.response_body(&h, &mut &a[..], false).unwrap();
	assert_eq!(first.body.as_deref(), Some(&b""[..]));
	assert_eq!(first.usage.total_tokens(), None);

	let last = t.response_body(&h, &mut &b[..], true).unwrap();
	let out: Value = serde_json::from_slice(last.body.as_ref().unwrap()).unwrap();
	assert_eq!(out["choices"][0]["message"]["content"], "Hello");
	assert_eq!(last.usage.total_tokens(), Some(4));
}

#[test]
fn malformed_response() {
	let mut t = ChatToGemini::new(None);
	assert_matches!(
		t.response_body(&HeaderMap::new(), &mut "[1,2".as_bytes(), true),
		Err(AIError::MalformedUpstreamResponse(_))
	);
}

#[test]
fn stream_translation() {
	let mut t = ChatToGemini::new(None);
	request(
		&mut t,
		json!({"model": "gemini-2.0-flash", "stream": true, "stream_options": {"include_usage": true}, "messages": [{"role": "user", "content": "hi"}]}),
	);
	let events = [
		json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hel"}]}}], "modelVersion": "gemini-2.0-flash-001", "usageMetadata": {"promptTokenCount": 3}}),
		json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "lo"}]}, "finishReason": "MAX_TOKENS"}], "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}}),
	];
	let mut body = String::new();
	for ev in &events {
		body.push_str(&format!("data: {ev}\n\n"));
	}
	body.push_str("data: not json\n\n");

	let (a, b) = body.as_bytes().split_at(body.len() / 2);
	let h = HeaderMap::new();
	let first = t.response_body(&h, &mut &a[..], false).unwrap();
	let last = t.response_body(&h, &mut &b[..], true).unwrap();
	let mut out = first.body.unwrap().to_vec();
	out.extend_from_slice(&last.body.unwrap());

	let chunks = sse_data(&out);
	assert_eq!(chunks.len(), 4, "{chunks:#?}");
	assert_eq!(chunks[0]["choices"][0]["delta"]["content"], "Hel");
	assert_eq!(chunks[0]["model"], "gemini-2.0-flash-001");
	assert_eq!(chunks[1]["choices"][0]["delta"]["content"], "lo");
	assert_eq!(chunks[1]["choices"][0]["finish_reason"], "length");
	assert_eq!(chunks[2]["choices"], json!([]));
	assert_eq!(chunks[2]["usage"]["total_tokens"], 5);
	assert_eq!(chunks[3], "[DONE]");
	assert_eq!(chunks[0]["id"], chunks[1]["id"]);

	assert!(first.usage.is_empty());
	assert_eq!(last.usage.total_tokens(), Some(5));
	assert_eq!(last.response_model.as_str(), "gemini-2.0-flash-001");
}

#[test]
fn google_errors_are_mapped() {
	let mut t = ChatToGemini::new(None);
	let mut headers = HeaderMap::new();
	headers.insert("content-type", HeaderValue::from_static("application/json"));
	let body = r#"{"error":{"code":400,"message":"Invalid value","status":"INVALID_ARGUMENT"}}"#;
	let m = t
		.response_error(StatusCode::BAD_REQUEST, &headers, &mut body.as_bytes())
		.unwrap();
	let v: Value = serde_json::from_slice(m.body.as_ref().unwrap()).unwrap();
	assert_eq!(
		v,
		json!({"type": "error", "error": {"type": "INVALID_ARGUMENT", "message": "Invalid value", "code": "400"}})
	);
}

fn embed(body: Value) -> (RequestMutation, Value) {
	let req: embeddings::Request = serde_json::from_value(body).unwrap();
	let m = EmbeddingsToVertex::new(None)
		.request_body(b"", &req, false)
		.unwrap();
	let sent = serde_json::from_slice(m.body.as_ref().unwrap()).unwrap();
	(m, sent)
}

#[test]
fn embeddings_request() {
	let (m, sent) = embed(json!({
		"model": "text-embedding-005",
		"input": ["Quarterly report\nRevenue grew.", "second"],
		"dimensions": 256,
		"task_type": "RETRIEVAL_DOCUMENT"
	}));
	assert_eq!(
		m.header(":path"),
		Some("publishers/google/models/text-embedding-005:embedContent")
	);
	assert_eq!(
		sent,
		json!({
			"content": {"parts": [{"text": "Quarterly report\nRevenue grew."}, {"text": "second"}]},
			"config": {"taskType": "RETRIEVAL_DOCUMENT", "title": "Quarterly report", "outputDimensionality": 256}
		})
	);
}

#[test]
fn embeddings_chat_input_is_joined() {
	let (_, sent) = embed(json!({
		"model": "text-embedding-005",
		"messages": [{"role": "system", "content": "a"}, {"role": "user", "content": "b"}]
	}));
	assert_eq!(sent, json!({"content": {"parts": [{"text": "a\nb"}]}}));
}

#[test]
fn embeddings_reject_tokens() {
	let req: embeddings::Request =
		serde_json::from_value(json!({"model": "m", "input": [1, 2, 3]})).unwrap();
	assert_matches!(
		EmbeddingsToVertex::new(None).request_body(b"", &req, false),
		Err(AIError::InvalidRequest(_))
	);
}

#[rstest]
#[case::statistics(
	json!({"embeddings": [
		{"values": [0.5, 1.0], "statistics": {"token_count": 3.0, "truncated": false}},
		{"values": [0.25], "statistics": {"token_count": 2.0, "truncated": false}}
	]}),
	json!([0.5, 1.0]),
	2,
	5
)]
#[case::single(json!({"embedding": {"values": [0.5]}, "tokenCount": 7}), json!([0.5]), 1, 7)]
fn embeddings_response(
	#[case] resp: Value,
	#[case] first: Value,
	#[case] count: usize,
	#[case] tokens: u32,
) {
	let mut t = EmbeddingsToVertex::new(None);
	let req: embeddings::Request =
		serde_json::from_value(json!({"model": "text-embedding-005", "input": "x"})).unwrap();
	t.request_body(b"", &req, false).unwrap();
	let m = t
		.response_body(&HeaderMap::new(), &mut resp.to_string().as_bytes(), true)
		.unwrap();
	let out: Value = serde_json::from_slice(m.body.as_ref().unwrap()).unwrap();
	assert_eq!(out["object"], "list");
	assert_eq!(out["model"], "text-embedding-005");
	assert_eq!(out["data"].as_array().unwrap().len(), count);
	assert_eq!(
		out["data"][0],
		json!({"object": "embedding", "index": 0, "embedding": first})
	);
	assert_eq!(out["usage"], json!({"prompt_tokens": tokens, "total_tokens": tokens}));
	assert_eq!(m.usage.input_tokens(), Some(tokens));
}

#[rstest]
#[case("Title line\nBody text.", Some("Title line"))]
#[case("A full sentence.\nMore", None)]
#[case("Is this a question?", None)]
#[case("  padded heading  \n", Some("padded heading"))]
fn title_heuristic(#[case] content: &str, #[case] want: Option<&str>) {
	assert_eq!(document_title(content).as_deref(), want);
}
