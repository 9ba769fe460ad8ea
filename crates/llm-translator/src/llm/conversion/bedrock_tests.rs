use assert_matches::assert_matches;
use http::{HeaderMap, HeaderValue};
use serde_json::{Value, json};

use super::*;
use crate::llm::conversion::testing::sse_data;
use crate::parse::aws_sse::testing as frames;
use crate::strng;

fn send(t: &mut ChatToConverse, body: Value) -> (RequestMutation, Value) {
	let req: completions::Request = serde_json::from_value(body).unwrap();
	let m = t.request_body(b"", &req, false).unwrap();
	let sent = serde_json::from_slice(m.body.as_ref().unwrap()).unwrap();
	(m, sent)
}

#[test]
fn request_translation() {
	let mut t = ChatToConverse::new(None);
	let (m, sent) = send(
		&mut t,
		json!({
			"model": "anthropic.claude-3-sonnet",
			"max_tokens": 256,
			"temperature": 0.25,
			"top_k": 40,
			"stop": ["###"],
			"reasoning_effort": "low",
			"messages": [
				{"role": "system", "content": "You are terse."},
				{"role": "developer", "content": "Use metric units."},
				{"role": "user", "content": [
					{"type": "text", "text": "Weather?"},
					{"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,/9j/4AAQ"}}
				]},
				{"role": "assistant", "content": "", "tool_calls": [{"id": "t1", "type": "function", "function": {"name": "weather", "arguments": ""}}]},
				{"role": "tool", "tool_call_id": "t1", "content": "12C"}
			],
			"tools": [{"type": "function", "function": {"name": "weather", "description": "Current weather"}}],
			"tool_choice": {"type": "function", "function": {"name": "weather"}}
		}),
	);
	assert_eq!(
		m.header(":path"),
		Some("/model/anthropic.claude-3-sonnet/converse")
	);
	insta::assert_json_snapshot!(sent, @r####"
 {
   "messages": [
     {
       "role": "user",
       "content": [
         {
           "text": "Weather?"
         },
         {
           "image": {
             "format": "jpeg",
             "source": {
               "bytes": "/9j/4AAQ"
             }
           }
         }
       ]
     },
     {
       "role": "assistant",
       "content": [
         {
           "toolUse": {
             "toolUseId": "t1",
             "name": "weather",
             "input": {}
           }
         }
       ]
     },
     {
       "role": "user",
       "content": [
         {
           "toolResult": {
             "toolUseId": "t1",
             "content": [
               {
                 "text": "12C"
               }
             ]
           }
         }
       ]
     }
   ],
   "system": [
     {
       "text": "You are terse.\nUse metric units."
     }
   ],
   "inferenceConfig": {
     "maxTokens": 256,
     "temperature": 0.25,
     "stopSequences": [
       "###"
     ]
   },
   "toolConfig": {
     "tools": [
       {
         "toolSpec": {
           "name": "weather",
           "description": "Current weather",
           "inputSchema": {
             "json": {
               "type": "object",
               "properties": {}
             }
           }
         }
       }
     ],
     "toolChoice": {
       "tool": {
         "name": "weather"
       }
     }
   },
   "additionalModelRequestFields": {
     "top_k": 40,
     "thinking": {
       "type": "enabled",
       "budget_tokens": 1024
     }
   }
 }
 "####);
}

#[test]
fn arn_models_are_escaped() {
	let mut t = ChatToConverse::new(Some(strng::literal!(
		"arn:aws:bedrock:us-east-1:123:model/gpt-4"
	)));
	let (m, sent) = send(
		&mut t,
		json!({"model": "ignored", "stream": true, "messages": [{"role": "user", "content": "hi"}]}),
	);
	assert_eq!(
		m.header(":path"),
		Some("/model/arn:aws:bedrock:us-east-1:123:model%2Fgpt-4/converse-stream")
	);
	// Empty inference settings are omitted.
	assert_eq!(
		sent,
		json!({"messages": [{"role": "user", "content": [{"text": "hi"}]}]})
	);
}

#[test]
fn tool_choice_none_omits_tool_config() {
	let mut t = ChatToConverse::new(None);
	let (_, sent) = send(
		&mut t,
		json!({
			"model": "amazon.nova-pro",
			"messages": [{"role": "user", "content": "hi"}],
			"tools": [{"type": "function", "function": {"name": "lookup", "parameters": {"type": "object"}}}],
			"tool_choice": "none"
		}),
	);
	assert_eq!(sent.get("toolConfig"), None);
	assert_eq!(
		sent,
		json!({"messages": [{"role": "user", "content": [{"text": "hi"}]}]})
	);
}

#[test]
fn non_streaming_response() {
	let mut t = ChatToConverse::new(None);
	send(
		&mut t,
		json!({"model": "amazon.nova-pro", "messages": [{"role": "user", "content": "hi"}]}),
	);
	let resp = json!({
		"output": {"message": {"role": "assistant", "content": [
			{"reasoningContent": {"reasoningText": {"text": "thinking", "signature": "sig"}}},
			{"text": "Hello"},
			{"toolUse": {"toolUseId": "tu", "name": "lookup", "input": {"q": 1}}}
		]}},
		"stopReason": "tool_use",
		"usage": {"inputTokens": 13, "outputTokens": 9, "totalTokens": 22, "cacheReadInputTokens": 3},
		"metrics": {"latencyMs": 120}
	})
	.to_string();
	let mut headers = HeaderMap::new();
	headers.insert("x-amzn-requestid", HeaderValue::from_static("req-123"));
	let m = t
		.response_body(&headers, &mut resp.as_bytes(), true)
		.unwrap();
	assert_eq!(m.response_model.as_str(), "amazon.nova-pro");
	assert_eq!(m.usage.input_tokens(), Some(16));
	assert_eq!(m.usage.cached_input_tokens(), Some(3));
	assert_eq!(m.usage.total_tokens(), Some(25));

	let out: Value = serde_json::from_slice(m.body.as_ref().unwrap()).unwrap();
	assert_eq!(out["id"], "req-123");
	assert_eq!(out["model"], "amazon.nova-pro");
	assert_eq!(out["choices"][0]["finish_reason"], "tool_calls");
	assert_eq!(out["choices"][0]["message"]["content"], "Hello");
	assert_eq!(out["choices"][0]["message"]["reasoning_content"], "thinking");
	assert_eq!(
		out["choices"][0]["message"]["tool_calls"][0]["function"],
		json!({"name": "lookup", "arguments": "{\"q\":1}"})
	);
	assert_eq!(out["usage"]["prompt_tokens"], 16);
}

#[test]
fn non_streaming_response_split_across_calls() {
	let mut t = ChatToConverse::new(None);
	send(
		&mut t,
		json!({"model": "amazon.nova-pro", "messages": [{"role": "user", "content": "hi"}]}),
	);
	let resp = json!({
		"output": {"message": {"role": "assistant", "content": [{"text": "Hello"}]}},
		"stopReason": "end_turn",
		"usage": {"inputTokens": 2, "outputTokens": 1, "totalTokens": 3}
	})
	.to_string();
	let (a, b) = resp.as_bytes().split_at(25);
	let h = HeaderMap::new();
	let first = t.response_body(&h, &mut &a[..], false).unwrap();
	assert_eq!(first.body.as_deref(), Some(&b""[..]));
	let last = t.response_body(&h, &mut &b[..], true).unwrap();
	let out: Value = serde_json::from_slice(last.body.as_ref().unwrap()).unwrap();
	assert_eq!(out["choices"][0]["message"]["content"], "Hello");
	assert_eq!(out["choices"][0]["finish_reason"], "stop");
	assert_eq!(last.usage.total_tokens(), Some(3));
}

#[test]
fn missing_output_is_incomplete() {
	let mut t = ChatToConverse::new(None);
	send(
		&mut t,
		json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]}),
	);
	let resp = r#"{"stopReason":"end_turn","usage":{"inputTokens":1,"outputTokens":0}}"#;
	assert_matches!(
		t.response_body(&HeaderMap::new(), &mut resp.as_bytes(), true),
		Err(AIError::IncompleteResponse)
	);
}

#[test]
fn stream_translation() {
	let mut t = ChatToConverse::new(None);
	send(
		&mut t,
		json!({"model": "m", "stream": true, "stream_options": {"include_usage": true}, "messages": [{"role": "user", "content": "hi"}]}),
	);
	let mut body = Vec::new();
	body.extend(frames::event("messageStart", r#"{"role":"assistant"}"#));
	body.extend(frames::event(
		"contentBlockDelta",
		r#"{"contentBlockIndex":0,"delta":{"text":"Hi"}}"#,
	));
	body.extend(frames::event("contentBlockStop", r#"{"contentBlockIndex":0}"#));
	body.extend(frames::event(
		"contentBlockStart",
		r#"{"contentBlockIndex":1,"start":{"toolUse":{"toolUseId":"tu_1","name":"lookup"}}}"#,
	));
	body.extend(frames::event(
		"contentBlockDelta",
		r#"{"contentBlockIndex":1,"delta":{"toolUse":{"input":"{\"q\":"}}}"#,
	));
	body.extend(frames::event("unknownEvent", "{}"));
	body.extend(frames::event("messageStop", r#"{"stopReason":"tool_use"}"#));
	body.extend(frames::event(
		"metadata",
		r#"{"usage":{"inputTokens":5,"outputTokens":4,"totalTokens":9},"metrics":{"latencyMs":1}}"#,
	));

	// Deliver the frames in two pieces, splitting one frame.
	let (a, b) = body.split_at(body.len() / 2 + 3);
	let h = HeaderMap::new();
	let first = t.response_body(&h, &mut &a[..], false).unwrap();
	let last = t.response_body(&h, &mut &b[..], true).unwrap();
	let mut out = first.body.unwrap().to_vec();
	out.extend_from_slice(&last.body.unwrap());

	let chunks = sse_data(&out);
	assert_eq!(chunks.len(), 7, "{chunks:#?}");
	assert_eq!(chunks[0]["choices"][0]["delta"]["role"], "assistant");
	assert_eq!(chunks[1]["choices"][0]["delta"]["content"], "Hi");
	assert_eq!(
		chunks[2]["choices"][0]["delta"]["tool_calls"][0],
		json!({"index": 0, "id": "tu_1", "type": "function", "function": {"name": "lookup", "arguments": ""}})
	);
	assert_eq!(
		chunks[3]["choices"][0]["delta"]["tool_calls"][0]["function"]["arguments"],
		"{\"q\":"
	);
	assert_eq!(chunks[4]["choices"][0]["finish_reason"], "tool_calls");
	assert_eq!(chunks[5]["usage"]["total_tokens"], 9);
	assert_eq!(chunks[6], "[DONE]");
	assert_eq!(chunks[0]["model"], "m");

	assert!(first.usage.is_empty());
	assert_eq!(last.usage.total_tokens(), Some(9));
	assert_eq!(last.response_model.as_str(), "m");
}

#[test]
fn stream_exception() {
	let mut t = ChatToConverse::new(None);
	send(
		&mut t,
		json!({"model": "m", "stream": true, "messages": [{"role": "user", "content": "hi"}]}),
	);
	let body = frames::exception("modelStreamErrorException", "boom");
	let m = t
		.response_body(&HeaderMap::new(), &mut body.as_slice(), true)
		.unwrap();
	let chunks = sse_data(m.body.as_ref().unwrap());
	assert_eq!(chunks[0]["error"]["type"], "modelStreamErrorException");
	assert_eq!(chunks[1], "[DONE]");
}

#[test]
fn error_uses_amzn_error_type() {
	let mut t = ChatToConverse::new(None);
	let mut headers = HeaderMap::new();
	headers.insert("content-type", HeaderValue::from_static("application/json"));
	headers.insert("x-amzn-errortype", HeaderValue::from_static("ValidationException"));
	let m = t
		.response_error(
			StatusCode::BAD_REQUEST,
			&headers,
			&mut r#"{"message":"bad input"}"#.as_bytes(),
		)
		.unwrap();
	let v: Value = serde_json::from_slice(m.body.as_ref().unwrap()).unwrap();
	assert_eq!(
		v,
		json!({"type": "error", "error": {"type": "ValidationException", "message": "bad input", "code": "400"}})
	);
}
