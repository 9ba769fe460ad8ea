use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use serde_json::json;

use crate::config::{ApiSchemaName, BackendConfig};
use crate::llm::endpoint::{ChatCompletionsEndpoint, EndpointSpec, Endpoint, MessagesEndpoint};
use crate::telemetry::testing::{Event, MemoryRecorder};

fn config(yaml: &str) -> BackendConfig {
	BackendConfig::from_yaml(yaml).unwrap()
}

#[test]
fn invoke_openai_round_trip_records_usage() {
	crate::telemetry::init_logging("debug");
	let cfg = config("schema: {name: AWSInvokeOpenAI}");
	let recorder = Arc::new(MemoryRecorder::default());
	let mut t = cfg
		.translator_with_recorder::<ChatCompletionsEndpoint>(recorder.clone())
		.unwrap();

	let raw = json!({"model": "claude-x", "messages": [{"role": "user", "content": "hi"}]}).to_string();
	let parsed = ChatCompletionsEndpoint::parse_body(raw.as_bytes(), cfg.cost_configured).unwrap();
	let m = t.request_body(raw.as_bytes(), &parsed.request, false).unwrap();
	assert_eq!(m.header(":path"), Some("/model/claude-x/invoke"));

	let resp = json!({
		"id": "chatcmpl-1",
		"object": "chat.completion",
		"choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}],
		"usage": {"prompt_tokens": 13, "completion_tokens": 9, "total_tokens": 22}
	})
	.to_string();
	let m = t
		.response_body(&HeaderMap::new(), &mut resp.as_bytes(), true)
		.unwrap();
	assert_eq!(m.response_model.as_str(), "claude-x");
	assert_eq!(m.usage.total_tokens(), Some(22));

	let events = recorder.events();
	assert_eq!(events.len(), 1);
	let Event::Usage {
		schema,
		endpoint,
		model,
		usage,
	} = &events[0]
	else {
		panic!("expected a usage event, got {events:?}");
	};
	assert_eq!(*schema, ApiSchemaName::AWSInvokeOpenAI);
	assert_eq!(*endpoint, Endpoint::ChatCompletions);
	assert_eq!(model, "claude-x");
	assert_eq!(usage.input_tokens(), Some(13));
	assert_eq!(usage.output_tokens(), Some(9));
}

#[test]
fn overridden_arn_model_is_escaped() {
	let cfg = config(
		"schema: {name: AWSInvokeOpenAI}\nmodelNameOverride: arn:aws:bedrock:us-east-1:123:inference-profile/p",
	);
	let mut t = cfg.translator_for::<ChatCompletionsEndpoint>().unwrap();
	let raw = json!({"model": "ignored", "stream": true, "messages": []}).to_string();
	let parsed = ChatCompletionsEndpoint::parse_body(raw.as_bytes(), false).unwrap();
	let m = t.request_body(raw.as_bytes(), &parsed.request, false).unwrap();
	assert_eq!(
		m.header(":path"),
		Some("/model/arn:aws:bedrock:us-east-1:123:inference-profile%2Fp/invoke-with-response-stream")
	);
	let body: serde_json::Value = serde_json::from_slice(m.body.as_ref().unwrap()).unwrap();
	assert_eq!(body["model"], "arn:aws:bedrock:us-east-1:123:inference-profile/p");
}

#[test]
fn cost_tracking_streams_report_usage() {
	let cfg = config("schema: {name: OpenAI}\ncostConfigured: true");
	let raw = json!({"model": "gpt-4o-mini", "stream": true, "messages": []}).to_string();
	let parsed = ChatCompletionsEndpoint::parse_body(raw.as_bytes(), cfg.cost_configured).unwrap();
	let body = parsed.mutated_body.expect("body should be rewritten");

	let recorder = Arc::new(MemoryRecorder::default());
	let mut t = cfg
		.translator_with_recorder::<ChatCompletionsEndpoint>(recorder.clone())
		.unwrap();
	let m = t.request_body(&body, &parsed.request, true).unwrap();
	assert_eq!(m.header(":path"), Some("/v1/chat/completions"));

	let stream = concat!(
		"data: {\"id\":\"c\",\"object\":\"chat.completion.chunk\",\"model\":\"gpt-4o-mini-2024-07-18\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\n",
		"data: {\"id\":\"c\",\"object\":\"chat.completion.chunk\",\"model\":\"gpt-4o-mini-2024-07-18\",\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":1,\"total_tokens\":6}}\n\n",
		"data: [DONE]\n\n",
	);
	let m = t
		.response_body(&HeaderMap::new(), &mut stream.as_bytes(), true)
		.unwrap();
	assert_eq!(m.usage.total_tokens(), Some(6));
	assert_eq!(
		recorder.events(),
		vec![Event::Usage {
			schema: ApiSchemaName::OpenAI,
			endpoint: Endpoint::ChatCompletions,
			model: "gpt-4o-mini-2024-07-18".to_string(),
			usage: m.usage,
		}]
	);
}

#[test]
fn failures_are_recorded() {
	let cfg = config("schema: {name: AWSAnthropic}");
	let recorder = Arc::new(MemoryRecorder::default());
	let mut t = cfg
		.translator_with_recorder::<MessagesEndpoint>(recorder.clone())
		.unwrap();
	let raw = br#"{"model": "anthropic.claude-3-haiku", "max_tokens": 1, "messages": []}"#;
	let parsed = MessagesEndpoint::parse_body(raw, false).unwrap();
	t.request_body(raw, &parsed.request, false).unwrap();

	assert!(
		t.response_body(&HeaderMap::new(), &mut "not json".as_bytes(), true)
			.is_err()
	);
	t.response_error(
		StatusCode::TOO_MANY_REQUESTS,
		&HeaderMap::new(),
		&mut r#"{"message":"slow down"}"#.as_bytes(),
	)
	.unwrap();

	let events = recorder.events();
	assert_eq!(events.len(), 2);
	assert!(matches!(&events[0], Event::TranslationError(e) if e.starts_with("malformed upstream response")));
	assert_eq!(events[1], Event::UpstreamError(StatusCode::TOO_MANY_REQUESTS));
}
