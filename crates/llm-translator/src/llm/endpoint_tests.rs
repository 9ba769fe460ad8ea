use assert_matches::assert_matches;
use rstest::rstest;
use serde_json::{Value, json};

use super::*;

fn schema(name: ApiSchemaName) -> VersionedApiSchema {
	VersionedApiSchema::new(name)
}

fn supported<E: EndpointSpec>(name: ApiSchemaName) -> bool {
	match E::translator(&schema(name), None) {
		Ok(_) => true,
		Err(AIError::UnsupportedSchema { schema, endpoint }) => {
			assert_eq!(schema, name);
			assert_eq!(endpoint, E::ENDPOINT);
			false
		},
		Err(e) => panic!("unexpected error: {e}"),
	}
}

#[test]
fn endpoint_names() {
	assert_eq!(Endpoint::ChatCompletions.to_string(), "chat_completions");
	assert_eq!(Endpoint::ImageGeneration.as_str(), "image_generation");
}

#[rstest]
#[case(ApiSchemaName::OpenAI, true)]
#[case(ApiSchemaName::AzureOpenAI, true)]
#[case(ApiSchemaName::AWSBedrock, true)]
#[case(ApiSchemaName::AWSInvokeOpenAI, true)]
#[case(ApiSchemaName::AWSAnthropic, true)]
#[case(ApiSchemaName::GCPVertexAI, true)]
#[case(ApiSchemaName::GCPAnthropic, true)]
#[case(ApiSchemaName::Anthropic, false)]
#[case(ApiSchemaName::Cohere, false)]
fn chat_registry(#[case] name: ApiSchemaName, #[case] want: bool) {
	assert_eq!(supported::<ChatCompletionsEndpoint>(name), want);
}

#[rstest]
#[case(ApiSchemaName::OpenAI, [true, true, true, false, false, true])]
#[case(ApiSchemaName::AzureOpenAI, [false, true, false, false, false, false])]
#[case(ApiSchemaName::GCPVertexAI, [false, true, false, false, false, true])]
#[case(ApiSchemaName::GCPAnthropic, [false, false, false, true, false, true])]
#[case(ApiSchemaName::AWSAnthropic, [false, false, false, true, false, false])]
#[case(ApiSchemaName::AWSBedrock, [false, false, false, false, false, true])]
#[case(ApiSchemaName::Anthropic, [false, false, false, true, false, false])]
#[case(ApiSchemaName::Cohere, [false, false, false, false, true, false])]
#[case(ApiSchemaName::AWSInvokeOpenAI, [false; 6])]
fn registry(#[case] name: ApiSchemaName, #[case] want: [bool; 6]) {
	let got = [
		supported::<CompletionsEndpoint>(name),
		supported::<EmbeddingsEndpoint>(name),
		supported::<ImageGenerationEndpoint>(name),
		supported::<MessagesEndpoint>(name),
		supported::<RerankEndpoint>(name),
		supported::<TokenizeEndpoint>(name),
	];
	assert_eq!(got, want);
}

#[test]
fn streaming_chat_asks_for_usage_when_cost_is_tracked() {
	let raw = json!({"model": "gpt-4o", "stream": true, "messages": [], "stream_options": null});
	let parsed = ChatCompletionsEndpoint::parse_body(raw.to_string().as_bytes(), true).unwrap();
	assert!(parsed.stream);
	assert_eq!(parsed.model.as_str(), "gpt-4o");
	assert!(parsed.request.include_usage());
	let body: Value = serde_json::from_slice(&parsed.mutated_body.unwrap()).unwrap();
	assert_eq!(
		body,
		json!({"model": "gpt-4o", "stream": true, "messages": [], "stream_options": {"include_usage": true}})
	);
}

#[rstest]
#[case(json!({"model": "m", "stream": true, "messages": []}), false)]
#[case(json!({"model": "m", "messages": []}), true)]
#[case(json!({"model": "m", "stream": true, "stream_options": {"include_usage": true}, "messages": []}), true)]
fn chat_body_is_left_alone(#[case] raw: Value, #[case] cost_configured: bool) {
	let parsed =
		ChatCompletionsEndpoint::parse_body(raw.to_string().as_bytes(), cost_configured).unwrap();
	assert_eq!(parsed.mutated_body, None);
}

#[test]
fn messages_require_a_model() {
	assert_matches!(
		MessagesEndpoint::parse_body(br#"{"max_tokens": 1, "messages": []}"#, false),
		Err(AIError::MissingField(f)) if f.as_str() == "model"
	);
	let parsed = MessagesEndpoint::parse_body(
		br#"{"model": "claude", "stream": true, "max_tokens": 1, "messages": []}"#,
		false,
	)
	.unwrap();
	assert!(parsed.stream);
	assert_eq!(parsed.model.as_str(), "claude");
}

#[test]
fn invalid_bodies_are_rejected() {
	assert_matches!(
		parse(Endpoint::Embeddings, br#"{"model": "e"}"#, false),
		Err(AIError::InvalidRequest(_))
	);
	assert_matches!(
		parse(
			Endpoint::Tokenize,
			br#"{"model": "t", "prompt": "a", "messages": []}"#,
			false
		),
		Err(AIError::InvalidRequest(_))
	);
	assert_matches!(
		parse(Endpoint::Rerank, b"not json", false),
		Err(AIError::RequestParsing(_))
	);
}

#[test]
fn dynamic_parse_keeps_the_endpoint() {
	let parsed = parse(
		Endpoint::Tokenize,
		br#"{"model": "t", "prompt": "hello"}"#,
		false,
	)
	.unwrap();
	assert_eq!(parsed.model.as_str(), "t");
	assert_eq!(parsed.request.endpoint(), Endpoint::Tokenize);
	assert_matches!(parsed.request, CanonicalRequest::Tokenize(tokenize::Request::Completion(_)));
}
