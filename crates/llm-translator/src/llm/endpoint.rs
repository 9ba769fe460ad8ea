//! The canonical endpoints and the registry mapping (endpoint, backend schema) to a translator.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::{ApiSchemaName, VersionedApiSchema};
use crate::json;
use crate::llm::conversion::anthropic::{ChatToAnthropic, Cloud};
use crate::llm::conversion::aws_invoke::ChatToInvokeOpenAI;
use crate::llm::conversion::bedrock::ChatToConverse;
use crate::llm::conversion::messages::{self as messages_conversion, MessagesToBedrock};
use crate::llm::conversion::openai::{Passthrough, UsageRule};
use crate::llm::conversion::tokenize_count::{Counter, TokenizeToCount};
use crate::llm::conversion::vertex::{ChatToGemini, EmbeddingsToVertex};
use crate::llm::errors;
use crate::llm::types::{completions, embeddings, images, messages, rerank, tokenize};
use crate::llm::{AIError, Translator, azureopenai, cohere, openai};
use crate::strng;
use crate::strng::Strng;
use crate::telemetry::{Recorded, Recorder};

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
	ChatCompletions,
	Completions,
	Embeddings,
	ImageGeneration,
	Messages,
	Rerank,
	Tokenize,
}

impl Endpoint {
	pub fn as_str(&self) -> &'static str {
		match self {
			Endpoint::ChatCompletions => "chat_completions",
			Endpoint::Completions => "completions",
			Endpoint::Embeddings => "embeddings",
			Endpoint::ImageGeneration => "image_generation",
			Endpoint::Messages => "messages",
			Endpoint::Rerank => "rerank",
			Endpoint::Tokenize => "tokenize",
		}
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A parsed client request.
#[derive(Debug, Clone)]
pub struct ParsedBody<Req> {
	pub model: Strng,
	pub stream: bool,
	pub request: Req,
	/// Set when parsing changed the body. The host forwards and replays these bytes instead of
	/// the original ones.
	pub mutated_body: Option<Bytes>,
}

impl<Req> ParsedBody<Req> {
	pub fn map<T>(self, f: impl FnOnce(Req) -> T) -> ParsedBody<T> {
		ParsedBody {
			model: self.model,
			stream: self.stream,
			request: f(self.request),
			mutated_body: self.mutated_body,
		}
	}
}

/// A request on any canonical endpoint.
#[derive(Debug, Clone)]
pub enum CanonicalRequest {
	ChatCompletion(completions::Request),
	Completion(completions::CompletionRequest),
	Embedding(embeddings::Request),
	ImageGeneration(images::Request),
	Messages(messages::Request),
	Rerank(rerank::Request),
	Tokenize(tokenize::Request),
}

impl CanonicalRequest {
	pub fn endpoint(&self) -> Endpoint {
		match self {
			CanonicalRequest::ChatCompletion(_) => Endpoint::ChatCompletions,
			CanonicalRequest::Completion(_) => Endpoint::Completions,
			CanonicalRequest::Embedding(_) => Endpoint::Embeddings,
			CanonicalRequest::ImageGeneration(_) => Endpoint::ImageGeneration,
			CanonicalRequest::Messages(_) => Endpoint::Messages,
			CanonicalRequest::Rerank(_) => Endpoint::Rerank,
			CanonicalRequest::Tokenize(_) => Endpoint::Tokenize,
		}
	}
}

/// An endpoint: how its bodies are parsed and which translator serves each backend schema.
pub trait EndpointSpec {
	const ENDPOINT: Endpoint;
	type Request: Send + 'static;

	/// Parses and validates a client body. `cost_configured` lets the endpoint ask the client
	/// request for the usage reporting that cost accounting needs.
	fn parse_body(raw: &[u8], cost_configured: bool) -> Result<ParsedBody<Self::Request>, AIError>;

	fn get_translator(
		schema: &VersionedApiSchema,
		model_name_override: Option<Strng>,
		recorder: Arc<dyn Recorder>,
	) -> Result<Box<dyn Translator<Self::Request>>, AIError> {
		let inner = Self::translator(schema, model_name_override)?;
		Ok(Box::new(Recorded::new(
			inner,
			recorder,
			schema.name,
			Self::ENDPOINT,
		)))
	}

	/// The bare translator, without recording.
	fn translator(
		schema: &VersionedApiSchema,
		model_name_override: Option<Strng>,
	) -> Result<Box<dyn Translator<Self::Request>>, AIError>;

	fn into_canonical(req: Self::Request) -> CanonicalRequest;
}

/// Parses `raw` for whichever endpoint the host routed the request to.
pub fn parse(
	endpoint: Endpoint,
	raw: &[u8],
	cost_configured: bool,
) -> Result<ParsedBody<CanonicalRequest>, AIError> {
	fn parse_as<E: EndpointSpec>(
		raw: &[u8],
		cost_configured: bool,
	) -> Result<ParsedBody<CanonicalRequest>, AIError> {
		Ok(E::parse_body(raw, cost_configured)?.map(E::into_canonical))
	}
	match endpoint {
		Endpoint::ChatCompletions => parse_as::<ChatCompletionsEndpoint>(raw, cost_configured),
		Endpoint::Completions => parse_as::<CompletionsEndpoint>(raw, cost_configured),
		Endpoint::Embeddings => parse_as::<EmbeddingsEndpoint>(raw, cost_configured),
		Endpoint::ImageGeneration => parse_as::<ImageGenerationEndpoint>(raw, cost_configured),
		Endpoint::Messages => parse_as::<MessagesEndpoint>(raw, cost_configured),
		Endpoint::Rerank => parse_as::<RerankEndpoint>(raw, cost_configured),
		Endpoint::Tokenize => parse_as::<TokenizeEndpoint>(raw, cost_configured),
	}
}

fn unsupported<E: EndpointSpec>(schema: &VersionedApiSchema) -> AIError {
	AIError::UnsupportedSchema {
		schema: schema.name,
		endpoint: E::ENDPOINT,
	}
}

fn deserialize<T: DeserializeOwned>(raw: &[u8]) -> Result<T, AIError> {
	serde_json::from_slice(raw).map_err(AIError::RequestParsing)
}

fn unchanged<Req>(model: &str, stream: bool, request: Req) -> ParsedBody<Req> {
	ParsedBody {
		model: strng::new(model),
		stream,
		request,
		mutated_body: None,
	}
}

fn owned_version(schema: &VersionedApiSchema) -> Option<Strng> {
	schema.version().map(strng::new)
}

/// An OpenAI-compatible passthrough for `endpoint`, routed by the OpenAI or Azure path rules.
fn openai_passthrough(
	schema: &VersionedApiSchema,
	endpoint: Endpoint,
	usage: UsageRule,
	model_name_override: Option<Strng>,
) -> Passthrough {
	let version = owned_version(schema);
	if schema.name == ApiSchemaName::AzureOpenAI {
		return Passthrough::new(
			move |model, _| azureopenai::path(endpoint, model, version.as_deref()),
			usage,
			errors::OPENAI,
			model_name_override,
		);
	}
	Passthrough::new(
		move |_, _| openai::path(endpoint, version.as_deref()),
		usage,
		errors::OPENAI,
		model_name_override,
	)
}

pub struct ChatCompletionsEndpoint;

impl EndpointSpec for ChatCompletionsEndpoint {
	const ENDPOINT: Endpoint = Endpoint::ChatCompletions;
	type Request = completions::Request;

	fn parse_body(raw: &[u8], cost_configured: bool) -> Result<ParsedBody<Self::Request>, AIError> {
		let mut req: completions::Request = deserialize(raw)?;
		let stream = req.is_streaming();
		if !(stream && cost_configured) || req.include_usage() {
			return Ok(unchanged(&req.model.clone(), stream, req));
		}
		// Without it, streamed responses carry no usage to account for.
		let body = json::rewrite_object(raw, |obj| {
			let options = obj
				.entry("stream_options")
				.or_insert_with(|| Value::Object(Map::new()));
			if !options.is_object() {
				*options = Value::Object(Map::new());
			}
			if let Value::Object(options) = options {
				options.insert("include_usage".to_string(), Value::Bool(true));
			}
		})
		.map_err(AIError::RequestParsing)?;
		req
			.stream_options
			.get_or_insert_default()
			.include_usage = Some(true);
		Ok(ParsedBody {
			model: strng::new(&req.model),
			stream,
			request: req,
			mutated_body: Some(body),
		})
	}

	fn translator(
		schema: &VersionedApiSchema,
		model_name_override: Option<Strng>,
	) -> Result<Box<dyn Translator<Self::Request>>, AIError> {
		let o = model_name_override;
		Ok(match schema.name {
			ApiSchemaName::OpenAI | ApiSchemaName::AzureOpenAI => Box::new(openai_passthrough(
				schema,
				Self::ENDPOINT,
				UsageRule::Completions,
				o,
			)),
			ApiSchemaName::AWSBedrock => Box::new(ChatToConverse::new(o)),
			ApiSchemaName::AWSInvokeOpenAI => Box::new(ChatToInvokeOpenAI::new(o)),
			ApiSchemaName::AWSAnthropic => Box::new(ChatToAnthropic::new(
				Cloud::Aws {
					version: owned_version(schema),
				},
				o,
			)),
			ApiSchemaName::GCPVertexAI => Box::new(ChatToGemini::new(o)),
			ApiSchemaName::GCPAnthropic => Box::new(ChatToAnthropic::new(Cloud::Gcp, o)),
			ApiSchemaName::Anthropic | ApiSchemaName::Cohere => return Err(unsupported::<Self>(schema)),
		})
	}

	fn into_canonical(req: Self::Request) -> CanonicalRequest {
		CanonicalRequest::ChatCompletion(req)
	}
}

pub struct CompletionsEndpoint;

impl EndpointSpec for CompletionsEndpoint {
	const ENDPOINT: Endpoint = Endpoint::Completions;
	type Request = completions::CompletionRequest;

	fn parse_body(raw: &[u8], _cost_configured: bool) -> Result<ParsedBody<Self::Request>, AIError> {
		let req: completions::CompletionRequest = deserialize(raw)?;
		let stream = req.stream.unwrap_or_default();
		Ok(unchanged(&req.model.clone(), stream, req))
	}

	fn translator(
		schema: &VersionedApiSchema,
		model_name_override: Option<Strng>,
	) -> Result<Box<dyn Translator<Self::Request>>, AIError> {
		match schema.name {
			ApiSchemaName::OpenAI => Ok(Box::new(openai_passthrough(
				schema,
				Self::ENDPOINT,
				UsageRule::Completions,
				model_name_override,
			))),
			_ => Err(unsupported::<Self>(schema)),
		}
	}

	fn into_canonical(req: Self::Request) -> CanonicalRequest {
		CanonicalRequest::Completion(req)
	}
}

pub struct EmbeddingsEndpoint;

impl EndpointSpec for EmbeddingsEndpoint {
	const ENDPOINT: Endpoint = Endpoint::Embeddings;
	type Request = embeddings::Request;

	fn parse_body(raw: &[u8], _cost_configured: bool) -> Result<ParsedBody<Self::Request>, AIError> {
		let req: embeddings::Request = deserialize(raw)?;
		req.validate()?;
		Ok(unchanged(&req.model.clone(), false, req))
	}

	fn translator(
		schema: &VersionedApiSchema,
		model_name_override: Option<Strng>,
	) -> Result<Box<dyn Translator<Self::Request>>, AIError> {
		match schema.name {
			ApiSchemaName::OpenAI | ApiSchemaName::AzureOpenAI => Ok(Box::new(openai_passthrough(
				schema,
				Self::ENDPOINT,
				UsageRule::Embeddings,
				model_name_override,
			))),
			ApiSchemaName::GCPVertexAI => Ok(Box::new(EmbeddingsToVertex::new(model_name_override))),
			_ => Err(unsupported::<Self>(schema)),
		}
	}

	fn into_canonical(req: Self::Request) -> CanonicalRequest {
		CanonicalRequest::Embedding(req)
	}
}

pub struct ImageGenerationEndpoint;

impl EndpointSpec for ImageGenerationEndpoint {
	const ENDPOINT: Endpoint = Endpoint::ImageGeneration;
	type Request = images::Request;

	fn parse_body(raw: &[u8], _cost_configured: bool) -> Result<ParsedBody<Self::Request>, AIError> {
		let req: images::Request = deserialize(raw)?;
		Ok(unchanged(&req.model.clone(), false, req))
	}

	fn translator(
		schema: &VersionedApiSchema,
		model_name_override: Option<Strng>,
	) -> Result<Box<dyn Translator<Self::Request>>, AIError> {
		match schema.name {
			ApiSchemaName::OpenAI => Ok(Box::new(openai_passthrough(
				schema,
				Self::ENDPOINT,
				UsageRule::Images,
				model_name_override,
			))),
			_ => Err(unsupported::<Self>(schema)),
		}
	}

	fn into_canonical(req: Self::Request) -> CanonicalRequest {
		CanonicalRequest::ImageGeneration(req)
	}
}

pub struct MessagesEndpoint;

impl EndpointSpec for MessagesEndpoint {
	const ENDPOINT: Endpoint = Endpoint::Messages;
	type Request = messages::Request;

	fn parse_body(raw: &[u8], _cost_configured: bool) -> Result<ParsedBody<Self::Request>, AIError> {
		let req: messages::Request = deserialize(raw)?;
		let Some(model) = req.model.clone().filter(|m| !m.is_empty()) else {
			return Err(AIError::MissingField(strng::literal!("model")));
		};
		let stream = req.is_streaming();
		Ok(unchanged(&model, stream, req))
	}

	fn translator(
		schema: &VersionedApiSchema,
		model_name_override: Option<Strng>,
	) -> Result<Box<dyn Translator<Self::Request>>, AIError> {
		let o = model_name_override;
		Ok(match schema.name {
			ApiSchemaName::Anthropic => Box::new(messages_conversion::anthropic(o)),
			ApiSchemaName::GCPAnthropic => Box::new(messages_conversion::gcp_anthropic(o)),
			ApiSchemaName::AWSAnthropic => Box::new(MessagesToBedrock::new(owned_version(schema), o)),
			_ => return Err(unsupported::<Self>(schema)),
		})
	}

	fn into_canonical(req: Self::Request) -> CanonicalRequest {
		CanonicalRequest::Messages(req)
	}
}

pub struct RerankEndpoint;

impl EndpointSpec for RerankEndpoint {
	const ENDPOINT: Endpoint = Endpoint::Rerank;
	type Request = rerank::Request;

	fn parse_body(raw: &[u8], _cost_configured: bool) -> Result<ParsedBody<Self::Request>, AIError> {
		let req: rerank::Request = deserialize(raw)?;
		Ok(unchanged(&req.model.clone(), false, req))
	}

	fn translator(
		schema: &VersionedApiSchema,
		model_name_override: Option<Strng>,
	) -> Result<Box<dyn Translator<Self::Request>>, AIError> {
		match schema.name {
			ApiSchemaName::Cohere => {
				let version = owned_version(schema);
				Ok(Box::new(Passthrough::new(
					move |_, _| cohere::rerank_path(version.as_deref()),
					UsageRule::Rerank,
					errors::COHERE,
					model_name_override,
				)))
			},
			_ => Err(unsupported::<Self>(schema)),
		}
	}

	fn into_canonical(req: Self::Request) -> CanonicalRequest {
		CanonicalRequest::Rerank(req)
	}
}

pub struct TokenizeEndpoint;

impl EndpointSpec for TokenizeEndpoint {
	const ENDPOINT: Endpoint = Endpoint::Tokenize;
	type Request = tokenize::Request;

	fn parse_body(raw: &[u8], _cost_configured: bool) -> Result<ParsedBody<Self::Request>, AIError> {
		let req = tokenize::Request::parse(raw)?;
		Ok(unchanged(&req.model().to_string(), false, req))
	}

	fn translator(
		schema: &VersionedApiSchema,
		model_name_override: Option<Strng>,
	) -> Result<Box<dyn Translator<Self::Request>>, AIError> {
		let o = model_name_override;
		Ok(match schema.name {
			ApiSchemaName::OpenAI => Box::new(openai_passthrough(
				schema,
				Self::ENDPOINT,
				UsageRule::Tokenize,
				o,
			)),
			ApiSchemaName::AWSBedrock => Box::new(TokenizeToCount::new(Counter::Bedrock, o)),
			ApiSchemaName::GCPVertexAI => Box::new(TokenizeToCount::new(Counter::Vertex, o)),
			ApiSchemaName::GCPAnthropic => Box::new(TokenizeToCount::new(Counter::GcpAnthropic, o)),
			_ => return Err(unsupported::<Self>(schema)),
		})
	}

	fn into_canonical(req: Self::Request) -> CanonicalRequest {
		CanonicalRequest::Tokenize(req)
	}
}
