//! Cohere v2 rerank.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::TokenUsage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	#[serde(default)]
	pub model: String,
	pub query: String,
	pub documents: Vec<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub top_n: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens_per_doc: Option<u32>,

	#[serde(flatten, default)]
	pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Response {
	#[serde(default)]
	pub id: Option<String>,
	#[serde(default)]
	pub results: Vec<Value>,
	#[serde(default)]
	pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
	#[serde(default)]
	pub tokens: Option<Tokens>,
	#[serde(default)]
	pub billed_units: Option<BilledUnits>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Tokens {
	#[serde(default)]
	pub input_tokens: Option<f64>,
	#[serde(default)]
	pub output_tokens: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct BilledUnits {
	#[serde(default)]
	pub search_units: Option<f64>,
}

impl Response {
	/// Rerank reports input tokens only; billing is in search units, which are not tokens.
	pub fn token_usage(&self) -> TokenUsage {
		let input = self
			.meta
			.as_ref()
			.and_then(|m| m.tokens)
			.and_then(|t| t.input_tokens);
		match input {
			Some(n) => TokenUsage::from_input_only(n as u32),
			None => TokenUsage::default(),
		}
	}
}
