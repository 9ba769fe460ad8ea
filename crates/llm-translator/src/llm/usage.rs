use serde::Serialize;

#[cfg(test)]
#[path = "usage_tests.rs"]
mod tests;

/// TokenUsage is the provider-agnostic token accounting record for a single exchange.
///
/// Every counter is optional: `None` means the provider did not report it, which is distinct
/// from a reported zero. The provider constructors apply each backend's accounting rule so that
/// whenever all counters are present `total == input + output` and `cached_input <= input`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
	#[serde(skip_serializing_if = "Option::is_none")]
	input: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	output: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	total: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	cached_input: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	cache_creation_input: Option<u32>,
}

impl TokenUsage {
	pub fn input_tokens(&self) -> Option<u32> {
		self.input
	}

	pub fn output_tokens(&self) -> Option<u32> {
		self.output
	}

	pub fn total_tokens(&self) -> Option<u32> {
		self.total
	}

	pub fn cached_input_tokens(&self) -> Option<u32> {
		self.cached_input
	}

	pub fn cache_creation_input_tokens(&self) -> Option<u32> {
		self.cache_creation_input
	}

	pub fn set_input_tokens(&mut self, v: u32) {
		self.input = Some(v);
	}

	pub fn set_output_tokens(&mut self, v: u32) {
		self.output = Some(v);
	}

	pub fn set_total_tokens(&mut self, v: u32) {
		self.total = Some(v);
	}

	pub fn set_cached_input_tokens(&mut self, v: u32) {
		self.cached_input = Some(v);
	}

	pub fn set_cache_creation_input_tokens(&mut self, v: u32) {
		self.cache_creation_input = Some(v);
	}

	pub fn is_empty(&self) -> bool {
		self == &TokenUsage::default()
	}

	/// OpenAI-family providers already include cached tokens in `prompt_tokens`.
	pub fn from_openai(prompt: u32, completion: u32, cached: Option<u32>) -> Self {
		TokenUsage {
			input: Some(prompt),
			output: Some(completion),
			total: Some(prompt.saturating_add(completion)),
			cached_input: cached.map(|c| c.min(prompt)),
			cache_creation_input: None,
		}
	}

	/// Anthropic reports base input tokens separately from cache reads and cache writes.
	/// Both cache counters are folded into the input and the cached input.
	pub fn from_anthropic(
		input: u32,
		output: u32,
		cache_read: Option<u32>,
		cache_creation: Option<u32>,
	) -> Self {
		let read = cache_read.unwrap_or_default();
		let creation = cache_creation.unwrap_or_default();
		let input = input.saturating_add(read).saturating_add(creation);
		TokenUsage {
			input: Some(input),
			output: Some(output),
			total: Some(input.saturating_add(output)),
			cached_input: Some(read.saturating_add(creation)),
			cache_creation_input: Some(creation),
		}
	}

	/// Bedrock Converse follows the Anthropic convention: `inputTokens` excludes the cache
	/// read and write counters, so the reported total is recomputed.
	pub fn from_bedrock(
		input: u32,
		output: u32,
		cache_read: Option<u32>,
		cache_write: Option<u32>,
	) -> Self {
		Self::from_anthropic(input, output, cache_read, cache_write)
	}

	/// Gemini includes cached content in `promptTokenCount`; thinking tokens are billed as output.
	pub fn from_gemini(prompt: u32, candidates: u32, thoughts: u32, cached: Option<u32>) -> Self {
		let output = candidates.saturating_add(thoughts);
		TokenUsage {
			input: Some(prompt),
			output: Some(output),
			total: Some(prompt.saturating_add(output)),
			cached_input: Some(cached.unwrap_or_default().min(prompt)),
			cache_creation_input: None,
		}
	}

	/// Tokenize and embedding responses only report input tokens.
	pub fn from_input_only(input: u32) -> Self {
		TokenUsage {
			input: Some(input),
			output: Some(0),
			total: Some(input),
			cached_input: None,
			cache_creation_input: None,
		}
	}

	/// Merges a later report into this one. Counters reported by `other` win.
	pub fn override_with(&mut self, other: &TokenUsage) {
		self.input = other.input.or(self.input);
		self.output = other.output.or(self.output);
		self.total = other.total.or(self.total);
		self.cached_input = other.cached_input.or(self.cached_input);
		self.cache_creation_input = other.cache_creation_input.or(self.cache_creation_input);
	}

	/// Recomputes the total after the input or output counters were updated independently.
	pub fn recompute_total(&mut self) {
		if let (Some(i), Some(o)) = (self.input, self.output) {
			self.total = Some(i.saturating_add(o));
		}
	}
}
