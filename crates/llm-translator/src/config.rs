use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::apply;
use crate::llm::AIError;
use crate::llm::endpoint::EndpointSpec;
use crate::serdes::schema;
use crate::strng::Strng;
use crate::telemetry::{NoopRecorder, Recorder};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// The wire API spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiSchemaName {
	OpenAI,
	AzureOpenAI,
	AWSBedrock,
	AWSInvokeOpenAI,
	AWSAnthropic,
	GCPVertexAI,
	GCPAnthropic,
	Anthropic,
	Cohere,
}

impl ApiSchemaName {
	pub fn as_str(&self) -> &'static str {
		match self {
			ApiSchemaName::OpenAI => "OpenAI",
			ApiSchemaName::AzureOpenAI => "AzureOpenAI",
			ApiSchemaName::AWSBedrock => "AWSBedrock",
			ApiSchemaName::AWSInvokeOpenAI => "AWSInvokeOpenAI",
			ApiSchemaName::AWSAnthropic => "AWSAnthropic",
			ApiSchemaName::GCPVertexAI => "GCPVertexAI",
			ApiSchemaName::GCPAnthropic => "GCPAnthropic",
			ApiSchemaName::Anthropic => "Anthropic",
			ApiSchemaName::Cohere => "Cohere",
		}
	}
}

impl fmt::Display for ApiSchemaName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A backend schema together with its optional API version. The version means different
/// things per schema: a path prefix for OpenAI, the `api-version` query for Azure, and the
/// `anthropic_version` body field for the Anthropic-on-cloud schemas.
#[apply(schema!)]
pub struct VersionedApiSchema {
	pub name: ApiSchemaName,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<Strng>,
}

impl VersionedApiSchema {
	pub fn new(name: ApiSchemaName) -> Self {
		VersionedApiSchema {
			name,
			version: None,
		}
	}

	pub fn with_version(name: ApiSchemaName, version: impl Into<Strng>) -> Self {
		VersionedApiSchema {
			name,
			version: Some(version.into()),
		}
	}

	pub fn version(&self) -> Option<&str> {
		self.version.as_deref().filter(|v| !v.is_empty())
	}
}

/// Per-backend translation settings.
#[apply(schema!)]
pub struct BackendConfig {
	pub schema: VersionedApiSchema,
	/// Replaces the model sent upstream, regardless of what the client requested.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model_name_override: Option<Strng>,
	/// When set, streamed chat requests are forced to report usage in their final chunk.
	#[serde(default, skip_serializing_if = "crate::serdes::is_default")]
	pub cost_configured: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config: {0}")]
	Io(#[from] std::io::Error),
	#[error("failed to parse config: {0}")]
	Parse(#[from] serde_yaml::Error),
}

impl BackendConfig {
	pub fn from_yaml(s: &str) -> Result<Self, ConfigError> {
		Ok(serde_yaml::from_str(s)?)
	}

	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let contents = std::fs::read_to_string(path)?;
		Self::from_yaml(&contents)
	}

	/// Resolves the translator for endpoint `E`, recording into a no-op recorder.
	pub fn translator_for<E: EndpointSpec>(
		&self,
	) -> Result<Box<dyn crate::llm::Translator<E::Request>>, AIError> {
		self.translator_with_recorder::<E>(Arc::new(NoopRecorder))
	}

	pub fn translator_with_recorder<E: EndpointSpec>(
		&self,
		recorder: Arc<dyn Recorder>,
	) -> Result<Box<dyn crate::llm::Translator<E::Request>>, AIError> {
		E::get_translator(&self.schema, self.model_name_override.clone(), recorder)
	}
}
