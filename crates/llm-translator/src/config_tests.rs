use assert_matches::assert_matches;

use super::*;
use crate::llm::endpoint::{ChatCompletionsEndpoint, RerankEndpoint};

#[test]
fn parse_yaml() {
	let cfg = BackendConfig::from_yaml(
		r#"
schema:
  name: AzureOpenAI
  version: "2024-10-21"
modelNameOverride: gpt-4o-deployment
costConfigured: true
"#,
	)
	.unwrap();
	assert_eq!(cfg.schema.name, ApiSchemaName::AzureOpenAI);
	assert_eq!(cfg.schema.version(), Some("2024-10-21"));
	assert_eq!(cfg.model_name_override.as_deref(), Some("gpt-4o-deployment"));
	assert!(cfg.cost_configured);
}

#[test]
fn defaults() {
	let cfg = BackendConfig::from_yaml("schema: {name: AWSBedrock}").unwrap();
	assert_eq!(cfg.schema, VersionedApiSchema::new(ApiSchemaName::AWSBedrock));
	assert_eq!(cfg.model_name_override, None);
	assert!(!cfg.cost_configured);
}

#[test]
fn empty_version_is_unset() {
	let schema = VersionedApiSchema::with_version(ApiSchemaName::OpenAI, "");
	assert_eq!(schema.version(), None);
}

#[test]
fn unknown_fields_rejected() {
	let err = BackendConfig::from_yaml("schema: {name: OpenAI}\nmodelOverride: x").unwrap_err();
	assert_matches!(err, ConfigError::Parse(_));
	let err = BackendConfig::from_yaml("schema: {name: Mistral}").unwrap_err();
	assert_matches!(err, ConfigError::Parse(_));
}

#[test]
fn resolve_translator() {
	let cfg = BackendConfig::from_yaml("schema: {name: GCPAnthropic}").unwrap();
	assert!(cfg.translator_for::<ChatCompletionsEndpoint>().is_ok());
	assert_matches!(
		cfg.translator_for::<RerankEndpoint>().map(|_| ()),
		Err(AIError::UnsupportedSchema {
			schema: ApiSchemaName::GCPAnthropic,
			..
		})
	);
}
