//! Tool parameter schema sanitization.
//!
//! Some backends (Gemini and Vertex AI) accept only a restricted OpenAPI-flavoured subset of JSON
//! Schema. Client-provided schemas are first dereferenced (every `$ref` inlined from the
//! document) and then projected onto that subset.

use std::collections::HashSet;

use serde_json::{Map, Value};

#[cfg(test)]
#[path = "jsonschema_tests.rs"]
mod tests;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
	#[error("reference {0} not found")]
	MissingReference(String),
	#[error("circular reference {0} is not supported")]
	CircularReference(String),
	#[error("invalid JSON schema: {0}")]
	InvalidSchema(String),
}

/// Keys kept by the projection. Everything else is silently dropped.
pub const GAPIC_ALLOWED_FIELDS: &[&str] = &[
	"anyOf",
	"default",
	"description",
	"enum",
	"example",
	"format",
	"items",
	"maxItems",
	"maxLength",
	"maxProperties",
	"maximum",
	"minItems",
	"minLength",
	"minProperties",
	"minimum",
	"nullable",
	"pattern",
	"properties",
	"propertyOrdering",
	"required",
	"title",
	"type",
];

const REF: &str = "$ref";
const DEFS: &str = "$defs";

/// Dereferences `schema` against `document` and projects the result onto the restricted
/// dialect. Neither input is modified.
pub fn sanitize(schema: &Value, document: &Value) -> Result<Value, SchemaError> {
	let dereferenced = dereference(schema, document)?;
	let Value::Object(obj) = &dereferenced else {
		return Err(SchemaError::InvalidSchema(
			"schema must be an object".to_string(),
		));
	};
	to_gapic(obj).map(Value::Object)
}

/// Returns a deep copy of `schema` with every `$ref` replaced by the node it points at.
pub fn dereference(schema: &Value, document: &Value) -> Result<Value, SchemaError> {
	let mut skip_keys = HashSet::new();
	collect_skip_keys(schema, document, &mut skip_keys, &mut HashSet::new())?;
	dereference_node(schema, document, &skip_keys, &mut HashSet::new())
}

fn ref_path(v: &Value) -> Result<&str, SchemaError> {
	v.as_str()
		.ok_or_else(|| SchemaError::InvalidSchema("'$ref' value must be a string".to_string()))
}

// Resolves a `#/a/b` fragment. Only same-document references are supported.
fn resolve<'a>(path: &str, document: &'a Value) -> Result<&'a Value, SchemaError> {
	let mut components = path.split('/');
	if components.next() != Some("#") {
		return Err(SchemaError::InvalidSchema(format!(
			"ref {path} is expected to be a URI fragment starting with #"
		)));
	}
	let mut out = document;
	for component in components {
		let component = component.replace("~1", "/").replace("~0", "~");
		out = out
			.as_object()
			.and_then(|o| o.get(&component))
			.filter(|v| v.is_object())
			.ok_or_else(|| SchemaError::MissingReference(path.to_string()))?;
	}
	Ok(out)
}

// Records the top-level key of every reference target, following references transitively.
// Keys found here are copied verbatim during dereferencing so `$defs` entries that point at
// their siblings are not expanded in place.
fn collect_skip_keys(
	node: &Value,
	document: &Value,
	skip_keys: &mut HashSet<String>,
	visiting: &mut HashSet<String>,
) -> Result<(), SchemaError> {
	match node {
		Value::Object(obj) => {
			for (k, v) in obj {
				if k == REF {
					let path = ref_path(v)?;
					if !visiting.insert(path.to_string()) {
						return Err(SchemaError::CircularReference(path.to_string()));
					}
					let target = resolve(path, document)?;
					if let Some(top) = path.split('/').nth(1) {
						skip_keys.insert(top.to_string());
					}
					collect_skip_keys(target, document, skip_keys, visiting)?;
					visiting.remove(path);
				} else if v.is_object() || v.is_array() {
					collect_skip_keys(v, document, skip_keys, visiting)?;
				}
			}
		},
		Value::Array(items) => {
			for item in items {
				collect_skip_keys(item, document, skip_keys, visiting)?;
			}
		},
		_ => {},
	}
	Ok(())
}

fn dereference_node(
	node: &Value,
	document: &Value,
	skip_keys: &HashSet<String>,
	visiting: &mut HashSet<String>,
) -> Result<Value, SchemaError> {
	match node {
		Value::Object(obj) => {
			// An object carrying a reference is replaced by the target as a whole.
			if let Some(r) = obj.get(REF) {
				let path = ref_path(r)?;
				if !visiting.insert(path.to_string()) {
					return Err(SchemaError::CircularReference(path.to_string()));
				}
				let target = resolve(path, document)?;
				let resolved = dereference_node(target, document, skip_keys, visiting)?;
				visiting.remove(path);
				return Ok(resolved);
			}
			let mut out = Map::with_capacity(obj.len());
			for (k, v) in obj {
				let v = if skip_keys.contains(k) {
					v.clone()
				} else {
					dereference_node(v, document, skip_keys, visiting)?
				};
				out.insert(k.clone(), v);
			}
			Ok(Value::Object(out))
		},
		Value::Array(items) => items
			.iter()
			.map(|item| dereference_node(item, document, skip_keys, visiting))
			.collect::<Result<Vec<_>, _>>()
			.map(Value::Array),
		other => Ok(other.clone()),
	}
}

/// Projects a dereferenced schema onto the Gemini (GAPIC) schema dialect.
pub fn to_gapic(schema: &Map<String, Value>) -> Result<Map<String, Value>, SchemaError> {
	let mut out = Map::new();
	for (key, value) in schema {
		match key.as_str() {
			DEFS => continue,
			"items" => {
				let Value::Object(sub) = value else {
					return Err(SchemaError::InvalidSchema(
						"'items' must be an object".to_string(),
					));
				};
				out.insert(key.clone(), Value::Object(to_gapic(sub)?));
			},
			"properties" => {
				let Value::Object(properties) = value else {
					return Err(SchemaError::InvalidSchema(
						"'properties' must be an object".to_string(),
					));
				};
				let mut converted = Map::with_capacity(properties.len());
				for (name, prop) in properties {
					if let Value::Object(sub) = prop {
						converted.insert(name.clone(), Value::Object(to_gapic(sub)?));
					}
				}
				out.insert(key.clone(), Value::Object(converted));
			},
			"type" => match value {
				Value::String(_) => {
					out.insert(key.clone(), value.clone());
				},
				Value::Array(types) => {
					if types.len() != 2 {
						return Err(SchemaError::InvalidSchema(format!(
							"a 'type' list must have exactly 2 entries, got {}",
							types.len()
						)));
					}
					let has_null = types.iter().any(|t| t.as_str() == Some("null"));
					let concrete = types.iter().find(|t| t.as_str() != Some("null"));
					let (true, Some(concrete)) = (has_null, concrete) else {
						return Err(SchemaError::InvalidSchema(
							"a 'type' list must contain one non-null type and 'null'".to_string(),
						));
					};
					match concrete {
						Value::Object(sub) => out.extend(to_gapic(sub)?),
						Value::String(s) => {
							out.insert(key.clone(), Value::String(s.clone()));
						},
						other => {
							out.insert(key.clone(), Value::String(other.to_string()));
						},
					}
					out.insert("nullable".to_string(), Value::Bool(true));
				},
				_ => {
					return Err(SchemaError::InvalidSchema(
						"the value of 'type' must be a list or a string".to_string(),
					));
				},
			},
			"allOf" => {
				let Value::Array(entries) = value else {
					return Err(SchemaError::InvalidSchema("'allOf' must be a list".to_string()));
				};
				if entries.len() != 1 {
					return Err(SchemaError::InvalidSchema(format!(
						"exactly one 'allOf' entry is supported, got {}",
						entries.len()
					)));
				}
				let Value::Object(sub) = &entries[0] else {
					return Err(SchemaError::InvalidSchema(
						"'allOf' entries must be objects".to_string(),
					));
				};
				return to_gapic(sub);
			},
			"anyOf" => {
				let Value::Array(branches) = value else {
					return Err(SchemaError::InvalidSchema("'anyOf' must be a list".to_string()));
				};
				let mut projected = Vec::with_capacity(branches.len());
				let mut nullable = false;
				for branch in branches {
					let Value::Object(sub) = branch else {
						return Err(SchemaError::InvalidSchema(
							"'anyOf' entries must be objects".to_string(),
						));
					};
					if sub.get("type").and_then(Value::as_str) == Some("null") {
						nullable = true;
					} else {
						projected.push(Value::Object(to_gapic(sub)?));
					}
				}
				if nullable {
					out.insert("nullable".to_string(), Value::Bool(true));
				}
				out.insert(key.clone(), Value::Array(projected));
			},
			k if GAPIC_ALLOWED_FIELDS.contains(&k) => {
				out.insert(key.clone(), value.clone());
			},
			_ => {},
		}
	}
	Ok(out)
}
