/// `schema!` applies the standard derives for configuration types: camelCase keys and strict
/// field checking, so typos in configuration are rejected instead of silently ignored.
macro_rules! schema {
	($item:item) => {
		#[derive(Debug, Clone, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
		#[serde(rename_all = "camelCase", deny_unknown_fields)]
		$item
	};
}

pub(crate) use schema;

pub fn is_default<T: Default + PartialEq>(t: &T) -> bool {
	t == &T::default()
}
