use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

pub fn to_bytes<T: Serialize + ?Sized>(t: &T) -> Result<Bytes, serde_json::Error> {
	serde_json::to_vec(t).map(Bytes::from)
}

/// rewrite_object parses `raw` as a JSON object, applies `f`, and serializes it back.
/// Key order is preserved so untouched fields come out the way the client sent them.
pub fn rewrite_object(
	raw: &[u8],
	f: impl FnOnce(&mut Map<String, Value>),
) -> Result<Bytes, serde_json::Error> {
	let mut obj: Map<String, Value> = serde_json::from_slice(raw)?;
	f(&mut obj);
	to_bytes(&obj)
}
