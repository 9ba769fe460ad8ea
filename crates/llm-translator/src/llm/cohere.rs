use crate::strng;
use crate::strng::Strng;

pub const DEFAULT_VERSION: &str = "v2";

pub fn rerank_path(version: Option<&str>) -> Strng {
	strng::format!("/{}/rerank", version.unwrap_or(DEFAULT_VERSION))
}
