//! Wire types. The canonical (client facing) schemas are `completions`, `embeddings`, `images`,
//! `messages`, `rerank` and `tokenize`; `bedrock` and `gemini` are provider-native.

pub mod bedrock;
pub mod completions;
pub mod embeddings;
pub mod gemini;
pub mod images;
pub mod messages;
pub mod rerank;
pub mod tokenize;

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
