//! Frame decoders for the streaming encodings used by upstream providers.

pub mod aws_sse;
pub mod sse;
