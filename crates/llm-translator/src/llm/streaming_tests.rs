use serde_json::json;

use super::*;
use crate::llm::conversion::testing::{sse_data, sse_names};
use crate::parse::aws_sse::{EventStreamCodec, testing, unwrap_payload};

#[test]
fn phases_and_single_sentinel() {
	let mut st = StreamState::new();
	assert_eq!(st.phase(), Phase::Idle);

	st.feed(&mut &b"data: {\"n\":1}\n\ndata: {\"n\""[..]).unwrap();
	assert_eq!(st.phase(), Phase::Buffering);

	let mut out = BytesMut::new();
	let events = st.sse_events(false);
	assert_eq!(events.len(), 1);
	assert_eq!(st.phase(), Phase::EmittingChunks);
	st.emit(&mut out, &json!({"n": 1})).unwrap();
	st.finish(&mut out, false, true);
	assert_eq!(st.phase(), Phase::Buffering);
	assert_eq!(st.pending(), b"data: {\"n\"");
	assert_eq!(sse_data(&out), vec![json!({"n": 1})]);

	st.feed(&mut &b":2}\n\n"[..]).unwrap();
	let mut out = BytesMut::new();
	for _ in st.sse_events(true) {
		st.emit(&mut out, &json!({"n": 2})).unwrap();
	}
	st.finish(&mut out, true, true);
	assert_eq!(st.phase(), Phase::Closed);
	assert_eq!(sse_data(&out), vec![json!({"n": 2}), json!("[DONE]")]);

	// A later empty end-of-stream call must not repeat the sentinel.
	let mut out = BytesMut::new();
	st.feed(&mut &b""[..]).unwrap();
	assert!(st.sse_events(true).is_empty());
	st.finish(&mut out, true, true);
	assert!(out.is_empty());
}

#[test]
fn finish_without_sentinel() {
	let mut st = StreamState::new();
	let mut out = BytesMut::new();
	st.emit_named(&mut out, "message_stop", &json!({"type": "message_stop"}))
		.unwrap();
	st.finish(&mut out, true, false);
	assert_eq!(sse_names(&out), vec!["message_stop"]);
	assert_eq!(sse_data(&out), vec![json!({"type": "message_stop"})]);
	assert!(st.is_closed());
}

#[test]
fn eventstream_bad_frame_is_skipped() {
	let mut bytes = testing::chunk(r#"{"n":1}"#);
	let mut broken = testing::chunk(r#"{"n":2}"#);
	let last = broken.len() - 1;
	broken[last] ^= 0x55;
	bytes.extend(broken);
	bytes.extend(testing::chunk(r#"{"n":3}"#));

	let mut st = StreamState::new();
	st.feed(&mut &bytes[..]).unwrap();
	let payloads: Vec<_> = st
		.frames(&mut EventStreamCodec::new(), false)
		.iter()
		.map(|m| unwrap_payload(m).unwrap())
		.collect();
	assert_eq!(payloads.len(), 2);
	assert_eq!(&payloads[0][..], br#"{"n":1}"#);
	assert_eq!(&payloads[1][..], br#"{"n":3}"#);
	assert!(st.pending().is_empty());
}

#[test]
fn eventstream_damaged_prelude_does_not_stall() {
	let mut damaged = testing::chunk(r#"{"n":1}"#);
	// Byte 9 sits in the prelude CRC.
	damaged[9] ^= 0xff;

	let mut st = StreamState::new();
	let mut codec = EventStreamCodec::new();
	st.feed(&mut &damaged[..]).unwrap();
	assert!(st.frames(&mut codec, false).is_empty());
	assert!(st.pending().is_empty());

	let payloads = |st: &mut StreamState, codec: &mut EventStreamCodec, eos| {
		st.frames(codec, eos)
			.iter()
			.map(|m| unwrap_payload(m).unwrap())
			.collect::<Vec<_>>()
	};
	st.feed(&mut &testing::chunk(r#"{"n":2}"#)[..]).unwrap();
	assert_eq!(payloads(&mut st, &mut codec, false), vec![&br#"{"n":2}"#[..]]);
	st.feed(&mut &testing::chunk(r#"{"n":3}"#)[..]).unwrap();
	assert_eq!(payloads(&mut st, &mut codec, true), vec![&br#"{"n":3}"#[..]]);
}

#[test]
fn model_and_usage_tracking() {
	let request_model = strng::new("req");
	let mut st = StreamState::new();
	assert_eq!(st.response_model(&request_model).as_str(), "req");
	st.observe_model(Some(""));
	st.observe_model(Some("first"));
	st.observe_model(Some("second"));
	assert_eq!(st.response_model(&request_model).as_str(), "first");

	st.record_usage(&TokenUsage::from_openai(3, 4, None));
	assert!(st.final_usage(false).is_empty());
	assert_eq!(st.final_usage(true).total_tokens(), Some(7));
}
