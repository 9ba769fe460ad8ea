use super::*;

fn decode_all(buf: &mut BytesMut) -> Vec<SseEvent> {
	let mut codec = SseEvents::default();
	let mut out = Vec::new();
	while let Some(ev) = codec.decode(buf).unwrap() {
		out.push(ev);
	}
	out
}

#[test]
fn comments_are_skipped() {
	let mut buf = BytesMut::from(
		"event: message_start\ndata: {\"a\":1}\n\n: keep-alive\n\ndata: [DONE]\n\ndata: {\"partial\"",
	);
	let events = decode_all(&mut buf);
	assert_eq!(events.len(), 2);
	assert_eq!(event_name(&events[0]), Some("message_start"));
	assert_eq!(events[0].data, "{\"a\":1}");
	assert_eq!(event_name(&events[1]), None);
	assert!(is_done(&events[1]));
	assert!(!is_done(&events[0]));
}

#[test]
fn multiline_data_is_joined() {
	let mut buf = BytesMut::from("data: line1\ndata: line2\n\n");
	let events = decode_all(&mut buf);
	assert_eq!(events.len(), 1);
	assert_eq!(events[0].data, "line1\nline2");
}

#[test]
fn encode_plain_and_named() {
	let mut dst = BytesMut::new();
	encode(&mut dst, "", Bytes::from_static(b"{}"));
	encode(&mut dst, "ping", Bytes::from_static(b"{\"type\":\"ping\"}"));

	let events = decode_all(&mut dst);
	assert_eq!(events.len(), 2);
	assert_eq!(event_name(&events[0]), None);
	assert_eq!(events[0].data, "{}");
	assert_eq!(event_name(&events[1]), Some("ping"));
	assert_eq!(events[1].data, "{\"type\":\"ping\"}");
}
