use bridge_telemetry::{
    PAYLOAD_LOG_LIMIT, metrics, record_decode_failure, record_message_received,
    record_write_latency_ms, truncate_payload,
};

#[test]
fn counters_are_monotonic() {
    let before = metrics().snapshot();
    record_message_received();
    record_decode_failure();
    record_write_latency_ms(7);
    let after = metrics().snapshot();

    assert!(after.messages_received >= before.messages_received + 1);
    assert!(after.decode_failures >= before.decode_failures + 1);
    assert!(after.write_latency_ms_total >= before.write_latency_ms_total + 7);
    assert!(after.write_latency_ms_count >= before.write_latency_ms_count + 1);
}

#[test]
fn short_payload_is_kept() {
    assert_eq!(truncate_payload(br#"{"value":1}"#), r#"{"value":1}"#);
}

#[test]
fn long_payload_is_truncated() {
    let payload = vec![b'a'; PAYLOAD_LOG_LIMIT + 10];
    let text = truncate_payload(&payload);
    assert_eq!(text.len(), PAYLOAD_LOG_LIMIT + 3);
    assert!(text.ends_with("..."));
}

#[test]
fn invalid_utf8_is_lossy() {
    let text = truncate_payload(&[0xff, b'x']);
    assert!(text.ends_with('x'));
}
