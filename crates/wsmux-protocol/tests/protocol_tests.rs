//! Protocol layer tests: inbound classification, command decoding,
//! outbound serialization and the batch envelope.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::{Value, json};
    use wsmux_protocol::*;

    fn parse_json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inbound classification
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn ping_and_pong_are_recognized_by_type() {
        assert_eq!(Inbound::parse(br#"{"type":"ping"}"#).unwrap(), Inbound::Ping);
        assert_eq!(Inbound::parse(br#"{"type":"pong","stime":1}"#).unwrap(), Inbound::Pong);
    }

    #[test]
    fn frame_with_wscommand_is_a_command() {
        let inbound = Inbound::parse(br#"{"wscommand":"rpc","message":{"command":"echo"}}"#).unwrap();
        match inbound {
            Inbound::Command { wscommand, body } => {
                assert_eq!(wscommand, "rpc");
                assert_eq!(body["message"]["command"], "echo");
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn frame_without_discriminator_is_unrecognized() {
        assert_eq!(Inbound::parse(br#"{"hello":"world"}"#).unwrap(), Inbound::Unrecognized);
        assert_eq!(Inbound::parse(br#"{"wscommand":""}"#).unwrap(), Inbound::Unrecognized);
        assert_eq!(Inbound::parse(br#"{"type":"other"}"#).unwrap(), Inbound::Unrecognized);
    }

    #[test]
    fn malformed_outer_json_is_a_protocol_error() {
        assert!(matches!(Inbound::parse(b"{not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(Inbound::parse(b"[1,2,3]"), Err(ProtocolError::NotAnObject)));
    }

    // ─────────────────────────────────────────────────────────────────────
    // WsCommand
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn rpc_command_decodes_embedded_message() {
        let body = json!({
            "wscommand": "rpc",
            "message": {"command": "echo", "reqid": "r1", "data": {"n": 1}}
        });
        let cmd = WsCommand::from_value(body).unwrap();
        assert_eq!(cmd.name(), "rpc");
        let WsCommand::Rpc(RpcCommand { message: Some(msg) }) = cmd else {
            panic!("expected rpc command with message");
        };
        assert_eq!(msg.command_name(), Some("echo"));
        assert_eq!(msg.reqid.as_deref(), Some("r1"));
        assert_eq!(msg.data, Some(json!({"n": 1})));
    }

    #[test]
    fn rpc_command_without_message_is_accepted() {
        let cmd = WsCommand::from_value(json!({"wscommand": "rpc"})).unwrap();
        assert_eq!(cmd, WsCommand::Rpc(RpcCommand { message: None }));
    }

    #[test]
    fn unknown_wscommand_fails_explicitly() {
        let err = WsCommand::from_value(json!({"wscommand": "teleport"})).unwrap_err();
        assert!(matches!(err, CommandError::UnknownCommand(ref c) if c == "teleport"));
        assert!(err.to_string().contains("teleport"));
    }

    #[test]
    fn missing_wscommand_fails_explicitly() {
        let err = WsCommand::from_value(json!({"message": {}})).unwrap_err();
        assert!(matches!(err, CommandError::MissingDiscriminator));
    }

    #[test]
    fn mistyped_rpc_message_is_a_decode_error_tagged_with_command() {
        let err = WsCommand::from_value(json!({"wscommand": "rpc", "message": "nope"})).unwrap_err();
        match &err {
            CommandError::Decode { command, .. } => assert_eq!(command, "rpc"),
            other => panic!("expected decode error, got {other:?}"),
        }
        assert!(err.to_string().contains("\"rpc\""));
    }

    // ─────────────────────────────────────────────────────────────────────
    // RpcMessage
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn rpc_message_omits_empty_fields() {
        let msg = RpcMessage::response("r9", Some(json!("ok")));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"resid": "r9", "data": "ok"}));
    }

    #[test]
    fn rpc_message_flags_roundtrip_from_wire() {
        let wire = r#"{"command":"stream","reqid":"a","cont":true,"timeout":5000}"#;
        let msg: RpcMessage = serde_json::from_str(wire).unwrap();
        assert!(msg.cont);
        assert!(!msg.cancel);
        assert_eq!(msg.timeout, Some(5000));
    }

    #[test]
    fn link_id_sentinel() {
        assert!(LinkId::NONE.is_none());
        assert!(LinkId(7).is_some());
        assert_eq!(LinkId(7).to_string(), "7");
        assert_eq!(serde_json::to_value(LinkId(3)).unwrap(), json!(3));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Outbound messages
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn control_messages_have_flat_type_tag() {
        let pong = OutboundMessage::from(ControlMessage::Pong { stime: 42 }).into_bytes().unwrap();
        assert_eq!(parse_json(&pong), json!({"type": "pong", "stime": 42}));

        let err = OutboundMessage::from(ControlMessage::error("bad")).into_bytes().unwrap();
        assert_eq!(parse_json(&err), json!({"type": "error", "error": "bad"}));
    }

    #[test]
    fn ping_now_carries_current_time() {
        let before = server_time_millis();
        let ControlMessage::Ping { stime } = ControlMessage::ping_now() else {
            panic!("expected ping");
        };
        assert!(stime >= before);
    }

    #[test]
    fn routed_rpc_bytes_are_wrapped_verbatim() {
        let raw = Bytes::from_static(br#"{"resid":"r1","data":{"x":[1,2]}}"#);
        let bytes = OutboundMessage::Rpc(raw).into_bytes().unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"eventtype":"rpc","data":{"resid":"r1","data":{"x":[1,2]}}}"#
        );
    }

    #[test]
    fn routed_rpc_bytes_that_are_not_json_fail_to_serialize() {
        let result = OutboundMessage::Rpc(Bytes::from_static(b"{oops")).into_bytes();
        assert!(matches!(result, Err(ProtocolError::Json(_))));

        let result = OutboundMessage::Rpc(Bytes::from_static(&[0xff, 0xfe])).into_bytes();
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8)));
    }

    #[test]
    fn events_serialize_with_optional_oref() {
        let event = WsEvent::new("config", json!({"theme": "dark"}));
        let bytes = OutboundMessage::from(event.clone()).into_bytes().unwrap();
        assert_eq!(parse_json(&bytes), json!({"eventtype": "config", "data": {"theme": "dark"}}));

        let bytes = OutboundMessage::from(event.with_oref("block:1")).into_bytes().unwrap();
        assert_eq!(parse_json(&bytes)["oref"], "block:1");
    }

    #[test]
    fn raw_messages_pass_through() {
        let raw = Bytes::from_static(br#"{"anything":true}"#);
        assert_eq!(OutboundMessage::Raw(raw.clone()).into_bytes().unwrap(), raw);
    }

    #[test]
    fn message_class_inspects_type_field_only() {
        assert_eq!(MessageClass::of(br#"{"type":"ping","stime":1}"#), MessageClass::Control);
        assert_eq!(MessageClass::of(br#"{"type":"pong"}"#), MessageClass::Control);
        assert_eq!(MessageClass::of(br#"{"type":"error","error":"x"}"#), MessageClass::Control);
        assert_eq!(MessageClass::of(br#"{"eventtype":"rpc","data":{}}"#), MessageClass::Data);
        assert_eq!(MessageClass::of(br#"{"type":"blockupdate"}"#), MessageClass::Data);
        assert_eq!(MessageClass::of(br#"{"type":5}"#), MessageClass::Data);
        assert_eq!(MessageClass::of(b"not json"), MessageClass::Data);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Batch envelope
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn batch_layout_is_count_then_length_prefixed_messages() {
        let frame = encode_batch(&[b"ab".as_slice(), b"cde".as_slice()]).unwrap();
        assert_eq!(
            frame.as_ref(),
            &[2, 0, 0, 0, 2, 0, 0, 0, b'a', b'b', 3, 0, 0, 0, b'c', b'd', b'e']
        );
        assert_eq!(frame.len(), encoded_len(&[b"ab".as_slice(), b"cde".as_slice()]));
    }

    #[test]
    fn batch_decode_preserves_order_and_bytes() {
        let msgs: Vec<Bytes> = (0..5)
            .map(|i| Bytes::from(format!(r#"{{"eventtype":"rpc","data":{{"seq":{i}}}}}"#)))
            .collect();
        let frame = encode_batch(&msgs).unwrap();
        assert_eq!(decode_batch(&frame).unwrap(), msgs);
    }

    #[test]
    fn batch_with_empty_message_decodes() {
        let frame = encode_batch(&[b"".as_slice(), b"x".as_slice()]).unwrap();
        let decoded = decode_batch(&frame).unwrap();
        assert_eq!(decoded, vec![Bytes::new(), Bytes::from_static(b"x")]);
    }

    #[test]
    fn truncated_batches_are_rejected() {
        assert!(matches!(decode_batch(&[1, 0]), Err(ProtocolError::TruncatedBatch(_))));
        assert!(matches!(decode_batch(&[1, 0, 0, 0, 9]), Err(ProtocolError::TruncatedBatch(_))));
        assert!(matches!(
            decode_batch(&[1, 0, 0, 0, 5, 0, 0, 0, b'a']),
            Err(ProtocolError::TruncatedBatch(_))
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut frame = encode_batch(&[b"a".as_slice(), b"b".as_slice()]).unwrap().to_vec();
        frame.push(0);
        assert!(matches!(decode_batch(&frame), Err(ProtocolError::TrailingBytes(1))));
    }
}
