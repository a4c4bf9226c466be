// File: crates/fitrpc/src/tests.rs
use std::collections::BTreeMap;

use crate::*;

// ============================================================================
//  FORMATS
// ============================================================================

#[test]
fn test_format_lookup_by_code_and_name() {
    assert_eq!(Format::from_code(1).unwrap(), Format::JSON);
    assert_eq!(Format::from_code(2).unwrap(), Format::BINCODE);
    assert_eq!(Format::from_name("bincode").unwrap(), Format::BINCODE);
    assert_eq!(Format::from_code(42).unwrap_err(), Error::UnknownFormat(42));
    assert!(matches!(Format::from_name("protobuf"), Err(Error::UnknownFormatName(_))));
}

#[test]
fn test_format_identity_is_code() {
    let renamed = Format { name: "JSON".into(), code: 1 };
    assert_eq!(renamed, Format::JSON);
}

#[test]
fn test_nested_value_survives_both_formats() {
    let mut fields = BTreeMap::new();
    fields.insert("amount".to_string(), Value::U64(1250));
    fields.insert("currency".to_string(), Value::from("EUR"));
    fields.insert("tags".to_string(), Value::List(vec![Value::Bool(true), Value::Unit]));
    let value = Value::Map(fields);

    for format in Format::builtin() {
        let bytes = format.encode(&value).unwrap();
        let decoded: Value = format.decode(&bytes).unwrap();
        assert_eq!(decoded, value, "format {}", format);
    }
}

// ============================================================================
//  FRAMES
// ============================================================================

#[test]
fn test_request_frame_carries_format_prefix() {
    let req = RequestFrame::new(7, "pay.charge", "1.0.0")
        .with_impl("card", Some("2".into()))
        .with_args(&Format::BINCODE, &[Value::from("order-1"), Value::U64(10)])
        .unwrap();

    let bytes = RpcFrame::Request(req.clone()).encode(&Format::BINCODE).unwrap();
    assert_eq!(bytes[0], Format::BINCODE.code);
    assert_eq!(peek_format(&bytes).unwrap(), Format::BINCODE);
    assert_eq!(decode_seq(&bytes).unwrap(), 7);

    let (format, frame) = RpcFrame::decode(&bytes).unwrap();
    let RpcFrame::Request(decoded) = frame else {
        panic!("Expected Request frame");
    };
    assert_eq!(decoded, req);
    assert_eq!(
        decoded.decode_args(&format).unwrap(),
        vec![Value::from("order-1"), Value::U64(10)]
    );
}

#[test]
fn test_request_without_args_decodes_empty() {
    let req = RequestFrame::new(1, "svc", "1");
    assert!(req.decode_args(&Format::JSON).unwrap().is_empty());
}

#[test]
fn test_ok_reply_unit_has_no_payload() {
    let reply = ReplyFrame::ok(3, &Format::JSON, &Value::Unit).unwrap();
    assert!(reply.payload.is_none());
    assert_eq!(reply.into_status(&Format::JSON).unwrap(), Ok(Value::Unit));
}

#[test]
fn test_empty_frame_is_protocol_violation() {
    assert!(matches!(RpcFrame::decode(&[]), Err(Error::ProtocolViolation(_))));
}

#[test]
fn test_garbage_body_is_serialization_error() {
    let bytes = [Format::JSON.code, 0xFF, 0x00, 0x13];
    assert!(matches!(RpcFrame::decode(&bytes), Err(Error::Serialization(_))));
}

// ============================================================================
//  EXCEPTIONS
// ============================================================================

#[test]
fn test_business_exception_survives_reply_roundtrip() {
    let envelope = ExceptionEnvelope::business("pay.charge@1.0.0", "card@2", 4001, "bad arg")
        .with_property("field", "x");

    for format in Format::builtin() {
        let bytes = RpcFrame::Reply(ReplyFrame::failure(9, envelope.clone()))
            .encode(&format)
            .unwrap();
        let (decoded_format, frame) = RpcFrame::decode(&bytes).unwrap();
        let RpcFrame::Reply(reply) = frame else {
            panic!("Expected Reply frame");
        };

        assert!(!reply.is_ok());
        let status = reply.into_status(&decoded_format).unwrap();
        assert_eq!(status, Err(envelope.clone()));
    }
}

#[test]
fn test_failure_kind_is_independent_of_code() {
    // Business codes may collide with OK or with the reserved system range.
    for business_code in [code::OK, code::UNREACHABLE] {
        let envelope = ExceptionEnvelope::business("pay.charge@1.0.0", "card@2", business_code, "boom");

        for format in Format::builtin() {
            let bytes = RpcFrame::Reply(ReplyFrame::failure(3, envelope.clone()))
                .encode(&format)
                .unwrap();
            let (decoded_format, frame) = RpcFrame::decode(&bytes).unwrap();
            let RpcFrame::Reply(reply) = frame else {
                panic!("Expected Reply frame");
            };

            assert!(!reply.is_ok());
            let rebuilt = reply.into_status(&decoded_format).unwrap().unwrap_err();
            assert_eq!(rebuilt.kind, ExceptionKind::Business);
            assert_eq!(rebuilt.code, business_code);
            assert!(!rebuilt.is_system());
        }
    }

    let system = ExceptionEnvelope::system("pay.charge@1.0.0", "card@2", code::NOT_FOUND, "gone");
    assert!(system.is_system());
}

#[test]
fn test_system_code_range() {
    assert!(code::is_system(code::NOT_FOUND));
    assert!(code::is_system(code::INTERNAL));
    assert!(!code::is_system(code::OK));
    assert!(!code::is_system(4001));
    assert!(!code::is_system(-1));
}
