use super::*;

use serde_json::json;

#[test]
fn message_type_tags_parse_back_to_themselves() {
    for kind in MessageType::ALL {
        assert_eq!(kind.as_str().parse::<MessageType>().expect("known tag"), kind);
    }
}

#[test]
fn message_type_rejects_unknown_tag() {
    let err = "board:join".parse::<MessageType>().expect_err("unknown tag");
    assert!(matches!(err, CodecError::UnknownType(ref t) if t == "board:join"));
    assert!(err.is_unknown_type());
}

#[test]
fn only_widget_types_are_widget_mutations() {
    let widgets: Vec<_> = MessageType::ALL.into_iter().filter(|k| k.is_widget()).collect();
    assert_eq!(widgets.len(), 6);
    assert!(!MessageType::CursorMove.is_widget());
}

#[test]
fn decode_auth_ack_with_envelope_id() {
    let frame = decode_frame(r#"{"type":"ack","id":"auth","success":true}"#).expect("decode");
    assert_eq!(frame.id.as_deref(), Some("auth"));
    assert_eq!(
        frame.body,
        Body::Ack {
            original_message_id: None,
            success: true,
            message: None
        }
    );
}

#[test]
fn decode_ack_without_success_is_a_failure() {
    let frame = decode_frame(r#"{"type":"ack","originalMessageId":"m-1"}"#).expect("decode");
    let Body::Ack { original_message_id, success, .. } = frame.body else {
        panic!("expected ack");
    };
    assert_eq!(original_message_id.as_deref(), Some("m-1"));
    assert!(!success);
}

#[test]
fn decode_widget_move_reads_camel_case_fields() {
    let text = r#"{"type":"widget:move","widgetId":"w1","position":{"x":5,"y":9},"canvasId":"canvas-1","userId":"u2","timestamp":1700}"#;
    let frame = decode_frame(text).expect("decode");
    assert_eq!(frame.kind(), MessageType::WidgetMove);
    assert_eq!(frame.canvas_id.as_deref(), Some("canvas-1"));
    assert_eq!(frame.user_id.as_deref(), Some("u2"));
    assert_eq!(frame.timestamp, Some(1700));
    assert_eq!(
        frame.body,
        Body::WidgetMove {
            widget_id: "w1".to_owned(),
            position: Point::new(5.0, 9.0)
        }
    );
}

#[test]
fn decode_presence_update_keeps_absent_fields_absent() {
    let frame = decode_frame(r#"{"type":"presence:update","userId":"u2","cursor":{"x":1.5,"y":2}}"#)
        .expect("decode");
    let Body::PresenceUpdate { cursor, selected_ids } = frame.body else {
        panic!("expected presence update");
    };
    assert_eq!(cursor, Some(Point::new(1.5, 2.0)));
    assert!(selected_ids.is_none());
}

#[test]
fn decode_presence_join_accepts_display_name_alias() {
    let text = r##"{"type":"presence:join","user":{"id":"u2","displayName":"Ada","color":"#ff0000"}}"##;
    let frame = decode_frame(text).expect("decode");
    let Body::PresenceJoin { user } = frame.body else {
        panic!("expected presence join");
    };
    assert_eq!(user.name, "Ada");
    assert_eq!(user.color.as_deref(), Some("#ff0000"));
    assert!(user.avatar.is_none());
}

#[test]
fn decode_unit_variants_ignore_extra_fields() {
    let frame = decode_frame(r#"{"type":"presence:leave","userId":"u2","reason":"timeout"}"#).expect("decode");
    assert_eq!(frame.body, Body::PresenceLeave);
    assert_eq!(frame.user_id.as_deref(), Some("u2"));
}

#[test]
fn decode_rejects_unknown_type_distinctly() {
    let err = decode_frame(r#"{"type":"board:savepoint","data":{}}"#).expect_err("unknown");
    assert!(err.is_unknown_type());
}

#[test]
fn decode_rejects_missing_type() {
    let err = decode_frame(r#"{"widgetId":"w1"}"#).expect_err("missing type");
    assert!(matches!(err, CodecError::MissingType));
}

#[test]
fn decode_rejects_non_json() {
    let err = decode_frame("not json").expect_err("malformed");
    assert!(matches!(err, CodecError::Json(_)));
}

#[test]
fn decode_rejects_known_type_with_bad_payload() {
    let err = decode_frame(r#"{"type":"widget:move","widgetId":"w1"}"#).expect_err("no position");
    assert!(matches!(
        err,
        CodecError::Payload {
            kind: MessageType::WidgetMove,
            ..
        }
    ));
}

#[test]
fn encode_writes_type_tag_and_omits_empty_envelope_fields() {
    let frame = Frame {
        body: Body::CursorMove {
            cursor: Point::new(3.0, 4.0),
        },
        id: None,
        timestamp: None,
        canvas_id: Some("c1".to_owned()),
        user_id: Some("me".to_owned()),
    };
    let text = encode_frame(&frame).expect("encode");
    let value: Value = serde_json::from_str(&text).expect("json");
    assert_eq!(
        value,
        json!({"type": "cursor:move", "cursor": {"x": 3.0, "y": 4.0}, "canvasId": "c1", "userId": "me"})
    );
}

#[test]
fn encode_unit_variant_is_just_the_tag_and_envelope() {
    let frame = Frame::new(Body::Leave).with_canvas_id("c1");
    let value: Value = serde_json::from_str(&encode_frame(&frame).expect("encode")).expect("json");
    assert_eq!(value["type"], "leave");
    assert_eq!(value["canvasId"], "c1");
    assert!(value.get("id").is_none());
}

#[test]
fn encode_selection_change_uses_selected_ids_key() {
    let frame = Frame::new(Body::SelectionChange {
        selected_ids: vec!["a".to_owned(), "b".to_owned()],
    });
    let value: Value = serde_json::from_str(&encode_frame(&frame).expect("encode")).expect("json");
    assert_eq!(value["selectedIds"], json!(["a", "b"]));
}

#[test]
fn ack_constructor_sets_both_correlation_fields() {
    let frame = Frame::ack("auth", false);
    assert_eq!(frame.id.as_deref(), Some("auth"));
    let Body::Ack { original_message_id, success, .. } = frame.body else {
        panic!("expected ack");
    };
    assert_eq!(original_message_id.as_deref(), Some("auth"));
    assert!(!success);
}

#[test]
fn new_frame_is_timestamped() {
    let frame = Frame::new(Body::Leave);
    assert!(frame.timestamp.expect("timestamp") > 0);
    assert!(frame.id.is_none());
}
