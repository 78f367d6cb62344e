use super::*;

#[test]
fn request_sets_fields() {
    let frame = Frame::request("join-room", Data::new());
    assert_eq!(frame.event, "join-room");
    assert_eq!(frame.status, Status::Request);
    assert!(frame.parent_id.is_none());
    assert!(frame.room_id.is_none());
    assert!(frame.ts > 0);
}

#[test]
fn reply_correlates_to_request() {
    let req = Frame::request("join-room", Data::new()).with_room_id("kitchen");
    let reply = req.reply("room-state", Data::new());

    assert_eq!(reply.parent_id, Some(req.id));
    assert_eq!(reply.room_id.as_deref(), Some("kitchen"));
    assert_eq!(reply.event, "room-state");
    assert_eq!(reply.status, Status::Event);
}

#[test]
fn minimal_client_frame_fills_defaults() {
    let frame: Frame = serde_json::from_str(r#"{"event":"get-history-dates","roomId":"r1"}"#).expect("decode");
    assert_eq!(frame.event, "get-history-dates");
    assert_eq!(frame.status, Status::Request);
    assert_eq!(frame.room_id.as_deref(), Some("r1"));
    assert!(frame.data.is_empty());
    assert!(frame.ts > 0);
}

#[test]
fn target_room_falls_back_to_data() {
    let frame = Frame::request("add-item", Data::new()).with_data("roomId", "from-data");
    assert_eq!(frame.target_room(), Some("from-data"));

    let frame = frame.with_room_id("from-envelope");
    assert_eq!(frame.target_room(), Some("from-envelope"));
}

#[test]
fn target_room_rejects_empty_id() {
    let frame = Frame::request("add-item", Data::new()).with_room_id("");
    assert_eq!(frame.target_room(), None);
}

#[test]
fn envelope_uses_camel_case_keys() {
    let req = Frame::request("join-room", Data::new()).with_room_id("r1");
    let reply = req.reply("room-state", Data::new());
    let json = serde_json::to_value(&reply).expect("serialize");

    assert_eq!(json["parentId"], serde_json::json!(req.id));
    assert_eq!(json["roomId"], "r1");
    assert_eq!(json["status"], "event");
}

#[test]
fn error_from_typed() {
    #[derive(Debug, thiserror::Error)]
    #[error("not found")]
    struct NotFound;

    impl ErrorCode for NotFound {
        fn error_code(&self) -> &'static str {
            "E_NOT_FOUND"
        }
    }

    let req = Frame::request("update-item", Data::new());
    let err = req.error_from(&NotFound);

    assert_eq!(err.status, Status::Error);
    assert_eq!(err.event, ERROR_EVENT);
    assert_eq!(err.parent_id, Some(req.id));
    assert_eq!(err.data.get("code").and_then(|v| v.as_str()), Some("E_NOT_FOUND"));
    assert_eq!(err.data.get("message").and_then(|v| v.as_str()), Some("not found"));
}

#[test]
fn protocol_error_has_no_parent() {
    let err = Frame::protocol_error("E_INVALID_JSON", "invalid json");

    assert_eq!(err.status, Status::Error);
    assert_eq!(err.event, ERROR_EVENT);
    assert!(err.parent_id.is_none());
    assert_eq!(err.str_field(FRAME_CODE), Some("E_INVALID_JSON"));
    assert_eq!(err.str_field(FRAME_MESSAGE), Some("invalid json"));
}
