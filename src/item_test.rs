use super::*;
use serde_json::json;

fn note_json(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "type": "note",
        "position": {"x": 10.0, "y": 20.0},
        "zIndex": 3,
        "rotation": -4.5,
        "data": {"color": "#FFEB3B", "text": "hello"}
    })
}

#[test]
fn decodes_note_with_typed_payload() {
    let item = CanvasItem::from_payload(Some(&note_json("n1"))).expect("valid note");
    assert_eq!(item.id, "n1");
    assert_eq!(item.kind(), ItemKind::Note);
    assert!((item.z_index - 3.0).abs() < f64::EPSILON);
    assert!((item.rotation + 4.5).abs() < f64::EPSILON);
    let ItemContent::Note(note) = &item.content else {
        panic!("expected note content");
    };
    assert_eq!(note.text, "hello");
    assert_eq!(note.color, "#FFEB3B");
}

#[test]
fn encodes_back_to_wire_shape() {
    let item = CanvasItem::from_payload(Some(&note_json("n1"))).expect("valid note");
    let value = serde_json::to_value(&item).expect("serialize");
    assert_eq!(value["type"], "note");
    assert_eq!(value["zIndex"], 3.0);
    assert_eq!(value["position"]["x"], 10.0);
    assert_eq!(value["data"]["text"], "hello");
}

#[test]
fn unknown_data_keys_survive_round_trip() {
    let value = json!({
        "id": "p1",
        "type": "photo",
        "position": {"x": 0, "y": 0},
        "data": {"imageUrl": "u", "dateTaken": "d", "caption": "hello", "width": 300}
    });
    let item = CanvasItem::from_payload(Some(&value)).expect("valid photo");
    let encoded = serde_json::to_value(&item).expect("serialize");

    assert_eq!(encoded["data"]["imageUrl"], "u");
    assert_eq!(encoded["data"]["caption"], "hello");
    assert_eq!(encoded["data"]["width"], 300);
}

#[test]
fn spotify_is_accepted_as_media() {
    let value = json!({
        "id": "m1",
        "type": "spotify",
        "position": {"x": 0, "y": 0},
        "data": {"embedUrl": "https://open.spotify.com/embed/track/1"}
    });
    let item = CanvasItem::from_payload(Some(&value)).expect("valid media");
    assert_eq!(item.kind(), ItemKind::Media);
    assert_eq!(serde_json::to_value(&item).expect("serialize")["type"], "media");
}

#[test]
fn gif_defaults_scale_and_sticker_flag() {
    let value = json!({
        "id": "g1",
        "type": "gif",
        "data": {"gifUrl": "https://media.example/cat.gif"}
    });
    let item = CanvasItem::from_payload(Some(&value)).expect("valid gif");
    let ItemContent::Gif(gif) = item.content else {
        panic!("expected gif content");
    };
    assert!((gif.scale - 1.0).abs() < f64::EPSILON);
    assert!(!gif.is_sticker);
}

#[test]
fn rejects_unknown_type() {
    let value = json!({"id": "x", "type": "hologram", "data": {}});
    assert!(matches!(CanvasItem::from_payload(Some(&value)), Err(ItemError::Malformed(_))));
}

#[test]
fn rejects_payload_that_does_not_match_type() {
    // A note payload under the photo type.
    let value = json!({"id": "p1", "type": "photo", "data": {"color": "#fff", "text": "hi"}});
    assert!(matches!(CanvasItem::from_payload(Some(&value)), Err(ItemError::Malformed(_))));
}

#[test]
fn rejects_empty_required_url() {
    let value = json!({"id": "a1", "type": "audio", "data": {"audioUrl": "  "}});
    let err = CanvasItem::from_payload(Some(&value)).expect_err("empty url");
    assert!(matches!(err, ItemError::EmptyField { kind: ItemKind::Audio, field: "audioUrl" }));
}

#[test]
fn rejects_empty_id() {
    let mut value = note_json("");
    value["id"] = json!("");
    assert!(matches!(CanvasItem::from_payload(Some(&value)), Err(ItemError::EmptyId)));
}

#[test]
fn rejects_missing_payload() {
    assert!(matches!(CanvasItem::from_payload(None), Err(ItemError::Missing)));
}

#[test]
fn list_decode_fails_on_any_invalid_entry() {
    let value = json!([note_json("a"), {"id": "b", "type": "doodle", "data": {"pathData": ""}}]);
    assert!(CanvasItem::list_from_payload(Some(&value)).is_err());

    let value = json!([note_json("a"), note_json("b")]);
    let items = CanvasItem::list_from_payload(Some(&value)).expect("valid list");
    assert_eq!(items.len(), 2);
}

#[test]
fn error_code_is_stable() {
    assert_eq!(ItemError::EmptyId.error_code(), "E_INVALID_ITEM");
}
