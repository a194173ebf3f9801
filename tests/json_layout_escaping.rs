//! JSON layout output is exercised against `serde_json` to confirm it
//! is always well-formed, and against literal strings to confirm exact
//! escaping and field-ordering behavior.

use emberlog::event::Event;
use emberlog::layout::{JsonLayout, JsonStyle, Layout};
use emberlog::level::Level;

#[test]
fn compact_output_parses_as_json_with_expected_shape() {
    let layout = JsonLayout::new(JsonStyle::Compact);
    let event = Event::builder("app.service", Level::Warn).message("disk at 91%").build();
    let bytes = layout.format(&event);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.ends_with('\n'));

    let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
    assert_eq!(value["level"], "WARN");
    assert_eq!(value["logger"], "app.service");
    assert_eq!(value["message"], "disk at 91%");
}

#[test]
fn control_characters_and_quotes_are_escaped() {
    let layout = JsonLayout::new(JsonStyle::Compact);
    let event = Event::builder("app", Level::Info)
        .message("line one\nline \"two\"\tend")
        .build();
    let bytes = layout.format(&event);
    let text = String::from_utf8(bytes).unwrap();

    assert!(text.contains(r#"line one\nline \"two\"\tend"#));
    let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
    assert_eq!(value["message"], "line one\nline \"two\"\tend");
}

#[test]
fn null_message_is_literal_json_null() {
    let layout = JsonLayout::new(JsonStyle::Compact);
    let event = Event::builder("app", Level::Info).build();
    let bytes = layout.format(&event);
    let text = String::from_utf8(bytes).unwrap();
    let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
    assert!(value["message"].is_null());
}

#[test]
fn pretty_mode_is_multiline_and_still_valid_json() {
    let layout = JsonLayout::new(JsonStyle::Pretty);
    let event = Event::builder("app", Level::Error).message("boom").build();
    let bytes = layout.format(&event);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.lines().count() > 1);
    let _: serde_json::Value = serde_json::from_str(&text).unwrap();
}
