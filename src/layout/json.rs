//! Structured JSON layout: one object per event, insertion-ordered keys.

use super::Layout;
use crate::event::{Event, Throwable};
use chrono::{DateTime, Utc};

/// JSON output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonStyle {
    /// No whitespace, single line, `\n`-terminated.
    Compact,
    /// 2-space indentation, newline-separated entries.
    Pretty,
}

/// Renders each [`Event`] as a single JSON object.
///
/// Additional static fields (supplied at construction) are appended to
/// every record after the standard fields, in the order given.
pub struct JsonLayout {
    style: JsonStyle,
    time_format: Option<String>,
    static_fields: Vec<(String, String)>,
}

impl JsonLayout {
    pub fn new(style: JsonStyle) -> Self {
        JsonLayout {
            style,
            time_format: None,
            static_fields: Vec::new(),
        }
    }

    /// Override the timestamp format (chrono strftime). Defaults to
    /// ISO-8601 (RFC 3339) when unset.
    pub fn with_time_format(mut self, format: impl Into<String>) -> Self {
        self.time_format = Some(format.into());
        self
    }

    /// Add a field emitted verbatim on every record, already JSON-encoded
    /// as a value (e.g. `"\"hostname\""` or `"1"`).
    pub fn with_static_field(mut self, key: impl Into<String>, raw_json_value: impl Into<String>) -> Self {
        self.static_fields.push((key.into(), raw_json_value.into()));
        self
    }
}

/// Escape a string per the JSON escaping rules: the seven standard
/// backslash escapes, control codes below 0x20 as lowercase `\u00XX`, and
/// everything else (including non-ASCII) passed through unescaped.
fn escape_json_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

struct ObjectWriter<'a> {
    out: &'a mut String,
    pretty: bool,
    indent: usize,
    first_field: bool,
}

impl<'a> ObjectWriter<'a> {
    fn open(out: &'a mut String, pretty: bool, indent: usize) -> Self {
        out.push('{');
        ObjectWriter { out, pretty, indent, first_field: true }
    }

    fn field_prefix(&mut self) {
        if !self.first_field {
            self.out.push(',');
        }
        self.first_field = false;
        if self.pretty {
            self.out.push('\n');
            for _ in 0..(self.indent + 1) {
                self.out.push_str("  ");
            }
        }
    }

    fn string_field(&mut self, key: &str, value: &str) {
        self.field_prefix();
        escape_json_string(key, self.out);
        self.out.push(':');
        if self.pretty {
            self.out.push(' ');
        }
        escape_json_string(value, self.out);
    }

    fn raw_field(&mut self, key: &str, raw_value: &str) {
        self.field_prefix();
        escape_json_string(key, self.out);
        self.out.push(':');
        if self.pretty {
            self.out.push(' ');
        }
        self.out.push_str(raw_value);
    }

    fn object_field(&mut self, key: &str) -> ObjectWriter<'_> {
        self.field_prefix();
        escape_json_string(key, self.out);
        self.out.push(':');
        if self.pretty {
            self.out.push(' ');
        }
        ObjectWriter::open(&mut *self.out, self.pretty, self.indent + 1)
    }

    fn close(self) {
        if self.pretty && !self.first_field {
            self.out.push('\n');
            for _ in 0..self.indent {
                self.out.push_str("  ");
            }
        }
        self.out.push('}');
    }
}

fn write_throwable(writer: &mut ObjectWriter<'_>, throwable: &Throwable) {
    let mut exc = writer.object_field("exception");
    exc.string_field("class", &throwable.class);
    exc.string_field("message", &throwable.message);

    // stackTrace array
    exc.field_prefix();
    escape_json_string("stackTrace", exc.out);
    exc.out.push(':');
    if exc.pretty {
        exc.out.push(' ');
    }
    exc.out.push('[');
    for (i, frame) in throwable.stack_frames.iter().enumerate() {
        if i > 0 {
            exc.out.push(',');
        }
        escape_json_string(frame, exc.out);
    }
    exc.out.push(']');

    // cause: one level deep only (class + message), per design notes.
    if let Some(cause) = &throwable.cause {
        let mut cause_writer = exc.object_field("cause");
        cause_writer.string_field("class", &cause.class);
        cause_writer.string_field("message", &cause.message);
        cause_writer.close();
    }

    exc.close();
}

impl Layout for JsonLayout {
    fn format(&self, event: &Event) -> Vec<u8> {
        let pretty = self.style == JsonStyle::Pretty;
        let mut out = String::new();
        let mut writer = ObjectWriter::open(&mut out, pretty, 0);

        let dt: DateTime<Utc> =
            DateTime::from_timestamp_millis(event.timestamp_millis).unwrap_or_default();
        let timestamp = match &self.time_format {
            Some(fmt) => dt.format(fmt).to_string(),
            None => dt.to_rfc3339(),
        };
        writer.string_field("timestamp", &timestamp);
        writer.string_field("level", event.level.as_str());
        writer.string_field("logger", &event.logger_name);

        match &event.message {
            Some(message) => writer.string_field("message", message),
            None => writer.raw_field("message", "null"),
        }

        writer.string_field("thread", &event.thread_name);

        if let Some(location) = &event.location {
            let mut loc = writer.object_field("location");
            loc.string_field("class", &location.class);
            loc.string_field("method", &location.method);
            loc.string_field("file", &location.file);
            loc.raw_field("line", &location.line.to_string());
            loc.close();
        }

        if let Some(throwable) = &event.throwable {
            write_throwable(&mut writer, throwable);
        }

        for (key, raw_value) in &self.static_fields {
            writer.raw_field(key, raw_value);
        }

        writer.close();

        if self.style == JsonStyle::Compact {
            out.push('\n');
        }
        out.into_bytes()
    }

    fn renders_throwable(&self) -> bool {
        true
    }
}
