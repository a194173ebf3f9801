//! Pattern-based text layout, e.g. `"[%level] %logger - %message%n"`.

use super::Layout;
use crate::event::{Event, Location};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[cfg(windows)]
const PLATFORM_NEWLINE: &str = "\r\n";
#[cfg(not(windows))]
const PLATFORM_NEWLINE: &str = "\n";

#[derive(Debug, Clone)]
enum Token {
    Literal(String),
    Level,
    Thread,
    Logger,
    Message,
    Class,
    Method,
    Line,
    File,
    Newline,
    Date(String),
}

/// A compiled `%token`-based pattern. Unknown `%foo` tokens are emitted
/// verbatim, including the leading `%`.
pub struct PatternLayout {
    tokens: Vec<Token>,
}

impl PatternLayout {
    pub fn new(pattern: &str) -> Self {
        PatternLayout {
            tokens: compile(pattern),
        }
    }
}

/// Convert a user-supplied date pattern (`yyyy-MM-dd HH:mm:ss`-style) to a
/// chrono strftime format, falling back to the default on any token chrono
/// cannot parse.
fn resolve_date_format(user_pattern: &str) -> String {
    let converted = user_pattern
        .replace("yyyy", "%Y")
        .replace("yy", "%y")
        .replace("MM", "%m")
        .replace("dd", "%d")
        .replace("HH", "%H")
        .replace("mm", "%M")
        .replace("ss", "%S")
        .replace("SSS", "%3f");

    let has_error = StrftimeItems::new(&converted).any(|item| matches!(item, Item::Error));
    if has_error {
        DEFAULT_DATE_FORMAT.to_string()
    } else {
        converted
    }
}

fn compile(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    macro_rules! flush_literal {
        () => {
            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
        };
    }

    while i < chars.len() {
        if chars[i] != '%' {
            literal.push(chars[i]);
            i += 1;
            continue;
        }

        let rest: String = chars[i + 1..].iter().collect();
        // Longest names first so "logger" isn't shadowed by a shorter prefix.
        let matched = [
            ("message", Token::Message),
            ("thread", Token::Thread),
            ("logger", Token::Logger),
            ("method", Token::Method),
            ("level", Token::Level),
            ("class", Token::Class),
            ("line", Token::Line),
            ("file", Token::File),
            ("n", Token::Newline),
        ]
        .into_iter()
        .find(|(name, _)| rest.starts_with(name))
        .map(|(name, token)| (name.len(), token));

        if rest.starts_with("date") {
            let after = &rest[4..];
            if let Some(stripped) = after.strip_prefix('{') {
                if let Some(end) = stripped.find('}') {
                    let user_fmt = &stripped[..end];
                    flush_literal!();
                    tokens.push(Token::Date(resolve_date_format(user_fmt)));
                    i += 1 + 4 + 1 + end + 1; // % date { fmt }
                    continue;
                }
            }
            flush_literal!();
            tokens.push(Token::Date(DEFAULT_DATE_FORMAT.to_string()));
            i += 1 + 4;
            continue;
        }

        if let Some((token_len, token)) = matched {
            flush_literal!();
            tokens.push(token);
            i += 1 + token_len;
            continue;
        }

        // Unknown token: emit the '%' verbatim and keep scanning from the
        // next character so "%foo" ends up as literal text.
        literal.push('%');
        i += 1;
    }

    flush_literal!();
    tokens
}

impl Layout for PatternLayout {
    fn format(&self, event: &Event) -> Vec<u8> {
        let mut out = String::new();
        let unknown_location = Location::unknown();
        let location = event.location.as_ref().unwrap_or(&unknown_location);

        for token in &self.tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Level => out.push_str(event.level.as_str()),
                Token::Thread => out.push_str(&event.thread_name),
                Token::Logger => out.push_str(&event.logger_name),
                Token::Message => out.push_str(event.message.as_deref().unwrap_or("null")),
                Token::Class => out.push_str(&location.class),
                Token::Method => out.push_str(&location.method),
                Token::Line => out.push_str(&location.line.to_string()),
                Token::File => out.push_str(&location.file),
                Token::Newline => out.push_str(PLATFORM_NEWLINE),
                Token::Date(fmt) => {
                    let dt: DateTime<Utc> =
                        DateTime::from_timestamp_millis(event.timestamp_millis).unwrap_or_default();
                    out.push_str(&dt.format(fmt).to_string());
                }
            }
        }

        out.into_bytes()
    }

    fn renders_throwable(&self) -> bool {
        // Pattern layout appends the primary throwable's stack trace
        // separately (see RollingFileSink/ConsoleSink), not via a token.
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;

    fn event(message: &str) -> Event {
        Event::builder("app", Level::Info).message(message).build()
    }

    #[test]
    fn basic_pattern() {
        let layout = PatternLayout::new("[%level] %message%n");
        let bytes = layout.format(&event("hello"));
        assert_eq!(bytes, b"[INFO] hello\n");
    }

    #[test]
    fn unknown_token_is_verbatim() {
        let layout = PatternLayout::new("%level %bogus %message");
        let bytes = layout.format(&event("hi"));
        assert_eq!(String::from_utf8(bytes).unwrap(), "INFO %bogus hi");
    }

    #[test]
    fn missing_location_fields_use_placeholders() {
        let layout = PatternLayout::new("%class/%method/%file/%line");
        let bytes = layout.format(&event("x"));
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "Unknown/unknown/Unknown/0"
        );
    }

    #[test]
    fn custom_date_format_is_applied() {
        let layout = PatternLayout::new("%date{yyyy/MM/dd}");
        let bytes = layout.format(&event("x"));
        let s = String::from_utf8(bytes).unwrap();
        assert_eq!(s.len(), "2024/01/01".len());
        assert!(s.chars().nth(4) == Some('/'));
    }

    #[test]
    fn invalid_date_format_falls_back_to_default() {
        let layout = PatternLayout::new("%date{%Q}");
        let bytes = layout.format(&event("x"));
        let s = String::from_utf8(bytes).unwrap();
        // default format is "yyyy-MM-dd HH:mm:ss" shaped
        assert!(s.len() >= "0000-00-00 00:00:00".len());
    }
}
