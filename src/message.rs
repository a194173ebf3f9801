//! `{}`-placeholder message interpolation and throwable extraction.

use crate::event::Throwable;

/// An interpolation argument. `Throwable` is only meaningful as the last
/// argument in a call; see [`MessageFormatter::format`].
#[derive(Debug, Clone)]
pub enum Arg {
    Null,
    Str(String),
    Array(Vec<Arg>),
    Throwable(Throwable),
}

impl Arg {
    fn render(&self) -> String {
        match self {
            Arg::Null => "null".to_string(),
            Arg::Str(s) => s.clone(),
            Arg::Array(items) => {
                let rendered: Vec<String> = items.iter().map(Arg::render).collect();
                format!("[{}]", rendered.join(", "))
            }
            // A throwable reaching render() (i.e. not the trailing arg) is
            // rendered by its class + message, same as any other object's
            // string form would be.
            Arg::Throwable(t) => format!("{}: {}", t.class, t.message),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

/// Stateless `{}`-placeholder interpolator.
pub struct MessageFormatter;

impl MessageFormatter {
    /// Interpolate `pattern` against `args`, extracting a trailing
    /// throwable argument if present.
    ///
    /// Returns the interpolated string and, if the last element of `args`
    /// was [`Arg::Throwable`], that throwable (removed from the
    /// interpolation list - it never consumes a `{}` marker).
    pub fn format(pattern: Option<&str>, args: &[Arg]) -> (String, Option<Throwable>) {
        let Some(pattern) = pattern else {
            return ("null".to_string(), None);
        };

        let (throwable, interpolation_args) = match args.split_last() {
            Some((Arg::Throwable(t), rest)) => (Some(t.clone()), rest),
            _ => (None, args),
        };

        (Self::interpolate(pattern, interpolation_args), throwable)
    }

    fn interpolate(pattern: &str, args: &[Arg]) -> String {
        let mut out = String::with_capacity(pattern.len() + args.len() * 8);
        let mut arg_idx = 0;
        let bytes = pattern.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            // `\{}`: literal two-character marker, does not consume an arg.
            if bytes[i] == b'\\' && pattern[i..].starts_with("\\{}") {
                out.push_str("{}");
                i += 3;
                continue;
            }
            if pattern[i..].starts_with("{}") {
                if arg_idx < args.len() {
                    out.push_str(&args[arg_idx].render());
                    arg_idx += 1;
                } else {
                    out.push_str("{}");
                }
                i += 2;
                continue;
            }
            let ch = pattern[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }

        out
    }
}
