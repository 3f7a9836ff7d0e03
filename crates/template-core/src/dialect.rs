//! Template dialects and their syntax tables.
//!
//! Every dialect shares the same tag grammar but differs in which delimiters
//! introduce a tag, how literal delimiters are escaped, and how raw values are
//! encoded before they are bound.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// A pair of tag delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub open: &'static str,
    pub close: &'static str,
    /// When true, an occurrence of `open` that does not start a recognised tag
    /// is ordinary literal text instead of a syntax error.
    pub literal_fallback: bool,
}

const BRACES: Delimiters = Delimiters {
    open: "{{",
    close: "}}",
    literal_fallback: false,
};

const MARKUP_COMMENT: Delimiters = Delimiters {
    open: "<!--",
    close: "-->",
    literal_fallback: true,
};

const MARKUP_DELIMITERS: &[Delimiters] = &[MARKUP_COMMENT, BRACES];
const BRACE_DELIMITERS: &[Delimiters] = &[BRACES];

/// The templating sub-language, tied to an output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Structured markup (HTML, XML, SVG).
    Markup,
    /// Plain text.
    Text,
    /// Data interchange (JSON).
    Data,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Markup, Dialect::Text, Dialect::Data];

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Markup => "markup",
            Dialect::Text => "text",
            Dialect::Data => "data",
        }
    }

    /// Tag delimiters recognised by this dialect, in priority order.
    pub fn delimiters(self) -> &'static [Delimiters] {
        match self {
            Dialect::Markup => MARKUP_DELIMITERS,
            Dialect::Text | Dialect::Data => BRACE_DELIMITERS,
        }
    }

    /// The escape sequence that turns a following `{{` into literal text.
    pub fn escape(self) -> Option<&'static str> {
        match self {
            Dialect::Markup => None,
            Dialect::Text | Dialect::Data => Some("\\"),
        }
    }

    /// The canonical file extension of resources in this dialect.
    pub fn extension(self) -> &'static str {
        match self {
            Dialect::Markup => "html",
            Dialect::Text => "txt",
            Dialect::Data => "json",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "html" | "htm" | "xml" | "svg" => Some(Dialect::Markup),
            "txt" | "text" => Some(Dialect::Text),
            "json" => Some(Dialect::Data),
            _ => None,
        }
    }

    /// Maps a logical template name to a relative resource path.
    ///
    /// Names without a `/` use `.` as the path separator, so `mail.welcome`
    /// and `mail/welcome` both resolve to `mail/welcome.<ext>`.
    pub fn resource_path(self, name: &str) -> String {
        let path = if name.contains('/') {
            name.to_string()
        } else {
            name.replace('.', "/")
        };
        format!("{}.{}", path, self.extension())
    }

    /// Encodes raw text so it can be embedded literally in this dialect's output.
    pub fn encode(self, raw: &str) -> Cow<'_, str> {
        match self {
            Dialect::Markup => encode_markup(raw),
            Dialect::Text => Cow::Borrowed(raw),
            Dialect::Data => encode_json(raw),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markup" => Ok(Dialect::Markup),
            "text" => Ok(Dialect::Text),
            "data" => Ok(Dialect::Data),
            other => Dialect::from_extension(other)
                .ok_or_else(|| format!("unknown template dialect '{}'", s)),
        }
    }
}

fn encode_markup(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 16);
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn encode_json(raw: &str) -> Cow<'_, str> {
    if !raw.chars().any(|c| c == '"' || c == '\\' || c.is_control()) {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 16);
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
