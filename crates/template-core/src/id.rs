use crate::dialect::Dialect;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Character encodings a template resource may be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "UTF-8", alias = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "ISO-8859-1", alias = "iso-8859-1", alias = "latin1")]
    Latin1,
    #[serde(rename = "US-ASCII", alias = "us-ascii", alias = "ascii")]
    Ascii,
}

impl Encoding {
    pub fn label(self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Latin1 => "ISO-8859-1",
            Encoding::Ascii => "US-ASCII",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Encoding::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Some(Encoding::Latin1),
            "us-ascii" | "ascii" => Some(Encoding::Ascii),
            _ => None,
        }
    }

    /// Decodes raw resource bytes. A leading UTF-8 byte order mark is dropped.
    pub fn decode(self, bytes: &[u8]) -> Result<String, String> {
        match self {
            Encoding::Utf8 => {
                let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
                std::str::from_utf8(bytes)
                    .map(str::to_owned)
                    .map_err(|e| e.to_string())
            }
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            Encoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(format!(
                    "non-ASCII byte 0x{:02X} at offset {}",
                    bytes[offset], offset
                )),
                None => Ok(bytes.iter().map(|&b| b as char).collect()),
            },
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identifies one compiled template: a logical name in a dialect and encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateId {
    pub name: String,
    pub dialect: Dialect,
    pub encoding: Encoding,
}

impl TemplateId {
    pub fn new(name: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            name: name.into(),
            dialect,
            encoding: Encoding::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}, {}]", self.name, self.dialect, self.encoding)
    }
}

/// How a template treats a second declaration of an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// A repeated identifier is a structural error.
    #[default]
    Reject,
    /// All occurrences share one binding; the last declaration supplies the
    /// default content.
    LastWins,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_decode_strips_bom() {
        let bytes = b"\xEF\xBB\xBFhello";
        assert_eq!(Encoding::Utf8.decode(bytes).unwrap(), "hello");
    }

    #[test]
    fn test_utf8_decode_rejects_invalid_bytes() {
        assert!(Encoding::Utf8.decode(&[0x66, 0xFF, 0x6F]).is_err());
    }

    #[test]
    fn test_latin1_decode() {
        assert_eq!(Encoding::Latin1.decode(&[0x63, 0x61, 0x66, 0xE9]).unwrap(), "café");
    }

    #[test]
    fn test_ascii_decode_reports_offset() {
        let err = Encoding::Ascii.decode(b"ab\x80").unwrap_err();
        assert!(err.contains("0x80"));
        assert!(err.contains("offset 2"));
    }

    #[test]
    fn test_encoding_labels() {
        assert_eq!(Encoding::from_label("latin1"), Some(Encoding::Latin1));
        assert_eq!(Encoding::from_label(" UTF-8 "), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_label("koi8-r"), None);
        let parsed: Encoding = serde_json::from_str("\"ISO-8859-1\"").unwrap();
        assert_eq!(parsed, Encoding::Latin1);
    }

    #[test]
    fn test_template_id_display() {
        let id = TemplateId::new("mail.welcome", Dialect::Markup).with_encoding(Encoding::Ascii);
        assert_eq!(id.to_string(), "mail.welcome [markup, US-ASCII]");
    }

    #[test]
    fn test_duplicate_policy_serde() {
        let policy: DuplicatePolicy = serde_json::from_str("\"last-wins\"").unwrap();
        assert_eq!(policy, DuplicatePolicy::LastWins);
        assert_eq!(DuplicatePolicy::default(), DuplicatePolicy::Reject);
    }
}
