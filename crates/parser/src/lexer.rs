//! Splits a template source into text and tag tokens.
//!
//! Delimiters are located with plain substring search; only the text between
//! a pair of delimiters goes through the tag grammar in [`crate::tag`].

use crate::tag::{HeadKind, TagHead, TagParse, parse_tag};
use stencil_template_core::{Delimiters, Dialect, Location, ParseError, ParseErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Text {
        text: String,
        location: Location,
    },
    Open {
        kind: HeadKind,
        id: String,
        qualifier: Option<String>,
        full_name: String,
        short: bool,
        raw: String,
        location: Location,
    },
    Close {
        kind: HeadKind,
        name: Option<String>,
        raw: String,
        location: Location,
    },
    Comment {
        raw: String,
        location: Location,
    },
}

/// Byte offsets of line starts, for turning offsets into locations.
struct LineIndex<'s> {
    source: &'s str,
    starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    fn new(source: &'s str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { source, starts }
    }

    fn location(&self, offset: usize) -> Location {
        let line = self.starts.partition_point(|&start| start <= offset);
        let line_start = self.starts[line - 1];
        let col = self.source[line_start..offset].chars().count() + 1;
        Location::new(line, col)
    }
}

pub(crate) struct Lexer<'s> {
    source: &'s str,
    dialect: Dialect,
    lines: LineIndex<'s>,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'s> Lexer<'s> {
    pub(crate) fn new(source: &'s str, dialect: Dialect) -> Self {
        Self {
            source,
            dialect,
            lines: LineIndex::new(source),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    pub(crate) fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let escape = self.dialect.escape().map(|e| format!("{}{{{{", e));

        let source = self.source;
        while self.pos < source.len() {
            let rest = &source[self.pos..];

            // Earliest delimiter wins; the escape sequence starts before the
            // braces it escapes, so it naturally sorts first.
            let next_tag = self
                .dialect
                .delimiters()
                .iter()
                .filter_map(|d| rest.find(d.open).map(|at| (at, *d)))
                .min_by_key(|(at, _)| *at);
            let next_escape = escape.as_deref().and_then(|e| rest.find(e).map(|at| (at, e)));

            match (next_tag, next_escape) {
                (_, Some((at, esc))) if next_tag.is_none_or(|(tag_at, _)| at <= tag_at) => {
                    self.push_text(self.pos, self.pos + at);
                    let start = self.pos + at;
                    self.push_literal("{{", start);
                    self.pos = start + esc.len();
                }
                (Some((at, delimiters)), _) => {
                    self.push_text(self.pos, self.pos + at);
                    self.lex_tag(self.pos + at, delimiters)?;
                }
                (None, _) => {
                    self.push_text(self.pos, source.len());
                    self.pos = source.len();
                }
            }
        }
        Ok(self.tokens)
    }

    fn lex_tag(&mut self, start: usize, delimiters: Delimiters) -> Result<(), ParseError> {
        let source = self.source;
        let body_start = start + delimiters.open.len();
        let Some(body_len) = source[body_start..].find(delimiters.close) else {
            if delimiters.literal_fallback {
                self.push_literal(delimiters.open, start);
                self.pos = body_start;
                return Ok(());
            }
            return Err(self.error(
                ParseErrorKind::InvalidSyntax,
                start,
                format!("'{}' is never closed by '{}'", delimiters.open, delimiters.close),
            ));
        };
        let end = body_start + body_len + delimiters.close.len();
        let body = &source[body_start..body_start + body_len];
        let raw = &source[start..end];
        let location = self.lines.location(start);

        match parse_tag(body) {
            TagParse::NotATag if delimiters.literal_fallback => {
                // An ordinary markup comment; its content is scanned as text.
                self.push_literal(delimiters.open, start);
                self.pos = body_start;
                return Ok(());
            }
            TagParse::NotATag => {
                return Err(self.error(
                    ParseErrorKind::InvalidSyntax,
                    start,
                    format!("unrecognized tag '{}'", raw),
                ));
            }
            TagParse::Malformed(message) => {
                return Err(self.error(ParseErrorKind::MalformedIdentifier, start, message));
            }
            TagParse::Invalid(message) => {
                return Err(self.error(ParseErrorKind::InvalidSyntax, start, message));
            }
            TagParse::Tag(TagHead::CommentOpen) => return self.lex_comment(start, end),
            TagParse::Tag(TagHead::CommentClose) => {
                return Err(self.error(
                    ParseErrorKind::MismatchedClose,
                    start,
                    format!("'{}' closes a comment that was never opened", raw),
                ));
            }
            TagParse::Tag(TagHead::Open { kind, name, short }) => self.tokens.push(Token::Open {
                kind,
                id: name.id.to_string(),
                qualifier: name.qualifier.map(str::to_string),
                full_name: name.full.to_string(),
                short,
                raw: raw.to_string(),
                location,
            }),
            TagParse::Tag(TagHead::Close { kind, name }) => self.tokens.push(Token::Close {
                kind,
                name: name.map(str::to_string),
                raw: raw.to_string(),
                location,
            }),
        }
        self.pos = end;
        Ok(())
    }

    /// Skips everything up to the first comment close tag. Comments do not nest.
    fn lex_comment(&mut self, start: usize, content_start: usize) -> Result<(), ParseError> {
        let close = self
            .dialect
            .delimiters()
            .iter()
            .filter_map(|d| self.comment_close(content_start, d))
            .min();
        let Some(end) = close else {
            return Err(self.error(
                ParseErrorKind::UnterminatedBlock,
                start,
                "comment is never closed",
            ));
        };
        self.tokens.push(Token::Comment {
            raw: self.source[start..end].to_string(),
            location: self.lines.location(start),
        });
        self.pos = end;
        Ok(())
    }

    /// End offset of the first tag from `from` on that reads as a comment
    /// close, whatever its spacing.
    fn comment_close(&self, from: usize, delimiters: &Delimiters) -> Option<usize> {
        let source = self.source;
        let mut search = from;
        while let Some(at) = source[search..].find(delimiters.open) {
            let body_start = search + at + delimiters.open.len();
            let body_len = source[body_start..].find(delimiters.close)?;
            let body = &source[body_start..body_start + body_len];
            if matches!(parse_tag(body), TagParse::Tag(TagHead::CommentClose)) {
                return Some(body_start + body_len + delimiters.close.len());
            }
            search = body_start;
        }
        None
    }

    fn push_text(&mut self, from: usize, to: usize) {
        if from < to {
            let source = self.source;
            let text = &source[from..to];
            self.push_literal(text, from);
        }
    }

    fn push_literal(&mut self, text: &str, offset: usize) {
        if let Some(Token::Text { text: previous, .. }) = self.tokens.last_mut() {
            previous.push_str(text);
            return;
        }
        self.tokens.push(Token::Text {
            text: text.to_string(),
            location: self.lines.location(offset),
        });
    }

    fn error(&self, kind: ParseErrorKind, offset: usize, message: impl Into<String>) -> ParseError {
        ParseError::new(kind, self.lines.location(offset), message)
    }
}
