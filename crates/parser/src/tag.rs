//! A `nom`-based parser for the text between a pair of tag delimiters.
//!
//! The lexer finds `{{ ... }}` (or `<!-- ... -->`) and hands the inner text
//! here. Whether the text is a tag at all is decided by the kind head
//! (`v:`, `/b:`, `c`, ...); once a head is recognised, a bad name is an error
//! rather than literal text.
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{alpha1, char},
    combinator::{all_consuming, map, recognize, value},
    sequence::{pair, separated_pair},
};

/// The kind letter of a tag head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum HeadKind {
    Value,
    Block,
    Filtered,
    Alternative,
    Include,
}

impl HeadKind {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            HeadKind::Value => "value",
            HeadKind::Block => "block",
            HeadKind::Filtered => "filtered",
            HeadKind::Alternative => "alternative",
            HeadKind::Include => "include",
        }
    }
}

/// The validated name part of an opening tag.
///
/// `id` is the identifier the tag binds (the include path for includes);
/// `qualifier` is the filter key of a filtered tag or the alternative name of
/// an alternative. `full` is the text after the kind head, which is what a
/// named close tag must repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TagName<'a> {
    pub id: &'a str,
    pub qualifier: Option<&'a str>,
    pub full: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagHead<'a> {
    Open {
        kind: HeadKind,
        name: TagName<'a>,
        short: bool,
    },
    Close {
        kind: HeadKind,
        name: Option<&'a str>,
    },
    CommentOpen,
    CommentClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TagParse<'a> {
    Tag(TagHead<'a>),
    /// The text has no tag head; the lexer decides whether that is literal.
    NotATag,
    /// A tag head followed by a name that breaks the identifier rules.
    Malformed(String),
    /// A tag head used in a way the grammar does not allow.
    Invalid(String),
}

/// Classifies the text between two delimiters.
pub(crate) fn parse_tag(body: &str) -> TagParse<'_> {
    let body = body.trim();
    match body {
        "c" => return TagParse::Tag(TagHead::CommentOpen),
        "/c" => return TagParse::Tag(TagHead::CommentClose),
        _ => {}
    }

    if let Some(rest) = body.strip_prefix('/') {
        let Ok((after, kind)) = kind_letter(rest) else {
            return TagParse::NotATag;
        };
        if after.is_empty() {
            if kind == HeadKind::Include {
                return TagParse::Invalid("include tags have no close tag".to_string());
            }
            return TagParse::Tag(TagHead::Close { kind, name: None });
        }
        let Some(name) = after.strip_prefix(':') else {
            return TagParse::NotATag;
        };
        if kind == HeadKind::Include {
            return TagParse::Invalid(format!("include tags have no close tag: '/{}'", rest));
        }
        return match tag_name(kind, name) {
            Ok(_) => TagParse::Tag(TagHead::Close {
                kind,
                name: Some(name),
            }),
            Err(message) => TagParse::Malformed(message),
        };
    }

    let Ok((after, kind)) = kind_letter(body) else {
        return TagParse::NotATag;
    };
    let Some(rest) = after.strip_prefix(':') else {
        return TagParse::NotATag;
    };
    let (name, short) = match rest.strip_suffix('/') {
        Some(name) => (name, true),
        None => (rest, false),
    };
    if kind == HeadKind::Include && !short {
        return TagParse::Invalid(format!("include of '{}' must be self-closing", name));
    }
    match tag_name(kind, name) {
        Ok(name) => TagParse::Tag(TagHead::Open { kind, name, short }),
        Err(message) => TagParse::Malformed(message),
    }
}

/// Validates a name against the grammar of its tag kind.
fn tag_name(kind: HeadKind, name: &str) -> Result<TagName<'_>, String> {
    let parsed = match kind {
        HeadKind::Value | HeadKind::Block => all_consuming(identifier)
            .parse(name)
            .map(|(_, id)| (id, None)),
        // f:KEY:ID
        HeadKind::Filtered => all_consuming(qualified)
            .parse(name)
            .map(|(_, (key, id))| (id, Some(key))),
        // a:ID:ALT
        HeadKind::Alternative => all_consuming(qualified)
            .parse(name)
            .map(|(_, (id, alt))| (id, Some(alt))),
        HeadKind::Include => all_consuming(include_path)
            .parse(name)
            .map(|(_, path)| (path, None)),
    };
    match parsed {
        Ok((id, qualifier)) => Ok(TagName {
            id,
            qualifier,
            full: name,
        }),
        Err(_) if name.is_empty() => Err(format!("{} tag without a name", kind.describe())),
        Err(_) => Err(format!("'{}' is not a valid {} name", name, kind.describe())),
    }
}

// --- Combinators ---

/// A single kind letter that is not followed by more letters.
fn kind_letter(input: &str) -> IResult<&str, HeadKind> {
    let (rest, kind) = alt((
        value(HeadKind::Value, char('v')),
        value(HeadKind::Block, char('b')),
        value(HeadKind::Filtered, char('f')),
        value(HeadKind::Alternative, char('a')),
        value(HeadKind::Include, char('i')),
    ))
    .parse(input)?;
    if rest.is_empty() || rest.starts_with(':') {
        Ok((rest, kind))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )))
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((map(alpha1, |_| ()), map(tag("_"), |_| ()))),
        take_while(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')),
    ))
    .parse(input)
}

fn qualified(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(identifier, char(':'), identifier).parse(input)
}

fn include_path(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/'))
        .parse(input)
}
