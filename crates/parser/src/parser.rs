//! Turns template source into a validated [`Document`].
//!
//! Parsing happens in three steps: the lexer produces tokens, include tags are
//! replaced by the tokens of the included source, and the resulting stream is
//! assembled into segments with resolved body ranges.

use crate::document::{Document, MAX_NESTING_DEPTH, Segment, Tag, TagKind};
use crate::lexer::{Lexer, Token};
use crate::tag::HeadKind;
use stencil_template_core::{
    Dialect, DuplicatePolicy, Location, ParseError, ParseErrorKind, TemplateError,
};

/// Maximum nesting of include tags.
pub const MAX_INCLUDE_DEPTH: usize = 32;

/// Supplies the source of templates named by include tags.
pub trait IncludeResolver {
    fn include(&mut self, name: &str, dialect: Dialect) -> Result<String, TemplateError>;
}

impl<F> IncludeResolver for F
where
    F: FnMut(&str, Dialect) -> Result<String, TemplateError>,
{
    fn include(&mut self, name: &str, dialect: Dialect) -> Result<String, TemplateError> {
        self(name, dialect)
    }
}

/// An include resolver for sources parsed on their own, without a resource store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIncludes;

impl IncludeResolver for NoIncludes {
    fn include(&mut self, name: &str, _dialect: Dialect) -> Result<String, TemplateError> {
        Err(TemplateError::resource_unavailable(
            name,
            "includes are not available when parsing a standalone source",
        ))
    }
}

/// Parser configuration for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct Parser {
    dialect: Dialect,
    policy: DuplicatePolicy,
}

impl Parser {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            policy: DuplicatePolicy::default(),
        }
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Parses a source that contains no include tags.
    pub fn parse(&self, source: &str) -> Result<Document, TemplateError> {
        self.parse_with_includes("<source>", source, &mut NoIncludes)
    }

    /// Parses the template `name`, splicing in included templates.
    ///
    /// Parse errors raised inside an included template carry that template's
    /// name in [`ParseError::template`].
    pub fn parse_with_includes(
        &self,
        name: &str,
        source: &str,
        includes: &mut dyn IncludeResolver,
    ) -> Result<Document, TemplateError> {
        let mut tokens = Vec::new();
        let mut active = vec![name.to_string()];
        self.expand(source, includes, &mut active, &mut tokens)?;
        let segments = assemble(tokens)?;
        Document::from_segments(segments, self.policy)
    }

    fn expand(
        &self,
        source: &str,
        includes: &mut dyn IncludeResolver,
        active: &mut Vec<String>,
        out: &mut Vec<Token>,
    ) -> Result<(), TemplateError> {
        for token in Lexer::new(source, self.dialect).tokenize()? {
            let (path, location) = match token {
                Token::Open {
                    kind: HeadKind::Include,
                    id,
                    location,
                    ..
                } => (id, location),
                other => {
                    push_token(out, other);
                    continue;
                }
            };

            if active.contains(&path) {
                let chain = active.join(" -> ");
                return Err(ParseError::new(
                    ParseErrorKind::RecursiveInclude,
                    location,
                    format!("'{}' is already being included ({} -> {})", path, chain, path),
                )
                .into());
            }
            if active.len() > MAX_INCLUDE_DEPTH {
                return Err(ParseError::new(
                    ParseErrorKind::RecursiveInclude,
                    location,
                    format!("includes nest deeper than {}", MAX_INCLUDE_DEPTH),
                )
                .into());
            }

            log::trace!("Including '{}' into '{}'", path, active.last().map_or("", String::as_str));
            let included = includes.include(&path, self.dialect)?;
            active.push(path.clone());
            let result = self.expand(&included, includes, active, out);
            active.pop();
            result.map_err(|e| attribute(e, &path))?;
        }
        Ok(())
    }
}

/// Names the template a parse error was found in, keeping the innermost name.
fn attribute(err: TemplateError, name: &str) -> TemplateError {
    match err {
        TemplateError::Parse(parse) => TemplateError::Parse(parse.in_template(name)),
        other => other,
    }
}

/// Appends a token, merging adjacent text across include boundaries.
fn push_token(out: &mut Vec<Token>, token: Token) {
    if let Token::Text { text, .. } = &token {
        if let Some(Token::Text { text: previous, .. }) = out.last_mut() {
            previous.push_str(text);
            return;
        }
    }
    out.push(token);
}

struct OpenFrame {
    kind: HeadKind,
    full_name: String,
    raw: String,
    segment: usize,
    location: Location,
}

fn tag_kind(kind: HeadKind) -> TagKind {
    match kind {
        HeadKind::Value => TagKind::Value,
        HeadKind::Block => TagKind::BlockOpen,
        HeadKind::Filtered => TagKind::Filtered,
        HeadKind::Alternative => TagKind::Alternative,
        // Includes are spliced away before assembly.
        HeadKind::Include => TagKind::Comment,
    }
}

/// Pairs open and close tokens and records body ranges.
fn assemble(tokens: Vec<Token>) -> Result<Vec<Segment>, ParseError> {
    let mut segments = Vec::with_capacity(tokens.len());
    let mut stack: Vec<OpenFrame> = Vec::new();

    for token in tokens {
        match token {
            Token::Text { text, location } => segments.push(Segment::text(text, location)),
            Token::Comment { raw, location } => {
                segments.push(Segment::Tag(Tag::new(TagKind::Comment, "", raw, location)))
            }
            Token::Open {
                kind,
                id,
                qualifier,
                full_name,
                short,
                raw,
                location,
            } => {
                let index = segments.len();
                let mut tag = Tag::new(tag_kind(kind), id, raw.clone(), location);
                tag.qualifier = qualifier;
                if !short {
                    tag.body = Some(index + 1..index + 1);
                    if stack.len() == MAX_NESTING_DEPTH {
                        return Err(ParseError::new(
                            ParseErrorKind::NestingTooDeep,
                            location,
                            format!(
                                "'{}' is nested more than {} levels deep",
                                raw, MAX_NESTING_DEPTH
                            ),
                        ));
                    }
                    stack.push(OpenFrame {
                        kind,
                        full_name,
                        raw,
                        segment: index,
                        location,
                    });
                }
                segments.push(Segment::Tag(tag));
            }
            Token::Close {
                kind,
                name,
                raw,
                location,
            } => {
                let Some(frame) = stack.pop() else {
                    return Err(ParseError::new(
                        ParseErrorKind::MismatchedClose,
                        location,
                        format!("'{}' has no matching open tag", raw),
                    ));
                };
                let name_matches = name.as_ref().is_none_or(|n| *n == frame.full_name);
                if frame.kind != kind || !name_matches {
                    return Err(ParseError::new(
                        ParseErrorKind::MismatchedClose,
                        location,
                        format!(
                            "'{}' does not close '{}' opened at {}",
                            raw, frame.raw, frame.location
                        ),
                    ));
                }

                let close_index = segments.len();
                let (id, qualifier) = match &mut segments[frame.segment] {
                    Segment::Tag(open) => {
                        open.body = Some(frame.segment + 1..close_index);
                        (open.id.clone(), open.qualifier.clone())
                    }
                    Segment::Text { .. } => (String::new(), None),
                };
                let mut close = Tag::new(TagKind::BlockClose, id, raw, location);
                close.qualifier = qualifier;
                segments.push(Segment::Tag(close));
            }
        }
    }

    match stack.pop() {
        Some(frame) => Err(ParseError::new(
            ParseErrorKind::UnterminatedBlock,
            frame.location,
            format!("'{}' is never closed", frame.raw),
        )),
        None => Ok(segments),
    }
}
