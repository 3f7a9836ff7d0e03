//! The parsed, validated form of a template.
//!
//! A [`Document`] is a flat sequence of [`Segment`]s. Tags that own content
//! (blocks, filtered tags, value tags with a default, alternatives) record the
//! index range of their body; the matching close tag sits right after the body.
//! Everything the compiler needs is checked once, in [`Document::from_segments`].

use itertools::Itertools;
use std::collections::HashMap;
use std::ops::Range;
use stencil_template_core::{
    DuplicatePolicy, Location, StructuralError, StructuralErrorKind, TemplateError,
};

/// Maximum nesting of tags that own a body.
pub const MAX_NESTING_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Value,
    BlockOpen,
    BlockClose,
    Filtered,
    Alternative,
    Comment,
}

/// A tag as it appears in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub kind: TagKind,
    /// The identifier the tag refers to. Empty for comments.
    pub id: String,
    /// The filter key of a filtered tag, or the name of an alternative.
    pub qualifier: Option<String>,
    /// Index range of the body segments, for tags that have one.
    pub body: Option<Range<usize>>,
    /// The tag exactly as written. For comments, the whole comment.
    pub raw: String,
    pub location: Location,
}

impl Tag {
    pub fn new(kind: TagKind, id: impl Into<String>, raw: impl Into<String>, location: Location) -> Self {
        Self {
            kind,
            id: id.into(),
            qualifier: None,
            body: None,
            raw: raw.into(),
            location,
        }
    }

    pub fn with_body(mut self, body: Range<usize>) -> Self {
        self.body = Some(body);
        self
    }

    /// Whether the tag introduces an identifier into the template's namespace.
    pub fn declares(&self) -> bool {
        matches!(self.kind, TagKind::Value | TagKind::BlockOpen | TagKind::Filtered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text { text: String, location: Location },
    Tag(Tag),
}

impl Segment {
    pub fn text(text: impl Into<String>, location: Location) -> Self {
        Segment::Text {
            text: text.into(),
            location,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            Segment::Text { location, .. } => *location,
            Segment::Tag(tag) => tag.location,
        }
    }

    /// The source text the segment stands for.
    pub fn source_text(&self) -> &str {
        match self {
            Segment::Text { text, .. } => text,
            Segment::Tag(tag) => &tag.raw,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Segment::Tag(tag) => Some(tag),
            Segment::Text { .. } => None,
        }
    }
}

/// What kind of slot an identifier declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Value,
    Block,
    Filtered,
}

impl DeclarationKind {
    fn of(kind: TagKind) -> Option<Self> {
        match kind {
            TagKind::Value => Some(DeclarationKind::Value),
            TagKind::BlockOpen => Some(DeclarationKind::Block),
            TagKind::Filtered => Some(DeclarationKind::Filtered),
            _ => None,
        }
    }
}

/// The canonical declaration of an identifier.
///
/// With [`DuplicatePolicy::LastWins`] an identifier may occur several times;
/// every occurrence renders the same binding, and the last occurrence supplies
/// the kind and default content recorded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub id: String,
    pub kind: DeclarationKind,
    /// Index of the canonical opening segment.
    pub segment: usize,
    /// Default content, absent for self-closing tags.
    pub body: Option<Range<usize>>,
    pub filter_key: Option<String>,
    /// Every segment that refers to this identifier, in document order.
    pub occurrences: Vec<usize>,
    pub location: Location,
}

impl Declaration {
    /// Segment range covering the canonical tag, its body and its close tag.
    pub fn span(&self) -> Range<usize> {
        match &self.body {
            Some(body) => self.segment..body.end + 1,
            None => self.segment..self.segment + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternativeDecl {
    pub name: String,
    pub segment: usize,
    pub body: Range<usize>,
    pub location: Location,
}

/// A validated template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    segments: Vec<Segment>,
    declarations: Vec<Declaration>,
    index: HashMap<String, usize>,
    alternatives: HashMap<String, Vec<AlternativeDecl>>,
    policy: DuplicatePolicy,
}

fn structural(
    kind: StructuralErrorKind,
    id: &str,
    location: Location,
    message: impl Into<String>,
) -> TemplateError {
    StructuralError::new(kind, id, location, message).into()
}

impl Document {
    /// Validates a segment sequence and indexes its identifiers.
    ///
    /// # Errors
    ///
    /// - `InvalidNesting` when body ranges do not nest, a value default holds
    ///   tags, or default content refers back to its own identifier
    /// - `DuplicateIdentifier` for a repeated identifier under
    ///   [`DuplicatePolicy::Reject`], and for a repeated alternative
    /// - `OrphanAlternative` for an alternative with no filtered tag
    pub fn from_segments(
        segments: Vec<Segment>,
        policy: DuplicatePolicy,
    ) -> Result<Self, TemplateError> {
        check_ranges(&segments)?;

        let mut doc = Document {
            segments,
            declarations: Vec::new(),
            index: HashMap::new(),
            alternatives: HashMap::new(),
            policy,
        };
        let mut enclosing = Vec::new();
        doc.collect(0..doc.segments.len(), &mut enclosing)?;
        doc.prune_shadowed();
        doc.check_alternatives()?;
        doc.check_cycles()?;
        Ok(doc)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    pub fn declaration(&self, id: &str) -> Option<&Declaration> {
        self.index.get(id).map(|&i| &self.declarations[i])
    }

    /// Declarations in order of first occurrence.
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// The segment span of an identifier's canonical declaration, from its
    /// opening tag through its close tag.
    pub fn resolve(&self, id: &str) -> Option<Range<usize>> {
        self.declaration(id).map(Declaration::span)
    }

    /// Identifiers of the tags directly inside `range`, in document order.
    ///
    /// When `range` is the span of a tag with a body (as returned by
    /// [`resolve`](Self::resolve)), the tags inside that body are listed.
    /// Tags nested deeper, alternatives and comments are not included.
    pub fn children(&self, range: Range<usize>) -> Vec<&str> {
        if let Some(Segment::Tag(Tag {
            body: Some(body), ..
        })) = self.segments.get(range.start)
        {
            if body.end + 1 == range.end {
                return self.direct_children(body.clone());
            }
        }
        self.direct_children(range)
    }

    pub fn root_children(&self) -> Vec<&str> {
        self.direct_children(0..self.segments.len())
    }

    fn direct_children(&self, range: Range<usize>) -> Vec<&str> {
        let range = range.start..range.end.min(self.segments.len());
        let mut children = Vec::new();
        let mut i = range.start;
        while i < range.end {
            let Segment::Tag(tag) = &self.segments[i] else {
                i += 1;
                continue;
            };
            if tag.declares() {
                children.push(tag.id.as_str());
            }
            i = match &tag.body {
                Some(body) => body.end + 1,
                None => i + 1,
            };
        }
        children
    }

    /// All identifiers, in order of first occurrence.
    pub fn identifiers(&self) -> Vec<&str> {
        self.declarations.iter().map(|d| d.id.as_str()).collect()
    }

    /// Alternatives declared for a filtered identifier, in document order.
    pub fn alternatives(&self, id: &str) -> &[AlternativeDecl] {
        self.alternatives.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The source text of an identifier's default content.
    ///
    /// Returns `None` for unknown identifiers and self-closing declarations.
    pub fn default_content(&self, id: &str) -> Option<String> {
        let body = self.declaration(id)?.body.clone()?;
        Some(self.source_text(body))
    }

    /// Concatenated source text of a segment range.
    pub fn source_text(&self, range: Range<usize>) -> String {
        self.segments[range].iter().map(Segment::source_text).collect()
    }

    fn collect(&mut self, range: Range<usize>, enclosing: &mut Vec<String>) -> Result<(), TemplateError> {
        let mut i = range.start;
        while i < range.end {
            let Segment::Tag(tag) = &self.segments[i] else {
                i += 1;
                continue;
            };
            let tag = tag.clone();
            let next = match &tag.body {
                Some(body) => body.end + 1,
                None => i + 1,
            };

            match tag.kind {
                TagKind::Value | TagKind::BlockOpen | TagKind::Filtered => {
                    if enclosing.contains(&tag.id) {
                        return Err(structural(
                            StructuralErrorKind::InvalidNesting,
                            &tag.id,
                            tag.location,
                            "tag occurs inside the default content of its own identifier",
                        ));
                    }
                    if tag.kind == TagKind::Value {
                        self.check_value_default(&tag)?;
                    }
                    self.declare(i, &tag)?;
                }
                TagKind::Alternative => self.declare_alternative(i, &tag)?,
                TagKind::Comment | TagKind::BlockClose => {}
            }

            if let Some(body) = &tag.body {
                enclosing.push(tag.id.clone());
                let result = self.collect(body.clone(), enclosing);
                enclosing.pop();
                result?;
            }
            i = next;
        }
        Ok(())
    }

    fn check_value_default(&self, tag: &Tag) -> Result<(), TemplateError> {
        let Some(body) = &tag.body else {
            return Ok(());
        };
        let offending = self.segments[body.clone()]
            .iter()
            .filter_map(Segment::as_tag)
            .find(|inner| inner.kind != TagKind::Comment);
        match offending {
            Some(inner) => Err(structural(
                StructuralErrorKind::InvalidNesting,
                &tag.id,
                inner.location,
                format!("value defaults may only hold text, found '{}'", inner.raw),
            )),
            None => Ok(()),
        }
    }

    fn declare(&mut self, segment: usize, tag: &Tag) -> Result<(), TemplateError> {
        let Some(kind) = DeclarationKind::of(tag.kind) else {
            return Ok(());
        };
        let filter_key = if kind == DeclarationKind::Filtered {
            tag.qualifier.clone()
        } else {
            None
        };

        match self.index.get(&tag.id) {
            None => {
                self.index.insert(tag.id.clone(), self.declarations.len());
                self.declarations.push(Declaration {
                    id: tag.id.clone(),
                    kind,
                    segment,
                    body: tag.body.clone(),
                    filter_key,
                    occurrences: vec![segment],
                    location: tag.location,
                });
                Ok(())
            }
            Some(&existing) => match self.policy {
                DuplicatePolicy::Reject => {
                    let first = self.declarations[existing].location;
                    Err(structural(
                        StructuralErrorKind::DuplicateIdentifier,
                        &tag.id,
                        tag.location,
                        format!("already declared at {}", first),
                    ))
                }
                DuplicatePolicy::LastWins => {
                    let decl = &mut self.declarations[existing];
                    decl.kind = kind;
                    decl.segment = segment;
                    decl.body = tag.body.clone();
                    decl.filter_key = filter_key;
                    decl.location = tag.location;
                    decl.occurrences.push(segment);
                    Ok(())
                }
            },
        }
    }

    fn declare_alternative(&mut self, segment: usize, tag: &Tag) -> Result<(), TemplateError> {
        let name = tag.qualifier.clone().unwrap_or_default();
        let alternatives = self.alternatives.entry(tag.id.clone()).or_default();
        if let Some(previous) = alternatives.iter().find(|alt| alt.name == name) {
            return Err(structural(
                StructuralErrorKind::DuplicateIdentifier,
                format!("{}:{}", tag.id, name).as_str(),
                tag.location,
                format!("alternative already declared at {}", previous.location),
            ));
        }
        alternatives.push(AlternativeDecl {
            name,
            segment,
            body: tag.body.clone().unwrap_or(segment + 1..segment + 1),
            location: tag.location,
        });
        Ok(())
    }

    fn check_alternatives(&self) -> Result<(), TemplateError> {
        // Report the first orphan in document order.
        let orphan = self
            .alternatives
            .iter()
            .filter(|(id, _)| {
                self.declaration(id)
                    .is_none_or(|decl| decl.kind != DeclarationKind::Filtered)
            })
            .filter_map(|(id, alts)| alts.first().map(|alt| (id, alt)))
            .min_by_key(|(_, alt)| alt.segment);
        match orphan {
            Some((id, alt)) => Err(structural(
                StructuralErrorKind::OrphanAlternative,
                id,
                alt.location,
                format!("alternative '{}' has no filtered tag to belong to", alt.name),
            )),
            None => Ok(()),
        }
    }

    /// Identifiers rendered directly by the default or alternative content of `decl`.
    fn references(&self, decl: &Declaration) -> Vec<&str> {
        let mut refs = Vec::new();
        if let Some(body) = &decl.body {
            refs.extend(self.direct_children(body.clone()));
        }
        if decl.kind == DeclarationKind::Filtered {
            for alt in self.alternatives(&decl.id) {
                refs.extend(self.direct_children(alt.body.clone()));
            }
        }
        refs
    }

    /// Under `LastWins` only the last declaration of an identifier has its body
    /// compiled. Drops identifiers and alternatives that occur only inside the
    /// bodies of earlier, shadowed declarations.
    fn prune_shadowed(&mut self) {
        if self.policy != DuplicatePolicy::LastWins {
            return;
        }
        let mut reached = vec![false; self.segments.len()];
        let mut pending = vec![0..self.segments.len()];
        while let Some(range) = pending.pop() {
            let mut i = range.start;
            while i < range.end {
                reached[i] = true;
                let Segment::Tag(tag) = &self.segments[i] else {
                    i += 1;
                    continue;
                };
                let Some(body) = &tag.body else {
                    i += 1;
                    continue;
                };
                let live = !tag.declares()
                    || self.declaration(&tag.id).is_some_and(|decl| decl.segment == i);
                if live {
                    pending.push(body.clone());
                }
                i = body.end + 1;
            }
        }

        let before = self.declarations.len();
        self.declarations.retain_mut(|decl| {
            decl.occurrences.retain(|&segment| reached[segment]);
            !decl.occurrences.is_empty()
        });
        if self.declarations.len() != before {
            self.index = self
                .declarations
                .iter()
                .enumerate()
                .map(|(i, decl)| (decl.id.clone(), i))
                .collect();
        }
        for alternatives in self.alternatives.values_mut() {
            alternatives.retain(|alt| reached[alt.segment]);
        }
        self.alternatives.retain(|_, alternatives| !alternatives.is_empty());
    }

    /// Rejects default content that, through other defaults, renders itself.
    ///
    /// Reference chains can be far longer than the nesting depth (under
    /// `LastWins` each link may be a separate top-level block), so the walk
    /// keeps its own stack.
    fn check_cycles(&self) -> Result<(), TemplateError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }

        let pending_refs = |decl: &Declaration| {
            let mut refs = self.references(decl);
            // Popped from the back, so reverse to visit in document order.
            refs.reverse();
            refs
        };

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut stack: Vec<(&str, Vec<&str>)> = Vec::new();
        for decl in &self.declarations {
            if marks.contains_key(decl.id.as_str()) {
                continue;
            }
            marks.insert(decl.id.as_str(), Mark::Active);
            stack.push((decl.id.as_str(), pending_refs(decl)));

            while let Some(top) = stack.last_mut() {
                let id = top.0;
                let Some(child) = top.1.pop() else {
                    marks.insert(id, Mark::Done);
                    stack.pop();
                    continue;
                };
                match marks.get(child).copied() {
                    Some(Mark::Done) => {}
                    Some(Mark::Active) => {
                        let start = stack.iter().position(|(p, _)| *p == child).unwrap_or(0);
                        let cycle = stack[start..]
                            .iter()
                            .map(|(p, _)| *p)
                            .chain(std::iter::once(child))
                            .join(" -> ");
                        let location = self
                            .declaration(child)
                            .map(|d| d.location)
                            .unwrap_or_default();
                        return Err(structural(
                            StructuralErrorKind::InvalidNesting,
                            child,
                            location,
                            format!("default content refers back to itself: {}", cycle),
                        ));
                    }
                    None => {
                        if let Some(child_decl) = self.declaration(child) {
                            marks.insert(child, Mark::Active);
                            stack.push((child, pending_refs(child_decl)));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Checks that body ranges are well formed: each body starts right after its
/// tag, is followed by a matching close tag, and nests inside its parent.
fn check_ranges(segments: &[Segment]) -> Result<(), TemplateError> {
    let mut open: Vec<(usize, &Tag)> = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        if let Some(&(end, parent)) = open.last() {
            if i == end {
                let closes_parent = matches!(
                    segment,
                    Segment::Tag(tag) if tag.kind == TagKind::BlockClose && tag.id == parent.id
                );
                if !closes_parent {
                    return Err(structural(
                        StructuralErrorKind::InvalidNesting,
                        &parent.id,
                        segment.location(),
                        "body is not followed by its close tag",
                    ));
                }
                open.pop();
                continue;
            }
        }

        let Segment::Tag(tag) = segment else {
            continue;
        };
        match (&tag.body, tag.kind) {
            (Some(_), TagKind::BlockClose | TagKind::Comment) => {
                return Err(structural(
                    StructuralErrorKind::InvalidNesting,
                    &tag.id,
                    tag.location,
                    "close tags and comments cannot own a body",
                ));
            }
            (Some(body), _) => {
                let limit = open.last().map_or(segments.len(), |(end, _)| *end);
                if body.start != i + 1 || body.end < body.start || body.end >= limit {
                    return Err(structural(
                        StructuralErrorKind::InvalidNesting,
                        &tag.id,
                        tag.location,
                        format!("body {:?} does not nest inside its parent", body),
                    ));
                }
                open.push((body.end, tag));
                if open.len() > MAX_NESTING_DEPTH {
                    return Err(structural(
                        StructuralErrorKind::InvalidNesting,
                        &tag.id,
                        tag.location,
                        format!("tags are nested more than {} levels deep", MAX_NESTING_DEPTH),
                    ));
                }
            }
            (None, TagKind::BlockClose) => {
                return Err(structural(
                    StructuralErrorKind::InvalidNesting,
                    &tag.id,
                    tag.location,
                    "close tag without an open tag",
                ));
            }
            (None, _) => {}
        }
    }

    match open.last() {
        Some((_, tag)) => Err(structural(
            StructuralErrorKind::InvalidNesting,
            &tag.id,
            tag.location,
            "body runs past the end of the document",
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(col: usize) -> Location {
        Location::new(1, col)
    }

    fn text(s: &str) -> Segment {
        Segment::text(s, loc(1))
    }

    fn tag(kind: TagKind, id: &str) -> Segment {
        Segment::Tag(Tag::new(kind, id, format!("{{{{{id}}}}}"), loc(1)))
    }

    fn bodied(kind: TagKind, id: &str, body: Range<usize>) -> Segment {
        Segment::Tag(Tag::new(kind, id, format!("{{{{b:{id}}}}}"), loc(1)).with_body(body))
    }

    fn close(id: &str) -> Segment {
        Segment::Tag(Tag::new(TagKind::BlockClose, id, format!("{{{{/b:{id}}}}}"), loc(1)))
    }

    /// `depth` blocks, each nested in the previous one.
    fn nested(depth: usize) -> Vec<Segment> {
        let last = 2 * depth - 1;
        let opens = (0..depth).map(|i| bodied(TagKind::BlockOpen, &format!("x{i}"), i + 1..last - i));
        let closes = (0..depth).rev().map(|i| close(&format!("x{i}")));
        opens.chain(closes).collect()
    }

    #[test]
    fn test_nesting_depth_is_limited() {
        let doc = Document::from_segments(nested(MAX_NESTING_DEPTH), DuplicatePolicy::Reject).unwrap();
        assert_eq!(doc.identifiers().len(), MAX_NESTING_DEPTH);

        let err = Document::from_segments(nested(MAX_NESTING_DEPTH + 1), DuplicatePolicy::Reject)
            .unwrap_err();
        assert_eq!(err.structural_kind(), Some(StructuralErrorKind::InvalidNesting));
        assert!(err.to_string().contains(&format!("x{}", MAX_NESTING_DEPTH)));
    }

    #[test]
    fn test_from_segments_indexes_blocks() {
        let doc = Document::from_segments(
            vec![
                text("a"),
                bodied(TagKind::BlockOpen, "outer", 2..5),
                text("x"),
                tag(TagKind::Value, "inner"),
                text("y"),
                close("outer"),
            ],
            DuplicatePolicy::Reject,
        )
        .unwrap();

        assert_eq!(doc.resolve("outer"), Some(1..6));
        assert_eq!(doc.resolve("inner"), Some(3..4));
        assert_eq!(doc.resolve("missing"), None);
        assert_eq!(doc.root_children(), vec!["outer"]);
        assert_eq!(doc.children(doc.resolve("outer").unwrap()), vec!["inner"]);
        assert_eq!(doc.identifiers(), vec!["outer", "inner"]);
        assert_eq!(doc.children(2..5), vec!["inner"]);
        assert_eq!(doc.children(0..6), vec!["outer"]);
    }

    #[test]
    fn test_from_segments_rejects_crossing_ranges() {
        let err = Document::from_segments(
            vec![
                bodied(TagKind::BlockOpen, "a", 1..3),
                bodied(TagKind::BlockOpen, "b", 2..4),
                text("x"),
                close("a"),
                close("b"),
            ],
            DuplicatePolicy::Reject,
        )
        .unwrap_err();
        assert_eq!(err.structural_kind(), Some(StructuralErrorKind::InvalidNesting));
    }

    #[test]
    fn test_from_segments_rejects_dangling_close() {
        let err = Document::from_segments(vec![text("x"), close("a")], DuplicatePolicy::Reject)
            .unwrap_err();
        assert_eq!(err.structural_kind(), Some(StructuralErrorKind::InvalidNesting));
    }

    #[test]
    fn test_from_segments_rejects_body_past_end() {
        let err = Document::from_segments(
            vec![bodied(TagKind::BlockOpen, "a", 1..2), text("x")],
            DuplicatePolicy::Reject,
        )
        .unwrap_err();
        assert_eq!(err.structural_kind(), Some(StructuralErrorKind::InvalidNesting));
    }

    #[test]
    fn test_empty_document() {
        let doc = Document::from_segments(Vec::new(), DuplicatePolicy::Reject).unwrap();
        assert!(doc.is_empty());
        assert!(doc.identifiers().is_empty());
    }
}
