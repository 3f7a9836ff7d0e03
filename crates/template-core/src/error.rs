use crate::id::Encoding;
use std::fmt;
use thiserror::Error;

/// A 1-based line/column position inside a template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

impl Location {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.col)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    /// An open tag reached the end of the source without its close tag.
    #[error("unterminated block")]
    UnterminatedBlock,
    /// A close tag does not match the innermost open tag.
    #[error("mismatched close tag")]
    MismatchedClose,
    /// A tag identifier violates the identifier grammar.
    #[error("malformed identifier")]
    MalformedIdentifier,
    #[error("invalid syntax")]
    InvalidSyntax,
    /// An include refers back to a template that is already being included.
    #[error("recursive include")]
    RecursiveInclude,
    /// Tags with a body are nested deeper than the parser allows.
    #[error("nesting too deep")]
    NestingTooDeep,
}

/// A syntax error. No partial document is ever produced alongside one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at {location}{}: {message}", in_template_suffix(.template))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub location: Location,
    pub message: String,
    /// Set when the error occurred inside an included template.
    pub template: Option<String>,
}

fn in_template_suffix(template: &Option<String>) -> String {
    template
        .as_deref()
        .map(|name| format!(" in '{}'", name))
        .unwrap_or_default()
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, location: Location, message: impl Into<String>) -> Self {
        Self {
            kind,
            location,
            message: message.into(),
            template: None,
        }
    }

    /// Attributes the error to a named (included) template, keeping the innermost name.
    pub fn in_template(mut self, name: impl Into<String>) -> Self {
        if self.template.is_none() {
            self.template = Some(name.into());
        }
        self
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralErrorKind {
    #[error("duplicate identifier")]
    DuplicateIdentifier,
    #[error("invalid nesting")]
    InvalidNesting,
    /// An alternative was declared for an identifier without a filtered tag.
    #[error("orphan alternative")]
    OrphanAlternative,
}

/// A document that parsed cleanly but violates the structural rules of the model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} '{identifier}' at {location}: {message}")]
pub struct StructuralError {
    pub kind: StructuralErrorKind,
    pub identifier: String,
    pub location: Location,
    pub message: String,
}

impl StructuralError {
    pub fn new(
        kind: StructuralErrorKind,
        identifier: impl Into<String>,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            location,
            message: message.into(),
        }
    }
}

/// Failures that can only happen while rendering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Circular reference while rendering '{0}'")]
    CircularReference(String),

    #[error("Rendering '{identifier}' nests more than {limit} levels deep")]
    DepthExceeded { identifier: String, limit: usize },

    #[error("Output sink error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::Io(err.to_string())
    }
}

/// The error type shared by every stage of the engine.
///
/// It is `Clone` so that a failed compilation can be cached and replayed to
/// every caller asking for the same template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Template structure error: {0}")]
    Structure(#[from] StructuralError),

    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("Resource unavailable '{name}': {message}")]
    ResourceUnavailable { name: String, message: String },

    #[error("Template '{name}' is not valid {encoding}: {message}")]
    Encoding {
        name: String,
        encoding: Encoding,
        message: String,
    },

    #[error("Template render error: {0}")]
    Render(#[from] RenderError),

    #[error("Invalid template configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TemplateError {
    pub fn unknown_identifier(id: impl Into<String>) -> Self {
        Self::UnknownIdentifier(id.into())
    }

    pub fn resource_unavailable(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The parse error kind, if this is a syntax error.
    pub fn parse_kind(&self) -> Option<ParseErrorKind> {
        match self {
            TemplateError::Parse(e) => Some(e.kind),
            _ => None,
        }
    }

    /// The structural error kind, if this is a structural error.
    pub fn structural_kind(&self) -> Option<StructuralErrorKind> {
        match self {
            TemplateError::Structure(e) => Some(e.kind),
            _ => None,
        }
    }

    /// True for failures that are a property of the template source itself and
    /// will repeat until the source changes.
    pub fn is_compile_failure(&self) -> bool {
        matches!(
            self,
            TemplateError::Parse(_) | TemplateError::Structure(_) | TemplateError::Encoding { .. }
        )
    }
}
