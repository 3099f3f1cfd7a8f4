use std::fmt;

use miette::SourceSpan;
use serde::Serialize;

/// Source location information for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SourceLocation {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// Byte offset from start of file
    pub offset: usize,
    /// Length in bytes
    pub length: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize, offset: usize, length: usize) -> Self {
        Self {
            line,
            column,
            offset,
            length,
        }
    }

    /// Create a span from this location to another
    pub fn span_to(&self, other: &SourceLocation) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
            offset: self.offset,
            length: (other.offset + other.length).saturating_sub(self.offset),
        }
    }

    /// The miette span covering this location
    pub fn span(&self) -> SourceSpan {
        (self.offset, self.length).into()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Comparison and assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    /// `:`
    Colon,
    /// `=`
    Assign,
    /// `==`
    Eq,
    /// `<<`
    Append,
    /// `<-`
    Contains,
    /// `=~`
    Matches,
    /// `~~`
    LengthEq,
    /// `!=`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
}

impl Operator {
    /// Two-character operators, checked before the single-character ones
    pub const TWO_CHAR: [(&'static str, Operator); 8] = [
        (">=", Operator::GtEq),
        ("=~", Operator::Matches),
        ("<-", Operator::Contains),
        ("~~", Operator::LengthEq),
        ("==", Operator::Eq),
        ("<=", Operator::LtEq),
        ("!=", Operator::NotEq),
        ("<<", Operator::Append),
    ];

    pub const ONE_CHAR: [(char, Operator); 4] = [
        ('=', Operator::Assign),
        (':', Operator::Colon),
        ('<', Operator::Lt),
        ('>', Operator::Gt),
    ];

    /// `:` or `=`
    pub fn is_assignment(self) -> bool {
        matches!(self, Operator::Colon | Operator::Assign)
    }

    /// `:`, `=` or `==`
    pub fn is_equality(self) -> bool {
        matches!(self, Operator::Colon | Operator::Assign | Operator::Eq)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Colon => ":",
            Operator::Assign => "=",
            Operator::Eq => "==",
            Operator::Append => "<<",
            Operator::Contains => "<-",
            Operator::Matches => "=~",
            Operator::LengthEq => "~~",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token type enumeration
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `# ...` or `// ...`, only produced when comment tokens are requested
    Comment(String),

    /// A key read in key position
    Key { text: String, quoted: bool },
    /// A literal read in value position
    Literal { text: String, quoted: bool },
    /// `${...}` or `@{...}`, content trimmed
    Substitution { sigil: char, content: String },

    Operator(Operator),

    ObjectStart, // {
    ObjectEnd,   // }
    ArrayStart,  // [ in value position
    ArrayEnd,    // ] in value position
    Comma,       // ,

    MethodNameStart,  // [ in key position
    MethodNameEnd,    // ] in key position
    HttpMethodMarker, // >>
    ImportStart,      // <%

    Eof,
}

impl TokenKind {
    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Comment(_) => "comment".to_string(),
            TokenKind::Key { text, .. } => format!("key '{}'", text),
            TokenKind::Literal { text, .. } => format!("value '{}'", text),
            TokenKind::Substitution { .. } => "substitution".to_string(),
            TokenKind::Operator(op) => format!("operator '{}'", op),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("'{}'", other),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Comment(text) => write!(f, "#{}", text),
            TokenKind::Key { text, quoted } | TokenKind::Literal { text, quoted } => {
                if *quoted {
                    write!(f, "{:?}", text)
                } else {
                    write!(f, "{}", text)
                }
            }
            TokenKind::Substitution { sigil, content } => write!(f, "{}{{{}}}", sigil, content),
            TokenKind::Operator(op) => write!(f, "{}", op),
            TokenKind::ObjectStart => write!(f, "{{"),
            TokenKind::ObjectEnd => write!(f, "}}"),
            TokenKind::ArrayStart | TokenKind::MethodNameStart => write!(f, "["),
            TokenKind::ArrayEnd | TokenKind::MethodNameEnd => write!(f, "]"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::HttpMethodMarker => write!(f, ">>"),
            TokenKind::ImportStart => write!(f, "<%"),
            TokenKind::Eof => write!(f, "<eof>"),
        }
    }
}

/// A token with its location and kind
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

impl Token {
    pub fn new(kind: TokenKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }

    /// Text and quoting of a key, literal or substitution token
    pub fn text(&self) -> Option<(String, bool)> {
        match &self.kind {
            TokenKind::Key { text, quoted } | TokenKind::Literal { text, quoted } => {
                Some((text.clone(), *quoted))
            }
            TokenKind::Substitution { sigil, content } => Some((format!("{}{}", sigil, content), false)),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.location)
    }
}
