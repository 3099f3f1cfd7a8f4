//! Error types, diagnostics, and result aliases for the vouch compiler and runner.
//!
//! All failures are variants of [`VouchError`], rendered via `miette` diagnostics.
//! Assertion mismatches are not errors; they are reported as
//! [`crate::evaluator::AssertionResult`] values.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::lexer::token::SourceLocation;

/// Maximum number of source characters shown in an error snippet
const SNIPPET_LEN: usize = 20;

/// Calculate Levenshtein distance between two strings
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut row = vec![0usize; b_chars.len() + 1];

    for (i, ca) in a_chars.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut row);
    }

    prev[b_chars.len()]
}

/// Find the best "did you mean?" suggestion from a list of candidates
pub fn find_similar(name: &str, candidates: &[String], max_distance: usize) -> Option<String> {
    let name_lower = name.to_lowercase();
    candidates
        .iter()
        .map(|c| (levenshtein_distance(&name_lower, &c.to_lowercase()), c))
        .filter(|(d, _)| *d <= max_distance)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c.clone())
}

/// Help text for a `$name` or `@name` reference that could not be resolved
pub fn undefined_reference_help(name: &str, available: &[String]) -> String {
    let max_distance = (name.len() / 3).clamp(2, 3);

    if let Some(suggestion) = find_similar(name, available, max_distance) {
        format!("did you mean '{}'?", suggestion)
    } else if available.is_empty() {
        "nothing is defined; bind it in the `initialize` block or the config".to_string()
    } else if available.len() <= 5 {
        format!("available names: {}", available.join(", "))
    } else {
        "check the name for typos".to_string()
    }
}

/// Render the text at `offset` the way every lex and parse error shows it:
/// at most 20 characters, newlines escaped, ellipsized when truncated.
pub fn snippet_at(source: &str, offset: usize) -> String {
    let start = offset.min(source.len());
    let rest = source.get(start..).unwrap_or("");
    let mut snippet: String = rest.chars().take(SNIPPET_LEN).collect();
    let truncated = rest.chars().nth(SNIPPET_LEN).is_some();
    snippet = snippet.replace('\r', "\\r").replace('\n', "\\n");
    if truncated {
        snippet.push_str("...");
    }
    format!("at index {}: `{}`", offset, snippet)
}

/// Broad classification of a [`VouchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Tokenizer failure
    Lex,
    /// Structural failure while building the tree
    Parse,
    /// A well-formed entry with a shape the synthesizer cannot use
    Synthesis,
    /// A reference that could not be resolved while running a test
    Runtime,
    /// Failure talking to the target service
    Transport,
    /// File system or configuration failure
    Io,
}

/// Main error type for vouch
#[derive(Error, Debug, Diagnostic)]
pub enum VouchError {
    #[error("unknown token {snippet}")]
    #[diagnostic(code(V0001), help("{help}"))]
    UnknownToken {
        #[source_code]
        src: String,
        #[label("unexpected: '{ch}'")]
        span: SourceSpan,
        ch: char,
        snippet: String,
        help: String,
    },

    #[error("unterminated {what} {snippet}")]
    #[diagnostic(code(V0002), help("add the closing {closer}"))]
    Unterminated {
        #[source_code]
        src: String,
        #[label("started here but never closed")]
        span: SourceSpan,
        what: String,
        closer: String,
        snippet: String,
    },

    #[error("invalid escape sequence {sequence} {snippet}")]
    #[diagnostic(code(V0003), help("{help}"))]
    InvalidEscapeSequence {
        #[source_code]
        src: String,
        #[label("invalid escape: {sequence}")]
        span: SourceSpan,
        sequence: String,
        snippet: String,
        help: String,
    },

    #[error("end of input reached while trying to read a value {snippet}, current path: {path}")]
    #[diagnostic(code(V0101), help("give the key a value"))]
    MissingValue {
        #[source_code]
        src: String,
        #[label("value expected here")]
        span: SourceSpan,
        snippet: String,
        path: String,
    },

    #[error("expected end of object {snippet}, current path: {path}")]
    #[diagnostic(code(V0102), help("add the closing '}}'"))]
    UnterminatedObject {
        #[source_code]
        src: String,
        #[label("object is not closed")]
        span: SourceSpan,
        snippet: String,
        path: String,
    },

    #[error("expected end of array {snippet}, current path: {path}")]
    #[diagnostic(code(V0103), help("add the closing ']' or separate elements with a single ','"))]
    UnterminatedArray {
        #[source_code]
        src: String,
        #[label("array is not closed")]
        span: SourceSpan,
        snippet: String,
        path: String,
    },

    #[error("syntax error {snippet}, current path: {path}")]
    #[diagnostic(code(V0104), help("expected a value: text, quoted text, object or array"))]
    SyntaxError {
        #[source_code]
        src: String,
        #[label("no value could be read here")]
        span: SourceSpan,
        snippet: String,
        path: String,
    },

    #[error("malformed request line {snippet}, current path: {path}")]
    #[diagnostic(code(V0105), help("{help}"))]
    MalformedRequestLine {
        #[source_code]
        src: String,
        #[label("request line")]
        span: SourceSpan,
        snippet: String,
        path: String,
        help: String,
    },

    #[error("unexpected {found} {snippet}, current path: {path}")]
    #[diagnostic(code(V0106), help("expected {expected}"))]
    UnexpectedToken {
        #[source_code]
        src: String,
        #[label("unexpected: {found}")]
        span: SourceSpan,
        expected: String,
        found: String,
        snippet: String,
        path: String,
    },

    #[error("entry '{key}' appears outside of a method block {snippet}, current path: {path}")]
    #[diagnostic(code(V0107), help("start a method with `[name]` before declaring entries"))]
    EntryOutsideMethod {
        #[source_code]
        src: String,
        #[label("no enclosing method")]
        span: SourceSpan,
        key: String,
        snippet: String,
        path: String,
    },

    #[error("invalid '{section}' section")]
    #[diagnostic(code(V0201), help("{help}"))]
    InvalidSection {
        #[source_code]
        src: String,
        #[label("{section} must be {expected}")]
        span: SourceSpan,
        section: String,
        expected: String,
        help: String,
    },

    #[error("undefined {kind} '{name}'")]
    #[diagnostic(code(V0301), help("{help}"))]
    UndefinedReference {
        kind: String,
        name: String,
        help: String,
    },

    #[error("request failed: {message}")]
    #[diagnostic(code(V0401))]
    Transport { message: String },

    #[error("I/O error: {message}")]
    #[diagnostic(code(V0501))]
    IoError { message: String },

    #[error("configuration error: {message}")]
    #[diagnostic(code(V0502))]
    ConfigError { message: String },
}

impl VouchError {
    /// Create an UnknownToken error for the character at `location`
    pub fn unknown_token(src: impl Into<String>, location: &SourceLocation, ch: char) -> Self {
        let src = src.into();
        let help = match ch {
            '`' | '\'' => "use double quotes \"...\" for text".to_string(),
            ';' => "separate entries with newlines or ','".to_string(),
            _ => format!("'{}' cannot start a key, value or operator", ch),
        };
        VouchError::UnknownToken {
            snippet: snippet_at(&src, location.offset),
            src,
            span: location.span(),
            ch,
            help,
        }
    }

    /// Create an Unterminated error (quoted text, substitution, import block, method name)
    pub fn unterminated(
        src: impl Into<String>,
        location: &SourceLocation,
        what: impl Into<String>,
        closer: impl Into<String>,
    ) -> Self {
        let src = src.into();
        VouchError::Unterminated {
            snippet: snippet_at(&src, location.offset),
            src,
            span: location.span(),
            what: what.into(),
            closer: closer.into(),
        }
    }

    /// Create an InvalidEscapeSequence error
    pub fn invalid_escape_sequence(
        src: impl Into<String>,
        location: &SourceLocation,
        sequence: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        let src = src.into();
        VouchError::InvalidEscapeSequence {
            snippet: snippet_at(&src, location.offset),
            src,
            span: location.span(),
            sequence: sequence.into(),
            help: help.into(),
        }
    }

    /// Create a MissingValue error
    pub fn missing_value(
        src: impl Into<String>,
        location: &SourceLocation,
        path: impl Into<String>,
    ) -> Self {
        let src = src.into();
        VouchError::MissingValue {
            snippet: snippet_at(&src, location.offset),
            src,
            span: location.span(),
            path: path.into(),
        }
    }

    /// Create an UnterminatedObject error
    pub fn unterminated_object(
        src: impl Into<String>,
        location: &SourceLocation,
        path: impl Into<String>,
    ) -> Self {
        let src = src.into();
        VouchError::UnterminatedObject {
            snippet: snippet_at(&src, location.offset),
            src,
            span: location.span(),
            path: path.into(),
        }
    }

    /// Create an UnterminatedArray error
    pub fn unterminated_array(
        src: impl Into<String>,
        location: &SourceLocation,
        path: impl Into<String>,
    ) -> Self {
        let src = src.into();
        VouchError::UnterminatedArray {
            snippet: snippet_at(&src, location.offset),
            src,
            span: location.span(),
            path: path.into(),
        }
    }

    /// Create a SyntaxError (a value production that consumed nothing)
    pub fn syntax_error(
        src: impl Into<String>,
        location: &SourceLocation,
        path: impl Into<String>,
    ) -> Self {
        let src = src.into();
        VouchError::SyntaxError {
            snippet: snippet_at(&src, location.offset),
            src,
            span: location.span(),
            path: path.into(),
        }
    }

    /// Create a MalformedRequestLine error
    pub fn malformed_request_line(
        src: impl Into<String>,
        location: &SourceLocation,
        path: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        let src = src.into();
        VouchError::MalformedRequestLine {
            snippet: snippet_at(&src, location.offset),
            src,
            span: location.span(),
            path: path.into(),
            help: help.into(),
        }
    }

    /// Create an UnexpectedToken error
    pub fn unexpected_token(
        src: impl Into<String>,
        location: &SourceLocation,
        expected: impl Into<String>,
        found: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let src = src.into();
        VouchError::UnexpectedToken {
            snippet: snippet_at(&src, location.offset),
            src,
            span: location.span(),
            expected: expected.into(),
            found: found.into(),
            path: path.into(),
        }
    }

    /// Create an EntryOutsideMethod error
    pub fn entry_outside_method(
        src: impl Into<String>,
        location: &SourceLocation,
        key: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let src = src.into();
        VouchError::EntryOutsideMethod {
            snippet: snippet_at(&src, location.offset),
            src,
            span: location.span(),
            key: key.into(),
            path: path.into(),
        }
    }

    /// Create an InvalidSection error
    pub fn invalid_section(
        src: impl Into<String>,
        location: &SourceLocation,
        section: impl Into<String>,
        expected: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        VouchError::InvalidSection {
            src: src.into(),
            span: location.span(),
            section: section.into(),
            expected: expected.into(),
            help: help.into(),
        }
    }

    /// Create an UndefinedReference error with a "did you mean" hint
    pub fn undefined_reference(
        kind: impl Into<String>,
        name: impl Into<String>,
        available: &[String],
    ) -> Self {
        let name = name.into();
        VouchError::UndefinedReference {
            kind: kind.into(),
            help: undefined_reference_help(&name, available),
            name,
        }
    }

    /// Create a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        VouchError::Transport {
            message: message.into(),
        }
    }

    /// Create an IoError
    pub fn io_error(message: impl Into<String>) -> Self {
        VouchError::IoError {
            message: message.into(),
        }
    }

    /// Create a ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        VouchError::ConfigError {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            VouchError::UnknownToken { .. }
            | VouchError::Unterminated { .. }
            | VouchError::InvalidEscapeSequence { .. } => ErrorKind::Lex,
            VouchError::MissingValue { .. }
            | VouchError::UnterminatedObject { .. }
            | VouchError::UnterminatedArray { .. }
            | VouchError::SyntaxError { .. }
            | VouchError::MalformedRequestLine { .. }
            | VouchError::UnexpectedToken { .. }
            | VouchError::EntryOutsideMethod { .. } => ErrorKind::Parse,
            VouchError::InvalidSection { .. } => ErrorKind::Synthesis,
            VouchError::UndefinedReference { .. } => ErrorKind::Runtime,
            VouchError::Transport { .. } => ErrorKind::Transport,
            VouchError::IoError { .. } | VouchError::ConfigError { .. } => ErrorKind::Io,
        }
    }

    /// Get the span (start, end) for this error, if it has one
    pub fn span(&self) -> Option<Span> {
        match self {
            VouchError::UnknownToken { span, .. }
            | VouchError::Unterminated { span, .. }
            | VouchError::InvalidEscapeSequence { span, .. }
            | VouchError::MissingValue { span, .. }
            | VouchError::UnterminatedObject { span, .. }
            | VouchError::UnterminatedArray { span, .. }
            | VouchError::SyntaxError { span, .. }
            | VouchError::MalformedRequestLine { span, .. }
            | VouchError::UnexpectedToken { span, .. }
            | VouchError::EntryOutsideMethod { span, .. }
            | VouchError::InvalidSection { span, .. } => Some(Span::from(*span)),
            VouchError::UndefinedReference { .. }
            | VouchError::Transport { .. }
            | VouchError::IoError { .. }
            | VouchError::ConfigError { .. } => None,
        }
    }

    /// The diagnostic path recorded by the parser, if any
    pub fn diagnostic_path(&self) -> Option<&str> {
        match self {
            VouchError::MissingValue { path, .. }
            | VouchError::UnterminatedObject { path, .. }
            | VouchError::UnterminatedArray { path, .. }
            | VouchError::SyntaxError { path, .. }
            | VouchError::MalformedRequestLine { path, .. }
            | VouchError::UnexpectedToken { path, .. }
            | VouchError::EntryOutsideMethod { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Get a simple error message (without source context)
    pub fn message(&self) -> String {
        match self {
            VouchError::UndefinedReference { kind, name, help } => {
                format!("undefined {} '{}' ({})", kind, name, help)
            }
            other => other.to_string(),
        }
    }
}

/// Simple span type (offset, length) -> (start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl From<SourceSpan> for Span {
    fn from(span: SourceSpan) -> Self {
        Self {
            start: span.offset(),
            end: span.offset() + span.len(),
        }
    }
}

/// Result type for vouch operations
pub type VouchResult<T> = Result<T, VouchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("abc", "abd"), 1);
        assert_eq!(levenshtein_distance("token", "tokne"), 2);
    }

    #[test]
    fn test_find_similar() {
        let candidates = vec!["token".to_string(), "user_id".to_string()];
        assert_eq!(find_similar("tokne", &candidates, 2), Some("token".to_string()));
        assert_eq!(find_similar("xyz", &candidates, 2), None);
    }

    #[test]
    fn test_undefined_reference_help() {
        let available = vec!["token".to_string()];
        assert!(undefined_reference_help("tokn", &available).contains("did you mean 'token'"));
        assert!(undefined_reference_help("x", &[]).contains("initialize"));
    }

    #[test]
    fn test_snippet_short() {
        assert_eq!(snippet_at("a: }", 3), "at index 3: `}`");
    }

    #[test]
    fn test_snippet_is_bounded_and_escaped() {
        let source = "key: {\n  nested: value that goes on and on\n}";
        let snippet = snippet_at(source, 5);
        assert!(snippet.starts_with("at index 5: `{\\n  nested"));
        assert!(snippet.ends_with("...`"));
    }

    #[test]
    fn test_error_kind() {
        let loc = SourceLocation::new(1, 1, 0, 1);
        assert_eq!(
            VouchError::syntax_error("}", &loc, "{").kind(),
            ErrorKind::Parse
        );
        assert_eq!(
            VouchError::unknown_token("`", &loc, '`').kind(),
            ErrorKind::Lex
        );
        assert_eq!(VouchError::transport("refused").kind(), ErrorKind::Transport);
    }
}
