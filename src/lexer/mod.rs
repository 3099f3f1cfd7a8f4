//! Lexer (tokenizer) for the vouch test language.
//!
//! The grammar is context sensitive: `[` opens a method name in key position
//! and an array in value position. The parser therefore pulls tokens one at a
//! time, asking for either [`Lexer::next_token`] (key position) or
//! [`Lexer::next_value`] (value position).

pub mod token;

use crate::errors::{VouchError, VouchResult};
use token::{Operator, SourceLocation, Token, TokenKind};

/// Characters that end an unquoted key or unquoted text
const NOT_IN_UNQUOTED: &str = "\"{}[]:=,#`^?*&\\";

/// A collected comment with its location
#[derive(Debug, Clone)]
pub struct Comment {
    /// The comment text (without the leading `#` or `//`)
    pub text: String,
    /// Line number where the comment starts (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

/// Saved cursor, used by the parser to look ahead and back off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    position: usize,
    line: usize,
    column: usize,
}

/// Lexer for the vouch test language
pub struct Lexer<'a> {
    /// Full source text (errors always render against all of it)
    source: &'a str,
    /// Byte offset where this lexer stops
    end: usize,
    /// Current position in bytes
    position: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column number (1-indexed)
    column: usize,
    /// Start position of current token
    token_start: usize,
    token_start_line: usize,
    token_start_column: usize,
    /// Return comments as tokens instead of skipping them
    emit_comments: bool,
    /// Collected comments
    comments: Vec<Comment>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer over the whole source
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            end: source.len(),
            position: 0,
            line: 1,
            column: 1,
            token_start: 0,
            token_start_line: 1,
            token_start_column: 1,
            emit_comments: false,
            comments: Vec::new(),
        }
    }

    /// Produce [`TokenKind::Comment`] tokens from [`Lexer::next_token`]
    pub fn with_comment_tokens(mut self) -> Self {
        self.emit_comments = true;
        self
    }

    /// Get collected comments
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// True when the cursor reached the end of this lexer's range
    pub fn is_eof(&self) -> bool {
        self.position >= self.end
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            position: self.position,
            line: self.line,
            column: self.column,
        }
    }

    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.position = checkpoint.position;
        self.line = checkpoint.line;
        self.column = checkpoint.column;
    }

    /// Tokenize the remaining source in key position
    pub fn tokenize(&mut self) -> VouchResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token in key position
    pub fn next_token(&mut self) -> VouchResult<Token> {
        if self.emit_comments {
            self.skip_whitespace();
            if self.is_comment_start() {
                self.begin_token();
                let text = self.read_comment();
                return Ok(self.make_token(TokenKind::Comment(text)));
            }
        } else {
            self.skip_trivia();
        }
        self.begin_token();

        let Some(ch) = self.peek_char() else {
            return Ok(self.make_token(TokenKind::Eof));
        };

        match ch {
            '[' => self.single(TokenKind::MethodNameStart),
            ']' => self.single(TokenKind::MethodNameEnd),
            '>' if self.matches(">>") => {
                self.advance_n(2);
                Ok(self.make_token(TokenKind::HttpMethodMarker))
            }
            '$' | '@' if self.peek_char_at(1) == Some('{') => self.lex_substitution(ch),
            '<' if self.matches("<%") => {
                self.advance_n(2);
                Ok(self.make_token(TokenKind::ImportStart))
            }
            _ => {
                if let Some(op) = self.match_operator() {
                    return Ok(self.make_token(TokenKind::Operator(op)));
                }
                match ch {
                    '{' => self.single(TokenKind::ObjectStart),
                    '}' => self.single(TokenKind::ObjectEnd),
                    ',' => self.single(TokenKind::Comma),
                    '"' => {
                        let text = self.lex_quoted()?;
                        Ok(self.make_token(TokenKind::Key { text, quoted: true }))
                    }
                    _ if self.is_unquoted_char() => {
                        let text = self.lex_unquoted();
                        Ok(self.make_token(TokenKind::Key {
                            text,
                            quoted: false,
                        }))
                    }
                    _ => Err(self.error_unexpected_char(ch)),
                }
            }
        }
    }

    /// Get the next token in value position
    pub fn next_value(&mut self) -> VouchResult<Token> {
        self.skip_trivia();
        self.begin_token();

        let Some(ch) = self.peek_char() else {
            return Ok(self.make_token(TokenKind::Eof));
        };

        match ch {
            '[' => self.single(TokenKind::ArrayStart),
            ']' => self.single(TokenKind::ArrayEnd),
            '{' => self.single(TokenKind::ObjectStart),
            '}' => self.single(TokenKind::ObjectEnd),
            ',' => self.single(TokenKind::Comma),
            '"' => {
                let text = self.lex_quoted()?;
                Ok(self.make_token(TokenKind::Literal { text, quoted: true }))
            }
            '$' | '@' if self.peek_char_at(1) == Some('{') => self.lex_substitution(ch),
            _ if self.is_unquoted_char() => {
                let text = self.lex_unquoted();
                Ok(self.make_token(TokenKind::Literal {
                    text,
                    quoted: false,
                }))
            }
            _ => Err(self.error_unexpected_char(ch)),
        }
    }

    /// Split off the rest of the current line as an independent lexer.
    ///
    /// The cursor moves past the line break. Offsets produced by the returned
    /// lexer still index the full source.
    pub fn split_rest_of_line(&mut self) -> Lexer<'a> {
        let start = self.checkpoint();
        let mut line_end = self.position;
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                self.advance();
                break;
            }
            self.advance();
            line_end = self.position;
        }

        Lexer {
            source: self.source,
            end: line_end,
            position: start.position,
            line: start.line,
            column: start.column,
            token_start: start.position,
            token_start_line: start.line,
            token_start_column: start.column,
            emit_comments: false,
            comments: Vec::new(),
        }
    }

    /// Consume raw text up to `marker`, returning it trimmed.
    ///
    /// Used for method names (`]`) and import blocks (`%>`).
    pub fn take_until(&mut self, marker: &str, what: &str) -> VouchResult<String> {
        let opened = self.token_location();
        let rest = &self.source[self.position..self.end];
        let Some(found) = rest.find(marker) else {
            return Err(VouchError::unterminated(
                self.source,
                &opened,
                what,
                format!("'{}'", marker),
            ));
        };

        let text = rest[..found].trim().to_string();
        let target = self.position + found + marker.len();
        while self.position < target {
            self.advance();
        }
        Ok(text)
    }

    /// Skip whitespace and comments, collecting the comments
    pub fn skip_trivia(&mut self) {
        loop {
            self.skip_whitespace();
            if !self.is_comment_start() {
                break;
            }
            self.begin_token();
            self.read_comment();
        }
    }

    /// Peek at the current character without consuming
    pub fn peek_char(&self) -> Option<char> {
        self.source[self.position..self.end].chars().next()
    }

    /// Location of the cursor
    pub fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.position, 1)
    }

    /// Peek at a character at offset from current position
    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.source[self.position..self.end].chars().nth(offset)
    }

    fn matches(&self, pattern: &str) -> bool {
        self.source[self.position..self.end].starts_with(pattern)
    }

    /// Advance to the next character
    fn advance(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.position += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn advance_n(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek_char(), Some(ch) if ch.is_whitespace()) {
            self.advance();
        }
    }

    fn is_comment_start(&self) -> bool {
        self.matches("#") || self.matches("//")
    }

    fn read_comment(&mut self) -> String {
        let line = self.line;
        let column = self.column;
        if self.matches("#") {
            self.advance();
        } else {
            self.advance_n(2);
        }

        let mut text = String::new();
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            self.advance();
            text.push(ch);
        }
        let text = text.trim().to_string();
        self.comments.push(Comment {
            text: text.clone(),
            line,
            column,
        });
        text
    }

    fn is_unquoted_char(&self) -> bool {
        match self.peek_char() {
            None => false,
            Some(ch) => {
                !ch.is_whitespace() && !self.is_comment_start() && !NOT_IN_UNQUOTED.contains(ch)
            }
        }
    }

    fn match_operator(&mut self) -> Option<Operator> {
        for (text, op) in Operator::TWO_CHAR {
            if self.matches(text) {
                self.advance_n(2);
                return Some(op);
            }
        }
        let ch = self.peek_char()?;
        let (_, op) = Operator::ONE_CHAR.iter().find(|(c, _)| *c == ch)?;
        self.advance();
        Some(*op)
    }

    fn single(&mut self, kind: TokenKind) -> VouchResult<Token> {
        self.advance();
        Ok(self.make_token(kind))
    }

    fn lex_unquoted(&mut self) -> String {
        let mut text = String::new();
        while self.is_unquoted_char() {
            if let Some(ch) = self.advance() {
                text.push(ch);
            }
        }
        text
    }

    fn lex_substitution(&mut self, sigil: char) -> VouchResult<Token> {
        self.advance_n(2); // sigil and {
        let mut content = String::new();
        loop {
            match self.peek_char() {
                None => {
                    return Err(VouchError::unterminated(
                        self.source,
                        &self.token_location(),
                        "substitution",
                        "'}'",
                    ));
                }
                Some('}') => {
                    self.advance();
                    break;
                }
                Some(ch) => {
                    self.advance();
                    content.push(ch);
                }
            }
        }
        Ok(self.make_token(TokenKind::Substitution {
            sigil,
            content: content.trim().to_string(),
        }))
    }

    /// Lex `"..."` or `"""..."""`, returning the unescaped text
    fn lex_quoted(&mut self) -> VouchResult<String> {
        if self.matches("\"\"\"") {
            self.advance_n(3);
            return self.lex_triple_quoted();
        }

        self.advance(); // opening "
        let mut value = String::new();
        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    return Err(VouchError::unterminated(
                        self.source,
                        &self.token_location(),
                        "quoted text",
                        "'\"'",
                    ));
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    value.push(self.lex_escape_sequence()?);
                }
                Some(ch) => {
                    self.advance();
                    value.push(ch);
                }
            }
        }
        Ok(value)
    }

    fn lex_triple_quoted(&mut self) -> VouchResult<String> {
        let mut value = String::new();
        loop {
            if self.matches("\"\"\"") {
                self.advance_n(3);
                return Ok(value);
            }
            match self.peek_char() {
                None => {
                    return Err(VouchError::unterminated(
                        self.source,
                        &self.token_location(),
                        "triple quoted text",
                        "'\"\"\"'",
                    ));
                }
                Some('\\') => {
                    self.advance();
                    value.push(self.lex_escape_sequence()?);
                }
                Some(ch) => {
                    self.advance();
                    value.push(ch);
                }
            }
        }
    }

    /// Lex an escape sequence (the backslash is already consumed)
    fn lex_escape_sequence(&mut self) -> VouchResult<char> {
        let escape_start = SourceLocation::new(
            self.line,
            self.column.saturating_sub(1),
            self.position.saturating_sub(1),
            2,
        );
        let Some(ch) = self.advance() else {
            return Err(VouchError::invalid_escape_sequence(
                self.source,
                &escape_start,
                "\\<eof>",
                "unexpected end of file in escape sequence",
            ));
        };

        match ch {
            '"' => Ok('"'),
            '\\' => Ok('\\'),
            '/' => Ok('/'),
            'b' => Ok('\u{8}'),
            'f' => Ok('\u{c}'),
            'n' => Ok('\n'),
            'r' => Ok('\r'),
            't' => Ok('\t'),
            'u' => {
                let mut hex = String::new();
                for _ in 0..4 {
                    match self.peek_char() {
                        Some(h) if h.is_ascii_hexdigit() => {
                            self.advance();
                            hex.push(h);
                        }
                        _ => {
                            return Err(VouchError::invalid_escape_sequence(
                                self.source,
                                &escape_start,
                                format!("\\u{}", hex),
                                "expected four hex digits, as in \\u00e9",
                            ));
                        }
                    }
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        VouchError::invalid_escape_sequence(
                            self.source,
                            &escape_start,
                            format!("\\u{}", hex),
                            "invalid unicode code point",
                        )
                    })
            }
            other => {
                let seq = format!("\\{}", other);
                Err(VouchError::invalid_escape_sequence(
                    self.source,
                    &escape_start,
                    seq.clone(),
                    format!(
                        "'{}' is not a valid escape sequence. Use '\\\\' for literal backslash",
                        seq
                    ),
                ))
            }
        }
    }

    fn begin_token(&mut self) {
        self.token_start = self.position;
        self.token_start_line = self.line;
        self.token_start_column = self.column;
    }

    /// Create a token with the current token span
    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.token_location())
    }

    /// Get the location for the current token
    fn token_location(&self) -> SourceLocation {
        SourceLocation::new(
            self.token_start_line,
            self.token_start_column,
            self.token_start,
            self.position - self.token_start,
        )
    }

    fn error_unexpected_char(&self, ch: char) -> VouchError {
        VouchError::unknown_token(self.source, &self.current_location(), ch)
    }
}
