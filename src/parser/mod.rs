//! Parser for the vouch test language
//!
//! A recursive descent parser that pulls tokens from the [`Lexer`] on demand,
//! since whether `[` opens a method name or an array depends on position.
//!
//! Every recursive production pushes a fragment onto a diagnostic stack
//! (`{` per object, `key = ` per entry, `|` per array). Parse errors embed the
//! joined stack so a message reads like `current path: {{params = {id = `.

pub mod ast;

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{VouchError, VouchResult};
use crate::lexer::token::{Operator, SourceLocation, Token, TokenKind};
use crate::lexer::Lexer;
use ast::*;

/// Maximum nesting depth before the parser bails out
const MAX_PARSE_DEPTH: usize = 128;

static IMPORT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+[.A-Za-z_][.\w]*$").expect("valid regex"));

static FROM_IMPORT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^from\s+[.A-Za-z_][.\w]*\s+import\s+[A-Za-z_]\w*$").expect("valid regex")
});

/// True for the two accepted import shapes: `import x` and `from x import y`
pub fn is_import_line(line: &str) -> bool {
    IMPORT_LINE.is_match(line) || FROM_IMPORT_LINE.is_match(line)
}

/// Parser for vouch source code
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    source: &'a str,
    diagnostics: Vec<String>,
}

impl<'a> Parser<'a> {
    /// Create a new parser over the given source
    pub fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
            source,
            diagnostics: Vec::new(),
        }
    }

    /// The joined diagnostic stack
    pub fn diagnostic_path(&self) -> String {
        self.diagnostics.concat()
    }

    /// Parse a whole test file
    pub fn parse(&mut self) -> VouchResult<SourceFile> {
        self.scoped("{", |p| {
            let mut imports = Vec::new();
            let mut methods = Vec::new();
            let mut current: Option<MethodBlock> = None;

            loop {
                let token = p.lexer.next_token()?;
                match &token.kind {
                    TokenKind::Eof => break,
                    TokenKind::Comma => continue,
                    TokenKind::MethodNameStart => {
                        let name = p.lexer.take_until("]", "method name")?;
                        if let Some(method) = current.take() {
                            methods.push(method);
                        }
                        current = Some(MethodBlock {
                            name,
                            request: None,
                            entries: Vec::new(),
                            location: token.location,
                        });
                    }
                    TokenKind::HttpMethodMarker => {
                        let Some(method) = current.as_mut() else {
                            return Err(p.error_unexpected(&token, "a method name `[name]` before `>>`"));
                        };
                        let (request, trailing) = p.parse_request_line(token.location)?;
                        method.request = Some(request);
                        method.entries.extend(trailing);
                    }
                    TokenKind::ImportStart => {
                        let block = p.lexer.take_until("%>", "import block")?;
                        imports.extend(
                            block
                                .lines()
                                .map(str::trim)
                                .filter(|line| is_import_line(line))
                                .map(String::from),
                        );
                    }
                    TokenKind::Key { .. } | TokenKind::Substitution { .. } => {
                        let key = key_from_token(&token);
                        let Some(method) = current.as_mut() else {
                            let path = format!("{}{} = ", p.diagnostic_path(), key.text);
                            return Err(VouchError::entry_outside_method(
                                p.source,
                                &token.location,
                                key.text,
                                path,
                            ));
                        };
                        let entry = p.parse_key_content(key)?;
                        method.entries.push(entry);
                    }
                    _ => {
                        return Err(p.error_unexpected(&token, "a method, an entry or an import block"));
                    }
                }
            }

            if let Some(method) = current {
                methods.push(method);
            }
            Ok(SourceFile { imports, methods })
        })
    }

    /// Parse a flat list of entries with no method blocks (configuration files)
    pub fn parse_entries(&mut self) -> VouchResult<Vec<Entry>> {
        self.scoped("{", |p| p.parse_entry_list())
    }

    /// `VERB PATH` then the remainder of the line, re-lexed on its own.
    ///
    /// Returns the request line and any ordinary entries that share its line.
    fn parse_request_line(
        &mut self,
        marker: SourceLocation,
    ) -> VouchResult<(RequestLine, Vec<Entry>)> {
        let verb = self.lexer.next_token()?;
        let verb_text = match &verb.kind {
            TokenKind::Key { text, .. } if verb.location.line == marker.line => text.clone(),
            _ => {
                return Err(VouchError::malformed_request_line(
                    self.source,
                    &verb.location,
                    self.diagnostic_path(),
                    "expected an HTTP verb after `>>`, as in `>> GET /users`",
                ));
            }
        };

        let path = self.lexer.next_value()?;
        let path_text = match path.text() {
            Some((text, _)) if path.location.line == marker.line => text,
            _ => {
                return Err(VouchError::malformed_request_line(
                    self.source,
                    &path.location,
                    self.diagnostic_path(),
                    "expected a request path after the verb, as in `>> GET /users`",
                ));
            }
        };

        let line = self.lexer.split_rest_of_line();
        let outer = std::mem::replace(&mut self.lexer, line);
        let inline = self.parse_inline_entries();
        self.lexer = outer;
        let (params, trailing) = inline?;

        let request = RequestLine {
            verb: verb_text.to_uppercase(),
            path: path_text,
            params,
            location: marker.span_to(&path.location),
        };
        Ok((request, trailing))
    }

    /// A leading `{...}` supplies the parameters and the rest of the line holds
    /// ordinary entries. Without braces, `:`/`=` entries are parameters and
    /// entries with any other operator (`head << {..}`, `code >= 200`) belong
    /// to the method.
    fn parse_inline_entries(&mut self) -> VouchResult<(Vec<Entry>, Vec<Entry>)> {
        self.lexer.skip_trivia();
        if self.lexer.peek_char() == Some('{') {
            let open = self.lexer.next_token()?;
            let params = self.parse_object_body(open.location)?;
            let trailing = self.parse_entry_list()?;
            Ok((params, trailing))
        } else {
            let entries = self.scoped("{", |p| p.parse_entry_list())?;
            Ok(entries.into_iter().partition(|entry| entry.op.is_assignment()))
        }
    }

    /// Entries until end of input
    fn parse_entry_list(&mut self) -> VouchResult<Vec<Entry>> {
        let mut entries = Vec::new();
        loop {
            let token = self.lexer.next_token()?;
            match &token.kind {
                TokenKind::Eof => return Ok(entries),
                TokenKind::Comma => continue,
                TokenKind::Key { .. } | TokenKind::Substitution { .. } => {
                    let key = key_from_token(&token);
                    entries.push(self.parse_key_content(key)?);
                }
                _ => return Err(self.error_unexpected(&token, "a key")),
            }
        }
    }

    /// Entries until the closing `}` (the opening brace is already consumed)
    fn parse_object_body(&mut self, open: SourceLocation) -> VouchResult<Vec<Entry>> {
        self.scoped("{", |p| {
            let mut entries = Vec::new();
            loop {
                let token = p.lexer.next_token()?;
                match &token.kind {
                    TokenKind::ObjectEnd => return Ok(entries),
                    TokenKind::Comma => continue,
                    TokenKind::Key { .. } | TokenKind::Substitution { .. } => {
                        let key = key_from_token(&token);
                        entries.push(p.parse_key_content(key)?);
                    }
                    TokenKind::Eof => {
                        return Err(VouchError::unterminated_object(
                            p.source,
                            &open,
                            p.diagnostic_path(),
                        ));
                    }
                    _ => return Err(p.error_unexpected(&token, "a key or '}'")),
                }
            }
        })
    }

    /// The operator and value following a key, or a `{` block
    fn parse_key_content(&mut self, key: Key) -> VouchResult<Entry> {
        let fragment = format!("{} = ", key.text);
        self.scoped(fragment, |p| {
            let token = p.lexer.next_token()?;
            match &token.kind {
                TokenKind::Operator(op) => {
                    let op = *op;
                    let value = p.parse_value()?;
                    let location = key.location.span_to(&value.location());
                    Ok(Entry {
                        key,
                        op,
                        value,
                        location,
                    })
                }
                TokenKind::ObjectStart => {
                    let entries = p.parse_object_body(token.location)?;
                    let location = key.location.span_to(&p.lexer.current_location());
                    Ok(Entry {
                        key,
                        op: Operator::Colon,
                        value: Node::Object(entries, token.location),
                        location,
                    })
                }
                TokenKind::Eof => Err(VouchError::missing_value(
                    p.source,
                    &token.location,
                    p.diagnostic_path(),
                )),
                _ => Err(p.error_unexpected(&token, "an operator or '{'")),
            }
        })
    }

    /// One value, then at most one trailing comma
    fn parse_value(&mut self) -> VouchResult<Node> {
        let start = self.lexer.checkpoint();
        let token = self.lexer.next_value()?;

        let node = match &token.kind {
            TokenKind::Literal { text, quoted } => Node::Scalar(Scalar {
                text: text.clone(),
                quoted: *quoted,
                location: token.location,
            }),
            TokenKind::Substitution { .. } => {
                let (text, quoted) = token.text().unwrap_or_default();
                Node::Scalar(Scalar {
                    text,
                    quoted,
                    location: token.location,
                })
            }
            TokenKind::ObjectStart => Node::Object(self.parse_object_body(token.location)?, token.location),
            TokenKind::ArrayStart => Node::Array(self.parse_array(token.location)?, token.location),
            TokenKind::Eof => {
                return Err(VouchError::missing_value(
                    self.source,
                    &token.location,
                    self.diagnostic_path(),
                ));
            }
            _ => {
                // Nothing usable here; leave the cursor where the value should have been
                self.lexer.restore(start);
                return Err(VouchError::syntax_error(
                    self.source,
                    &token.location,
                    self.diagnostic_path(),
                ));
            }
        };

        self.skip_comma()?;
        Ok(node)
    }

    /// Values until the closing `]` (the opening bracket is already consumed)
    fn parse_array(&mut self, open: SourceLocation) -> VouchResult<Vec<Node>> {
        self.scoped("|", |p| {
            let mut items = Vec::new();
            loop {
                p.lexer.skip_trivia();
                match p.lexer.peek_char() {
                    Some(']') => {
                        p.lexer.next_value()?;
                        return Ok(items);
                    }
                    None => {
                        return Err(VouchError::unterminated_array(
                            p.source,
                            &open,
                            p.diagnostic_path(),
                        ));
                    }
                    Some(_) => items.push(p.parse_value()?),
                }
            }
        })
    }

    fn skip_comma(&mut self) -> VouchResult<()> {
        self.lexer.skip_trivia();
        if self.lexer.peek_char() == Some(',') {
            self.lexer.next_value()?;
        }
        Ok(())
    }

    /// Run `f` with `fragment` pushed on the diagnostic stack; popped on every exit
    fn scoped<T>(
        &mut self,
        fragment: impl Into<String>,
        f: impl FnOnce(&mut Self) -> VouchResult<T>,
    ) -> VouchResult<T> {
        if self.diagnostics.len() >= MAX_PARSE_DEPTH {
            return Err(VouchError::unexpected_token(
                self.source,
                &self.lexer.current_location(),
                format!("at most {} levels of nesting", MAX_PARSE_DEPTH),
                "deeper nesting",
                self.diagnostic_path(),
            ));
        }
        self.diagnostics.push(fragment.into());
        let result = f(self);
        self.diagnostics.pop();
        result
    }

    /// Create an "unexpected token" error
    fn error_unexpected(&self, token: &Token, expected: &str) -> VouchError {
        VouchError::unexpected_token(
            self.source,
            &token.location,
            expected,
            token.kind.describe(),
            self.diagnostic_path(),
        )
    }
}

fn key_from_token(token: &Token) -> Key {
    let (text, quoted) = token.text().unwrap_or_default();
    Key {
        text,
        quoted,
        location: token.location,
    }
}

/// Parse a whole test file
pub fn parse(source: &str) -> VouchResult<SourceFile> {
    Parser::new(source).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(node: &Node) -> (&str, bool) {
        match node {
            Node::Scalar(s) => (s.text.as_str(), s.quoted),
            other => panic!("expected scalar, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_file() {
        let file = parse("").unwrap();
        assert!(file.imports.is_empty());
        assert!(file.methods.is_empty());
    }

    #[test]
    fn test_method_with_request_line() {
        let file = parse("[list users]\n>> get /users\ncode: 200\n").unwrap();
        assert_eq!(file.methods.len(), 1);

        let method = &file.methods[0];
        assert_eq!(method.name, "list users");
        assert_eq!(method.verb(), "GET");
        assert_eq!(method.path(), "/users");
        assert_eq!(method.entries.len(), 1);
        assert_eq!(method.entries[0].key.text, "code");
        assert_eq!(method.entries[0].op, Operator::Colon);
        assert_eq!(scalar(&method.entries[0].value), ("200", false));
    }

    #[test]
    fn test_block_without_request_line() {
        let file = parse("[initialize]\n$token: abc\n").unwrap();
        let method = &file.methods[0];
        assert!(method.request.is_none());
        assert_eq!(method.verb(), "GET");
        assert_eq!(method.entries[0].key.text, "$token");
    }

    #[test]
    fn test_inline_object_then_entries() {
        let source = r#"[login] >> POST /login {username: $u} head << {Accept: "json"} code: 200"#;
        let file = parse(source).unwrap();
        let method = &file.methods[0];
        let request = method.request.as_ref().unwrap();

        assert_eq!(request.verb, "POST");
        assert_eq!(request.path, "/login");
        assert_eq!(request.params.len(), 1);
        assert_eq!(request.params[0].key.text, "username");
        assert_eq!(scalar(&request.params[0].value), ("$u", false));

        assert_eq!(method.entries.len(), 2);
        assert_eq!(method.entries[0].key.text, "head");
        assert_eq!(method.entries[0].op, Operator::Append);
        let head = method.entries[0].value.as_object().unwrap();
        assert_eq!(head[0].key.text, "Accept");
        assert_eq!(scalar(&head[0].value), ("json", true));
        assert_eq!(method.entries[1].key.text, "code");
    }

    #[test]
    fn test_inline_comma_params() {
        let file = parse("[a] >> GET /search q: rust, page = 2\nlimit: 5").unwrap();
        let method = &file.methods[0];
        let params = &method.request.as_ref().unwrap().params;
        assert_eq!(params.len(), 2);
        assert_eq!(params[1].key.text, "page");
        assert_eq!(params[1].op, Operator::Assign);
        assert_eq!(method.entries.len(), 1);
        assert_eq!(method.entries[0].key.text, "limit");
    }

    #[test]
    fn test_unbraced_line_routes_operators_to_method() {
        let file = parse("[a] >> GET /x a: 1 head << {k: v} code >= 200").unwrap();
        let method = &file.methods[0];
        let params = &method.request.as_ref().unwrap().params;
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].key.text, "a");

        let keys: Vec<_> = method.entries.iter().map(|e| (e.key.text.as_str(), e.op)).collect();
        assert_eq!(keys, vec![("head", Operator::Append), ("code", Operator::GtEq)]);
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let source = "[a] >> GET /x\njson: {\n  user { name: bob }\n  tags: [a, \"b\", [1, 2], {id: 1}]\n}";
        let file = parse(source).unwrap();
        let json = file.methods[0].entries[0].value.as_object().unwrap();

        assert_eq!(json[0].key.text, "user");
        assert!(matches!(json[0].value, Node::Object(..)));
        match &json[1].value {
            Node::Array(items, _) => {
                assert_eq!(items.len(), 4);
                assert_eq!(scalar(&items[1]), ("b", true));
                assert!(matches!(items[2], Node::Array(..)));
                assert!(matches!(items[3], Node::Object(..)));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_keys_preserved() {
        let file = parse("[a] >> GET /x\ncode: 200\ncode: 201").unwrap();
        let entries = &file.methods[0].entries;
        assert_eq!(entries.len(), 2);
        assert_eq!(scalar(&entries[1].value), ("201", false));
    }

    #[test]
    fn test_imports_filtered() {
        let source = "<%\nimport auth\nfrom hooks.common import Login\nprint(1)\n%>\n[a] >> GET /";
        let file = parse(source).unwrap();
        assert_eq!(file.imports, vec!["import auth", "from hooks.common import Login"]);
    }

    #[test]
    fn test_trailing_comma_in_array() {
        let file = parse("[a] >> GET /x\nids: [1, 2,]").unwrap();
        match &file.methods[0].entries[0].value {
            Node::Array(items, _) => assert_eq!(items.len(), 2),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_double_comma_in_array_fails() {
        let err = parse("[a] >> GET /x\nids: [1,, 2]").unwrap_err();
        match err {
            VouchError::SyntaxError { path, .. } => assert_eq!(path, "{ids = |"),
            other => panic!("expected SyntaxError, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_value_in_inline_object() {
        let err = parse("[a] >> GET /x { key: }").unwrap_err();
        match err {
            VouchError::SyntaxError { path, snippet, .. } => {
                assert_eq!(path, "{{key = ");
                assert_eq!(snippet, "at index 21: `}`");
            }
            other => panic!("expected SyntaxError, got {:?}", other),
        }
    }

    #[test]
    fn test_diagnostic_path_nesting() {
        let err = parse("[a] >> GET /x\nparams {\n  foo = \n}").unwrap_err();
        let path = err.diagnostic_path().unwrap().to_string();
        assert_eq!(path, "{params = {foo = ");
        let open = path.find('{').unwrap();
        assert!(open < path.find("foo = ").unwrap());
    }

    #[test]
    fn test_end_of_input_while_reading_value() {
        let err = parse("[a] >> GET /x\ncode:").unwrap_err();
        assert!(matches!(err, VouchError::MissingValue { .. }));
        assert!(err.to_string().contains("current path: {code = "));
    }

    #[test]
    fn test_unterminated_object() {
        let err = parse("[a] >> GET /x\nhead << { Accept: json").unwrap_err();
        assert!(matches!(err, VouchError::UnterminatedObject { .. }));
    }

    #[test]
    fn test_unterminated_array() {
        let err = parse("[a] >> GET /x\nids: [1, 2").unwrap_err();
        assert!(matches!(err, VouchError::UnterminatedArray { .. }));
    }

    #[test]
    fn test_malformed_request_line() {
        let err = parse("[a] >>\nGET /x").unwrap_err();
        assert!(matches!(err, VouchError::MalformedRequestLine { .. }));
    }

    #[test]
    fn test_entry_outside_method() {
        let err = parse("code: 200").unwrap_err();
        assert!(matches!(err, VouchError::EntryOutsideMethod { .. }));
        assert_eq!(err.diagnostic_path(), Some("{code = "));
        assert_eq!(
            err.to_string(),
            "entry 'code' appears outside of a method block at index 0: `code: 200`, current path: {code = "
        );
    }

    #[test]
    fn test_missing_value_renders_snippet() {
        let err = parse("[a] >> GET /x
code:").unwrap_err();
        assert!(matches!(err, VouchError::MissingValue { .. }));
        assert_eq!(
            err.to_string(),
            "end of input reached while trying to read a value at index 19: ``, current path: {code = "
        );
    }

    #[test]
    fn test_request_line_outside_method() {
        let err = parse(">> GET /x").unwrap_err();
        assert!(matches!(err, VouchError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_parse_entries() {
        let mut parser = Parser::new("url = \"http://localhost\"\nhttp { timeout: 5 }");
        let entries = parser.parse_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].key.text, "http");
        assert_eq!(parser.diagnostic_path(), "");
    }

    #[test]
    fn test_is_import_line() {
        assert!(is_import_line("import auth"));
        assert!(is_import_line("from a.b import C"));
        assert!(!is_import_line("import"));
        assert!(!is_import_line("from a import"));
        assert!(!is_import_line("os.system('x')"));
    }
}
