//! Test synthesis: method blocks to executable actions
//!
//! The compiler walks each parsed method block and produces a
//! [`MethodAction`]: the request to send (params, form data, headers, JSON
//! body, file uploads) and the ordered assertions to check against the
//! response. The output is plain data; the runner interprets it.

use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{VouchError, VouchResult};
use crate::lexer::token::Operator;
use crate::parser::ast::{Entry, MethodBlock, Node, SourceFile};
use crate::parser::Parser;
use crate::resolver::{resolve_key, resolve_node, Literal};

/// Name of the block whose bindings seed the class execution context
pub const INITIALIZE: &str = "initialize";

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

/// One compiled test file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassSpec {
    /// Derived from the file name, e.g. `user-login.vouch` -> `UserLoginTest`
    pub name: String,
    /// Accepted import lines, used to select hooks
    pub imports: Vec<String>,
    pub methods: Vec<MethodAction>,
}

impl ClassSpec {
    /// The `initialize` block, if the file has one
    pub fn initializer(&self) -> Option<&MethodAction> {
        self.methods.iter().find(|m| m.name == INITIALIZE)
    }

    /// Every block except `initialize`, in source order
    pub fn test_methods(&self) -> impl Iterator<Item = &MethodAction> {
        self.methods.iter().filter(|m| m.name != INITIALIZE)
    }
}

/// Everything needed to issue one request and judge its response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodAction {
    pub name: String,
    /// `test_` plus the name with non-word runs replaced by `_`
    pub test_name: String,
    pub verb: String,
    pub path: String,
    pub params: IndexMap<String, Literal>,
    pub data: IndexMap<String, Literal>,
    /// Request headers, names in `Content-Type` form
    pub headers: IndexMap<String, Literal>,
    pub json: Option<Literal>,
    pub files: Option<Literal>,
    /// Bindings declared in the block; only `initialize` feeds them to the class
    pub context: IndexMap<String, Literal>,
    pub assertions: Vec<AssertionDirective>,
}

/// The response facet a scalar directive reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "facet", content = "name", rename_all = "snake_case")]
pub enum ScalarTarget {
    Status,
    ContentType,
    Charset,
    Content,
    Header(String),
}

/// One assertion against the response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssertionDirective {
    Scalar {
        target: ScalarTarget,
        op: Operator,
        expected: Literal,
    },
    Json(JsonDirective),
}

/// An assertion on a JSON path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonDirective {
    pub key: JsonKey,
    pub op: Operator,
    pub expect: JsonExpect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonKey {
    pub name: String,
    /// `!name`: compare the length of the member instead of the member
    pub size: bool,
}

/// What a JSON member is expected to be
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "match", content = "expect", rename_all = "snake_case")]
pub enum JsonExpect {
    /// Compare the member with the directive operator
    Value(Literal),
    /// Check each child directive against the member object
    Object(Vec<JsonDirective>),
    /// Check element i of the member array against expectation i
    Array(Vec<JsonExpect>),
}

/// Split on `_` and `-`, lowercase, then capitalize each segment
fn capitalized_segments(key: &str) -> Vec<String> {
    key.to_lowercase()
        .split(['_', '-'])
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// `content_type` -> `Content-Type`
pub fn canonical_header(key: &str) -> String {
    capitalized_segments(key).join("-")
}

/// Map a key to its scalar target using the reserved-name table
pub fn scalar_target(key: &str) -> ScalarTarget {
    match capitalized_segments(key).concat().as_str() {
        "Status" | "Code" => ScalarTarget::Status,
        "ContentType" => ScalarTarget::ContentType,
        "Charset" => ScalarTarget::Charset,
        "Content" => ScalarTarget::Content,
        _ => ScalarTarget::Header(canonical_header(key)),
    }
}

/// `user-login` -> `UserLoginTest`
pub fn class_name(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name);
    let stem = base.split('.').next().unwrap_or(base);
    format!("{}Test", capitalized_segments(stem).concat())
}

/// `list users` -> `test_list_users`
pub fn test_name(method: &str) -> String {
    let parts: Vec<&str> = NON_WORD.split(method).collect();
    format!("test_{}", parts.join("_"))
}

/// Compile source text into a class
pub fn compile(source: &str, file_name: &str) -> VouchResult<ClassSpec> {
    let file = Parser::new(source).parse()?;
    let class = synthesize(&file, source, file_name)?;
    debug!(
        class = %class.name,
        methods = class.methods.len(),
        imports = class.imports.len(),
        "compiled test class"
    );
    Ok(class)
}

/// Build a class from an already parsed file
pub fn synthesize(file: &SourceFile, source: &str, file_name: &str) -> VouchResult<ClassSpec> {
    let methods = file
        .methods
        .iter()
        .map(|method| Synthesizer { source }.method(method))
        .collect::<VouchResult<Vec<_>>>()?;

    Ok(ClassSpec {
        name: class_name(file_name),
        imports: file.imports.clone(),
        methods,
    })
}

struct Synthesizer<'s> {
    source: &'s str,
}

impl Synthesizer<'_> {
    fn method(&self, block: &MethodBlock) -> VouchResult<MethodAction> {
        let mut action = MethodAction {
            name: block.name.clone(),
            test_name: test_name(&block.name),
            verb: block.verb().to_string(),
            path: block.path().to_string(),
            params: IndexMap::new(),
            data: IndexMap::new(),
            headers: IndexMap::new(),
            json: None,
            files: None,
            context: IndexMap::new(),
            assertions: Vec::new(),
        };

        if let Some(request) = &block.request {
            self.key_values(&mut action.params, &request.params, "params")?;
        }

        for entry in &block.entries {
            self.entry(&mut action, entry)?;
        }

        Ok(action)
    }

    fn entry(&self, action: &mut MethodAction, entry: &Entry) -> VouchResult<()> {
        let op = entry.op;
        match entry.key.text.as_str() {
            "params" if op.is_assignment() => {
                let members = self.object_members(entry, "params")?;
                self.key_values(&mut action.params, members, "params")?;
            }
            "data" if op.is_assignment() => {
                let members = self.object_members(entry, "data")?;
                self.key_values(&mut action.data, members, "data")?;
            }
            "head" if op == Operator::Append => {
                let members = self.object_members(entry, "head")?;
                for member in members {
                    action
                        .headers
                        .insert(canonical_header(&member.key.text), resolve_node(&member.value));
                }
            }
            "head" if op.is_assignment() => {
                let members = self.object_members(entry, "head")?;
                for member in members {
                    action.assertions.push(AssertionDirective::Scalar {
                        target: scalar_target(&member.key.text),
                        op: member.op,
                        expected: resolve_node(&member.value),
                    });
                }
            }
            "json" if op == Operator::Append => {
                action.json = Some(resolve_node(&entry.value));
            }
            "json" if op.is_assignment() => {
                let members = self.object_members(entry, "json")?;
                action
                    .assertions
                    .extend(members.iter().map(|m| AssertionDirective::Json(json_directive(m))));
            }
            "files" if op.is_assignment() => {
                action.files = Some(resolve_node(&entry.value));
            }
            "content" | "charset" | "code" | "content_type" => {
                action.assertions.push(AssertionDirective::Scalar {
                    target: scalar_target(&entry.key.text),
                    op,
                    expected: resolve_node(&entry.value),
                });
            }
            _ if op.is_assignment() && matches!(entry.value, Node::Scalar(_)) => {
                let key = resolve_key(&entry.key);
                let name = key.name().unwrap_or(&entry.key.text).to_string();
                action.context.insert(name, resolve_node(&entry.value));
            }
            other => {
                warn!(
                    method = %action.name,
                    key = other,
                    op = %op,
                    line = entry.location.line,
                    "entry has no effect and was ignored"
                );
            }
        }
        Ok(())
    }

    /// Members of an object-valued section
    fn object_members<'e>(&self, entry: &'e Entry, section: &str) -> VouchResult<&'e [Entry]> {
        entry.value.as_object().ok_or_else(|| {
            VouchError::invalid_section(
                self.source,
                &entry.value.location(),
                section,
                "an object",
                format!(
                    "write `{} {{ name: value }}`; found {}",
                    section,
                    entry.value.shape()
                ),
            )
        })
    }

    fn key_values(
        &self,
        target: &mut IndexMap<String, Literal>,
        members: &[Entry],
        section: &str,
    ) -> VouchResult<()> {
        for member in members {
            if !member.op.is_assignment() {
                return Err(VouchError::invalid_section(
                    self.source,
                    &member.location,
                    section,
                    "name: value pairs",
                    format!("'{}' uses '{}'; use ':' or '='", member.key.text, member.op),
                ));
            }
            let key = resolve_key(&member.key);
            let name = key.name().unwrap_or(&member.key.text).to_string();
            target.insert(name, resolve_node(&member.value));
        }
        Ok(())
    }
}

fn json_directive(entry: &Entry) -> JsonDirective {
    let key = resolve_key(&entry.key);
    let key = JsonKey {
        name: key.name().unwrap_or(&entry.key.text).to_string(),
        size: matches!(key, Literal::SizeCompare(_)),
    };

    let expect = match &entry.value {
        Node::Object(members, _) if entry.op.is_equality() => {
            JsonExpect::Object(members.iter().map(json_directive).collect())
        }
        Node::Array(items, _) if entry.op.is_equality() => {
            JsonExpect::Array(items.iter().map(json_element).collect())
        }
        node => JsonExpect::Value(resolve_node(node)),
    };

    JsonDirective {
        key,
        op: entry.op,
        expect,
    }
}

fn json_element(node: &Node) -> JsonExpect {
    match node {
        Node::Object(members, _) => JsonExpect::Object(members.iter().map(json_directive).collect()),
        Node::Array(items, _) => JsonExpect::Array(items.iter().map(json_element).collect()),
        Node::Scalar(_) => JsonExpect::Value(resolve_node(node)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Number;
    use pretty_assertions::assert_eq;

    fn compile_one(source: &str) -> MethodAction {
        let class = compile(source, "sample.vouch").unwrap();
        class.methods.into_iter().next().unwrap()
    }

    fn text(s: &str) -> Literal {
        Literal::Text(s.to_string())
    }

    #[test]
    fn test_names() {
        assert_eq!(class_name("user-login.vouch"), "UserLoginTest");
        assert_eq!(class_name("tests/api/order_items.vouch"), "OrderItemsTest");
        assert_eq!(class_name("ADMIN.v1.vouch"), "AdminTest");
        assert_eq!(test_name("list users"), "test_list_users");
        assert_eq!(test_name("get-user/by id"), "test_get_user_by_id");
    }

    #[test]
    fn test_header_canonicalization() {
        assert_eq!(canonical_header("content_type"), "Content-Type");
        assert_eq!(canonical_header("X-REQUEST-id"), "X-Request-Id");
        assert_eq!(canonical_header("accept"), "Accept");
    }

    #[test]
    fn test_reserved_scalar_targets() {
        assert_eq!(scalar_target("code"), ScalarTarget::Status);
        assert_eq!(scalar_target("Status"), ScalarTarget::Status);
        assert_eq!(scalar_target("content_type"), ScalarTarget::ContentType);
        assert_eq!(scalar_target("Content-Type"), ScalarTarget::ContentType);
        assert_eq!(scalar_target("charset"), ScalarTarget::Charset);
        assert_eq!(scalar_target("content"), ScalarTarget::Content);
        assert_eq!(
            scalar_target("x_rate_limit"),
            ScalarTarget::Header("X-Rate-Limit".to_string())
        );
    }

    #[test]
    fn test_login_request_line() {
        let action = compile_one(
            r#"[login] >> POST /login {username: $u} head << {Accept: "json"} code: 200"#,
        );

        assert_eq!(action.verb, "POST");
        assert_eq!(action.path, "/login");
        assert_eq!(action.test_name, "test_login");
        assert_eq!(
            action.params.get("username"),
            Some(&Literal::InstanceVar("u".to_string()))
        );
        assert_eq!(action.headers.get("Accept"), Some(&text("json")));
        assert_eq!(
            action.assertions,
            vec![AssertionDirective::Scalar {
                target: ScalarTarget::Status,
                op: Operator::Colon,
                expected: Literal::Numeric(Number::Int(200)),
            }]
        );
    }

    #[test]
    fn test_unbraced_request_line_with_header_append() {
        let action = compile_one("[a] >> GET /x a: 1 head << {k: v}");
        assert_eq!(action.params.len(), 1);
        assert_eq!(action.params.get("a"), Some(&Literal::Numeric(Number::Int(1))));
        assert_eq!(action.headers.get("K"), Some(&text("v")));
    }

    #[test]
    fn test_sections() {
        let action = compile_one(
            "[create] >> POST /items\n\
             params { page: 1 }\n\
             data = { name: widget }\n\
             json << { id: 1, tags: [a] }\n\
             files: { upload: \"fixtures/a.txt\" }\n",
        );

        assert_eq!(action.params.get("page"), Some(&Literal::Numeric(Number::Int(1))));
        assert_eq!(action.data.get("name"), Some(&text("widget")));
        assert!(matches!(action.json, Some(Literal::Object(_))));
        let Some(Literal::Object(files)) = &action.files else {
            panic!("expected files object");
        };
        assert_eq!(files.get("upload"), Some(&text("fixtures/a.txt")));
        assert!(action.assertions.is_empty());
    }

    #[test]
    fn test_head_has_two_roles() {
        let action = compile_one(
            "[a] >> GET /x\nhead << { content_type: \"application/json\" }\nhead: { Content-Type =~ /json/i, x_trace <- abc }",
        );

        assert_eq!(
            action.headers.get("Content-Type"),
            Some(&text("application/json"))
        );
        assert_eq!(
            action.assertions,
            vec![
                AssertionDirective::Scalar {
                    target: ScalarTarget::ContentType,
                    op: Operator::Matches,
                    expected: text("/json/i"),
                },
                AssertionDirective::Scalar {
                    target: ScalarTarget::Header("X-Trace".to_string()),
                    op: Operator::Contains,
                    expected: text("abc"),
                },
            ]
        );
    }

    #[test]
    fn test_reserved_keys_take_any_operator() {
        let action = compile_one("[a] >> GET /x\ncode >= 200\ncontent <- ok\ncharset != latin1");
        let ops: Vec<Operator> = action
            .assertions
            .iter()
            .map(|a| match a {
                AssertionDirective::Scalar { op, .. } => *op,
                AssertionDirective::Json(_) => panic!("unexpected json directive"),
            })
            .collect();
        assert_eq!(ops, vec![Operator::GtEq, Operator::Contains, Operator::NotEq]);
    }

    #[test]
    fn test_json_directive_shapes() {
        let action = compile_one(
            "[a] >> GET /x\njson: {\n  id ~~ 3\n  !items: 2\n  user { name: bob }\n  tags: [a, {k: 1}]\n  meta <- {x: 1}\n}",
        );
        let directives: Vec<&JsonDirective> = action
            .assertions
            .iter()
            .map(|a| match a {
                AssertionDirective::Json(d) => d,
                other => panic!("expected json directive, got {:?}", other),
            })
            .collect();

        assert_eq!(directives.len(), 5);
        assert_eq!(directives[0].op, Operator::LengthEq);
        assert_eq!(
            directives[0].expect,
            JsonExpect::Value(Literal::Numeric(Number::Int(3)))
        );

        assert_eq!(
            directives[1].key,
            JsonKey {
                name: "items".to_string(),
                size: true
            }
        );

        let JsonExpect::Object(children) = &directives[2].expect else {
            panic!("expected object match");
        };
        assert_eq!(children[0].key.name, "name");

        let JsonExpect::Array(elements) = &directives[3].expect else {
            panic!("expected array match");
        };
        assert_eq!(elements[0], JsonExpect::Value(text("a")));
        assert!(matches!(elements[1], JsonExpect::Object(_)));

        assert!(matches!(
            directives[4].expect,
            JsonExpect::Value(Literal::Object(_))
        ));
    }

    #[test]
    fn test_initializer_bindings() {
        let class = compile(
            "[initialize]\n$token: abc\nuser = bob\nnested: { a: 1 }\n\n[ping] >> GET /ping\ncode: 200",
            "ping.vouch",
        )
        .unwrap();

        let init = class.initializer().unwrap();
        assert_eq!(init.context.get("token"), Some(&text("abc")));
        assert_eq!(init.context.get("user"), Some(&text("bob")));
        assert!(!init.context.contains_key("nested"));

        let tests: Vec<&str> = class.test_methods().map(|m| m.name.as_str()).collect();
        assert_eq!(tests, vec!["ping"]);
    }

    #[test]
    fn test_scalar_section_is_an_error() {
        let err = compile("[a] >> GET /x\nparams: 3", "a.vouch").unwrap_err();
        match err {
            VouchError::InvalidSection { section, .. } => assert_eq!(section, "params"),
            other => panic!("expected InvalidSection, got {:?}", other),
        }
    }

    #[test]
    fn test_param_with_assertion_operator_is_an_error() {
        let err = compile("[a] >> GET /x id >= 3", "a.vouch").unwrap_err();
        assert!(matches!(err, VouchError::InvalidSection { .. }));
    }

    #[test]
    fn test_serializes_to_json() {
        let class = compile("[a] >> GET /x\ncode: 200", "a.vouch").unwrap();
        let json = serde_json::to_value(&class).unwrap();
        assert_eq!(json["name"], "ATest");
        assert_eq!(json["methods"][0]["assertions"][0]["kind"], "scalar");
        assert_eq!(json["methods"][0]["assertions"][0]["target"]["facet"], "status");
        assert_eq!(json["methods"][0]["assertions"][0]["expected"]["value"], 200);
    }
}
