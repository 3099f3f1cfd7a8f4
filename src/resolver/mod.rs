//! Value resolution: raw lexemes to typed literals
//!
//! Rules, first match wins:
//! - quoted text is always [`Literal::Text`]
//! - `$name` is an instance variable (key or value position)
//! - in value position: `@name` or `@a.b` is a global, then `true`/`false`/`on`/`off`,
//!   `null`, integers and decimals
//! - in key position: `!name` marks a size comparison
//! - anything else is text

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;

use crate::evaluator::value::Value;
use crate::parser::ast::{Key, Node};

static INSTANCE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

static GLOBAL_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid regex")
});

static SIZE_COMPARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^!\w+$").expect("valid regex"));

static INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+$").expect("valid regex"));

static FLOAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+\.\d+$").expect("valid regex"));

/// Where a lexeme appeared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveContext {
    Key,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => Value::Int(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

/// A typed literal. The tag fully determines the payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Text(String),
    /// `$name`, looked up in the class execution context
    InstanceVar(String),
    /// `@name`, looked up in the configuration
    GlobalVar(String),
    Bool(bool),
    Numeric(Number),
    Null,
    /// `!name`, compare the size of `name` instead of its value
    SizeCompare(String),
    Object(IndexMap<String, Literal>),
    Array(Vec<Literal>),
    /// An already-resolved value, injected by hooks
    Raw(Value),
}

impl Literal {
    /// The key name to look up, with any sigil removed
    pub fn name(&self) -> Option<&str> {
        match self {
            Literal::Text(s)
            | Literal::InstanceVar(s)
            | Literal::GlobalVar(s)
            | Literal::SizeCompare(s) => Some(s),
            _ => None,
        }
    }

    /// Convert without a context; references keep their written form
    pub fn to_plain_value(&self) -> Value {
        match self {
            Literal::Text(s) => Value::String(s.clone()),
            Literal::InstanceVar(_) | Literal::GlobalVar(_) | Literal::SizeCompare(_) => {
                Value::String(self.to_string())
            }
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Numeric(n) => (*n).into(),
            Literal::Null => Value::Null,
            Literal::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_plain_value()))
                    .collect(),
            ),
            Literal::Array(items) => Value::Array(items.iter().map(Literal::to_plain_value).collect()),
            Literal::Raw(value) => value.clone(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Text(s) => write!(f, "{:?}", s),
            Literal::InstanceVar(name) => write!(f, "${}", name),
            Literal::GlobalVar(name) => write!(f, "@{}", name),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Numeric(Number::Int(n)) => write!(f, "{}", n),
            Literal::Numeric(Number::Float(n)) => write!(f, "{}", Value::Float(*n)),
            Literal::Null => write!(f, "null"),
            Literal::SizeCompare(name) => write!(f, "!{}", name),
            Literal::Object(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Literal::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Literal::Raw(value) => write!(f, "{}", value),
        }
    }
}

/// Type a raw lexeme
pub fn resolve(text: &str, quoted: bool, context: ResolveContext) -> Literal {
    if quoted {
        return Literal::Text(text.to_string());
    }

    if INSTANCE_VAR.is_match(text) {
        return Literal::InstanceVar(text[1..].to_string());
    }

    match context {
        ResolveContext::Value => {
            if GLOBAL_VAR.is_match(text) {
                return Literal::GlobalVar(text[1..].to_string());
            }
            match text {
                "true" | "on" => return Literal::Bool(true),
                "false" | "off" => return Literal::Bool(false),
                "null" => return Literal::Null,
                _ => {}
            }
            if INT.is_match(text) {
                // Out of i64 range still reads as a number
                return match text.parse::<i64>() {
                    Ok(n) => Literal::Numeric(Number::Int(n)),
                    Err(_) => text
                        .parse::<f64>()
                        .map(|f| Literal::Numeric(Number::Float(f)))
                        .unwrap_or_else(|_| Literal::Text(text.to_string())),
                };
            }
            if FLOAT.is_match(text) {
                if let Ok(f) = text.parse::<f64>() {
                    return Literal::Numeric(Number::Float(f));
                }
            }
        }
        ResolveContext::Key => {
            if SIZE_COMPARE.is_match(text) {
                return Literal::SizeCompare(text[1..].to_string());
            }
        }
    }

    Literal::Text(text.to_string())
}

/// Type a key
pub fn resolve_key(key: &Key) -> Literal {
    resolve(&key.text, key.quoted, ResolveContext::Key)
}

/// Type a value, recursing through objects and arrays.
///
/// Object member names are kept as written. When a name repeats, the last
/// occurrence wins but keeps the first position.
pub fn resolve_node(node: &Node) -> Literal {
    match node {
        Node::Scalar(scalar) => resolve(&scalar.text, scalar.quoted, ResolveContext::Value),
        Node::Object(entries, _) => Literal::Object(
            entries
                .iter()
                .map(|entry| (entry.key.text.clone(), resolve_node(&entry.value)))
                .collect(),
        ),
        Node::Array(items, _) => Literal::Array(items.iter().map(resolve_node).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn value(text: &str) -> Literal {
        resolve(text, false, ResolveContext::Value)
    }

    fn key(text: &str) -> Literal {
        resolve(text, false, ResolveContext::Key)
    }

    #[test]
    fn test_scalar_typing() {
        assert_eq!(value("true"), Literal::Bool(true));
        assert_eq!(value("on"), Literal::Bool(true));
        assert_eq!(value("off"), Literal::Bool(false));
        assert_eq!(value("-3"), Literal::Numeric(Number::Int(-3)));
        assert_eq!(value("1.5"), Literal::Numeric(Number::Float(1.5)));
        assert_eq!(value("null"), Literal::Null);
        assert_eq!(value("hello"), Literal::Text("hello".to_string()));
    }

    #[test]
    fn test_booleans_are_case_sensitive() {
        assert_eq!(value("True"), Literal::Text("True".to_string()));
        assert_eq!(value("NULL"), Literal::Text("NULL".to_string()));
    }

    #[test]
    fn test_not_quite_numbers() {
        assert_eq!(value("1."), Literal::Text("1.".to_string()));
        assert_eq!(value(".5"), Literal::Text(".5".to_string()));
        assert_eq!(value("1e3"), Literal::Text("1e3".to_string()));
        assert_eq!(value("--1"), Literal::Text("--1".to_string()));
    }

    #[test]
    fn test_int_overflow_reads_as_float() {
        assert_eq!(
            value("99999999999999999999"),
            Literal::Numeric(Number::Float(1e20))
        );
    }

    #[test]
    fn test_quoted_is_always_text() {
        for text in ["true", "-3", "1.5", "null", "$u", "@base", "!items"] {
            assert_eq!(
                resolve(text, true, ResolveContext::Value),
                Literal::Text(text.to_string())
            );
            assert_eq!(
                resolve(text, true, ResolveContext::Key),
                Literal::Text(text.to_string())
            );
        }
    }

    #[test]
    fn test_sigils() {
        assert_eq!(value("$u"), Literal::InstanceVar("u".to_string()));
        assert_eq!(key("$token"), Literal::InstanceVar("token".to_string()));
        assert_eq!(value("@base_url"), Literal::GlobalVar("base_url".to_string()));
        assert_eq!(value("@http.timeout"), Literal::GlobalVar("http.timeout".to_string()));
        assert_eq!(key("!items"), Literal::SizeCompare("items".to_string()));
    }

    #[test]
    fn test_sigils_are_position_sensitive() {
        assert_eq!(key("@base"), Literal::Text("@base".to_string()));
        assert_eq!(key("true"), Literal::Text("true".to_string()));
        assert_eq!(key("200"), Literal::Text("200".to_string()));
        assert_eq!(value("!items"), Literal::Text("!items".to_string()));
    }

    #[test]
    fn test_malformed_sigils_are_text() {
        assert_eq!(value("$"), Literal::Text("$".to_string()));
        assert_eq!(value("$1abc"), Literal::Text("$1abc".to_string()));
        assert_eq!(value("$a-b"), Literal::Text("$a-b".to_string()));
        assert_eq!(value("@a."), Literal::Text("@a.".to_string()));
    }

    #[test]
    fn test_resolve_node_recurses() {
        let file = parse("[a] >> GET /x\njson << {id: 1, tags: [\"x\", $tag], meta {ok: on}}").unwrap();
        let literal = resolve_node(&file.methods[0].entries[0].value);

        let Literal::Object(members) = literal else {
            panic!("expected object");
        };
        assert_eq!(members["id"], Literal::Numeric(Number::Int(1)));
        assert_eq!(
            members["tags"],
            Literal::Array(vec![
                Literal::Text("x".to_string()),
                Literal::InstanceVar("tag".to_string())
            ])
        );
        let Literal::Object(meta) = &members["meta"] else {
            panic!("expected nested object");
        };
        assert_eq!(meta["ok"], Literal::Bool(true));
    }

    #[test]
    fn test_display() {
        assert_eq!(value("$u").to_string(), "$u");
        assert_eq!(value("2.0").to_string(), "2.0");
        assert_eq!(value("x").to_string(), "\"x\"");
    }
}
