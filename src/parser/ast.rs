//! Abstract Syntax Tree (AST) definitions for vouch
//!
//! The tree keeps every entry in parse order, duplicates included. Deciding
//! which occurrences matter is left to the compiler.

use crate::lexer::token::{Operator, SourceLocation};

/// A complete vouch source file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// Accepted import lines, verbatim
    pub imports: Vec<String>,
    /// Method blocks in source order
    pub methods: Vec<MethodBlock>,
}

/// `[name] >> VERB /path ...` followed by entries
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBlock {
    pub name: String,
    /// Absent for blocks such as `initialize` that issue no request
    pub request: Option<RequestLine>,
    pub entries: Vec<Entry>,
    /// Location of the opening `[`
    pub location: SourceLocation,
}

/// `>> VERB /path key: value, ...`
#[derive(Debug, Clone, PartialEq)]
pub struct RequestLine {
    pub verb: String,
    pub path: String,
    /// Entries written on the request line itself
    pub params: Vec<Entry>,
    pub location: SourceLocation,
}

/// `key op value`, or `key { ... }` which is recorded with `:`
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: Key,
    pub op: Operator,
    pub value: Node,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub text: String,
    pub quoted: bool,
    pub location: SourceLocation,
}

/// A value in the tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Scalar(Scalar),
    Object(Vec<Entry>, SourceLocation),
    Array(Vec<Node>, SourceLocation),
}

/// An unresolved literal: raw text plus whether it was quoted
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub text: String,
    pub quoted: bool,
    pub location: SourceLocation,
}

impl Node {
    pub fn location(&self) -> SourceLocation {
        match self {
            Node::Scalar(scalar) => scalar.location,
            Node::Object(_, location) | Node::Array(_, location) => *location,
        }
    }

    pub fn as_object(&self) -> Option<&[Entry]> {
        match self {
            Node::Object(entries, _) => Some(entries),
            _ => None,
        }
    }

    /// Short name of the node shape, for messages
    pub fn shape(&self) -> &'static str {
        match self {
            Node::Scalar(_) => "a scalar",
            Node::Object(..) => "an object",
            Node::Array(..) => "an array",
        }
    }
}

impl MethodBlock {
    /// HTTP verb, `GET` when the block has no request line
    pub fn verb(&self) -> &str {
        self.request.as_ref().map_or("GET", |r| r.verb.as_str())
    }

    /// Request path, empty when the block has no request line
    pub fn path(&self) -> &str {
        self.request.as_ref().map_or("", |r| r.path.as_str())
    }
}
