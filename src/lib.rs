// Rust 1.93+ triggers false positives on thiserror/miette derive macro fields
#![allow(unused_assignments)]

//! vouch: a declarative HTTP test language
//!
//! Test files describe requests and the responses they should produce.
//! Each file compiles to a test class; each `[name]` block becomes one test
//! method that is run against a live server.
//!
//! # Example
//!
//! ```text
//! [initialize]
//! $user: "u1"
//!
//! [get user] >> GET /users {id: $user}
//! head << { accept: application/json }
//! code: 200
//! head: { content_type =~ /json/i }
//! json: {
//!   id: $user
//!   !roles: 2
//! }
//! ```

pub mod compiler;
pub mod config;
pub mod errors;
pub mod evaluator;
pub mod http;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod runner;

pub use compiler::{compile, synthesize, AssertionDirective, ClassSpec, MethodAction};
pub use config::Config;
pub use errors::{ErrorKind, VouchError, VouchResult};
pub use evaluator::{evaluate, AssertionResult, ExecutionContext, Value};
pub use http::{HttpClient, HttpRequest, HttpResponse, UreqClient};
pub use lexer::token::{Operator, SourceLocation, Token, TokenKind};
pub use lexer::Lexer;
pub use parser::ast;
pub use parser::{parse, Parser};
pub use resolver::{resolve, Literal, ResolveContext};
pub use runner::{discover, DefaultHeaders, Hook, HookRegistry, RunReport, Runner};
