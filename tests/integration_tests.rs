//! End-to-end pipeline tests: source text through lexer, parser, resolver,
//! synthesizer and evaluator.

use pretty_assertions::assert_eq;

use vouch::compiler::{JsonExpect, ScalarTarget};
use vouch::resolver::Number;
use vouch::{
    compile, evaluate, parse, AssertionDirective, ExecutionContext, HttpResponse, Literal,
    Operator, Value, VouchError,
};

fn json_response(status: u16, content_type: &str, body: &str) -> HttpResponse {
    HttpResponse::new(
        status,
        vec![("Content-Type".to_string(), content_type.to_string())],
        body,
    )
}

fn passes(source: &str, response: &HttpResponse) -> Vec<bool> {
    let class = compile(source, "pipeline.vouch").unwrap();
    let action = class.test_methods().next().unwrap();
    evaluate(action, response, &ExecutionContext::default())
        .iter()
        .map(|r| r.passed)
        .collect()
}

#[test]
fn test_login_scenario_synthesis() {
    let class = compile(
        r#"[login] >> POST /login {username: $u} head << {Accept: "json"} code: 200"#,
        "auth.vouch",
    )
    .unwrap();
    assert_eq!(class.name, "AuthTest");

    let action = class.test_methods().next().unwrap();
    assert_eq!(action.verb, "POST");
    assert_eq!(action.path, "/login");
    assert_eq!(action.params["username"], Literal::InstanceVar("u".to_string()));
    assert_eq!(action.headers["Accept"], Literal::Text("json".to_string()));
    assert_eq!(
        action.assertions,
        vec![AssertionDirective::Scalar {
            target: ScalarTarget::Status,
            op: Operator::Colon,
            expected: Literal::Numeric(Number::Int(200)),
        }]
    );

    let mut context = ExecutionContext::default();
    context.define("u", "bob");
    assert_eq!(
        context.realize(&action.params["username"]).unwrap(),
        Value::from("bob")
    );
}

#[test]
fn test_length_directive_scenario() {
    let source = "[get] >> GET /item\njson: { id ~~ 3 }";
    assert_eq!(
        passes(source, &json_response(200, "application/json", r#"{"id":"abc"}"#)),
        vec![true]
    );
    assert_eq!(
        passes(source, &json_response(200, "application/json", r#"{"id":"ab"}"#)),
        vec![false]
    );
}

#[test]
fn test_case_insensitive_regex_scenario() {
    let source = "[get] >> GET /item\nhead: { Content-Type =~ /json/i }";
    assert_eq!(
        passes(source, &json_response(200, "application/JSON", "{}")),
        vec![true]
    );
}

#[test]
fn test_missing_value_scenario() {
    let err = parse("[a] >> GET /x { key: }").unwrap_err();
    assert_eq!(err.diagnostic_path(), Some("{{key = "));
    assert!(err.to_string().contains("key = "));
}

#[test]
fn test_missing_value_at_end_of_input() {
    let err = compile("[a] >> GET /x\njson: { id: ", "a.vouch").unwrap_err();
    match err {
        VouchError::MissingValue { path, .. } => assert_eq!(path, "{json = {id = "),
        other => panic!("expected MissingValue, got {:?}", other),
    }
}

#[test]
fn test_full_file() {
    let source = r#"
<%
import auth
from plugins import tracing
%>

# shared state
[initialize]
$user: "u1"

[list users] >> GET /users {page: 1, limit: 20}
head << { x_api_key: @api.key }
code: 200
head: { content_type: application/json }
json: {
  !items: 2
  items: [{id: 1}, {id: 2}]
}

[create user] >> POST /users
json << {
  name: "bob"
  roles: [admin, dev]
}
code: 201
content <- bob
"#;
    let class = compile(source, "users_api.vouch").unwrap();
    assert_eq!(class.name, "UsersApiTest");
    assert_eq!(class.imports, vec!["import auth", "from plugins import tracing"]);
    assert!(class.initializer().is_some());

    let names: Vec<_> = class.test_methods().map(|m| m.test_name.as_str()).collect();
    assert_eq!(names, vec!["test_list_users", "test_create_user"]);

    let list = class.test_methods().next().unwrap();
    assert_eq!(list.params.len(), 2);
    assert_eq!(list.headers["X-Api-Key"], Literal::GlobalVar("api.key".to_string()));
    assert_eq!(list.assertions.len(), 4);

    let AssertionDirective::Json(size) = &list.assertions[2] else {
        panic!("expected a json directive");
    };
    assert!(size.key.size);
    assert_eq!(size.key.name, "items");
    let AssertionDirective::Json(items) = &list.assertions[3] else {
        panic!("expected a json directive");
    };
    assert!(matches!(&items.expect, JsonExpect::Array(elements) if elements.len() == 2));

    let create = class.test_methods().nth(1).unwrap();
    assert_eq!(create.verb, "POST");
    let Some(Literal::Object(body)) = &create.json else {
        panic!("expected a json body");
    };
    assert_eq!(body["name"], Literal::Text("bob".to_string()));
}

#[test]
fn test_evaluation_collects_every_failure() {
    let source = r#"[check] >> GET /x
code >= 200
code < 300
head: { x_missing: nope }
json: { user { name: alice, age > 40 }, tags <- beta }
"#;
    let body = r#"{"user":{"name":"bob","age":30},"tags":["alpha","beta"]}"#;
    assert_eq!(
        passes(source, &json_response(200, "application/json", body)),
        vec![true, true, false, false, false, true]
    );
}

#[test]
fn test_comments_and_blank_lines_are_ignored() {
    let source = "# header comment\n\n[a] >> GET /x  # trailing\n// another\ncode: 200\n";
    let class = compile(source, "c.vouch").unwrap();
    assert_eq!(class.methods.len(), 1);
    assert_eq!(class.methods[0].assertions.len(), 1);
}

#[test]
fn test_lex_error_is_reported_with_code() {
    let err = compile("[a] >> GET /x\ncode: \"unterminated", "e.vouch").unwrap_err();
    assert_eq!(err.kind(), vouch::ErrorKind::Lex);
}
