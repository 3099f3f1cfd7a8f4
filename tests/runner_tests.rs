//! Runner tests against an in-memory HTTP client

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use vouch::compiler::MethodAction;
use vouch::{
    compile, AssertionResult, Config, ExecutionContext, Hook, HookRegistry, HttpClient,
    HttpRequest, HttpResponse, Runner, VouchError, VouchResult,
};

/// Answers by `VERB path`; unknown routes are a transport failure
#[derive(Default)]
struct FakeServer {
    routes: HashMap<String, HttpResponse>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl FakeServer {
    fn route(mut self, verb: &str, url: &str, status: u16, body: &str) -> Self {
        self.routes.insert(
            format!("{} {}", verb, url),
            HttpResponse::new(
                status,
                vec![(
                    "Content-Type".to_string(),
                    "application/json; charset=utf-8".to_string(),
                )],
                body,
            ),
        );
        self
    }
}

impl HttpClient for &FakeServer {
    fn send(&self, request: &HttpRequest) -> VouchResult<HttpResponse> {
        self.seen.lock().unwrap().push(request.clone());
        self.routes
            .get(&format!("{} {}", request.verb, request.url))
            .cloned()
            .ok_or_else(|| VouchError::transport(format!("connection refused: {}", request.url)))
    }
}

fn config() -> Arc<Config> {
    let mut config = Config::new();
    config.set("url", "http://api.test");
    config.set("api.key", "k-123");
    Arc::new(config)
}

const USERS: &str = r#"
<%
import auth
%>
[initialize]
$user: u1

[get user] >> GET /users/u1
head << { x_api_key: @api.key }
code: 200
head: { content_type: application/json, charset: utf-8 }
json: {
  id: $user
  !roles: 2
  roles: [admin, dev]
}

[missing user] >> GET /users/u2
code: 404

[unreachable] >> GET /down
code: 200
"#;

fn server() -> FakeServer {
    FakeServer::default()
        .route("GET", "http://api.test/users/u1", 200, r#"{"id":"u1","roles":["admin","dev"]}"#)
        .route("GET", "http://api.test/users/u2", 404, r#"{"error":"not found"}"#)
}

#[test]
fn test_run_class_end_to_end() {
    let server = server();
    let class = compile(USERS, "users.vouch").unwrap();
    let runner = Runner::new(&server, config());
    let report = runner.run_class(&class, Path::new("."));

    assert_eq!(report.name, "UsersTest");
    let outcome: Vec<_> = report.methods.iter().map(|m| m.passed()).collect();
    assert_eq!(outcome, vec![true, true, false]);

    let get = &report.methods[0];
    assert_eq!(get.results.len(), 7);
    assert_eq!(get.status, Some(200));

    let down = &report.methods[2];
    assert!(down.results.is_empty());
    assert!(down.error.as_deref().unwrap().contains("connection refused"));

    let seen = server.seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].header("X-Api-Key"), Some("k-123"));
}

struct AuthHook;

impl Hook for AuthHook {
    fn name(&self) -> &str {
        "auth"
    }

    fn extend_context(&self, context: &mut ExecutionContext) -> VouchResult<()> {
        context.define("token", "t-1");
        Ok(())
    }

    fn before_request(
        &self,
        _action: &MethodAction,
        request: &mut HttpRequest,
        context: &ExecutionContext,
    ) -> VouchResult<()> {
        if let Some(token) = context.get("token") {
            request.set_header("Authorization", format!("Bearer {}", token.to_text()));
        }
        Ok(())
    }

    fn after_response(
        &self,
        _action: &MethodAction,
        response: &HttpResponse,
        results: &mut Vec<AssertionResult>,
    ) {
        results.push(AssertionResult {
            description: "response is not a server error".to_string(),
            passed: response.status < 500,
            actual: None,
            expected: None,
            message: None,
        });
    }
}

#[test]
fn test_imported_hooks_apply() {
    let server = server();
    let class = compile(USERS, "users.vouch").unwrap();

    let mut registry = HookRegistry::new();
    registry.register(Arc::new(AuthHook));
    let runner = Runner::new(&server, config()).with_registry(registry);
    let report = runner.run_class(&class, Path::new("."));

    assert_eq!(report.methods[0].results.len(), 8);
    assert_eq!(
        report.methods[0].results.last().unwrap().description,
        "response is not a server error"
    );

    let seen = server.seen.lock().unwrap();
    assert!(seen
        .iter()
        .all(|r| r.header("authorization") == Some("Bearer t-1")));
}

#[test]
fn test_hooks_not_imported_do_not_apply() {
    let server = server();
    let class = compile("[ping] >> GET /users/u1\ncode: 200", "ping.vouch").unwrap();

    let mut registry = HookRegistry::new();
    registry.register(Arc::new(AuthHook));
    let runner = Runner::new(&server, config()).with_registry(registry);
    let report = runner.run_class(&class, Path::new("."));

    assert!(report.passed());
    assert_eq!(server.seen.lock().unwrap()[0].header("authorization"), None);
}

#[test]
fn test_run_paths_continues_after_compile_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a_ok.vouch"), "[ping] >> GET /users/u1\ncode: 200\n").unwrap();
    std::fs::write(dir.path().join("b_broken.vouch"), "[a] >> GET /x\njson: { key: }\n").unwrap();
    std::fs::write(dir.path().join("c_ok.vouch"), "[gone] >> GET /users/u2\ncode: 404\n").unwrap();

    let server = server();
    let runner = Runner::new(&server, config());
    let report = runner.run_paths(&[dir.path().to_path_buf()]).unwrap();

    assert_eq!(report.classes.len(), 3);
    assert_eq!(report.classes[0].name, "AOkTest");
    assert!(report.classes[1].error.is_some());
    assert_eq!(report.classes[2].name, "COkTest");
    assert_eq!(report.total(), 2);
    assert_eq!(report.passed(), 2);
    assert!(!report.success());
    assert!(report.summary().contains("1 files with errors"));
}
