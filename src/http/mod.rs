//! HTTP transport
//!
//! [`HttpClient`] is the seam between the runner and the network. The
//! default implementation, [`UreqClient`], is a blocking `ureq` agent that
//! never turns a status code into an error: a 404 is a response to assert
//! on, not a transport failure.

use std::time::Duration;

use tracing::debug;
use ureq::tls::TlsConfig;
use ureq::{Agent, RequestBuilder};

use crate::config::Config;
use crate::errors::{VouchError, VouchResult};
use crate::evaluator::value::Value;

/// Boundary for hand-built multipart bodies
const MULTIPART_BOUNDARY: &str = "vouch-boundary-5e1f0c9a7b";

/// A file to upload as one multipart field
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

/// A fully resolved request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpRequest {
    pub verb: String,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Form fields; sent urlencoded, or as multipart fields alongside files
    pub form: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
    pub files: Vec<FilePart>,
}

impl HttpRequest {
    pub fn new(verb: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set a header, replacing any header of the same name
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_body(&self) -> bool {
        self.json.is_some() || !self.form.is_empty() || !self.files.is_empty()
    }
}

/// What came back
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<String>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Look up a header; case-insensitive, `_` matches `-`
    pub fn header(&self, name: &str) -> Option<&str> {
        let wanted = name.replace('_', "-");
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(&wanted))
            .map(|(_, v)| v.as_str())
    }

    /// Media type of `Content-Type`, without parameters
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .map(|value| value.split(';').next().unwrap_or_default().trim().to_string())
    }

    /// `charset` parameter of `Content-Type`, `utf-8` when absent
    pub fn charset(&self) -> String {
        self.header("content-type")
            .and_then(|value| {
                value.split(';').skip(1).find_map(|param| {
                    let (key, val) = param.split_once('=')?;
                    key.trim()
                        .eq_ignore_ascii_case("charset")
                        .then(|| val.trim().trim_matches('"').to_string())
                })
            })
            .unwrap_or_else(|| "utf-8".to_string())
    }

    /// Parse the body as JSON
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str::<serde_json::Value>(&self.body).map(Value::from_serde_json)
    }
}

/// Sends requests
pub trait HttpClient {
    fn send(&self, request: &HttpRequest) -> VouchResult<HttpResponse>;
}

/// Join the base URL and a request path. Absolute URLs are used as given.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{}{}", base, path)
    }
}

/// Encode form fields and files as `multipart/form-data`
pub fn multipart_body(form: &[(String, String)], files: &[FilePart]) -> (String, Vec<u8>) {
    let mut body = Vec::new();

    for (name, value) in form {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    for file in files {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                file.field, file.file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(&file.content);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    (
        format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        body,
    )
}

/// Blocking client over a shared `ureq` agent
pub struct UreqClient {
    agent: Agent,
}

impl UreqClient {
    pub fn new(timeout: Duration, verify: bool) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .tls_config(TlsConfig::builder().disable_verification(!verify).build())
            .build()
            .into();
        Self { agent }
    }

    /// Client using `http.timeout` and `http.verify`
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.timeout(), config.verify())
    }
}

fn prepare<B>(mut builder: RequestBuilder<B>, request: &HttpRequest) -> RequestBuilder<B> {
    for (name, value) in &request.params {
        builder = builder.query(name, value);
    }
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_with_body(
    builder: RequestBuilder<ureq::typestate::WithBody>,
    request: &HttpRequest,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    if !request.files.is_empty() {
        let (content_type, body) = multipart_body(&request.form, &request.files);
        builder.header("Content-Type", &content_type).send(&body)
    } else if let Some(json) = &request.json {
        builder.send_json(json)
    } else if !request.form.is_empty() {
        builder.send_form(request.form.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    } else {
        builder.send_empty()
    }
}

impl HttpClient for UreqClient {
    fn send(&self, request: &HttpRequest) -> VouchResult<HttpResponse> {
        let url = request.url.as_str();
        debug!(verb = %request.verb, url, params = request.params.len(), "sending request");

        let result = match request.verb.as_str() {
            "POST" => send_with_body(prepare(self.agent.post(url), request), request),
            "PUT" => send_with_body(prepare(self.agent.put(url), request), request),
            "PATCH" => send_with_body(prepare(self.agent.patch(url), request), request),
            verb => {
                if request.has_body() {
                    tracing::warn!(verb, url, "request body ignored for a method without a body");
                }
                let builder = match verb {
                    "GET" => self.agent.get(url),
                    "DELETE" => self.agent.delete(url),
                    "HEAD" => self.agent.head(url),
                    "OPTIONS" => self.agent.options(url),
                    "TRACE" => self.agent.trace(url),
                    other => {
                        return Err(VouchError::transport(format!(
                            "unsupported HTTP method '{}'",
                            other
                        )))
                    }
                };
                prepare(builder, request).call()
            }
        };

        let mut response = result
            .map_err(|e| VouchError::transport(format!("{} {}: {}", request.verb, url, e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| VouchError::transport(format!("failed to read response body: {}", e)))?;

        debug!(status, bytes = body.len(), "received response");
        Ok(HttpResponse::new(status, headers, body))
    }
}
