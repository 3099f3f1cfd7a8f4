//! Assertion evaluation against live responses
//!
//! Every directive of a [`MethodAction`] yields one or more
//! [`AssertionResult`]s. A mismatch is recorded and evaluation moves on;
//! nothing here aborts the remaining directives.

pub mod scope;
pub mod value;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::compiler::{AssertionDirective, JsonDirective, JsonExpect, MethodAction, ScalarTarget};
use crate::http::HttpResponse;
use crate::lexer::token::Operator;
pub use scope::ExecutionContext;
pub use value::Value;

/// Outcome of one assertion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssertionResult {
    /// What was checked, e.g. `status : 200` or `$.user.id == 1`
    pub description: String,
    pub passed: bool,
    pub actual: Option<Value>,
    pub expected: Option<Value>,
    /// Why the assertion failed
    pub message: Option<String>,
}

impl AssertionResult {
    fn checked(description: String, op: Operator, actual: Value, expected: Value) -> Self {
        let outcome = apply_operator(op, &actual, &expected);
        Self {
            description,
            passed: outcome.is_ok(),
            message: outcome.err(),
            actual: Some(actual),
            expected: Some(expected),
        }
    }

    fn failed(description: String, message: impl Into<String>) -> Self {
        Self {
            description,
            passed: false,
            actual: None,
            expected: None,
            message: Some(message.into()),
        }
    }
}

/// Compile `/pattern/flags` (flags from `i`, `m`, `s`); text without the
/// slashes is used as the whole pattern
pub fn compile_pattern(text: &str) -> Result<Regex, regex::Error> {
    let (pattern, flags) = match text.strip_prefix('/').and_then(|rest| rest.rsplit_once('/')) {
        Some((pattern, flags)) if flags.chars().all(|c| matches!(c, 'i' | 'm' | 's')) => {
            (pattern, flags)
        }
        _ => (text, ""),
    };

    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
}

/// Apply an assertion operator; `Err` carries the failure message
pub fn apply_operator(op: Operator, actual: &Value, expected: &Value) -> Result<(), String> {
    let ok = match op {
        Operator::Colon | Operator::Assign | Operator::Eq => actual.equals(expected),
        Operator::NotEq => !actual.equals(expected),
        Operator::Contains => actual.contains(expected),
        Operator::Matches => {
            let pattern = match expected {
                Value::String(s) => s.clone(),
                other => other.to_text(),
            };
            let regex = compile_pattern(&pattern)
                .map_err(|e| format!("invalid pattern {}: {}", pattern, e))?;
            match actual {
                Value::Null => false,
                Value::String(s) => regex.is_match(s),
                other => regex.is_match(&other.to_text()),
            }
        }
        Operator::LengthEq => {
            let Some(length) = actual.length() else {
                return Err(format!("{} value {} has no length", actual.type_name(), actual));
            };
            Value::Int(length as i64).equals(expected)
        }
        Operator::Gt | Operator::GtEq | Operator::Lt | Operator::LtEq => {
            let Some(ordering) = actual.partial_cmp(expected) else {
                return Err(format!(
                    "cannot order {} {} against {} {}",
                    actual.type_name(),
                    actual,
                    expected.type_name(),
                    expected
                ));
            };
            match op {
                Operator::Gt => ordering.is_gt(),
                Operator::GtEq => ordering.is_ge(),
                Operator::Lt => ordering.is_lt(),
                _ => ordering.is_le(),
            }
        }
        Operator::Append => {
            return Err("unsupported assertion operator '<<'".to_string());
        }
    };

    if ok {
        Ok(())
    } else {
        Err(mismatch_message(op, actual, expected))
    }
}

fn mismatch_message(op: Operator, actual: &Value, expected: &Value) -> String {
    match op {
        Operator::Colon | Operator::Assign | Operator::Eq => {
            format!("expected {}, found {}", expected, actual)
        }
        Operator::NotEq => format!("expected anything but {}", expected),
        Operator::Contains => format!("{} does not contain {}", actual, expected),
        Operator::Matches => format!("{} does not match {}", actual, expected),
        Operator::LengthEq => format!(
            "expected length {}, found {} for {}",
            expected,
            actual.length().unwrap_or_default(),
            actual
        ),
        _ => format!("expected {} {} {}", actual, op, expected),
    }
}

fn facet_name(target: &ScalarTarget) -> String {
    match target {
        ScalarTarget::Status => "status".to_string(),
        ScalarTarget::ContentType => "content type".to_string(),
        ScalarTarget::Charset => "charset".to_string(),
        ScalarTarget::Content => "content".to_string(),
        ScalarTarget::Header(name) => format!("header {}", name),
    }
}

/// Read a scalar facet of the response
pub fn scalar_facet(target: &ScalarTarget, response: &HttpResponse) -> Value {
    match target {
        ScalarTarget::Status => Value::from(response.status),
        ScalarTarget::ContentType => response.content_type().map_or(Value::Null, Value::String),
        ScalarTarget::Charset => Value::String(response.charset()),
        ScalarTarget::Content => Value::String(response.body.clone()),
        ScalarTarget::Header(name) => response.header(name).map_or(Value::Null, Value::from),
    }
}

/// Evaluate every directive of `action` against `response`
pub fn evaluate(
    action: &MethodAction,
    response: &HttpResponse,
    context: &ExecutionContext,
) -> Vec<AssertionResult> {
    let mut results = Vec::new();
    let mut body: Option<Result<Value, String>> = None;

    for directive in &action.assertions {
        match directive {
            AssertionDirective::Scalar {
                target,
                op,
                expected,
            } => {
                let description = format!("{} {} {}", facet_name(target), op, expected);
                results.push(match context.realize(expected) {
                    Ok(expected) => AssertionResult::checked(
                        description,
                        *op,
                        scalar_facet(target, response),
                        expected,
                    ),
                    Err(e) => AssertionResult::failed(description, e.message()),
                });
            }
            AssertionDirective::Json(json) => {
                let parsed = body.get_or_insert_with(|| {
                    response.json().map_err(|e| format!("response body is not JSON: {}", e))
                });
                match parsed {
                    Ok(root) => evaluate_json(json, root, "$", context, &mut results),
                    Err(message) => {
                        results.push(AssertionResult::failed(describe_json(json, "$"), message.clone()));
                    }
                }
            }
        }
    }

    results
}

fn describe_json(directive: &JsonDirective, parent: &str) -> String {
    let path = member_path(directive, parent);
    match &directive.expect {
        JsonExpect::Value(expected) => format!("{} {} {}", path, directive.op, expected),
        JsonExpect::Object(_) => format!("{} {} {{...}}", path, directive.op),
        JsonExpect::Array(_) => format!("{} {} [...]", path, directive.op),
    }
}

fn member_path(directive: &JsonDirective, parent: &str) -> String {
    if directive.key.size {
        format!("{}.!{}", parent, directive.key.name)
    } else {
        format!("{}.{}", parent, directive.key.name)
    }
}

/// Evaluate a JSON directive against the object (or array) `data`
pub fn evaluate_json(
    directive: &JsonDirective,
    data: &Value,
    parent: &str,
    context: &ExecutionContext,
    results: &mut Vec<AssertionResult>,
) {
    let path = member_path(directive, parent);
    let Some(member) = data.get(&directive.key.name) else {
        results.push(AssertionResult::failed(
            describe_json(directive, parent),
            format!("no member '{}' in {}", directive.key.name, parent),
        ));
        return;
    };

    match &directive.expect {
        JsonExpect::Value(expected) => {
            let description = describe_json(directive, parent);
            let expected = match context.realize(expected) {
                Ok(expected) => expected,
                Err(e) => {
                    results.push(AssertionResult::failed(description, e.message()));
                    return;
                }
            };
            let actual = if directive.key.size {
                match member.length() {
                    Some(length) => Value::Int(length as i64),
                    None => {
                        results.push(AssertionResult::failed(
                            description,
                            format!("{} value at {} has no size", member.type_name(), path),
                        ));
                        return;
                    }
                }
            } else {
                member.clone()
            };
            results.push(AssertionResult::checked(description, directive.op, actual, expected));
        }
        JsonExpect::Object(children) => {
            for child in children {
                evaluate_json(child, member, &path, context, results);
            }
        }
        JsonExpect::Array(elements) => evaluate_elements(elements, member, &path, context, results),
    }
}

/// Positional match: element i of `data` against expectation i
fn evaluate_elements(
    elements: &[JsonExpect],
    data: &Value,
    path: &str,
    context: &ExecutionContext,
    results: &mut Vec<AssertionResult>,
) {
    let Some(items) = data.as_array() else {
        results.push(AssertionResult::failed(
            format!("{} [...]", path),
            format!("expected an array at {}, found {}", path, data.type_name()),
        ));
        return;
    };

    for (index, expect) in elements.iter().enumerate() {
        let item_path = format!("{}[{}]", path, index);
        let Some(item) = items.get(index) else {
            results.push(AssertionResult::failed(
                item_path,
                format!("array at {} has only {} elements", path, items.len()),
            ));
            continue;
        };

        match expect {
            JsonExpect::Value(expected) => {
                let description = format!("{} : {}", item_path, expected);
                results.push(match context.realize(expected) {
                    Ok(expected) => AssertionResult::checked(description, Operator::Colon, item.clone(), expected),
                    Err(e) => AssertionResult::failed(description, e.message()),
                });
            }
            JsonExpect::Object(children) => {
                for child in children {
                    evaluate_json(child, item, &item_path, context, results);
                }
            }
            JsonExpect::Array(nested) => evaluate_elements(nested, item, &item_path, context, results),
        }
    }
}
