//! Execution context for one test class
//!
//! Holds the bindings made by the class's `initialize` block (and by hooks)
//! and a shared handle to the configuration. Test methods only read it.

use std::sync::Arc;

use indexmap::IndexMap;

use super::value::Value;
use crate::config::Config;
use crate::errors::{VouchError, VouchResult};
use crate::resolver::Literal;

/// Bindings visible to `$name` and `@name` references
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    vars: IndexMap<String, Value>,
    config: Arc<Config>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Arc::new(Config::new()))
    }
}

impl ExecutionContext {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            vars: IndexMap::new(),
            config,
        }
    }

    /// Bind an instance variable, replacing any earlier binding
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Look up an instance variable
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Names of all bound instance variables, in binding order
    pub fn names(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Turn a literal into a concrete value, following `$` and `@` references
    pub fn realize(&self, literal: &Literal) -> VouchResult<Value> {
        match literal {
            Literal::Text(s) => Ok(Value::String(s.clone())),
            Literal::InstanceVar(name) => self.get(name).cloned().ok_or_else(|| {
                VouchError::undefined_reference("instance variable", format!("${}", name), &self.names())
            }),
            Literal::GlobalVar(name) => self.config.get(name).cloned().ok_or_else(|| {
                VouchError::undefined_reference("global", format!("@{}", name), &self.config.keys())
            }),
            Literal::Bool(b) => Ok(Value::Bool(*b)),
            Literal::Numeric(n) => Ok((*n).into()),
            Literal::Null => Ok(Value::Null),
            Literal::SizeCompare(name) => Ok(Value::String(name.clone())),
            Literal::Object(entries) => {
                let mut obj = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    obj.insert(key.clone(), self.realize(value)?);
                }
                Ok(Value::Object(obj))
            }
            Literal::Array(items) => items
                .iter()
                .map(|item| self.realize(item))
                .collect::<VouchResult<Vec<_>>>()
                .map(Value::Array),
            Literal::Raw(value) => Ok(value.clone()),
        }
    }
}
