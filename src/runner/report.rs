use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::compiler::MethodAction;
use crate::evaluator::AssertionResult;

/// Outcome of one test method
#[derive(Debug, Clone, Serialize)]
pub struct MethodReport {
    pub name: String,
    pub test_name: String,
    pub verb: String,
    pub url: String,
    /// Response status, absent when no response arrived
    pub status: Option<u16>,
    pub results: Vec<AssertionResult>,
    /// Transport or resolution failure that stopped the method
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl MethodReport {
    pub fn new(action: &MethodAction, url: String) -> Self {
        Self {
            name: action.name.clone(),
            test_name: action.test_name.clone(),
            verb: action.verb.clone(),
            url,
            status: None,
            results: Vec::new(),
            error: None,
            elapsed_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.error.is_none() && self.results.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &AssertionResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Outcome of one test file
#[derive(Debug, Clone, Serialize)]
pub struct ClassReport {
    pub name: String,
    pub path: Option<PathBuf>,
    pub methods: Vec<MethodReport>,
    /// Compile or setup failure; no methods ran
    pub error: Option<String>,
}

impl ClassReport {
    pub fn passed(&self) -> bool {
        self.error.is_none() && self.methods.iter().all(MethodReport::passed)
    }
}

/// Totals across a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub classes: Vec<ClassReport>,
}

impl RunReport {
    pub fn methods(&self) -> impl Iterator<Item = &MethodReport> {
        self.classes.iter().flat_map(|c| c.methods.iter())
    }

    pub fn total(&self) -> usize {
        self.methods().count()
    }

    pub fn passed(&self) -> usize {
        self.methods().filter(|m| m.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    /// Classes that never ran because they failed to compile or set up
    pub fn errored_classes(&self) -> usize {
        self.classes.iter().filter(|c| c.error.is_some()).count()
    }

    pub fn assertions(&self) -> usize {
        self.methods().map(|m| m.results.len()).sum()
    }

    pub fn success(&self) -> bool {
        self.classes.iter().all(ClassReport::passed)
    }

    /// One-line summary, e.g. `4 methods, 3 passed, 1 failed (12 assertions)`
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} methods, {} passed, {} failed ({} assertions)",
            self.total(),
            self.passed(),
            self.failed(),
            self.assertions()
        );
        let errored = self.errored_classes();
        if errored > 0 {
            line.push_str(&format!(", {} files with errors", errored));
        }
        line
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for class in &self.classes {
            writeln!(f, "{}", class.name)?;
            if let Some(error) = &class.error {
                writeln!(f, "  ERROR {}", error)?;
                continue;
            }
            for method in &class.methods {
                let tag = if method.passed() { "ok  " } else { "FAIL" };
                writeln!(
                    f,
                    "  {} {} ({} {}, {}ms)",
                    tag, method.test_name, method.verb, method.url, method.elapsed_ms
                )?;
                if let Some(error) = &method.error {
                    writeln!(f, "       error: {}", error)?;
                }
                for failure in method.failures() {
                    writeln!(
                        f,
                        "       {}: {}",
                        failure.description,
                        failure.message.as_deref().unwrap_or("failed")
                    )?;
                }
            }
        }
        write!(f, "{}", self.summary())
    }
}
