//! Test discovery and execution
//!
//! A [`Runner`] interprets compiled classes directly: it builds the class
//! context from `initialize`, turns each test method into an
//! [`HttpRequest`], sends it through an [`HttpClient`] and evaluates the
//! method's directives against the response.
//!
//! Per-class behaviour is extended with [`Hook`]s. Runner-wide hooks apply
//! to every class; a class's import lines pull additional hooks out of the
//! [`HookRegistry`] by name.

mod report;

pub use report::{ClassReport, MethodReport, RunReport};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::compiler::{compile, ClassSpec, MethodAction};
use crate::config::Config;
use crate::errors::{VouchError, VouchResult};
use crate::evaluator::{evaluate, AssertionResult, ExecutionContext, Value};
use crate::http::{join_url, FilePart, HttpClient, HttpRequest, HttpResponse};
use crate::resolver::Literal;

/// Test file extension
pub const EXTENSION: &str = "vouch";

/// Collect test files. Directories are walked recursively; entries are
/// sorted so runs are repeatable.
pub fn discover(paths: &[PathBuf]) -> VouchResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            collect_files(path, &mut files)?;
        } else if path.is_file() {
            if has_extension(path) {
                files.push(path.clone());
            } else {
                warn!(path = %path.display(), "skipping file without .{} extension", EXTENSION);
            }
        } else {
            return Err(VouchError::io_error(format!(
                "no such file or directory: {}",
                path.display()
            )));
        }
    }
    Ok(files)
}

fn has_extension(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(EXTENSION)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> VouchResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        VouchError::io_error(format!("failed to read directory {}: {}", dir.display(), e))
    })?;

    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| VouchError::io_error(format!("failed to read entry: {}", e)))?;
    paths.sort();

    for path in paths {
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if has_extension(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Extension point around each class and request
pub trait Hook {
    /// Name used to select the hook from an import line
    fn name(&self) -> &str;

    /// Add bindings after `initialize` has run
    fn extend_context(&self, _context: &mut ExecutionContext) -> VouchResult<()> {
        Ok(())
    }

    /// Adjust a request before it is sent
    fn before_request(
        &self,
        _action: &MethodAction,
        _request: &mut HttpRequest,
        _context: &ExecutionContext,
    ) -> VouchResult<()> {
        Ok(())
    }

    /// Inspect a response; may append results of its own
    fn after_response(
        &self,
        _action: &MethodAction,
        _response: &HttpResponse,
        _results: &mut Vec<AssertionResult>,
    ) {
    }
}

/// Hooks addressable by import name
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: IndexMap<String, Arc<dyn Hook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the hook's own name
    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.insert(hook.name().to_string(), hook);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Hook>> {
        self.hooks.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.hooks.keys().cloned().collect()
    }

    /// Hooks named by a class's import lines, in import order. Unknown
    /// names are skipped.
    pub fn select(&self, imports: &[String]) -> Vec<Arc<dyn Hook>> {
        imports
            .iter()
            .filter_map(|line| {
                let name = import_name(line).unwrap_or_else(|| line.clone());
                let hook = self.get(&name);
                if hook.is_none() {
                    warn!(import = %name, "no hook registered under this name, skipping");
                }
                hook
            })
            .collect()
    }
}

/// `import x` -> `x`, `from x import y` -> `x.y`
pub fn import_name(line: &str) -> Option<String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["import", module] => Some(module.to_string()),
        ["from", module, "import", name] => Some(format!("{}.{}", module, name)),
        _ => None,
    }
}

/// Adds headers to every request that does not already set them
#[derive(Debug, Clone, Default)]
pub struct DefaultHeaders {
    headers: Vec<(String, String)>,
}

impl DefaultHeaders {
    pub const NAME: &'static str = "default_headers";

    pub fn new(headers: Vec<(String, String)>) -> Self {
        Self { headers }
    }
}

impl Hook for DefaultHeaders {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn before_request(
        &self,
        _action: &MethodAction,
        request: &mut HttpRequest,
        _context: &ExecutionContext,
    ) -> VouchResult<()> {
        for (name, value) in &self.headers {
            if request.header(name).is_none() {
                request.headers.push((name.clone(), value.clone()));
            }
        }
        Ok(())
    }
}

/// Executes compiled classes against an HTTP client
pub struct Runner<C: HttpClient> {
    client: C,
    config: Arc<Config>,
    hooks: Vec<Arc<dyn Hook>>,
    registry: HookRegistry,
}

impl<C: HttpClient> Runner<C> {
    pub fn new(client: C, config: Arc<Config>) -> Self {
        Self {
            client,
            config,
            hooks: Vec::new(),
            registry: HookRegistry::new(),
        }
    }

    /// Add a hook applied to every class
    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_registry(mut self, registry: HookRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Discover, compile and run. A file that fails to compile is reported
    /// and the remaining files still run.
    pub fn run_paths(&self, paths: &[PathBuf]) -> VouchResult<RunReport> {
        let files = discover(paths)?;
        info!(files = files.len(), "discovered test files");

        let mut report = RunReport::default();
        for file in &files {
            report.classes.push(self.run_file(file));
        }
        Ok(report)
    }

    /// Compile and run a single file
    pub fn run_file(&self, path: &Path) -> ClassReport {
        let file_name = path.display().to_string();
        let class = std::fs::read_to_string(path)
            .map_err(|e| VouchError::io_error(format!("failed to read {}: {}", file_name, e)))
            .and_then(|source| compile(&source, &file_name));

        match class {
            Ok(class) => {
                let base_dir = path.parent().unwrap_or(Path::new("."));
                let mut report = self.run_class(&class, base_dir);
                report.path = Some(path.to_path_buf());
                report
            }
            Err(e) => {
                warn!(path = %file_name, error = %e, "failed to compile test file");
                ClassReport {
                    name: file_name,
                    path: Some(path.to_path_buf()),
                    methods: Vec::new(),
                    error: Some(e.message()),
                }
            }
        }
    }

    /// Run every test method of a class; `base_dir` anchors relative upload paths
    pub fn run_class(&self, class: &ClassSpec, base_dir: &Path) -> ClassReport {
        info!(class = %class.name, methods = class.test_methods().count(), "running class");

        let hooks: Vec<Arc<dyn Hook>> = self
            .hooks
            .iter()
            .cloned()
            .chain(self.registry.select(&class.imports))
            .collect();

        let mut report = ClassReport {
            name: class.name.clone(),
            path: None,
            methods: Vec::new(),
            error: None,
        };

        let context = match self.build_context(class, &hooks) {
            Ok(context) => context,
            Err(e) => {
                warn!(class = %class.name, error = %e, "class setup failed");
                report.error = Some(e.message());
                return report;
            }
        };

        for action in class.test_methods() {
            report
                .methods
                .push(self.run_method(action, &context, &hooks, base_dir));
        }
        report
    }

    /// Bindings from `initialize`, resolved in order, then hook additions
    pub fn build_context(
        &self,
        class: &ClassSpec,
        hooks: &[Arc<dyn Hook>],
    ) -> VouchResult<ExecutionContext> {
        let mut context = ExecutionContext::new(Arc::clone(&self.config));
        if let Some(init) = class.initializer() {
            for (name, literal) in &init.context {
                let value = context.realize(literal)?;
                context.define(name.clone(), value);
            }
        }
        for hook in hooks {
            hook.extend_context(&mut context)?;
        }
        Ok(context)
    }

    fn run_method(
        &self,
        action: &MethodAction,
        context: &ExecutionContext,
        hooks: &[Arc<dyn Hook>],
        base_dir: &Path,
    ) -> MethodReport {
        let started = Instant::now();
        let mut report = MethodReport::new(action, join_url(&self.config.url(), &action.path));

        let response = self.build_request(action, context, base_dir).and_then(|mut request| {
            for hook in hooks {
                hook.before_request(action, &mut request, context)?;
            }
            report.url = request.url.clone();
            self.client.send(&request)
        });

        match response {
            Ok(response) => {
                let mut results = evaluate(action, &response, context);
                for hook in hooks {
                    hook.after_response(action, &response, &mut results);
                }
                report.status = Some(response.status);
                report.results = results;
            }
            Err(e) => {
                warn!(method = %action.test_name, error = %e, "request failed");
                report.error = Some(e.message());
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(
            method = %action.test_name,
            passed = report.passed(),
            assertions = report.results.len(),
            "method finished"
        );
        report
    }

    /// Resolve every request section of `action` against `context`
    pub fn build_request(
        &self,
        action: &MethodAction,
        context: &ExecutionContext,
        base_dir: &Path,
    ) -> VouchResult<HttpRequest> {
        let mut request = HttpRequest::new(
            action.verb.clone(),
            join_url(&self.config.url(), &action.path),
        );
        request.params = text_pairs(&action.params, context)?;
        request.form = text_pairs(&action.data, context)?;
        for (name, value) in text_pairs(&action.headers, context)? {
            request.set_header(name, value);
        }
        if let Some(json) = &action.json {
            request.json = Some(context.realize(json)?.to_serde_json());
        }
        if let Some(files) = &action.files {
            request.files = file_parts(files, context, base_dir)?;
        }
        Ok(request)
    }
}

fn text_pairs(
    section: &IndexMap<String, Literal>,
    context: &ExecutionContext,
) -> VouchResult<Vec<(String, String)>> {
    section
        .iter()
        .map(|(name, literal)| Ok((name.clone(), context.realize(literal)?.to_text())))
        .collect()
}

/// `files { field: path }`; a bare path uploads as field `file`
fn file_parts(
    files: &Literal,
    context: &ExecutionContext,
    base_dir: &Path,
) -> VouchResult<Vec<FilePart>> {
    let fields: Vec<(String, String)> = match context.realize(files)? {
        Value::Object(entries) => entries
            .into_iter()
            .map(|(field, path)| (field, path.to_text()))
            .collect(),
        Value::String(path) => vec![("file".to_string(), path)],
        other => {
            return Err(VouchError::io_error(format!(
                "files must map field names to paths, found {}",
                other.type_name()
            )))
        }
    };

    fields
        .into_iter()
        .map(|(field, path)| {
            let full = base_dir.join(&path);
            let content = std::fs::read(&full).map_err(|e| {
                VouchError::io_error(format!("failed to read upload {}: {}", full.display(), e))
            })?;
            let file_name = full
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(&path)
                .to_string();
            Ok(FilePart {
                field,
                file_name,
                content,
            })
        })
        .collect()
}
