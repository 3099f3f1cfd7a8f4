#![allow(unused_assignments)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vouch::resolver::{resolve, ResolveContext};
use vouch::{Config, DefaultHeaders, Runner, UreqClient, VouchError, VouchResult};

/// vouch HTTP test runner
///
/// Declarative HTTP tests: describe a request and the response it should get.
#[derive(Parser)]
#[command(name = "vouch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run test files against a server
    Run {
        /// Test files or directories (default: `path` from the config, then `.`)
        paths: Vec<PathBuf>,

        /// Base URL prepended to every request path
        #[arg(short, long)]
        url: Option<String>,

        /// Configuration file
        #[arg(short, long, default_value = "vouch.conf")]
        config: PathBuf,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<f64>,

        /// Skip TLS certificate verification
        #[arg(long)]
        insecure: bool,

        /// Header sent with every request unless the test sets it (NAME=value)
        #[arg(long = "header", value_parser = parse_key_value)]
        headers: Vec<(String, String)>,

        /// Override a configuration value (key=value, dotted keys allowed)
        #[arg(long = "set", value_parser = parse_key_value)]
        set: Vec<(String, String)>,

        /// Report format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Compile test files without running them
    Check {
        /// Files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Internal: Lex a file and print tokens (for debugging)
    #[command(hide = true)]
    Lex {
        /// Source file to lex
        file: PathBuf,
    },

    /// Internal: Parse a file and print AST (for debugging)
    #[command(hide = true)]
    Parse {
        /// Source file to parse
        file: PathBuf,
    },

    /// Internal: Compile a file and print the test class (for debugging)
    #[command(hide = true)]
    Compile {
        /// Source file to compile
        file: PathBuf,

        /// Output format: json, yaml
        #[arg(short, long, default_value = "json")]
        format: String,
    },
}

/// Parse a key=value pair
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_tracing(debug: bool) {
    let default = if debug { "warn,vouch=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Run {
            paths,
            url,
            config,
            timeout,
            insecure,
            headers,
            set,
            format,
        } => cmd_run(paths, url, config, timeout, insecure, headers, set, format),
        Commands::Check { files } => cmd_check(files),
        Commands::Lex { file } => cmd_lex(file),
        Commands::Parse { file } => cmd_parse(file),
        Commands::Compile { file, format } => cmd_compile(file, format),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            let exit_code = match &e {
                VouchError::IoError { .. } => ExitCode::from(3),
                _ => ExitCode::from(1),
            };
            eprintln!("{:?}", miette::Report::new(e));
            exit_code
        }
    }
}

fn read_source(file: &Path) -> VouchResult<String> {
    std::fs::read_to_string(file)
        .map_err(|e| VouchError::io_error(format!("failed to read {}: {}", file.display(), e)))
}

/// File config, then `--set`, then the dedicated flags
fn build_config(
    path: &Path,
    url: Option<String>,
    timeout: Option<f64>,
    insecure: bool,
    set: Vec<(String, String)>,
) -> VouchResult<Config> {
    let mut config = Config::load(path)?;
    for (key, value) in set {
        let value = resolve(&value, false, ResolveContext::Value).to_plain_value();
        config.set(&key, value);
    }
    if let Some(url) = url {
        config.set(vouch::config::URL, url);
    }
    if let Some(timeout) = timeout {
        config.set(vouch::config::HTTP_TIMEOUT, timeout);
    }
    if insecure {
        config.set(vouch::config::HTTP_VERIFY, false);
    }
    Ok(config)
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    paths: Vec<PathBuf>,
    url: Option<String>,
    config_path: PathBuf,
    timeout: Option<f64>,
    insecure: bool,
    headers: Vec<(String, String)>,
    set: Vec<(String, String)>,
    format: String,
) -> VouchResult<ExitCode> {
    if format != "text" && format != "json" {
        return Err(VouchError::config_error(format!(
            "unknown report format '{}'. Use: text, json",
            format
        )));
    }

    let config = build_config(&config_path, url, timeout, insecure, set)?;
    let paths = if paths.is_empty() {
        let fallback = config
            .get(vouch::config::PATH)
            .map(|p| p.to_text())
            .unwrap_or_else(|| ".".to_string());
        vec![PathBuf::from(fallback)]
    } else {
        paths
    };

    let client = UreqClient::from_config(&config);
    let mut runner = Runner::new(client, Arc::new(config));
    if !headers.is_empty() {
        runner = runner.with_hook(Arc::new(DefaultHeaders::new(headers)));
    }

    let report = runner.run_paths(&paths)?;

    if format == "json" {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| VouchError::io_error(format!("failed to serialize report: {}", e)))?;
        println!("{}", json);
    } else {
        println!("{}", report);
    }

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn cmd_check(files: Vec<PathBuf>) -> VouchResult<ExitCode> {
    let files = vouch::discover(&files)?;
    if files.is_empty() {
        eprintln!("No .{} files found", vouch::runner::EXTENSION);
        return Ok(ExitCode::SUCCESS);
    }

    let mut failed = 0;
    for file in &files {
        let source = match read_source(file) {
            Ok(source) => source,
            Err(e) => {
                failed += 1;
                eprintln!("{:?}", miette::Report::new(e));
                continue;
            }
        };
        match vouch::compile(&source, &file.display().to_string()) {
            Ok(class) => {
                eprintln!(
                    "{}: OK ({} test methods)",
                    file.display(),
                    class.test_methods().count()
                );
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}:", file.display());
                eprintln!("{:?}", miette::Report::new(e));
            }
        }
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn cmd_lex(file: PathBuf) -> VouchResult<ExitCode> {
    let source = read_source(&file)?;

    let mut lexer = vouch::Lexer::new(&source);
    let tokens = lexer.tokenize()?;

    println!("Tokens from {}:", file.display());
    println!("{:-<60}", "");

    for token in tokens {
        println!(
            "{:>4}:{:<3}  {:20} {}",
            token.location.line,
            token.location.column,
            token.kind.describe(),
            token.kind
        );
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_parse(file: PathBuf) -> VouchResult<ExitCode> {
    let source = read_source(&file)?;
    let ast = vouch::parse(&source)?;

    println!("AST from {}:", file.display());
    println!("{:-<60}", "");

    if !ast.imports.is_empty() {
        println!("Imports ({}):", ast.imports.len());
        for import in &ast.imports {
            println!("  {}", import);
        }
        println!();
    }

    for method in &ast.methods {
        println!("[{}] {} {}", method.name, method.verb(), method.path());
        if let Some(request) = &method.request {
            for param in &request.params {
                println!("  [param] {:?}", param);
            }
        }
        for entry in &method.entries {
            println!("  {:?}", entry);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_compile(file: PathBuf, format: String) -> VouchResult<ExitCode> {
    let source = read_source(&file)?;
    let class = vouch::compile(&source, &file.display().to_string())?;

    let output = match format.as_str() {
        "json" => serde_json::to_string_pretty(&class)
            .map_err(|e| VouchError::io_error(format!("JSON serialization failed: {}", e)))?,
        "yaml" => serde_yaml::to_string(&class)
            .map_err(|e| VouchError::io_error(format!("YAML serialization failed: {}", e)))?,
        other => {
            return Err(VouchError::config_error(format!(
                "unknown output format '{}'. Use: json, yaml",
                other
            )))
        }
    };
    println!("{}", output.trim_end());

    Ok(ExitCode::SUCCESS)
}
