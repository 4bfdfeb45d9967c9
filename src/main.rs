use std::io::IsTerminal;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use conclave_core::{AuditDepth, AuditRequest, ConclaveConfig};
use conclave_engine::{AuditEngine, ReportFormat};

#[derive(Parser)]
#[command(
    name = "conclave",
    version,
    about = "Multi-reviewer consensus engine for AI security audits",
    long_about = "Conclave fans a security audit out to several independent AI reviewers and\n\
                   fuses their findings into one ranked, deduplicated result with a defensible\n\
                   consensus score. One model shouldn't have the last word.\n\n\
                   Examples:\n  \
                     conclave audit --project api --input src/handler.ts   Audit one file\n  \
                     cat src/db.ts | conclave audit --project api          Audit from stdin\n  \
                     conclave audit --project api --input f.ts --report out.html --report-format html\n  \
                     conclave mcp                                          Serve audit tools over MCP\n  \
                     conclave doctor                                       Check setup and configuration"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .conclave.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: CliFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliFormat {
    /// Human-readable summary
    Text,
    /// Machine-readable JSON with camelCase keys
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run a consensus security audit over a codebase
    Audit {
        /// Project id the codebase belongs to
        #[arg(long)]
        project: String,

        /// File to read the codebase from (default: stdin)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Logical target names covered by the input (repeatable)
        #[arg(long = "target")]
        targets: Vec<String>,

        /// Primary language of the codebase
        #[arg(long)]
        language: Option<String>,

        /// Audit depth: quick, standard, or deep
        #[arg(long, default_value = "standard")]
        depth: AuditDepth,

        /// Focus areas to emphasize (repeatable)
        #[arg(long = "focus")]
        focus_areas: Vec<String>,

        /// Skip the consensus merge and return raw reviewer findings
        #[arg(long)]
        no_consensus: bool,

        /// Write a session report to this path after the audit
        #[arg(long)]
        report: Option<PathBuf>,

        /// Report format: json, html, or pdf
        #[arg(long, default_value = "json")]
        report_format: ReportFormat,
    },
    /// Check configuration and provider setup
    Doctor,
    /// Create a .conclave.toml with default configuration
    Init,
    /// Start the MCP server on stdio
    Mcp,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

const DEFAULT_CONFIG: &str = r#"# Conclave configuration
# All keys are optional; these are the defaults.

[engine]
# Reviewer models to fan out to
models = ["gpt-4o", "claude-sonnet-4", "deepseek-v3"]
# Drop consensus findings below this score from results
confidence_threshold = 0.4
# Attempts per reviewer call, including the first
max_retries = 3
# Base backoff delay in milliseconds (doubles per attempt)
retry_delay_ms = 500
# Serve repeated requests from the result cache
enable_caching = true
# Cache entry time-to-live in milliseconds
cache_ttl_ms = 3600000
# Degrade to the offline signature scanner when a provider is exhausted
enable_fallback = true
# Whole-audit time budget in milliseconds
audit_timeout_ms = 120000
# Escalate retained findings to a human review queue
enable_hitl = false

# Outbound call rate limiting (absent = disabled)
# [rate_limit]
# requests = 20
# window_ms = 60000

[reviewers]
# Weight for reviewers without an explicit entry
default_weight = 0.5

# Per-reviewer reliability weights in (0, 1]
# [reviewers.weights]
# "gpt-4o" = 0.9
# "claude-sonnet-4" = 0.8

# Model provider connection (absent = offline fallback only)
# [provider]
# base_url = "https://models.internal.example"
# api_key = "sk-..."
# request_timeout_ms = 30000
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => ConclaveConfig::from_file(path).into_diagnostic()?,
        None => {
            let default_path = std::path::Path::new(".conclave.toml");
            if default_path.exists() {
                ConclaveConfig::from_file(default_path).into_diagnostic()?
            } else {
                ConclaveConfig::default()
            }
        }
    };

    match cli.command {
        None => {
            Cli::command().print_help().into_diagnostic()?;
            Ok(())
        }
        Some(Command::Audit {
            project,
            input,
            targets,
            language,
            depth,
            focus_areas,
            no_consensus,
            report,
            report_format,
        }) => {
            let codebase = read_codebase(&input)?;
            let mut request = AuditRequest::new(project, codebase);
            request.targets = targets;
            request.language = language;
            request.options.depth = depth;
            request.options.focus_areas = focus_areas;
            request.options.enable_consensus = !no_consensus;

            run_audit(config, request, cli.format, report, report_format).await
        }
        Some(Command::Doctor) => {
            run_doctor(&config);
            Ok(())
        }
        Some(Command::Init) => {
            let path = std::path::Path::new(".conclave.toml");
            if path.exists() {
                miette::bail!(".conclave.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .conclave.toml with default configuration");
            Ok(())
        }
        Some(Command::Mcp) => {
            let engine = Arc::new(AuditEngine::new(config).into_diagnostic()?);
            let _sweeper = engine.spawn_cache_sweeper(std::time::Duration::from_secs(60));
            conclave_mcp::server::run_server(engine)
                .await
                .into_diagnostic()?;
            Ok(())
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "conclave", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_directive = if verbose {
        "conclave=debug"
    } else {
        "conclave=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_codebase(input: &Option<PathBuf>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path).into_diagnostic(),
        None => {
            if std::io::stdin().is_terminal() {
                miette::bail!(
                    "No input provided. Pass --input <file> or pipe the codebase on stdin."
                );
            }
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .into_diagnostic()?;
            Ok(buffer)
        }
    }
}

async fn run_audit(
    config: ConclaveConfig,
    request: AuditRequest,
    format: CliFormat,
    report_path: Option<PathBuf>,
    report_format: ReportFormat,
) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = AuditEngine::new(config)
        .into_diagnostic()?
        .with_progress(tx);

    let spinner = if std::io::stderr().is_terminal() {
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_style(
            indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
                .expect("spinner template"),
        );
        pb.set_message("Starting audit...");
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let spinner_feed = spinner.clone();
    let progress_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(pb) = &spinner_feed {
                pb.set_message(format!("[{:>3}%] {}", event.percent, event.detail));
            }
        }
    });

    let result = engine.audit(request).await;
    progress_task.abort();

    let audit_report = match result {
        Ok(report) => {
            if let Some(pb) = spinner {
                pb.finish_with_message("Done");
            }
            report
        }
        Err(error) => {
            if let Some(pb) = spinner {
                pb.finish_with_message("Failed");
            }
            return Err(miette::miette!("{error}"));
        }
    };

    match format {
        CliFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&audit_report).into_diagnostic()?
            );
        }
        CliFormat::Text => {
            print!("{audit_report}");
            println!("Session: {}", audit_report.session_id);
        }
    }

    if let Some(path) = report_path {
        let exported = engine
            .export_report(&audit_report.session_id, report_format)
            .into_diagnostic()?;
        std::fs::write(&path, exported.content).into_diagnostic()?;
        eprintln!("Report written to {}", path.display());
    }

    Ok(())
}

fn run_doctor(config: &ConclaveConfig) {
    println!("Conclave doctor");
    println!("===============");
    println!("Reviewers configured: {}", config.engine.models.len());
    for model in &config.engine.models {
        let weight = config
            .reviewers
            .weights
            .get(model)
            .copied()
            .unwrap_or(config.reviewers.default_weight);
        println!("  {model} (weight {weight})");
    }
    match &config.provider.base_url {
        Some(url) => println!("Provider: {url}"),
        None => println!(
            "Provider: none configured, audits use the offline fallback scanner{}",
            if config.engine.enable_fallback {
                ""
            } else {
                " (disabled: audits will fail)"
            }
        ),
    }
    match &config.rate_limit {
        Some(limit) => println!(
            "Rate limit: {} requests / {}ms",
            limit.requests, limit.window_ms
        ),
        None => println!("Rate limit: disabled"),
    }
    println!(
        "Caching: {} (ttl {}ms)",
        if config.engine.enable_caching {
            "enabled"
        } else {
            "disabled"
        },
        config.engine.cache_ttl_ms
    );
    println!(
        "Consensus threshold: {}",
        config.engine.confidence_threshold
    );
}
