//! # procflow CLI
//!
//! Command-line interface for process programs.
//!
//! Usage:
//!   procflow check <program.pf>
//!   procflow seal <program.pf> --run-id <id> [--out manifest.json]
//!   procflow verify <manifest.json>
//!   procflow run <manifest.json> [--adapter echo|messages] [--input name=value]...
//!
//! Examples:
//!   procflow check review.pf
//!   PROCFLOW_SECRET=dev procflow seal review.pf --run-id r1 --out r1.json
//!   PROCFLOW_SECRET=dev procflow run r1.json --input brief="Tighten the intro"

mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use procflow_core::{
    parse, EchoAdapter, FileContentStore, Manifest, MessagesAdapter, Program, RunInputs, SecurityConfig, Stmt,
};
use procflow_runner::{RunReport, Runner, RunnerConfig};
use settings::Settings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "procflow")]
#[command(author, version, about = "procflow - run process programs over agent sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (TOML)
    #[arg(short, long, global = true, env = "PROCFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Shared secret for manifest and event signatures
    #[arg(long, global = true, env = "PROCFLOW_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a program and print its structure
    Check {
        /// Path to the program source
        file: PathBuf,
    },
    /// Build a signed manifest for a program
    Seal {
        /// Path to the program source
        file: PathBuf,

        /// Run id to pin
        #[arg(long)]
        run_id: String,

        /// Write the manifest here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Verify a manifest's hash and signature
    Verify {
        /// Path to the manifest JSON
        manifest: PathBuf,
    },
    /// Verify and run a manifest
    Run {
        /// Path to the manifest JSON
        manifest: PathBuf,

        /// Session backend
        #[arg(short, long, value_enum, default_value = "echo")]
        adapter: AdapterKind,

        /// Input binding, repeatable
        #[arg(short, long = "input", value_name = "NAME=VALUE")]
        inputs: Vec<String>,

        /// Principal the run acts for
        #[arg(long, env = "PROCFLOW_PRINCIPAL")]
        principal: Option<String>,

        /// Collector base URL for events
        #[arg(long, env = "PROCFLOW_COLLECTOR_URL")]
        collector: Option<String>,

        /// Directory for binding contents and memory records
        #[arg(long, env = "PROCFLOW_STORE_DIR")]
        store_dir: Option<PathBuf>,

        /// API key for the messages adapter
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AdapterKind {
    Echo,
    Messages,
}

fn read_program(file: &Path) -> Result<(String, Program)> {
    let source = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let program = parse(&source).with_context(|| format!("{} does not parse", file.display()))?;
    Ok((source, program))
}

fn read_manifest(file: &Path) -> Result<Manifest> {
    let text = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    Ok(Manifest::from_json(&text)?)
}

fn print_outline(stmts: &[Stmt], depth: usize) {
    for stmt in stmts {
        let pad = "  ".repeat(depth);
        match stmt {
            Stmt::Try {
                body,
                catch_body,
                finally_body,
                ..
            } => {
                println!("{}try", pad);
                print_outline(body, depth + 1);
                if let Some(body) = catch_body {
                    println!("{}catch", pad);
                    print_outline(body, depth + 1);
                }
                if let Some(body) = finally_body {
                    println!("{}finally", pad);
                    print_outline(body, depth + 1);
                }
            }
            Stmt::Parallel { policy, branches } => {
                println!("{}parallel ({})", pad, policy.as_str());
                for branch in branches {
                    let name = branch.name.as_deref().unwrap_or("-");
                    println!("{}  [{}] {}", pad, name, branch.stmt.label());
                }
            }
            Stmt::Repeat { count, body } => {
                println!("{}repeat {}", pad, count);
                print_outline(body, depth + 1);
            }
            Stmt::Session(call) | Stmt::Resume(call) => {
                println!("{}{} {} \"{}\"", pad, stmt.label(), call.agent_name(), call.title);
            }
            Stmt::Let { name, .. } | Stmt::Output { name, .. } => {
                println!("{}{} {}", pad, stmt.label(), name);
            }
            Stmt::Comment { .. } => {}
        }
    }
}

fn check(file: &Path, json: bool) -> Result<()> {
    let (_, program) = read_program(file)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&program)?);
        return Ok(());
    }
    println!("{}: ok", file.display());
    for agent in program.agents.values() {
        println!(
            "agent {} (model: {}, persist: {})",
            agent.name,
            agent.model.as_deref().unwrap_or("default"),
            agent.persists()
        );
    }
    print_outline(&program.statements, 0);
    Ok(())
}

fn seal(settings: &Settings, file: &Path, run_id: &str, out: Option<&Path>) -> Result<()> {
    let secret = settings.require_secret()?;
    let (source, _) = read_program(file)?;
    let manifest = Manifest::new(run_id, source).sealed(secret)?;
    let text = manifest.to_json()?;
    match out {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            println!("sealed {} -> {}", run_id, path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn verify(settings: &Settings, file: &Path) -> Result<()> {
    let secret = settings.require_secret()?;
    let manifest = read_manifest(file)?;
    manifest.verify(&SecurityConfig::new(secret))?;
    println!("{}: manifest ok (run {})", file.display(), manifest.run_id);
    Ok(())
}

fn parse_inputs(raw: &[String]) -> Result<RunInputs> {
    let mut inputs = RunInputs::new();
    for item in raw {
        let (name, value) = item
            .split_once('=')
            .with_context(|| format!("input '{}' is not NAME=VALUE", item))?;
        inputs.insert(name.trim().to_string(), value.to_string());
    }
    Ok(inputs)
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("run {}: {:?}", report.run_id, report.status);
    if let Some(error) = &report.error {
        println!("  error: {}", error);
    }
    for output in &report.outputs {
        println!("  output {} -> {}", output.name, output.content_ref);
        println!("    {}", output.preview.replace('\n', "\n    "));
    }
    if let Some(outcome) = &report.outcome {
        println!(
            "  sessions: {} created, {} resumed; tokens: {}",
            outcome.counters.sessions_created,
            outcome.counters.sessions_resumed,
            outcome.usage.total_tokens()
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run(
    mut settings: Settings,
    manifest: &Path,
    adapter: AdapterKind,
    inputs: &[String],
    principal: Option<String>,
    collector: Option<String>,
    store_dir: Option<PathBuf>,
    api_key: Option<String>,
    json: bool,
) -> Result<bool> {
    settings.require_secret()?;
    if let Some(principal) = principal {
        settings.principal_id = principal;
    }
    if collector.is_some() {
        settings.collector_url = collector;
    }
    if let Some(dir) = store_dir {
        settings.store_dir = dir;
    }
    if api_key.is_some() {
        settings.messages.api_key = api_key;
    }

    let manifest = read_manifest(manifest)?;
    let inputs = parse_inputs(inputs)?;
    let store = Arc::new(FileContentStore::new(&settings.store_dir)?);
    let runner = Runner::new(
        RunnerConfig {
            security: settings.security.clone(),
            buffer: settings.buffer.clone(),
            principal_id: settings.principal_id.clone(),
            collector_url: settings.collector_url.clone(),
        },
        store,
    );

    let interrupted = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let report = match adapter {
        AdapterKind::Echo => runner.run_until(EchoAdapter::new(), &manifest, inputs, interrupted).await,
        AdapterKind::Messages => {
            let adapter = MessagesAdapter::new(settings.messages.clone())?;
            runner.run_until(adapter, &manifest, inputs, interrupted).await
        }
    };

    info!(run_id = %report.run_id, status = ?report.status, outputs = report.outputs.len(), "run finished");
    print_report(&report, json)?;
    Ok(report.is_success())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("procflow=info,procflow_core=info,procflow_runner=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    debug!(config = ?cli.config, principal = %settings.principal_id, "settings loaded");
    if let Some(secret) = cli.secret {
        settings.security.shared_secret = secret;
    }

    match cli.command {
        Commands::Check { file } => check(&file, cli.json)?,
        Commands::Seal { file, run_id, out } => seal(&settings, &file, &run_id, out.as_deref())?,
        Commands::Verify { manifest } => verify(&settings, &manifest)?,
        Commands::Run {
            manifest,
            adapter,
            inputs,
            principal,
            collector,
            store_dir,
            api_key,
        } => {
            let ok = run(settings, &manifest, adapter, &inputs, principal, collector, store_dir, api_key, cli.json).await?;
            if !ok {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
