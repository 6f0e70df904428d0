//! KataBuilder - CLI entry point
//!
//! Drives sessions through extract, plan, build and package.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use futures::StreamExt;
use tracing::{debug, info, warn};

use katabuilder::builder::{BuildOptions, Pipeline, Stage};
use katabuilder::cli::{Cli, Command};
use katabuilder::config::Config;
use katabuilder::domain::Plan;
use katabuilder::extract::{LlmExtractor, read_documents_from_directory};
use katabuilder::generation::UnitGenerator;
use katabuilder::llm::{Reasoner, create_client};
use katabuilder::package::ZipPackager;
use katabuilder::planning::Planner;
use katabuilder::prompts::PromptLoader;
use katabuilder::session::{FileSessionStore, SessionManager};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("katabuilder")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("kb.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    info!(
        "KataBuilder {} loaded config: provider={}, model={}",
        env!("CARGO_PKG_VERSION"),
        config.llm.provider,
        config.llm.model
    );

    let store = Arc::new(FileSessionStore::open(&config.storage.sessions_file));
    let sessions = SessionManager::new(store, &config.storage.output_dir);

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Init { dirs: doc_dirs, tasks } => cmd_init(&config, &sessions, &doc_dirs, tasks).await,
        Command::Plan { session, feedback } => cmd_plan(&config, &sessions, &session, feedback.as_deref()).await,
        Command::Build { session } => cmd_build(&config, &sessions, &session).await,
        Command::Show { session } => cmd_show(&sessions, &session),
        Command::Output { session } => cmd_output(&sessions, &session),
        Command::Sessions => cmd_sessions(&sessions),
    }
}

/// Wire the model-backed collaborators from configuration
fn build_pipeline(config: &Config, task_count: Option<usize>) -> Result<Pipeline> {
    config.validate()?;
    let client = create_client(&config.llm).context("Failed to create LLM client")?;
    let reasoner = Arc::new(Reasoner::new(client, config.llm.max_tokens));
    let prompts = Arc::new(PromptLoader::new(config.prompts.dir.clone()));

    let task_count = task_count.unwrap_or(config.generation.task_count);
    if task_count == 0 {
        return Err(eyre::eyre!("--tasks must be at least 1"));
    }

    Ok(Pipeline {
        extractor: Arc::new(LlmExtractor::new(reasoner.clone(), prompts.clone())),
        planner: Arc::new(Planner::new(reasoner.clone(), prompts.clone(), task_count)),
        generator: Arc::new(UnitGenerator::new(
            reasoner,
            prompts,
            config.generation.unit_timeout(),
        )),
        options: BuildOptions {
            max_concurrent: config.generation.max_concurrent,
            build_timeout: config.generation.build_timeout(),
        },
    })
}

async fn cmd_init(config: &Config, sessions: &SessionManager, doc_dirs: &[PathBuf], tasks: Option<usize>) -> Result<()> {
    debug!(?doc_dirs, ?tasks, "cmd_init: called");
    let pipeline = build_pipeline(config, tasks)?;

    let documents: Vec<String> = doc_dirs.iter().flat_map(|d| read_documents_from_directory(d)).collect();
    info!(documents = documents.len(), "Read documents");

    let mut builder = sessions.create(documents, pipeline)?;
    println!("{} Session: {}", "✓".green(), builder.id().cyan());

    let profile = builder.parse().await?;
    println!("{} Profile: {} ({})", "✓".green(), profile.title.bold(), profile.stack.join(", "));

    let plan = builder.plan(None).await?;
    print_plan(plan);
    Ok(())
}

async fn cmd_plan(config: &Config, sessions: &SessionManager, id: &str, feedback: Option<&str>) -> Result<()> {
    debug!(%id, has_feedback = feedback.is_some(), "cmd_plan: called");
    let mut builder = sessions.load(id, build_pipeline(config, None)?)?;
    let plan = builder.plan(feedback).await?;
    print_plan(plan);
    Ok(())
}

async fn cmd_build(config: &Config, sessions: &SessionManager, id: &str) -> Result<()> {
    debug!(%id, "cmd_build: called");
    let mut builder = sessions.load(id, build_pipeline(config, None)?)?;
    let mut run = builder.build()?;

    let cancel = run.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling build");
            cancel.cancel();
        }
    });

    let mut stdout = std::io::stdout().lock();
    while let Some(event) = run.next().await {
        writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
        stdout.flush()?;
    }
    drop(stdout);

    let summary = builder.finish(run).await?.clone();
    if builder.stage() != Stage::Built {
        return Err(eyre::eyre!(
            "Build cancelled after {} of {} tasks; run `kb build {}` again",
            summary.complete + summary.degraded,
            summary.units,
            id
        ));
    }

    let path = builder.package(&ZipPackager::new())?;
    println!(
        "{}",
        serde_json::json!({"type": "complete", "download": path.display().to_string()})
    );
    Ok(())
}

fn cmd_show(sessions: &SessionManager, id: &str) -> Result<()> {
    debug!(%id, "cmd_show: called");
    let record = sessions.record(id)?;

    println!("{} {}", "Session:".bold(), id.cyan());
    println!("{} {}", "Stage:".bold(), record.stage());
    println!("{} {}", "Output:".bold(), record.output_dir.display());
    if let Some(updated) = record.updated_at {
        println!("{} {}", "Updated:".bold(), updated.to_rfc3339());
    }

    if let Some(profile) = &record.profile {
        println!();
        println!("{} {}", "Role:".bold(), profile.title);
        if !profile.industry.is_empty() {
            println!("{} {}", "Industry:".bold(), profile.industry);
        }
        println!("{} {}", "Stack:".bold(), profile.stack.join(", "));
        if let Some(candidate) = &profile.candidate {
            println!(
                "{} {} ({:?}, {} yrs)",
                "Candidate:".bold(),
                candidate.name,
                candidate.level,
                candidate.experience_yrs
            );
        }
    }
    if let Some(plan) = &record.plan {
        print_plan(plan);
    }
    Ok(())
}

fn cmd_output(sessions: &SessionManager, id: &str) -> Result<()> {
    debug!(%id, "cmd_output: called");
    let path = sessions.artifact_path(id)?;
    println!("{}", path.display());
    Ok(())
}

fn cmd_sessions(sessions: &SessionManager) -> Result<()> {
    debug!("cmd_sessions: called");
    let ids = sessions.ids()?;
    if ids.is_empty() {
        println!("No sessions");
        return Ok(());
    }
    for id in ids {
        let stage = sessions.record(&id).map(|r| r.stage()).unwrap_or(Stage::Init);
        println!("{}  {}", id.cyan(), stage);
    }
    Ok(())
}

fn print_plan(plan: &Plan) {
    println!();
    println!("{} {}", "Plan:".bold(), plan.title.green());
    if !plan.description.is_empty() {
        println!("{}", plan.description);
    }
    for (i, unit) in plan.units.iter().enumerate() {
        println!("  {}. {} {}", i + 1, unit.name.bold(), format!("[{}]", unit.id).dimmed());
        if !unit.description.is_empty() {
            println!("     {}", unit.description);
        }
    }
}
