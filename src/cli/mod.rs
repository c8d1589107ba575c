mod config;

pub use config::{CapabilityCommandConfig, IdeaflowConfig};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::coordinator::{Coordinator, Interaction, TerminalInteraction};
use crate::engine::WorkflowSession;
use crate::engine::types::Metadata;
use crate::recorder::journal::JournalRecorder;
use crate::recorder::{NullRecorder, ProjectRecorder};
use crate::storage::CheckpointStore;
use crate::storage::json_store::JsonCheckpointStore;
use crate::triggers::{TriggerContext, TriggerEngine};

#[derive(Parser)]
#[command(
    name = "ideaflow",
    version,
    about = "Resumable idea-validation workflows with rule-based sub-agent triggers"
)]
pub struct Cli {
    /// Path to a .env file to load (default: auto-detect .env in cwd)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    /// Path to ideaflow.yaml (default: auto-detect in cwd)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project whose workflow to operate on
    #[arg(short, long, global = true, default_value = "default", env = "IDEAFLOW_PROJECT")]
    project: String,

    /// Session id (default: session of the latest checkpoint, or a new one)
    #[arg(short, long, global = true, env = "IDEAFLOW_SESSION")]
    session: Option<String>,

    /// Checkpoint root directory
    #[arg(long, global = true, env = "IDEAFLOW_CHECKPOINT_DIR")]
    checkpoint_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show workflow progress and detect an interrupted step
    Status,

    /// List checkpoints, newest first
    List {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Print a checkpoint (default: latest)
    Show {
        checkpoint_id: Option<String>,
    },

    /// Delete a checkpoint by id
    Delete {
        checkpoint_id: String,
    },

    /// Delete all but the most recent checkpoints
    Prune {
        /// Number of checkpoints to keep (default: keep_checkpoints from config, else 10)
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Mark a step as started
    Start {
        step: String,
    },

    /// Save a collected field (JSON value, or plain text)
    Set {
        field: String,
        value: String,

        /// Step the field belongs to
        #[arg(long)]
        step: Option<String>,
    },

    /// Mark a step as completed
    Complete {
        step: String,

        /// Score between 0 and 1
        #[arg(long)]
        score: f64,

        #[arg(long)]
        summary: Option<String>,
    },

    /// Write a manual checkpoint
    Checkpoint {
        /// Note stored in the checkpoint metadata
        #[arg(long)]
        note: Option<String>,
    },

    /// Resume the session from a specific checkpoint and save it as the new latest
    Resume {
        checkpoint_id: String,
    },

    /// Clear workflow progress (earlier checkpoints are kept)
    Reset,

    /// Evaluate trigger rules for a context without running anything
    Evaluate {
        /// Trigger context as JSON string
        #[arg(short, long)]
        context: Option<String>,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Evaluate trigger rules and execute the triggered capabilities
    Run {
        /// Trigger context as JSON string
        #[arg(short, long)]
        context: Option<String>,

        /// Approve interactive capabilities without prompting
        #[arg(short, long)]
        yes: bool,
    },

    /// List configured capabilities
    Capabilities,
}

/// Everything a command needs, resolved from flags, env and config.
struct Runtime {
    config: IdeaflowConfig,
    project: String,
    session: Option<String>,
    store: Arc<dyn CheckpointStore>,
    recorder: Arc<dyn ProjectRecorder>,
}

impl Runtime {
    fn new(cli: &Cli) -> Result<Self> {
        let config = IdeaflowConfig::load(cli.config.as_deref())?;

        let checkpoint_dir = cli
            .checkpoint_dir
            .clone()
            .or_else(|| config.checkpoint_dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("data/checkpoints"));

        let recorder: Arc<dyn ProjectRecorder> = match &config.journal {
            Some(path) => Arc::new(JournalRecorder::new(path)),
            None => Arc::new(NullRecorder),
        };

        Ok(Self {
            store: Arc::new(JsonCheckpointStore::new(&checkpoint_dir, &cli.project)),
            project: cli.project.clone(),
            session: cli.session.clone(),
            config,
            recorder,
        })
    }

    /// Explicit session, else the latest checkpoint's, else a fresh one.
    async fn session_id(&self) -> Result<String> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }
        if let Some(latest) = self.store.load(None).await? {
            return Ok(latest.checkpoint.session_id);
        }
        let session = uuid::Uuid::new_v4().to_string();
        info!(session = %session, "Starting new session");
        Ok(session)
    }

    async fn open_session(&self) -> Result<WorkflowSession> {
        let session_id = self.session_id().await?;
        let mut session =
            WorkflowSession::open(self.store.clone(), self.recorder.clone(), &session_id)
                .await?
                .with_auto_save(self.config.auto_save.unwrap_or(true));
        if let Some(definition) = &self.config.workflow {
            session = session.with_definition(definition.clone());
        }
        Ok(session)
    }

    /// Apply configured retention after a mutation.
    async fn apply_retention(&self) -> Result<()> {
        if let Some(keep) = self.config.keep_checkpoints {
            let removed = self.store.cleanup_old_checkpoints(keep).await?;
            if removed > 0 {
                info!(removed, keep, "Applied checkpoint retention");
            }
        }
        Ok(())
    }

    fn trigger_engine(&self) -> TriggerEngine {
        TriggerEngine::from_path(self.config.trigger_config.as_deref().map(Path::new))
    }
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file
    load_dotenv(cli.dotenv.as_deref());

    let rt = Runtime::new(&cli)?;

    match cli.command {
        Commands::Status => cmd_status(&rt).await,
        Commands::List { format } => cmd_list(&rt, &format).await,
        Commands::Show { checkpoint_id } => cmd_show(&rt, checkpoint_id.as_deref()).await,
        Commands::Delete { checkpoint_id } => cmd_delete(&rt, &checkpoint_id).await,
        Commands::Prune { keep } => cmd_prune(&rt, keep).await,
        Commands::Start { step } => {
            let mut session = rt.open_session().await?;
            let id = session.start_step(&step).await?;
            println!("Started '{}' (checkpoint {})", step, id);
            rt.apply_retention().await
        }
        Commands::Set { field, value, step } => {
            let mut session = rt.open_session().await?;
            let parsed = serde_json::from_str(&value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            match session.save_field(&field, parsed, step.as_deref()).await? {
                Some(id) => println!("Saved '{}' (checkpoint {})", field, id),
                None => println!("Saved '{}' (auto-save off, not persisted)", field),
            }
            rt.apply_retention().await
        }
        Commands::Complete {
            step,
            score,
            summary,
        } => {
            let mut session = rt.open_session().await?;
            let id = session.complete_step(&step, score, summary.as_deref()).await?;
            println!("Completed '{}' (checkpoint {})", step, id);
            rt.apply_retention().await
        }
        Commands::Checkpoint { note } => {
            let mut session = rt.open_session().await?;
            let mut metadata = Metadata::new();
            if let Some(note) = note {
                metadata.insert("note".to_string(), serde_json::Value::String(note));
            }
            let id = session.checkpoint(metadata).await?;
            println!("Checkpoint {}", id);
            rt.apply_retention().await
        }
        Commands::Resume { checkpoint_id } => cmd_resume(&rt, &checkpoint_id).await,
        Commands::Reset => {
            let mut session = rt.open_session().await?;
            let id = session.reset().await?;
            println!("Workflow reset (checkpoint {})", id);
            rt.apply_retention().await
        }
        Commands::Evaluate { context, format } => cmd_evaluate(&rt, context, &format),
        Commands::Run { context, yes } => cmd_run(&rt, context, yes).await,
        Commands::Capabilities => cmd_capabilities(&rt),
    }
}

/// Populate the environment from `path`, or from a `.env` found above the working directory.
/// Only a missing implicit `.env` is silent; other failures are logged and skipped.
fn load_dotenv(path: Option<&Path>) {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match loaded {
        Ok(file) => info!(file = %file.display(), "Loaded environment file"),
        Err(dotenvy::Error::Io(e)) if path.is_none() && e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, "Skipping environment file"),
    }
}

fn parse_context(context_json: Option<String>) -> Result<TriggerContext> {
    match context_json {
        Some(json) => serde_json::from_str(&json).with_context(|| "Failed to parse --context JSON"),
        None => Ok(TriggerContext::default()),
    }
}

async fn cmd_status(rt: &Runtime) -> Result<()> {
    if let Some(incomplete) = rt.store.detect_incomplete_session().await? {
        println!(
            "Interrupted step: '{}' (checkpoint {}, {})",
            incomplete.step,
            incomplete.checkpoint_id,
            incomplete.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!(
            "Resume with: ideaflow --project {} start {}\n",
            rt.project, incomplete.step
        );
    }

    let session = rt.open_session().await?;
    let summary = session.export_summary();

    println!("Project:  {}", summary.project_id);
    println!("Session:  {}", summary.session_id);
    println!("Progress: {:.0}%", summary.progress);
    println!(
        "Current:  {}",
        summary.current_step.as_deref().unwrap_or("-")
    );
    if let Some(next) = &summary.next_step {
        println!("Next:     {}", next);
    }
    if let Some(avg) = summary.average_score {
        println!("Average score: {:.2}", avg);
    }

    if !summary.completed_steps.is_empty() {
        println!("\nCompleted steps:");
        for step in &summary.completed_steps {
            let score = summary
                .step_scores
                .get(step)
                .map(|s| format!("{:.2}", s.score))
                .unwrap_or_else(|| "-".to_string());
            println!("  ✓ {} ({})", step, score);
        }
    }

    if !summary.data.is_empty() {
        println!("\nCollected data:");
        println!("{}", serde_json::to_string_pretty(&summary.data)?);
    }

    Ok(())
}

async fn cmd_list(rt: &Runtime, format: &str) -> Result<()> {
    let checkpoints = rt.store.list().await?;

    if checkpoints.is_empty() {
        println!("No checkpoints found.");
        return Ok(());
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&checkpoints)?);
        return Ok(());
    }

    // Table format
    println!(
        "{:<22} {:<14} {:<28} {:<20} {:>5}",
        "CHECKPOINT", "TYPE", "CREATED", "CURRENT STEP", "DONE"
    );
    println!("{}", "-".repeat(93));

    for cp in &checkpoints {
        println!(
            "{:<22} {:<14} {:<28} {:<20} {:>5}",
            cp.checkpoint_id,
            cp.checkpoint_type,
            cp.created_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            cp.current_step.as_deref().unwrap_or("-"),
            cp.completed_steps
        );
    }

    println!("\nTotal: {} checkpoint(s)", checkpoints.len());
    Ok(())
}

async fn cmd_show(rt: &Runtime, checkpoint_id: Option<&str>) -> Result<()> {
    let loaded = rt
        .store
        .load(checkpoint_id)
        .await?
        .with_context(|| match checkpoint_id {
            Some(id) => format!("Checkpoint '{}' not found", id),
            None => format!("No checkpoints for project '{}'", rt.project),
        })?;

    if loaded.version_mismatch {
        eprintln!(
            "Warning: checkpoint uses schema version {}",
            loaded.checkpoint.version
        );
    }
    println!("{}", serde_json::to_string_pretty(&loaded.checkpoint)?);
    Ok(())
}

async fn cmd_delete(rt: &Runtime, checkpoint_id: &str) -> Result<()> {
    if rt.store.delete_checkpoint(checkpoint_id).await? {
        println!("Deleted {}", checkpoint_id);
        Ok(())
    } else {
        anyhow::bail!("Checkpoint '{}' not found", checkpoint_id)
    }
}

async fn cmd_prune(rt: &Runtime, keep: Option<usize>) -> Result<()> {
    let keep = keep.or(rt.config.keep_checkpoints).unwrap_or(10);
    let removed = rt.store.cleanup_old_checkpoints(keep).await?;
    println!("Removed {} checkpoint(s), kept at most {}", removed, keep);
    Ok(())
}

async fn cmd_resume(rt: &Runtime, checkpoint_id: &str) -> Result<()> {
    let mut session = rt.open_session().await?;
    if !session.resume_from(checkpoint_id).await? {
        anyhow::bail!("Checkpoint '{}' not found", checkpoint_id);
    }

    let mut metadata = Metadata::new();
    metadata.insert(
        "resumed_from".to_string(),
        serde_json::Value::String(checkpoint_id.to_string()),
    );
    let id = session.checkpoint(metadata).await?;
    println!("Resumed from {} (new checkpoint {})", checkpoint_id, id);
    rt.apply_retention().await
}

fn cmd_evaluate(rt: &Runtime, context_json: Option<String>, format: &str) -> Result<()> {
    let ctx = parse_context(context_json)?;
    let mut engine = rt.trigger_engine();
    let decisions = engine.evaluate_all(&ctx);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&decisions)?);
        return Ok(());
    }

    println!("{:<20} {:<8} {:>6}  REASON", "CAPABILITY", "TRIGGER", "CONF");
    println!("{}", "-".repeat(80));
    for decision in decisions.values() {
        println!(
            "{:<20} {:<8} {:>6.2}  {}",
            decision.capability_name,
            if decision.should_trigger { "yes" } else { "no" },
            decision.confidence,
            decision.reason
        );
    }
    Ok(())
}

async fn cmd_run(rt: &Runtime, context_json: Option<String>, yes: bool) -> Result<()> {
    let ctx = parse_context(context_json)?;
    let mut engine = rt.trigger_engine();
    let decisions = engine.evaluate_all(&ctx);

    if !decisions.values().any(|d| d.should_trigger) {
        println!("No capabilities triggered.");
        return Ok(());
    }

    let interaction: Arc<dyn Interaction> = if yes {
        Arc::new(TerminalInteraction::assume_yes())
    } else {
        Arc::new(TerminalInteraction::new())
    };

    let session_id = rt.session_id().await?;
    let mut coordinator = Coordinator::new(
        &rt.project,
        &session_id,
        rt.config.build_registry(),
        interaction,
        rt.recorder.clone(),
    );
    for (name, template) in rt.config.plan_templates() {
        coordinator = coordinator.with_plan_template(&name, &template);
    }

    let results = coordinator.execute_triggered(&decisions, &ctx).await;

    println!("\nResults:");
    for result in &results {
        let icon = if result.skipped {
            "⊘"
        } else if result.success {
            "✓"
        } else {
            "✗"
        };
        println!(
            "  {} {} [{}] {:.2}s",
            icon, result.capability_name, result.mode, result.duration_seconds
        );
        if let Some(summary) = &result.summary {
            println!("    {}", summary);
        }
        if let Some(err) = &result.error {
            println!("    Error: {}", err);
        }
    }

    let failed = results.iter().filter(|r| !r.success && !r.skipped).count();
    if failed > 0 {
        anyhow::bail!("{} capability run(s) failed", failed);
    }
    Ok(())
}

fn cmd_capabilities(rt: &Runtime) -> Result<()> {
    let registry = rt.config.build_registry();
    let entries = registry.list();

    if entries.is_empty() {
        println!("No capabilities configured. Add a `capabilities:` section to ideaflow.yaml.");
        return Ok(());
    }

    println!("{:<20} {:<12} DESCRIPTION", "CAPABILITY", "MODE");
    println!("{}", "-".repeat(70));
    for (name, description) in &entries {
        println!(
            "{:<20} {:<12} {}",
            name,
            crate::coordinator::execution_mode(name),
            description
        );
    }

    println!("\nTotal: {} capability(ies)", entries.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_file_populates_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ideaflow.env");
        std::fs::write(&path, "IDEAFLOW_DOTENV_SMOKE=loaded\n").unwrap();

        load_dotenv(Some(&path));
        assert_eq!(std::env::var("IDEAFLOW_DOTENV_SMOKE").as_deref(), Ok("loaded"));

        // a missing explicit file is reported, not fatal
        load_dotenv(Some(&dir.path().join("absent.env")));
    }
}
