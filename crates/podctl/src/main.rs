//! podctl — the PodGrid command-line tool.
//!
//! Runs the placement pipeline against JSON fixtures, for dry-running
//! scheduler behavior outside a live cluster:
//!
//! ```text
//! podctl plan --cluster cluster.json --job job.json
//! podctl validate --job job.json --config podgrid.toml
//! ```
//!
//! `cluster.json` is an array of node facts; `job.json` is the job as
//! the orchestration layer would hand it over (labels included).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use podgrid_session::{
    ConfigFile, ExternalJob, SchedulerConfig, SchedulingSession, TaskRef, job_spec_from_external,
    validate_job,
};
use podgrid_state::{ClusterSnapshot, JobRegistry, NodeFacts};

#[derive(Parser)]
#[command(name = "podctl", about = "PodGrid placement CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full placement pipeline and print groups and scores.
    Plan {
        /// JSON file with the offered nodes.
        #[arg(long)]
        cluster: PathBuf,

        /// JSON file with the job spec.
        #[arg(long)]
        job: PathBuf,

        /// Optional TOML scheduler configuration.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Task index to print the score map for.
        #[arg(long, default_value = "0")]
        task_index: u32,
    },
    /// Validate a job spec against the configured topology.
    Validate {
        /// JSON file with the job spec.
        #[arg(long)]
        job: PathBuf,

        /// Optional TOML scheduler configuration.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,podctl=debug,podgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Plan {
            cluster,
            job,
            config,
            task_index,
        } => run_plan(&cluster, &job, config.as_deref(), task_index),
        Command::Validate { job, config } => run_validate(&job, config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SchedulerConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            let file: ConfigFile = toml::from_str(&raw)
                .with_context(|| format!("parse config {}", path.display()))?;
            Ok(file.resolve())
        }
        None => Ok(SchedulerConfig::default()),
    }
}

fn load_cluster(path: &Path) -> anyhow::Result<Vec<NodeFacts>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read cluster fixture {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse cluster fixture {}", path.display()))
}

fn load_job(path: &Path) -> anyhow::Result<ExternalJob> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read job fixture {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse job fixture {}", path.display()))
}

fn run_plan(
    cluster_path: &Path,
    job_path: &Path,
    config_path: Option<&Path>,
    task_index: u32,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let cluster = load_cluster(cluster_path)?;
    let job = job_spec_from_external(&load_job(job_path)?);

    let validation = validate_job(&config, &job);
    if !validation.pass {
        bail!("job rejected ({}): {}", validation.reason, validation.message);
    }

    let candidates: Vec<String> = cluster.iter().map(|n| n.name.clone()).collect();
    let registry = Arc::new(JobRegistry::new());
    let session = SchedulingSession::new(
        config,
        ClusterSnapshot::from_nodes(cluster),
        registry.clone(),
    );

    let task = TaskRef::new(format!("task-{task_index}"), task_index);
    let scores = session.score_nodes(&task, &job, &candidates, None);

    let placement = registry.placement(&job.job_id);
    info!(
        job = %job.job_id,
        ready = ?registry.ready(&job.job_id),
        groups = placement.as_ref().map(|p| p.groups.len()).unwrap_or(0),
        "plan finished"
    );

    // Stable ordering for diff-friendly output.
    let scores: BTreeMap<_, _> = scores.into_iter().collect();
    let output = serde_json::json!({
        "job_id": job.job_id,
        "ready": registry.ready(&job.job_id),
        "placement": placement,
        "task": task.task_name,
        "scores": scores,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    session.close();
    Ok(())
}

fn run_validate(job_path: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let job = job_spec_from_external(&load_job(job_path)?);

    let result = validate_job(&config, &job);
    let output = serde_json::json!({
        "job_id": job.job_id,
        "pass": result.pass,
        "reason": result.reason,
        "message": result.message,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if !result.pass {
        bail!("job rejected ({}): {}", result.reason, result.message);
    }
    Ok(())
}
