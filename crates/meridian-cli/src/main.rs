use std::path::Path;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use meridian_core::job::JobSubmission;
use meridian_core::job_queue::WorkQueue;
use meridian_core::traits::RecordStore;
use meridian_core::{job_summary, submit_job};
use meridian_db::{Database, DatabaseConfig};
use meridian_server::workers::WorkerOptions;

#[derive(Parser)]
#[command(name = "meridian", version, about = "Map listing harvester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run workers until Ctrl-C
    Work {
        #[command(flatten)]
        options: WorkerOptions,
    },

    /// Submit a job from a JSON file
    Submit {
        /// Path to the job submission (job_id, profile_id, engine, parts)
        file: PathBuf,
    },

    /// Show task counts for a job
    Status {
        job_id: Uuid,
    },

    /// Show how many items wait on each lane
    Queues,

    /// Empty one lane, or every lane
    Clear {
        /// Lane to clear (defaults to all lanes)
        #[arg(long)]
        lane: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("meridian=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db = connect_db().await?;

    match cli.command {
        Commands::Work { options } => cmd_work(&db, &options).await?,
        Commands::Submit { file } => cmd_submit(&db, &file).await?,
        Commands::Status { job_id } => cmd_status(&db, job_id).await?,
        Commands::Queues => cmd_queues(&db).await?,
        Commands::Clear { lane } => cmd_clear(&db, lane.as_deref()).await?,
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db)
}

async fn cmd_work(db: &Database, options: &WorkerOptions) -> Result<()> {
    let pool = options
        .start_pool(db)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown signal received, releasing in-flight tasks");
    pool.shutdown().await;
    Ok(())
}

fn read_submission(path: &Path) -> Result<JobSubmission> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file: {}", path.display()))?;
    serde_json::from_str(&raw).context("Invalid job submission JSON")
}

async fn cmd_submit(db: &Database, path: &Path) -> Result<()> {
    let submission = read_submission(path)?;
    let job = submit_job(&db.work_queue(), &db.record_store(), submission)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!(
        "Job {} accepted: {} task(s) on {}",
        job.id,
        job.tasks.len(),
        job.engine.lane()
    );
    Ok(())
}

async fn cmd_status(db: &Database, job_id: Uuid) -> Result<()> {
    let store = db.record_store();
    let summary = job_summary(&store, job_id)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    if summary.total == 0 {
        anyhow::bail!("Job {job_id} not found");
    }
    let status = store
        .get_job_status(job_id)
        .await
        .map_err(|e| anyhow::anyhow!(e))?
        .unwrap_or_else(|| summary.status());
    let records = store
        .count_records(job_id)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!("Job {job_id}: {status}");
    println!(
        "  tasks: {} total, {} pending, {} ongoing, {} done, {} failed",
        summary.total, summary.pending, summary.ongoing, summary.done, summary.failed
    );
    println!("  records: {records}");
    Ok(())
}

async fn cmd_queues(db: &Database) -> Result<()> {
    let lengths = db
        .work_queue()
        .lane_lengths()
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    for (lane, length) in &lengths {
        println!("  {lane:<14} {length}");
    }
    println!("\nTotal: {} item(s)", lengths.values().sum::<u64>());
    Ok(())
}

async fn cmd_clear(db: &Database, lane: Option<&str>) -> Result<()> {
    let queue = db.work_queue();
    let cleared = match lane {
        Some(lane) => queue.clear(lane).await,
        None => queue.clear_all().await,
    }
    .map_err(|e| anyhow::anyhow!(e))?;

    println!("Cleared {cleared} item(s)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_file_uses_flat_parts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(
            &path,
            r#"{
                "job_id": "6f2c1c3e-8f59-4c55-9a8e-6c4f7d0c9b11",
                "profile_id": "0b7f6a52-3d7e-4f0e-8a55-1f1f3e4a2c22",
                "engine": "hybrid",
                "parts": [
                    {"part_id": "a3c1e2d4-5b6f-4a7e-9c8d-0e1f2a3b4c55",
                     "keyword": "plumber", "postcode": "10001",
                     "city": "New York", "state": "NY", "country": "USA"}
                ]
            }"#,
        )
        .unwrap();

        let submission = read_submission(&path).unwrap();
        assert_eq!(submission.engine, "hybrid");
        assert_eq!(submission.parts[0].search.query(), "plumber in 10001 NY");
    }

    #[test]
    fn missing_submission_file_is_an_error() {
        let err = read_submission(Path::new("/nonexistent/job.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read job file"));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["meridian", "clear", "--lane", "maps_tile"]).unwrap();
        assert!(matches!(cli.command, Commands::Clear { lane: Some(ref l) } if l == "maps_tile"));

        let cli = Cli::try_parse_from(["meridian", "work", "--workers", "2"]).unwrap();
        assert!(matches!(cli.command, Commands::Work { ref options } if options.workers == 2));
    }
}
