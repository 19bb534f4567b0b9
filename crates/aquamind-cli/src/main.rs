use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

mod live;
mod projections;
mod recompute;

/// AquaMind growth engine - scheduled jobs and operational tooling
#[derive(Parser)]
#[command(name = "aquamind")]
#[command(about = "AquaMind growth assimilation and projection jobs", long_about = None)]
struct Cli {
    /// Database path (default: $AQUAMIND_DB_PATH or data/aquamind.db)
    #[arg(long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue batch-level recomputes over a recent window for all active
    /// batches with a scenario
    RecomputeRecentDailyStates {
        /// Restrict to one batch
        #[arg(long)]
        batch_id: Option<i64>,
        /// Lookback window in days
        #[arg(long, default_value_t = 7)]
        days: u64,
        /// Enumerate without enqueueing
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-run stored scenario projections
    RegenerateProjections {
        /// Regenerate every scenario
        #[arg(long, conflicts_with = "scenario")]
        all: bool,
        /// Scenario id to regenerate
        #[arg(long)]
        scenario: Option<i64>,
        /// Validate without saving
        #[arg(long)]
        dry_run: bool,
    },
    /// Compute a live forward projection for an assignment
    LiveForward {
        /// Assignment id
        #[arg(long)]
        assignment: i64,
        /// Run-as-of date (default: today)
        #[arg(long)]
        computed_date: Option<NaiveDate>,
    },
}

fn db_path(cli: &Cli) -> String {
    cli.db
        .clone()
        .or_else(|| std::env::var("AQUAMIND_DB_PATH").ok())
        .unwrap_or_else(|| "data/aquamind.db".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let db = db_path(&cli);

    match cli.command {
        Commands::RecomputeRecentDailyStates {
            batch_id,
            days,
            dry_run,
        } => recompute::recent_daily_states(&db, batch_id, days, dry_run).await,
        Commands::RegenerateProjections {
            all,
            scenario,
            dry_run,
        } => projections::regenerate(&db, all, scenario, dry_run).await,
        Commands::LiveForward {
            assignment,
            computed_date,
        } => live::forward(&db, assignment, computed_date).await,
    }
}
