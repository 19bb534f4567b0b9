use anyhow::Result;
use aquamind_api::AppContext;
use aquamind_core::services::{recompute_recent, RecomputeTask};
use chrono::Utc;
use colored::*;
use std::sync::Arc;

/// Fleet-wide catch-up: batch windows over the last `days` days.
pub async fn recent_daily_states(
    db: &str,
    batch_id: Option<i64>,
    days: u64,
    dry_run: bool,
) -> Result<()> {
    let ctx = AppContext::init(db).await?;
    let today = Utc::now().date_naive();

    println!(
        "{}",
        format!("Recomputing daily states over the last {} days", days)
            .bright_cyan()
            .bold()
    );
    if dry_run {
        println!("   {}", "dry run - nothing will be enqueued".dimmed());
    }
    println!();

    let outcome = recompute_recent(
        Arc::clone(&ctx.batches),
        Arc::clone(&ctx.queue),
        ctx.dedup.clone(),
        batch_id,
        days,
        dry_run,
        today,
    )
    .await?;

    for task in &outcome.tasks {
        if let RecomputeTask::BatchWindow { batch_id, start, end } = task {
            println!("   batch {:>5}  {} .. {}", batch_id, start, end);
        }
    }
    println!();
    println!(
        "{} {} batches seen, {} enqueued, {} skipped (no scenario)",
        "Done:".bright_green().bold(),
        outcome.batches_seen,
        outcome.enqueued,
        outcome.skipped_no_scenario
    );

    Ok(())
}
