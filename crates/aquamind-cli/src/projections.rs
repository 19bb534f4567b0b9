use anyhow::Result;
use aquamind_api::AppContext;
use aquamind_core::services::ProjectionEngine;
use colored::*;
use std::sync::Arc;

/// Regenerate stored projections for one scenario or all of them.
pub async fn regenerate(
    db: &str,
    all: bool,
    scenario: Option<i64>,
    dry_run: bool,
) -> Result<()> {
    let ctx = AppContext::init(db).await?;

    let scenario_ids = if all {
        ctx.batches.scenario_ids().await?
    } else if let Some(id) = scenario {
        vec![id]
    } else {
        anyhow::bail!("Specify either --all or --scenario <id>");
    };

    println!(
        "{}",
        format!("Regenerating projections for {} scenario(s)", scenario_ids.len())
            .bright_cyan()
            .bold()
    );
    println!();

    let mut succeeded = 0;
    let mut failed = 0;

    for id in scenario_ids {
        let Some(scenario) = ctx.batches.scenario(id).await? else {
            println!("   {} scenario {} not found", "!".bright_red(), id);
            failed += 1;
            continue;
        };
        let name = scenario.name.clone();

        let engine = ProjectionEngine::new(scenario);
        if !engine.errors().is_empty() {
            println!(
                "   {} {} ({}): {}",
                "x".bright_red(),
                name,
                id,
                engine.errors().join("; ")
            );
            failed += 1;
            continue;
        }

        let outcome = if dry_run {
            engine.run()
        } else {
            engine.run_and_store(Arc::clone(&ctx.states)).await?
        };

        if outcome.success {
            let summary = outcome.summary.as_ref().expect("summary on success");
            println!(
                "   {} {} ({}): {} days, final weight {:.1} g, total feed {:.1} kg",
                "ok".bright_green(),
                name,
                id,
                summary.duration_days,
                summary.final_state.weight_g,
                summary.total_feed_kg
            );
            succeeded += 1;
        } else {
            println!(
                "   {} {} ({}): {}",
                "x".bright_red(),
                name,
                id,
                outcome.errors.join("; ")
            );
            failed += 1;
        }
    }

    println!();
    println!(
        "{} {} succeeded, {} failed{}",
        "Done:".bright_green().bold(),
        succeeded,
        failed,
        if dry_run { " (dry run, nothing saved)" } else { "" }
    );

    Ok(())
}
