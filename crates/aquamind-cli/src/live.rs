use anyhow::Result;
use aquamind_api::{run_live_projection, AppContext};
use chrono::NaiveDate;
use colored::*;

/// Run the live forward projection for one assignment and print the
/// resulting forecast summary.
pub async fn forward(db: &str, assignment: i64, computed_date: Option<NaiveDate>) -> Result<()> {
    let ctx = AppContext::init(db).await?;

    println!(
        "{}",
        format!("Live forward projection for assignment {}", assignment)
            .bright_cyan()
            .bold()
    );
    println!();

    let response = run_live_projection(&ctx, assignment, computed_date).await?;
    if !response.success {
        println!(
            "{} {}",
            "Failed:".bright_red().bold(),
            response.error.unwrap_or_else(|| "unknown error".to_string())
        );
        return Ok(());
    }

    println!(
        "   {} rows from day {} over {} days (bias {:+.2} C from {} sensor days)",
        response.rows_created,
        response.start_day,
        response.horizon_days,
        response.bias_c,
        response.bias_window_days
    );

    if let Some(summary) = ctx.states.forecast_summary(assignment).await? {
        println!();
        println!(
            "   current: {:.1} g, {} fish, {:.1} kg (confidence {:.2})",
            summary.current_weight_g,
            summary.current_population,
            summary.current_biomass_kg,
            summary.state_confidence
        );
        match (summary.projected_transfer_date, summary.days_to_transfer) {
            (Some(date), Some(days)) => {
                println!("   transfer: {} ({} days, threshold {} g)", date, days, summary.transfer_threshold_g)
            }
            _ => println!("   transfer: no crossing inside the horizon"),
        }
        match (summary.projected_harvest_date, summary.days_to_harvest) {
            (Some(date), Some(days)) => {
                println!("   harvest:  {} ({} days, threshold {} g)", date, days, summary.harvest_threshold_g)
            }
            _ => println!("   harvest:  no crossing inside the horizon"),
        }
        if let Some(variance) = summary.harvest_variance_days {
            println!("   variance: {:+} days vs plan", variance);
        }
        if summary.needs_planning_attention {
            println!("   {}", "needs planning attention".bright_yellow().bold());
        }
    }

    Ok(())
}
