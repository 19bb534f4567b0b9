use crate::context::AppContext;
use crate::types::{
    CreateScenarioResponse, LiveRunResponse, ProjectionSummaryDto, RunProjectionResponse,
    ScenarioCreateRequest, SensitivityResponse,
};
use aquamind_core::domain::{ContainerForecastSummary, LiveForwardProjection};
use aquamind_core::services::{LiveProjectionEngine, ProjectionEngine, SensitivityParameter};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Validate and persist a scenario. Invalid payloads return the field-error
/// map without touching the store.
pub async fn create_scenario(
    ctx: &AppContext,
    request: ScenarioCreateRequest,
) -> anyhow::Result<CreateScenarioResponse> {
    let field_errors = request.validate();
    if !field_errors.is_empty() {
        return Ok(CreateScenarioResponse {
            success: false,
            scenario_id: None,
            field_errors,
        });
    }

    let scenario_id = ctx.batches.create_scenario(&request.into_scenario()).await?;
    tracing::info!(scenario_id, "Scenario created");

    Ok(CreateScenarioResponse {
        success: true,
        scenario_id: Some(scenario_id),
        field_errors: BTreeMap::new(),
    })
}

/// Run a scenario projection and persist it (replacing any previous run's
/// rows), recording a projection run on success.
pub async fn run_projection(
    ctx: &AppContext,
    scenario_id: i64,
) -> anyhow::Result<RunProjectionResponse> {
    let Some(scenario) = ctx.batches.scenario(scenario_id).await? else {
        return Ok(not_found_projection(scenario_id));
    };

    let engine = ProjectionEngine::new(scenario);
    let outcome = engine.run_and_store(Arc::clone(&ctx.states)).await?;

    let projection_run_id = if outcome.success {
        Some(ctx.batches.create_projection_run(scenario_id).await?)
    } else {
        None
    };

    Ok(RunProjectionResponse {
        success: outcome.success,
        error: None,
        errors: outcome.errors,
        warnings: outcome.warnings,
        projection_run_id,
        days_projected: outcome.projections.len(),
        summary: outcome.summary.as_ref().map(ProjectionSummaryDto::from),
    })
}

fn not_found_projection(scenario_id: i64) -> RunProjectionResponse {
    RunProjectionResponse {
        success: false,
        error: Some(format!("Scenario {} not found", scenario_id)),
        errors: vec![],
        warnings: vec![],
        projection_run_id: None,
        days_projected: 0,
        summary: None,
    }
}

/// Non-persisting sensitivity sweep over one parameter.
pub async fn run_sensitivity(
    ctx: &AppContext,
    scenario_id: i64,
    parameter: &str,
    variations: &[f64],
) -> anyhow::Result<SensitivityResponse> {
    let parameter = match SensitivityParameter::parse(parameter) {
        Ok(p) => p,
        Err(e) => {
            return Ok(SensitivityResponse {
                success: false,
                error: Some(e),
                parameter: parameter.to_string(),
                original_value: 0.0,
                variations: BTreeMap::new(),
            })
        }
    };

    let Some(scenario) = ctx.batches.scenario(scenario_id).await? else {
        return Ok(SensitivityResponse {
            success: false,
            error: Some(format!("Scenario {} not found", scenario_id)),
            parameter: parameter.as_str().to_string(),
            original_value: 0.0,
            variations: BTreeMap::new(),
        });
    };

    let engine = ProjectionEngine::new(scenario);
    let outcome = engine.sensitivity(parameter, variations);
    Ok(SensitivityResponse::from_outcome(&outcome))
}

/// Compute and persist a live forward projection for an assignment.
pub async fn run_live_projection(
    ctx: &AppContext,
    assignment_id: i64,
    computed_date: Option<NaiveDate>,
) -> anyhow::Result<LiveRunResponse> {
    let engine = match LiveProjectionEngine::for_assignment(
        assignment_id,
        Arc::clone(&ctx.batches),
        Arc::clone(&ctx.states),
        Arc::clone(&ctx.planning),
        ctx.settings.clone(),
    )
    .await
    {
        Ok(engine) => engine,
        Err(e) => {
            // Missing assignment/scenario is a structured failure, not a
            // crash across the task boundary.
            return Ok(LiveRunResponse {
                success: false,
                error: Some(e.to_string()),
                assignment_id,
                rows_created: 0,
                start_day: 0,
                horizon_days: 0,
                bias_c: 0.0,
                bias_window_days: 0,
            });
        }
    };

    let outcome = engine.compute_and_store(computed_date).await?;
    Ok(outcome.into())
}

/// Live rows of one generation, ordered by projection date.
pub async fn live_forward_projections(
    ctx: &AppContext,
    assignment_id: i64,
    computed_date: NaiveDate,
) -> anyhow::Result<Vec<LiveForwardProjection>> {
    ctx.states
        .live_projections(assignment_id, computed_date)
        .await
}

pub async fn container_forecast_summary(
    ctx: &AppContext,
    assignment_id: i64,
) -> anyhow::Result<Option<ContainerForecastSummary>> {
    ctx.states.forecast_summary(assignment_id).await
}
