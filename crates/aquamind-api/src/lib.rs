pub mod api;
pub mod context;
pub mod observations;
pub mod types;

pub use api::{
    container_forecast_summary, create_scenario, live_forward_projections, run_live_projection,
    run_projection, run_sensitivity,
};
pub use context::{AppContext, InlineTaskQueue};
pub use observations::{
    record_environmental_reading, record_feeding_event, record_growth_sample,
    record_mortality_event, record_transfer, record_treatment,
};
pub use types::{
    CreateScenarioResponse, FieldErrors, LiveRunResponse, ProjectionSummaryDto,
    RunProjectionResponse, ScenarioCreateRequest, SensitivityResponse,
};
