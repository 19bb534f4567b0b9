pub mod calc;
pub mod domain;
pub mod ports;
pub mod services;
pub mod stage;

// Re-export commonly used types
pub use domain::{
    Anchor,
    AnchorKind,
    Assignment,
    Batch,
    BatchStatus,
    BiologicalConstraints,
    Container,
    ContainerForecastSummary,
    DailyState,
    DomainError,
    EnvironmentalReading,
    FcrModel,
    FcrStage,
    FcrWeightBand,
    FeedingEvent,
    GrowthSample,
    LifecycleStage,
    LiveForwardProjection,
    MortalityAllocation,
    MortalityApplication,
    MortalityEvent,
    MortalityModel,
    MortalityStageOverride,
    PlannedActivityKind,
    ProfileReading,
    ProjectionRun,
    RateFrequency,
    Scenario,
    ScenarioModelChange,
    ScenarioProjection,
    SelectionMethod,
    SourceTag,
    Sourced,
    StageConstraint,
    StateProvenance,
    TemperatureProfile,
    TgcModel,
    TransferAction,
    TransferStatus,
    Treatment,
    WaterType,
};

pub use calc::{FcrCalculator, MortalityCalculator, TgcCalculator};

pub use ports::{
    BatchRepository, ObservationRepository, PlanningRepository, StateRepository, UpsertCounts,
};

pub use services::{
    distribute_mortality, recompute_batch_window, recompute_recent, AnchorSetBuilder,
    AssimilationEngine, CancelFlag, DedupCache, InMemoryDedupCache, LiveForwardSettings,
    LiveProjectionEngine, ObservationWriter, ProjectionEngine, RecomputeTask, SensitivityParameter,
    TaskQueue,
};

pub use stage::{stage_for_weight, StageConstraintSet, StageSchedule};
