pub mod batch_repository;
pub mod observation_repository;
pub mod planning_repository;
pub mod state_repository;

pub use batch_repository::BatchRepository;
pub use observation_repository::ObservationRepository;
pub use planning_repository::PlanningRepository;
pub use state_repository::{StateRepository, UpsertCounts};

#[cfg(any(test, feature = "testing"))]
pub use batch_repository::MockBatchRepository;
#[cfg(any(test, feature = "testing"))]
pub use observation_repository::MockObservationRepository;
#[cfg(any(test, feature = "testing"))]
pub use planning_repository::MockPlanningRepository;
#[cfg(any(test, feature = "testing"))]
pub use state_repository::MockStateRepository;
