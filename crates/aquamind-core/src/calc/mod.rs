pub mod fcr;
pub mod mortality;
pub mod tgc;

pub use fcr::{DailyFeed, FcrCalculator, DEFAULT_FCR};
pub use mortality::{
    mortality_seed, projection_seed, CatastrophePhase, CatastrophicDay, DailyMortality,
    MortalityCalculator, ObservedMortality,
};
pub use tgc::{stage_weight_cap, TgcCalculator, FRESHWATER_REARING_TEMP_C};
