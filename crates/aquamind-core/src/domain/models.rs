use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ===== Lifecycle stages =====

/// Ordered salmon lifecycle stages.
///
/// The order is the species order: a batch only ever moves forward through
/// this sequence. Weight-triggered transitions (assimilation) and time-based
/// transitions (projections) both use this ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Egg,
    Alevin,
    Fry,
    Parr,
    Smolt,
    PostSmolt,
    Adult,
}

impl LifecycleStage {
    pub const ALL: [LifecycleStage; 7] = [
        LifecycleStage::Egg,
        LifecycleStage::Alevin,
        LifecycleStage::Fry,
        LifecycleStage::Parr,
        LifecycleStage::Smolt,
        LifecycleStage::PostSmolt,
        LifecycleStage::Adult,
    ];

    pub fn order(&self) -> u8 {
        match self {
            LifecycleStage::Egg => 0,
            LifecycleStage::Alevin => 1,
            LifecycleStage::Fry => 2,
            LifecycleStage::Parr => 3,
            LifecycleStage::Smolt => 4,
            LifecycleStage::PostSmolt => 5,
            LifecycleStage::Adult => 6,
        }
    }

    /// Next stage in species order, or None past Adult.
    pub fn next(&self) -> Option<LifecycleStage> {
        let idx = self.order() as usize;
        LifecycleStage::ALL.get(idx + 1).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Egg => "egg",
            LifecycleStage::Alevin => "alevin",
            LifecycleStage::Fry => "fry",
            LifecycleStage::Parr => "parr",
            LifecycleStage::Smolt => "smolt",
            LifecycleStage::PostSmolt => "post_smolt",
            LifecycleStage::Adult => "adult",
        }
    }

    /// Parse a stage name as it appears in external data.
    ///
    /// Case-insensitive; underscores and dashes are treated as spaces.
    /// `harvest` maps to Adult and the combined hatchery label `egg&alevin`
    /// maps to Egg.
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "egg" => Ok(Self::Egg),
            "egg&alevin" => Ok(Self::Egg),
            "alevin" => Ok(Self::Alevin),
            "fry" => Ok(Self::Fry),
            "parr" => Ok(Self::Parr),
            "smolt" => Ok(Self::Smolt),
            "post smolt" => Ok(Self::PostSmolt),
            "adult" => Ok(Self::Adult),
            "harvest" => Ok(Self::Adult),
            _ => Err(format!("Unknown lifecycle stage: {}", s)),
        }
    }

    /// Freshwater stages are reared under controlled conditions; everything
    /// from Post-Smolt on lives in seawater.
    pub fn is_freshwater(&self) -> bool {
        *self <= LifecycleStage::Smolt
    }

    /// Egg and Alevin feed from the yolk sac only.
    pub fn has_external_feeding(&self) -> bool {
        !matches!(self, LifecycleStage::Egg | LifecycleStage::Alevin)
    }

    /// Expected weight band in grams (upper bound open for Adult).
    ///
    /// The band edges double as default transition weights when no explicit
    /// biological constraints are configured.
    pub fn expected_weight_range(&self) -> (f64, Option<f64>) {
        match self {
            LifecycleStage::Egg => (0.0, Some(0.2)),
            LifecycleStage::Alevin => (0.2, Some(1.0)),
            LifecycleStage::Fry => (1.0, Some(6.0)),
            LifecycleStage::Parr => (6.0, Some(60.0)),
            LifecycleStage::Smolt => (60.0, Some(180.0)),
            LifecycleStage::PostSmolt => (180.0, Some(500.0)),
            LifecycleStage::Adult => (500.0, None),
        }
    }

    /// Typical stage duration in days, used when an FCR model carries no
    /// explicit durations.
    pub fn typical_duration_days(&self) -> i64 {
        match self {
            LifecycleStage::Egg => 45,
            LifecycleStage::Alevin => 45,
            LifecycleStage::Fry => 90,
            LifecycleStage::Parr => 90,
            LifecycleStage::Smolt => 90,
            LifecycleStage::PostSmolt => 90,
            LifecycleStage::Adult => 450,
        }
    }
}

impl std::fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ===== Batches, containers, assignments =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Active,
    Completed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Active => "ACTIVE",
            BatchStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(format!("Unknown batch status: {}", s)),
        }
    }
}

/// An identifiable fish cohort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: i64,
    pub batch_number: String,
    pub species: String,
    pub start_date: NaiveDate,
    pub actual_end_date: Option<NaiveDate>,
    pub status: BatchStatus,
    /// Scenario providing growth/mortality models for assimilation.
    pub pinned_scenario_id: Option<i64>,
    /// Committed plan: the projection run live forecasts are compared against.
    pub pinned_projection_run_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterType {
    Freshwater,
    Seawater,
}

impl WaterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaterType::Freshwater => "freshwater",
            WaterType::Seawater => "seawater",
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s {
            "freshwater" => Ok(Self::Freshwater),
            "seawater" => Ok(Self::Seawater),
            _ => Err(format!("Unknown water type: {}", s)),
        }
    }
}

/// A physical holding unit (tank, cage, raceway).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub id: i64,
    pub name: String,
    pub water_type: WaterType,
    /// Geography trail, e.g. "FO-North / Station 3 / Hall B".
    pub geography: Option<String>,
}

/// A (batch, container, stage) occupancy.
///
/// Invariants: `biomass_kg = population_count * avg_weight_g / 1000`,
/// `assignment_date <= departure_date` when both are set, and
/// `is_active <=> departure_date is None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub batch_id: i64,
    pub container_id: i64,
    pub lifecycle_stage: LifecycleStage,
    pub assignment_date: NaiveDate,
    pub departure_date: Option<NaiveDate>,
    pub population_count: i64,
    pub avg_weight_g: Option<f64>,
    pub biomass_kg: f64,
    pub is_active: bool,
}

impl Assignment {
    pub fn computed_biomass_kg(&self) -> f64 {
        self.population_count as f64 * self.avg_weight_g.unwrap_or(0.0) / 1000.0
    }
}

// ===== Observations =====

/// Measured average weight for an assignment on a date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthSample {
    pub id: i64,
    pub assignment_id: i64,
    pub sample_date: NaiveDate,
    pub avg_weight_g: Option<f64>,
    pub sample_size: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Completed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown transfer status: {}", s)),
        }
    }
}

/// How fish were picked when weighing during a transfer.
///
/// Grading crews picking the largest or smallest fish skew the measured
/// average, so the anchor weight is corrected by a bias factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionMethod {
    Representative,
    Largest,
    Smallest,
}

impl SelectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMethod::Representative => "REPRESENTATIVE",
            SelectionMethod::Largest => "LARGEST",
            SelectionMethod::Smallest => "SMALLEST",
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s {
            "REPRESENTATIVE" => Ok(Self::Representative),
            "LARGEST" => Ok(Self::Largest),
            "SMALLEST" => Ok(Self::Smallest),
            _ => Err(format!("Unknown selection method: {}", s)),
        }
    }

    /// Correction applied to a measured transfer weight.
    pub fn bias_factor(&self) -> f64 {
        match self {
            SelectionMethod::Largest => 0.88,
            SelectionMethod::Smallest => 1.12,
            SelectionMethod::Representative => 1.0,
        }
    }
}

/// Movement of fish between assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferAction {
    pub id: i64,
    pub source_assignment_id: Option<i64>,
    pub dest_assignment_id: Option<i64>,
    pub status: TransferStatus,
    pub actual_execution_date: Option<NaiveDate>,
    pub transferred_count: i64,
    pub measured_avg_weight_g: Option<f64>,
    pub selection_method: Option<SelectionMethod>,
}

/// Veterinary treatment; anchors weight only when fish were weighed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treatment {
    pub id: i64,
    pub assignment_id: i64,
    pub treatment_date: NaiveDate,
    pub includes_weighing: bool,
    pub sampled_avg_weight_g: Option<f64>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentalReading {
    pub id: i64,
    pub container_id: i64,
    pub parameter: String,
    pub reading_time: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MortalityEvent {
    pub id: i64,
    pub batch_id: i64,
    pub container_id: Option<i64>,
    pub event_date: NaiveDate,
    pub count: i64,
    pub biomass_kg: f64,
    pub cause: String,
}

/// Per-assignment share of a mortality event after distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MortalityAllocation {
    pub assignment_id: i64,
    pub count: i64,
    /// True when the allocation depleted the assignment and closed it.
    pub closed: bool,
}

/// Result of applying one mortality event to a batch's active assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MortalityApplication {
    pub event_id: i64,
    pub allocations: Vec<MortalityAllocation>,
    pub total_requested: i64,
    pub total_applied: i64,
    /// Event count exceeded the available population (applied was clamped).
    pub over_subscribed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedingEvent {
    pub id: i64,
    pub container_id: i64,
    pub assignment_id: Option<i64>,
    pub feeding_date: NaiveDate,
    pub amount_kg: f64,
    pub batch_biomass_kg: Option<f64>,
}

// ===== Anchors =====

/// Kind of measurement pinning average weight on a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    GrowthSample,
    Transfer,
    Vaccination,
}

impl AnchorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorKind::GrowthSample => "growth_sample",
            AnchorKind::Transfer => "transfer",
            AnchorKind::Vaccination => "vaccination",
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s {
            "growth_sample" => Ok(Self::GrowthSample),
            "transfer" => Ok(Self::Transfer),
            "vaccination" => Ok(Self::Vaccination),
            _ => Err(format!("Unknown anchor kind: {}", s)),
        }
    }

    /// Lower number wins when two anchors land on the same date.
    pub fn priority(&self) -> u8 {
        match self {
            AnchorKind::GrowthSample => 1,
            AnchorKind::Transfer => 2,
            AnchorKind::Vaccination => 3,
        }
    }

    /// Measurement confidence for this anchor source.
    pub fn confidence(&self) -> f64 {
        match self {
            AnchorKind::GrowthSample => 1.0,
            AnchorKind::Transfer => 0.95,
            AnchorKind::Vaccination => 0.90,
        }
    }
}

/// A weight measurement resolved for one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub kind: AnchorKind,
    pub weight_g: f64,
    pub confidence: f64,
}

// ===== Provenance =====

/// Where a daily-state dimension came from. Closed set; storage serializes
/// these tags into the `sources` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Measured,
    TgcComputed,
    Unchanged,
    Profile,
    None,
    Actual,
    Model,
    Observed,
    NearestBefore,
    NearestAfter,
    Interpolated,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Measured => "measured",
            SourceTag::TgcComputed => "tgc_computed",
            SourceTag::Unchanged => "unchanged",
            SourceTag::Profile => "profile",
            SourceTag::None => "none",
            SourceTag::Actual => "actual",
            SourceTag::Model => "model",
            SourceTag::Observed => "observed",
            SourceTag::NearestBefore => "nearest_before",
            SourceTag::NearestAfter => "nearest_after",
            SourceTag::Interpolated => "interpolated",
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s {
            "measured" => Ok(Self::Measured),
            "tgc_computed" => Ok(Self::TgcComputed),
            "unchanged" => Ok(Self::Unchanged),
            "profile" => Ok(Self::Profile),
            "none" => Ok(Self::None),
            "actual" => Ok(Self::Actual),
            "model" => Ok(Self::Model),
            "observed" => Ok(Self::Observed),
            "nearest_before" => Ok(Self::NearestBefore),
            "nearest_after" => Ok(Self::NearestAfter),
            "interpolated" => Ok(Self::Interpolated),
            _ => Err(format!("Unknown source tag: {}", s)),
        }
    }

    /// Tags that mean the temperature came from a physical sensor (used by
    /// the live projection bias window).
    pub fn is_sensor_derived(&self) -> bool {
        matches!(
            self,
            SourceTag::Measured
                | SourceTag::Interpolated
                | SourceTag::NearestBefore
                | SourceTag::NearestAfter
        )
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A provenance tag with its confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sourced {
    pub tag: SourceTag,
    pub confidence: f64,
}

impl Sourced {
    pub fn new(tag: SourceTag, confidence: f64) -> Self {
        Self { tag, confidence }
    }

    pub fn none() -> Self {
        Self::new(SourceTag::None, 0.0)
    }
}

/// Per-dimension provenance for one daily state row.
///
/// Kept as a typed record inside the engines; flattened to the
/// `sources` / `confidence_scores` maps only at the storage boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateProvenance {
    pub weight: Sourced,
    pub temp: Sourced,
    pub mortality: Sourced,
    pub feed: Sourced,
    pub fcr: Option<Sourced>,
}

impl StateProvenance {
    /// Flatten to (sources, confidence_scores) maps for persistence.
    pub fn to_maps(&self) -> (BTreeMap<String, String>, BTreeMap<String, f64>) {
        let mut sources = BTreeMap::new();
        let mut confidence = BTreeMap::new();

        for (field, sourced) in [
            ("weight", Some(self.weight)),
            ("temp", Some(self.temp)),
            ("mortality", Some(self.mortality)),
            ("feed", Some(self.feed)),
            ("fcr", self.fcr),
        ] {
            if let Some(s) = sourced {
                sources.insert(field.to_string(), s.tag.as_str().to_string());
                confidence.insert(field.to_string(), s.confidence);
            }
        }

        (sources, confidence)
    }

    /// Rebuild from persisted maps. Unknown tags fail.
    pub fn from_maps(
        sources: &BTreeMap<String, String>,
        confidence: &BTreeMap<String, f64>,
    ) -> std::result::Result<Self, String> {
        let read = |field: &str| -> std::result::Result<Sourced, String> {
            let tag = sources
                .get(field)
                .map(|t| SourceTag::parse(t))
                .transpose()?
                .unwrap_or(SourceTag::None);
            let c = confidence.get(field).copied().unwrap_or(0.0);
            Ok(Sourced::new(tag, c))
        };

        let fcr = if sources.contains_key("fcr") {
            Some(read("fcr")?)
        } else {
            None
        };

        Ok(Self {
            weight: read("weight")?,
            temp: read("temp")?,
            mortality: read("mortality")?,
            feed: read("feed")?,
            fcr,
        })
    }
}

// ===== Daily state =====

/// One reconstructed day of an assignment's life: the assimilation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyState {
    pub assignment_id: i64,
    pub batch_id: i64,
    pub container_id: i64,
    pub lifecycle_stage: LifecycleStage,
    pub date: NaiveDate,
    /// 1-based day count from batch start.
    pub day_number: i64,
    pub avg_weight_g: f64,
    pub population: i64,
    pub biomass_kg: f64,
    pub temp_c: Option<f64>,
    pub mortality_count: i64,
    pub feed_kg: f64,
    pub observed_fcr: Option<f64>,
    pub anchor_type: Option<AnchorKind>,
    pub provenance: StateProvenance,
}

impl DailyState {
    /// Lowest confidence across the recorded dimensions; 0 when empty.
    pub fn overall_confidence(&self) -> f64 {
        let (_, scores) = self.provenance.to_maps();
        scores
            .values()
            .copied()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
            .unwrap_or(0.0)
    }
}

// ===== Temperature profiles =====

/// One profile reading, keyed by 1-based day number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileReading {
    pub day_number: i64,
    pub temperature_c: f64,
}

/// Fallback when a profile is missing or empty.
pub const DEFAULT_PROFILE_TEMP_C: f64 = 10.0;

/// A reusable day-indexed temperature series.
///
/// Readings are keyed by day number, never by calendar date, so the same
/// profile serves scenarios with different start dates. Readings are kept
/// sorted by day number; deserialization goes through the sorting
/// constructor so lookups stay valid for externally supplied payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "TemperatureProfileData")]
pub struct TemperatureProfile {
    pub id: i64,
    pub name: String,
    readings: Vec<ProfileReading>,
}

#[derive(Deserialize)]
struct TemperatureProfileData {
    id: i64,
    name: String,
    readings: Vec<ProfileReading>,
}

impl From<TemperatureProfileData> for TemperatureProfile {
    fn from(data: TemperatureProfileData) -> Self {
        TemperatureProfile::new(data.id, data.name, data.readings)
    }
}

impl TemperatureProfile {
    pub fn new(id: i64, name: impl Into<String>, mut readings: Vec<ProfileReading>) -> Self {
        readings.sort_by_key(|r| r.day_number);
        Self {
            id,
            name: name.into(),
            readings,
        }
    }

    pub fn readings(&self) -> &[ProfileReading] {
        &self.readings
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Temperature for a day number.
    ///
    /// Exact match wins; gaps are linearly interpolated between the nearest
    /// neighbors; outside the covered range the nearest boundary reading is
    /// used; an empty profile yields the default 10.0.
    pub fn temperature_for_day(&self, day_number: i64) -> f64 {
        if self.readings.is_empty() {
            return DEFAULT_PROFILE_TEMP_C;
        }

        match self
            .readings
            .binary_search_by_key(&day_number, |r| r.day_number)
        {
            Ok(idx) => self.readings[idx].temperature_c,
            Err(idx) => {
                if idx == 0 {
                    self.readings[0].temperature_c
                } else if idx == self.readings.len() {
                    self.readings[self.readings.len() - 1].temperature_c
                } else {
                    let before = self.readings[idx - 1];
                    let after = self.readings[idx];
                    let span = (after.day_number - before.day_number) as f64;
                    let offset = (day_number - before.day_number) as f64;
                    let interpolated = before.temperature_c
                        + (after.temperature_c - before.temperature_c) * offset / span;
                    (interpolated * 100.0).round() / 100.0
                }
            }
        }
    }
}

// ===== Model configurations =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TgcModel {
    pub id: i64,
    pub name: String,
    pub tgc_value: f64,
    /// Temperature exponent n; 1.0 for the classic formula.
    pub exponent_n: f64,
    /// Weight exponent m; 0 is read as the salmonid default 1/3.
    pub exponent_m: f64,
    pub profile: Option<TemperatureProfile>,
    pub stage_overrides: HashMap<LifecycleStage, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FcrWeightBand {
    pub min_weight_g: f64,
    pub max_weight_g: f64,
    pub fcr_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcrStage {
    pub stage: LifecycleStage,
    pub fcr_value: f64,
    pub duration_days: Option<i64>,
    pub overrides: Vec<FcrWeightBand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcrModel {
    pub id: i64,
    pub name: String,
    /// Ordered by stage; order drives the time-based stage schedule.
    pub stages: Vec<FcrStage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateFrequency {
    Daily,
    Weekly,
}

impl RateFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateFrequency::Daily => "daily",
            RateFrequency::Weekly => "weekly",
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            _ => Err(format!("Unknown rate frequency: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MortalityStageOverride {
    pub daily_rate_percent: Option<f64>,
    pub weekly_rate_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MortalityModel {
    pub id: i64,
    pub name: String,
    pub frequency: RateFrequency,
    pub rate_percent: f64,
    pub stage_overrides: HashMap<LifecycleStage, MortalityStageOverride>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageConstraint {
    pub min_weight_g: Option<f64>,
    pub max_weight_g: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiologicalConstraints {
    pub id: i64,
    pub name: String,
    pub stages: HashMap<LifecycleStage, StageConstraint>,
}

// ===== Scenarios & projections =====

/// Scheduled mid-projection model swap, keyed by 1-based change day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioModelChange {
    pub change_day: i64,
    pub new_tgc_model: Option<TgcModel>,
    pub new_fcr_model: Option<FcrModel>,
    pub new_mortality_model: Option<MortalityModel>,
}

/// A forward-simulation template with its models assembled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub duration_days: i64,
    pub initial_count: i64,
    pub initial_weight_g: Option<f64>,
    pub tgc_model: TgcModel,
    pub fcr_model: FcrModel,
    pub mortality_model: MortalityModel,
    pub biological_constraints: Option<BiologicalConstraints>,
    pub batch_id: Option<i64>,
    pub model_changes: Vec<ScenarioModelChange>,
}

pub const SCENARIO_MAX_DURATION_DAYS: i64 = 1200;
pub const SCENARIO_MAX_INITIAL_COUNT: i64 = 10_000_000;
pub const SCENARIO_MIN_INITIAL_WEIGHT_G: f64 = 0.01;
pub const SCENARIO_MAX_INITIAL_WEIGHT_G: f64 = 10_000.0;

/// A persisted set of scenario projections that a batch can pin as its plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionRun {
    pub id: i64,
    pub scenario_id: i64,
    pub run_at: DateTime<Utc>,
}

/// One projected day of a scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioProjection {
    pub scenario_id: i64,
    pub projection_date: NaiveDate,
    pub day_number: i64,
    pub avg_weight_g: f64,
    pub population: i64,
    pub biomass_kg: f64,
    pub daily_feed_kg: f64,
    pub cumulative_feed_kg: f64,
    pub temperature_c: f64,
    pub lifecycle_stage: LifecycleStage,
}

/// One projected day of a live forward run, with full temperature-bias
/// provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveForwardProjection {
    pub assignment_id: i64,
    pub batch_id: i64,
    pub container_id: i64,
    pub computed_date: NaiveDate,
    pub projection_date: NaiveDate,
    pub day_number: i64,
    pub projected_weight_g: f64,
    pub projected_population: i64,
    pub projected_biomass_kg: f64,
    pub temperature_used_c: f64,
    pub tgc_value_used: f64,
    pub temp_profile_id: Option<i64>,
    pub temp_profile_name: String,
    pub temp_bias_c: f64,
    pub temp_bias_window_days: i64,
    pub temp_bias_clamp_min_c: f64,
    pub temp_bias_clamp_max_c: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlannedActivityKind {
    Harvest,
    Transfer,
}

impl PlannedActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlannedActivityKind::Harvest => "HARVEST",
            PlannedActivityKind::Transfer => "TRANSFER",
        }
    }
}

/// Per-assignment planning rollup maintained after every live run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerForecastSummary {
    pub assignment_id: i64,

    // Current state snapshot
    pub current_weight_g: f64,
    pub current_population: i64,
    pub current_biomass_kg: f64,
    pub state_date: NaiveDate,
    pub state_day_number: i64,
    pub state_confidence: f64,

    // Harvest projection
    pub projected_harvest_date: Option<NaiveDate>,
    pub projected_harvest_weight_g: Option<f64>,
    pub days_to_harvest: Option<i64>,
    pub harvest_threshold_g: f64,

    // Transfer projection
    pub projected_transfer_date: Option<NaiveDate>,
    pub projected_transfer_weight_g: Option<f64>,
    pub days_to_transfer: Option<i64>,
    pub transfer_threshold_g: f64,

    // Variance against the committed plan (positive = behind plan)
    pub original_harvest_date: Option<NaiveDate>,
    pub harvest_variance_days: Option<i64>,

    // Planning flags
    pub has_planned_harvest: bool,
    pub has_planned_transfer: bool,
    pub needs_planning_attention: bool,

    // Provenance
    pub temp_profile_name: String,
    pub temp_bias_c: f64,
    pub temp_bias_window_days: i64,
    pub computed_date: NaiveDate,
}
