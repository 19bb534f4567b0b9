//! Configurable in-memory fakes for the repository ports, shared by the
//! engine test suites.

use crate::domain::*;
use crate::ports::{
    BatchRepository, ObservationRepository, PlanningRepository, StateRepository, UpsertCounts,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeObservations {
    pub samples: Vec<GrowthSample>,
    pub transfers_out: Vec<TransferAction>,
    pub transfers_in: Vec<TransferAction>,
    pub weighings: Vec<(NaiveDate, f64)>,
    pub temperatures: HashMap<NaiveDate, f64>,
    pub mortality: HashMap<NaiveDate, i64>,
    pub feeding: HashMap<NaiveDate, f64>,
}

fn in_range(date: NaiveDate, start: NaiveDate, end: NaiveDate) -> bool {
    date >= start && date <= end
}

#[async_trait]
impl ObservationRepository for FakeObservations {
    async fn growth_samples(
        &self,
        _assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<GrowthSample>> {
        Ok(self
            .samples
            .iter()
            .filter(|s| in_range(s.sample_date, start, end) && s.avg_weight_g.is_some())
            .cloned()
            .collect())
    }

    async fn completed_transfers_out(
        &self,
        _source_assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<TransferAction>> {
        Ok(self
            .transfers_out
            .iter()
            .filter(|t| {
                t.status == TransferStatus::Completed
                    && t.actual_execution_date
                        .map(|d| in_range(d, start, end))
                        .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn completed_transfers_in(
        &self,
        _dest_assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<TransferAction>> {
        Ok(self
            .transfers_in
            .iter()
            .filter(|t| {
                t.status == TransferStatus::Completed
                    && t.actual_execution_date
                        .map(|d| in_range(d, start, end))
                        .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn transfer_into(
        &self,
        _dest_assignment_id: i64,
    ) -> anyhow::Result<Option<TransferAction>> {
        Ok(self
            .transfers_in
            .iter()
            .find(|t| t.status == TransferStatus::Completed)
            .cloned())
    }

    async fn treatment_weighings(
        &self,
        _assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<(NaiveDate, f64)>> {
        Ok(self
            .weighings
            .iter()
            .filter(|(d, _)| in_range(*d, start, end))
            .copied()
            .collect())
    }

    async fn daily_mean_temperatures(
        &self,
        _container_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<HashMap<NaiveDate, f64>> {
        Ok(self
            .temperatures
            .iter()
            .filter(|(d, _)| in_range(**d, start, end))
            .map(|(d, t)| (*d, *t))
            .collect())
    }

    async fn mortality_totals(
        &self,
        _assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<HashMap<NaiveDate, i64>> {
        Ok(self
            .mortality
            .iter()
            .filter(|(d, _)| in_range(**d, start, end))
            .map(|(d, c)| (*d, *c))
            .collect())
    }

    async fn feeding_totals(
        &self,
        _container_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<HashMap<NaiveDate, f64>> {
        Ok(self
            .feeding
            .iter()
            .filter(|(d, _)| in_range(**d, start, end))
            .map(|(d, kg)| (*d, *kg))
            .collect())
    }

    async fn insert_growth_sample(&self, _sample: &GrowthSample) -> anyhow::Result<i64> {
        Ok(1)
    }

    async fn apply_mortality_event(
        &self,
        event: &MortalityEvent,
    ) -> anyhow::Result<MortalityApplication> {
        Ok(MortalityApplication {
            event_id: 1,
            allocations: vec![],
            total_requested: event.count,
            total_applied: event.count,
            over_subscribed: false,
        })
    }

    async fn insert_treatment(&self, _treatment: &Treatment) -> anyhow::Result<i64> {
        Ok(1)
    }

    async fn insert_transfer(&self, _transfer: &TransferAction) -> anyhow::Result<i64> {
        Ok(1)
    }

    async fn insert_environmental_reading(
        &self,
        _reading: &EnvironmentalReading,
    ) -> anyhow::Result<i64> {
        Ok(1)
    }

    async fn insert_feeding_event(&self, _event: &FeedingEvent) -> anyhow::Result<i64> {
        Ok(1)
    }
}

/// State store fake: upserts land in an in-memory map keyed by
/// (assignment, date) so reruns exercise the created/updated split.
#[derive(Default)]
pub struct FakeStates {
    pub daily: Mutex<BTreeMap<(i64, NaiveDate), DailyState>>,
    pub scenario_projections: Mutex<HashMap<i64, Vec<ScenarioProjection>>>,
    pub live: Mutex<HashMap<(i64, NaiveDate), Vec<LiveForwardProjection>>>,
    pub summaries: Mutex<HashMap<i64, ContainerForecastSummary>>,
}

impl FakeStates {
    pub fn with_states(states: Vec<DailyState>) -> Self {
        let fake = Self::default();
        {
            let mut daily = fake.daily.lock().unwrap();
            for state in states {
                daily.insert((state.assignment_id, state.date), state);
            }
        }
        fake
    }

    pub fn states_for(&self, assignment_id: i64) -> Vec<DailyState> {
        self.daily
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.assignment_id == assignment_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StateRepository for FakeStates {
    async fn latest_state_before(
        &self,
        assignment_id: i64,
        date: NaiveDate,
    ) -> anyhow::Result<Option<DailyState>> {
        Ok(self
            .daily
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.assignment_id == assignment_id && s.date < date)
            .max_by_key(|s| s.date)
            .cloned())
    }

    async fn latest_state(&self, assignment_id: i64) -> anyhow::Result<Option<DailyState>> {
        Ok(self
            .daily
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.assignment_id == assignment_id)
            .max_by_key(|s| s.date)
            .cloned())
    }

    async fn states_in_range(
        &self,
        assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<DailyState>> {
        Ok(self
            .daily
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.assignment_id == assignment_id && s.date >= start && s.date <= end)
            .cloned()
            .collect())
    }

    async fn upsert_daily_states(&self, states: &[DailyState]) -> anyhow::Result<UpsertCounts> {
        let mut daily = self.daily.lock().unwrap();
        let mut counts = UpsertCounts::default();
        for state in states {
            let key = (state.assignment_id, state.date);
            if daily.insert(key, state.clone()).is_some() {
                counts.updated += 1;
            } else {
                counts.created += 1;
            }
        }
        Ok(counts)
    }

    async fn replace_scenario_projections(
        &self,
        scenario_id: i64,
        projections: &[ScenarioProjection],
    ) -> anyhow::Result<()> {
        self.scenario_projections
            .lock()
            .unwrap()
            .insert(scenario_id, projections.to_vec());
        Ok(())
    }

    async fn first_projection_at_or_above(
        &self,
        scenario_id: i64,
        weight_g: f64,
    ) -> anyhow::Result<Option<ScenarioProjection>> {
        Ok(self
            .scenario_projections
            .lock()
            .unwrap()
            .get(&scenario_id)
            .and_then(|rows| {
                rows.iter()
                    .filter(|p| p.avg_weight_g >= weight_g)
                    .min_by_key(|p| p.day_number)
                    .cloned()
            }))
    }

    async fn replace_live_projections(
        &self,
        assignment_id: i64,
        computed_date: NaiveDate,
        projections: &[LiveForwardProjection],
    ) -> anyhow::Result<()> {
        self.live
            .lock()
            .unwrap()
            .insert((assignment_id, computed_date), projections.to_vec());
        Ok(())
    }

    async fn live_projections(
        &self,
        assignment_id: i64,
        computed_date: NaiveDate,
    ) -> anyhow::Result<Vec<LiveForwardProjection>> {
        Ok(self
            .live
            .lock()
            .unwrap()
            .get(&(assignment_id, computed_date))
            .cloned()
            .unwrap_or_default())
    }

    async fn prune_live_projections(
        &self,
        assignment_id: i64,
        computed_before: NaiveDate,
    ) -> anyhow::Result<u64> {
        let mut live = self.live.lock().unwrap();
        let before = live.len();
        live.retain(|(id, computed), _| *id != assignment_id || *computed >= computed_before);
        Ok((before - live.len()) as u64)
    }

    async fn compress_live_projections(
        &self,
        _assignment_id: i64,
        _computed_before: NaiveDate,
    ) -> anyhow::Result<u64> {
        Ok(0)
    }

    async fn upsert_forecast_summary(
        &self,
        summary: &ContainerForecastSummary,
    ) -> anyhow::Result<()> {
        self.summaries
            .lock()
            .unwrap()
            .insert(summary.assignment_id, summary.clone());
        Ok(())
    }

    async fn forecast_summary(
        &self,
        assignment_id: i64,
    ) -> anyhow::Result<Option<ContainerForecastSummary>> {
        Ok(self.summaries.lock().unwrap().get(&assignment_id).cloned())
    }
}

pub struct FakeBatches {
    pub batches: Vec<Batch>,
    pub assignments: Vec<Assignment>,
    pub scenarios: Vec<Scenario>,
    pub runs: Vec<ProjectionRun>,
}

#[async_trait]
impl BatchRepository for FakeBatches {
    async fn batch(&self, id: i64) -> anyhow::Result<Option<Batch>> {
        Ok(self.batches.iter().find(|b| b.id == id).cloned())
    }

    async fn assignment(&self, id: i64) -> anyhow::Result<Option<Assignment>> {
        Ok(self.assignments.iter().find(|a| a.id == id).cloned())
    }

    async fn assignments_for_batch(
        &self,
        batch_id: i64,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> anyhow::Result<Vec<Assignment>> {
        Ok(self
            .assignments
            .iter()
            .filter(|a| a.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn active_batches(&self, batch_id: Option<i64>) -> anyhow::Result<Vec<Batch>> {
        Ok(self
            .batches
            .iter()
            .filter(|b| b.status == BatchStatus::Active)
            .filter(|b| batch_id.map(|id| b.id == id).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn scenario(&self, id: i64) -> anyhow::Result<Option<Scenario>> {
        Ok(self.scenarios.iter().find(|s| s.id == id).cloned())
    }

    async fn scenario_for_batch(&self, _batch_id: i64) -> anyhow::Result<Option<Scenario>> {
        Ok(self.scenarios.first().cloned())
    }

    async fn projection_run(&self, id: i64) -> anyhow::Result<Option<ProjectionRun>> {
        Ok(self.runs.iter().find(|r| r.id == id).cloned())
    }

    async fn scenario_ids(&self) -> anyhow::Result<Vec<i64>> {
        Ok(self.scenarios.iter().map(|s| s.id).collect())
    }

    async fn create_projection_run(&self, _scenario_id: i64) -> anyhow::Result<i64> {
        Ok(1)
    }

    async fn create_scenario(&self, _scenario: &Scenario) -> anyhow::Result<i64> {
        Ok(1)
    }
}

#[derive(Default)]
pub struct FakePlanning {
    pub planned_harvest: bool,
    pub planned_transfer: bool,
}

#[async_trait]
impl PlanningRepository for FakePlanning {
    async fn has_pending_activity(
        &self,
        _batch_id: i64,
        kind: PlannedActivityKind,
    ) -> anyhow::Result<bool> {
        Ok(match kind {
            PlannedActivityKind::Harvest => self.planned_harvest,
            PlannedActivityKind::Transfer => self.planned_transfer,
        })
    }
}
