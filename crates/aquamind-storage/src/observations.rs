use crate::models::{date_str, parse_date, GrowthSampleRow, TransferRow};
use aquamind_core::domain::{
    EnvironmentalReading, FeedingEvent, GrowthSample, MortalityAllocation, MortalityApplication,
    MortalityEvent, TransferAction, Treatment,
};
use aquamind_core::ports::ObservationRepository;
use aquamind_core::services::distribute_mortality;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{query, query_as, Row, SqlitePool};
use std::collections::HashMap;

pub struct SqliteObservationRepository {
    pool: SqlitePool,
}

impl SqliteObservationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ObservationRepository for SqliteObservationRepository {
    async fn growth_samples(
        &self,
        assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<GrowthSample>> {
        let rows = query_as::<_, GrowthSampleRow>(
            "SELECT id, assignment_id, sample_date, avg_weight_g, sample_size
             FROM growth_samples
             WHERE assignment_id = ? AND sample_date >= ? AND sample_date <= ?
               AND avg_weight_g IS NOT NULL
             ORDER BY sample_date",
        )
        .bind(assignment_id)
        .bind(date_str(start))
        .bind(date_str(end))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_domain().map_err(Into::into))
            .collect()
    }

    async fn completed_transfers_out(
        &self,
        source_assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<TransferAction>> {
        let rows = query_as::<_, TransferRow>(
            "SELECT id, source_assignment_id, dest_assignment_id, status,
                    actual_execution_date, transferred_count, measured_avg_weight_g,
                    selection_method
             FROM transfer_actions
             WHERE source_assignment_id = ? AND status = 'COMPLETED'
               AND actual_execution_date >= ? AND actual_execution_date <= ?
             ORDER BY actual_execution_date",
        )
        .bind(source_assignment_id)
        .bind(date_str(start))
        .bind(date_str(end))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_domain().map_err(Into::into))
            .collect()
    }

    async fn completed_transfers_in(
        &self,
        dest_assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<TransferAction>> {
        let rows = query_as::<_, TransferRow>(
            "SELECT id, source_assignment_id, dest_assignment_id, status,
                    actual_execution_date, transferred_count, measured_avg_weight_g,
                    selection_method
             FROM transfer_actions
             WHERE dest_assignment_id = ? AND status = 'COMPLETED'
               AND actual_execution_date >= ? AND actual_execution_date <= ?
             ORDER BY actual_execution_date",
        )
        .bind(dest_assignment_id)
        .bind(date_str(start))
        .bind(date_str(end))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_domain().map_err(Into::into))
            .collect()
    }

    async fn transfer_into(
        &self,
        dest_assignment_id: i64,
    ) -> anyhow::Result<Option<TransferAction>> {
        let row = query_as::<_, TransferRow>(
            "SELECT id, source_assignment_id, dest_assignment_id, status,
                    actual_execution_date, transferred_count, measured_avg_weight_g,
                    selection_method
             FROM transfer_actions
             WHERE dest_assignment_id = ? AND status = 'COMPLETED'
             ORDER BY actual_execution_date
             LIMIT 1",
        )
        .bind(dest_assignment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain().map_err(Into::into)).transpose()
    }

    async fn treatment_weighings(
        &self,
        assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<(NaiveDate, f64)>> {
        let rows = query(
            "SELECT treatment_date, sampled_avg_weight_g
             FROM treatments
             WHERE assignment_id = ? AND includes_weighing = 1
               AND sampled_avg_weight_g IS NOT NULL
               AND treatment_date >= ? AND treatment_date <= ?
             ORDER BY treatment_date",
        )
        .bind(assignment_id)
        .bind(date_str(start))
        .bind(date_str(end))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let date: String = row.get("treatment_date");
                let weight: f64 = row.get("sampled_avg_weight_g");
                Ok((parse_date(&date)?, weight))
            })
            .collect::<crate::error::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    async fn daily_mean_temperatures(
        &self,
        container_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<HashMap<NaiveDate, f64>> {
        let rows = query(
            "SELECT reading_date, AVG(value) AS mean_value
             FROM environmental_readings
             WHERE container_id = ? AND parameter = 'temperature'
               AND reading_date >= ? AND reading_date <= ?
             GROUP BY reading_date",
        )
        .bind(container_id)
        .bind(date_str(start))
        .bind(date_str(end))
        .fetch_all(&self.pool)
        .await?;

        let mut temps = HashMap::with_capacity(rows.len());
        for row in rows {
            let date: String = row.get("reading_date");
            let mean: f64 = row.get("mean_value");
            temps.insert(parse_date(&date)?, mean);
        }
        Ok(temps)
    }

    async fn mortality_totals(
        &self,
        assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<HashMap<NaiveDate, i64>> {
        let rows = query(
            "SELECT e.event_date AS event_date, SUM(a.count) AS total
             FROM mortality_allocations a
             JOIN mortality_events e ON e.id = a.event_id
             WHERE a.assignment_id = ? AND e.event_date >= ? AND e.event_date <= ?
             GROUP BY e.event_date",
        )
        .bind(assignment_id)
        .bind(date_str(start))
        .bind(date_str(end))
        .fetch_all(&self.pool)
        .await?;

        let mut totals = HashMap::with_capacity(rows.len());
        for row in rows {
            let date: String = row.get("event_date");
            let total: i64 = row.get("total");
            totals.insert(parse_date(&date)?, total);
        }
        Ok(totals)
    }

    async fn feeding_totals(
        &self,
        container_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<HashMap<NaiveDate, f64>> {
        let rows = query(
            "SELECT feeding_date, SUM(amount_kg) AS total
             FROM feeding_events
             WHERE container_id = ? AND feeding_date >= ? AND feeding_date <= ?
             GROUP BY feeding_date",
        )
        .bind(container_id)
        .bind(date_str(start))
        .bind(date_str(end))
        .fetch_all(&self.pool)
        .await?;

        let mut totals = HashMap::with_capacity(rows.len());
        for row in rows {
            let date: String = row.get("feeding_date");
            let total: f64 = row.get("total");
            totals.insert(parse_date(&date)?, total);
        }
        Ok(totals)
    }

    async fn insert_growth_sample(&self, sample: &GrowthSample) -> anyhow::Result<i64> {
        let result = query(
            "INSERT INTO growth_samples (assignment_id, sample_date, avg_weight_g, sample_size)
             VALUES (?, ?, ?, ?)",
        )
        .bind(sample.assignment_id)
        .bind(date_str(sample.sample_date))
        .bind(sample.avg_weight_g)
        .bind(sample.sample_size)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Insert the event and distribute its count across the batch's active
    /// assignments in one transaction. SQLite's single-writer transaction is
    /// the lock; the distribution arithmetic lives in the core.
    async fn apply_mortality_event(
        &self,
        event: &MortalityEvent,
    ) -> anyhow::Result<MortalityApplication> {
        let mut tx = self.pool.begin().await?;

        let result = query(
            "INSERT INTO mortality_events (batch_id, container_id, event_date, count, biomass_kg, cause)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(event.batch_id)
        .bind(event.container_id)
        .bind(date_str(event.event_date))
        .bind(event.count)
        .bind(event.biomass_kg)
        .bind(&event.cause)
        .execute(&mut *tx)
        .await?;
        let event_id = result.last_insert_rowid();

        let rows = match event.container_id {
            Some(container_id) => {
                query("SELECT id, population_count FROM assignments
                       WHERE batch_id = ? AND is_active = 1 AND container_id = ?
                       ORDER BY id")
                    .bind(event.batch_id)
                    .bind(container_id)
                    .fetch_all(&mut *tx)
                    .await?
            }
            None => {
                query("SELECT id, population_count FROM assignments
                       WHERE batch_id = ? AND is_active = 1
                       ORDER BY id")
                    .bind(event.batch_id)
                    .fetch_all(&mut *tx)
                    .await?
            }
        };

        let populations: Vec<(i64, i64)> = rows
            .iter()
            .map(|row| (row.get::<i64, _>("id"), row.get::<i64, _>("population_count")))
            .collect();

        if populations.is_empty() {
            tracing::warn!(
                event_id,
                batch_id = event.batch_id,
                "No active assignments for mortality event"
            );
            tx.commit().await?;
            return Ok(MortalityApplication {
                event_id,
                allocations: vec![],
                total_requested: event.count,
                total_applied: 0,
                over_subscribed: false,
            });
        }

        let total_population: i64 = populations.iter().map(|(_, p)| p).sum();
        let over_subscribed = event.count > total_population;
        if over_subscribed {
            tracing::error!(
                event_id,
                count = event.count,
                total_population,
                "Mortality event exceeds available population; clamping"
            );
        }

        let portions = distribute_mortality(event.count, &populations);
        let mut allocations = Vec::with_capacity(portions.len());
        let mut total_applied = 0;

        for ((assignment_id, portion), (_, population)) in portions.iter().zip(&populations) {
            if *portion == 0 {
                continue;
            }
            total_applied += portion;
            let new_population = population - portion;
            let closed = new_population == 0;

            if closed {
                // A depleted assignment is closed on the event date; an
                // already-set departure date is kept.
                query(
                    "UPDATE assignments
                     SET population_count = 0, biomass_kg = 0, is_active = 0,
                         departure_date = COALESCE(departure_date, ?)
                     WHERE id = ?",
                )
                .bind(date_str(event.event_date))
                .bind(assignment_id)
                .execute(&mut *tx)
                .await?;
            } else {
                query(
                    "UPDATE assignments
                     SET population_count = ?,
                         biomass_kg = ? * COALESCE(avg_weight_g, 0) / 1000.0
                     WHERE id = ?",
                )
                .bind(new_population)
                .bind(new_population as f64)
                .bind(assignment_id)
                .execute(&mut *tx)
                .await?;
            }

            query(
                "INSERT INTO mortality_allocations (event_id, assignment_id, count)
                 VALUES (?, ?, ?)",
            )
            .bind(event_id)
            .bind(assignment_id)
            .bind(portion)
            .execute(&mut *tx)
            .await?;

            allocations.push(MortalityAllocation {
                assignment_id: *assignment_id,
                count: *portion,
                closed,
            });
        }

        tx.commit().await?;

        Ok(MortalityApplication {
            event_id,
            allocations,
            total_requested: event.count,
            total_applied,
            over_subscribed,
        })
    }

    async fn insert_treatment(&self, treatment: &Treatment) -> anyhow::Result<i64> {
        let result = query(
            "INSERT INTO treatments
             (assignment_id, treatment_date, includes_weighing, sampled_avg_weight_g, description)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(treatment.assignment_id)
        .bind(date_str(treatment.treatment_date))
        .bind(treatment.includes_weighing as i64)
        .bind(treatment.sampled_avg_weight_g)
        .bind(&treatment.description)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_transfer(&self, transfer: &TransferAction) -> anyhow::Result<i64> {
        let result = query(
            "INSERT INTO transfer_actions
             (source_assignment_id, dest_assignment_id, status, actual_execution_date,
              transferred_count, measured_avg_weight_g, selection_method)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(transfer.source_assignment_id)
        .bind(transfer.dest_assignment_id)
        .bind(transfer.status.as_str())
        .bind(transfer.actual_execution_date.map(date_str))
        .bind(transfer.transferred_count)
        .bind(transfer.measured_avg_weight_g)
        .bind(transfer.selection_method.map(|m| m.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_environmental_reading(
        &self,
        reading: &EnvironmentalReading,
    ) -> anyhow::Result<i64> {
        let result = query(
            "INSERT INTO environmental_readings
             (container_id, parameter, reading_date, reading_time, value)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(reading.container_id)
        .bind(&reading.parameter)
        .bind(date_str(reading.reading_time.date_naive()))
        .bind(reading.reading_time.timestamp_millis())
        .bind(reading.value)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_feeding_event(&self, event: &FeedingEvent) -> anyhow::Result<i64> {
        let result = query(
            "INSERT INTO feeding_events
             (container_id, assignment_id, feeding_date, amount_kg, batch_biomass_kg)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.container_id)
        .bind(event.assignment_id)
        .bind(date_str(event.feeding_date))
        .bind(event.amount_kg)
        .bind(event.batch_biomass_kg)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}
