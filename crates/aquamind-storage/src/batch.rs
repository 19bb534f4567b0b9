use crate::error::{Result as StorageResult, StorageError};
use crate::models::{date_str, parse_date, parse_stage, AssignmentRow, BatchRow, ScenarioRow};
use aquamind_core::domain::*;
use aquamind_core::ports::BatchRepository;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use sqlx::{query, query_as, Row, SqlitePool};
use std::collections::HashMap;

pub struct SqliteBatchRepository {
    pool: SqlitePool,
}

impl SqliteBatchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_profile(&self, profile_id: i64) -> StorageResult<Option<TemperatureProfile>> {
        let Some(row) = query("SELECT id, name FROM temperature_profiles WHERE id = ?")
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let readings = query(
            "SELECT day_number, temperature_c FROM profile_readings
             WHERE profile_id = ? ORDER BY day_number",
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| ProfileReading {
            day_number: r.get("day_number"),
            temperature_c: r.get("temperature_c"),
        })
        .collect();

        Ok(Some(TemperatureProfile::new(
            row.get("id"),
            row.get::<String, _>("name"),
            readings,
        )))
    }

    async fn load_tgc_model(&self, id: i64) -> StorageResult<TgcModel> {
        let row = query(
            "SELECT id, name, tgc_value, exponent_n, exponent_m, profile_id
             FROM tgc_models WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::corrupt(format!("tgc model {} missing", id)))?;

        let profile = match row.get::<Option<i64>, _>("profile_id") {
            Some(profile_id) => self.load_profile(profile_id).await?,
            None => None,
        };

        let mut stage_overrides = HashMap::new();
        for o in query(
            "SELECT lifecycle_stage, tgc_value FROM tgc_stage_overrides WHERE tgc_model_id = ?",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        {
            stage_overrides.insert(
                parse_stage(&o.get::<String, _>("lifecycle_stage"))?,
                o.get::<f64, _>("tgc_value"),
            );
        }

        Ok(TgcModel {
            id: row.get("id"),
            name: row.get("name"),
            tgc_value: row.get("tgc_value"),
            exponent_n: row.get("exponent_n"),
            exponent_m: row.get("exponent_m"),
            profile,
            stage_overrides,
        })
    }

    async fn load_fcr_model(&self, id: i64) -> StorageResult<FcrModel> {
        let row = query("SELECT id, name FROM fcr_models WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::corrupt(format!("fcr model {} missing", id)))?;

        let stage_rows = query(
            "SELECT id, lifecycle_stage, fcr_value, duration_days
             FROM fcr_model_stages WHERE fcr_model_id = ?
             ORDER BY position, id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut stages = Vec::with_capacity(stage_rows.len());
        for s in stage_rows {
            let stage_id: i64 = s.get("id");
            let overrides = query(
                "SELECT min_weight_g, max_weight_g, fcr_value
                 FROM fcr_weight_overrides WHERE fcr_model_stage_id = ?
                 ORDER BY min_weight_g",
            )
            .bind(stage_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|o| FcrWeightBand {
                min_weight_g: o.get("min_weight_g"),
                max_weight_g: o.get("max_weight_g"),
                fcr_value: o.get("fcr_value"),
            })
            .collect();

            stages.push(FcrStage {
                stage: parse_stage(&s.get::<String, _>("lifecycle_stage"))?,
                fcr_value: s.get("fcr_value"),
                duration_days: s.get("duration_days"),
                overrides,
            });
        }

        Ok(FcrModel {
            id: row.get("id"),
            name: row.get("name"),
            stages,
        })
    }

    async fn load_mortality_model(&self, id: i64) -> StorageResult<MortalityModel> {
        let row = query("SELECT id, name, frequency, rate_percent FROM mortality_models WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::corrupt(format!("mortality model {} missing", id)))?;

        let mut stage_overrides = HashMap::new();
        for o in query(
            "SELECT lifecycle_stage, daily_rate_percent, weekly_rate_percent
             FROM mortality_stage_overrides WHERE mortality_model_id = ?",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        {
            stage_overrides.insert(
                parse_stage(&o.get::<String, _>("lifecycle_stage"))?,
                MortalityStageOverride {
                    daily_rate_percent: o.get("daily_rate_percent"),
                    weekly_rate_percent: o.get("weekly_rate_percent"),
                },
            );
        }

        Ok(MortalityModel {
            id: row.get("id"),
            name: row.get("name"),
            frequency: RateFrequency::parse(&row.get::<String, _>("frequency"))
                .map_err(StorageError::corrupt)?,
            rate_percent: row.get("rate_percent"),
            stage_overrides,
        })
    }

    async fn load_constraints(&self, id: i64) -> StorageResult<Option<BiologicalConstraints>> {
        let Some(row) = query("SELECT id, name FROM biological_constraints WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let mut stages = HashMap::new();
        for s in query(
            "SELECT lifecycle_stage, min_weight_g, max_weight_g
             FROM stage_constraints WHERE constraint_set_id = ?",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        {
            stages.insert(
                parse_stage(&s.get::<String, _>("lifecycle_stage"))?,
                StageConstraint {
                    min_weight_g: s.get("min_weight_g"),
                    max_weight_g: s.get("max_weight_g"),
                },
            );
        }

        Ok(Some(BiologicalConstraints {
            id: row.get("id"),
            name: row.get("name"),
            stages,
        }))
    }

    /// Assemble the full scenario aggregate: models, profile, constraints
    /// and scheduled model changes.
    async fn assemble_scenario(&self, row: ScenarioRow) -> StorageResult<Scenario> {
        let tgc_model = self.load_tgc_model(row.tgc_model_id).await?;
        let fcr_model = self.load_fcr_model(row.fcr_model_id).await?;
        let mortality_model = self.load_mortality_model(row.mortality_model_id).await?;

        let biological_constraints = match row.biological_constraints_id {
            Some(id) => self.load_constraints(id).await?,
            None => None,
        };

        let change_rows = query(
            "SELECT change_day, new_tgc_model_id, new_fcr_model_id, new_mortality_model_id
             FROM scenario_model_changes WHERE scenario_id = ?
             ORDER BY change_day",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let mut model_changes = Vec::with_capacity(change_rows.len());
        for c in change_rows {
            let new_tgc_model = match c.get::<Option<i64>, _>("new_tgc_model_id") {
                Some(id) => Some(self.load_tgc_model(id).await?),
                None => None,
            };
            let new_fcr_model = match c.get::<Option<i64>, _>("new_fcr_model_id") {
                Some(id) => Some(self.load_fcr_model(id).await?),
                None => None,
            };
            let new_mortality_model = match c.get::<Option<i64>, _>("new_mortality_model_id") {
                Some(id) => Some(self.load_mortality_model(id).await?),
                None => None,
            };

            model_changes.push(ScenarioModelChange {
                change_day: c.get("change_day"),
                new_tgc_model,
                new_fcr_model,
                new_mortality_model,
            });
        }

        Ok(Scenario {
            id: row.id,
            name: row.name,
            start_date: parse_date(&row.start_date)?,
            duration_days: row.duration_days,
            initial_count: row.initial_count,
            initial_weight_g: row.initial_weight_g,
            tgc_model,
            fcr_model,
            mortality_model,
            biological_constraints,
            batch_id: row.batch_id,
            model_changes,
        })
    }

    async fn scenario_row(&self, id: i64) -> StorageResult<Option<ScenarioRow>> {
        Ok(query_as::<_, ScenarioRow>(
            "SELECT id, name, start_date, duration_days, initial_count, initial_weight_g,
                    tgc_model_id, fcr_model_id, mortality_model_id,
                    biological_constraints_id, batch_id
             FROM scenarios WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl BatchRepository for SqliteBatchRepository {
    async fn batch(&self, id: i64) -> anyhow::Result<Option<Batch>> {
        let row = query_as::<_, BatchRow>(
            "SELECT id, batch_number, species, start_date, actual_end_date, status,
                    pinned_scenario_id, pinned_projection_run_id
             FROM batches WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain().map_err(Into::into)).transpose()
    }

    async fn assignment(&self, id: i64) -> anyhow::Result<Option<Assignment>> {
        let row = query_as::<_, AssignmentRow>(
            "SELECT id, batch_id, container_id, lifecycle_stage, assignment_date,
                    departure_date, population_count, avg_weight_g, biomass_kg, is_active
             FROM assignments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain().map_err(Into::into)).transpose()
    }

    async fn assignments_for_batch(
        &self,
        batch_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<Assignment>> {
        let rows = query_as::<_, AssignmentRow>(
            "SELECT id, batch_id, container_id, lifecycle_stage, assignment_date,
                    departure_date, population_count, avg_weight_g, biomass_kg, is_active
             FROM assignments
             WHERE batch_id = ? AND assignment_date <= ?
               AND (departure_date IS NULL OR departure_date >= ?)
             ORDER BY assignment_date, id",
        )
        .bind(batch_id)
        .bind(date_str(end))
        .bind(date_str(start))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_domain().map_err(Into::into))
            .collect()
    }

    async fn active_batches(&self, batch_id: Option<i64>) -> anyhow::Result<Vec<Batch>> {
        let rows = match batch_id {
            Some(id) => {
                query_as::<_, BatchRow>(
                    "SELECT id, batch_number, species, start_date, actual_end_date, status,
                            pinned_scenario_id, pinned_projection_run_id
                     FROM batches WHERE status = 'ACTIVE' AND id = ?",
                )
                .bind(id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                query_as::<_, BatchRow>(
                    "SELECT id, batch_number, species, start_date, actual_end_date, status,
                            pinned_scenario_id, pinned_projection_run_id
                     FROM batches WHERE status = 'ACTIVE' ORDER BY id",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter()
            .map(|r| r.into_domain().map_err(Into::into))
            .collect()
    }

    async fn scenario(&self, id: i64) -> anyhow::Result<Option<Scenario>> {
        match self.scenario_row(id).await? {
            Some(row) => Ok(Some(self.assemble_scenario(row).await?)),
            None => Ok(None),
        }
    }

    /// Pinned projection run's scenario first, then the pinned scenario,
    /// then the first scenario attached to the batch.
    async fn scenario_for_batch(&self, batch_id: i64) -> anyhow::Result<Option<Scenario>> {
        let Some(batch) = self.batch(batch_id).await? else {
            return Ok(None);
        };

        if let Some(run_id) = batch.pinned_projection_run_id {
            if let Some(run) = self.projection_run(run_id).await? {
                if let Some(scenario) = self.scenario(run.scenario_id).await? {
                    return Ok(Some(scenario));
                }
            }
        }

        if let Some(scenario_id) = batch.pinned_scenario_id {
            if let Some(scenario) = self.scenario(scenario_id).await? {
                return Ok(Some(scenario));
            }
        }

        let attached = query("SELECT id FROM scenarios WHERE batch_id = ? ORDER BY id LIMIT 1")
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;

        match attached {
            Some(row) => self.scenario(row.get("id")).await,
            None => Ok(None),
        }
    }

    async fn projection_run(&self, id: i64) -> anyhow::Result<Option<ProjectionRun>> {
        let row = query("SELECT id, scenario_id, run_at FROM projection_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| ProjectionRun {
            id: r.get("id"),
            scenario_id: r.get("scenario_id"),
            run_at: Utc
                .timestamp_millis_opt(r.get::<i64, _>("run_at"))
                .single()
                .unwrap_or_else(Utc::now),
        }))
    }

    async fn create_projection_run(&self, scenario_id: i64) -> anyhow::Result<i64> {
        let result = query("INSERT INTO projection_runs (scenario_id, run_at) VALUES (?, ?)")
            .bind(scenario_id)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn scenario_ids(&self) -> anyhow::Result<Vec<i64>> {
        let rows = query("SELECT id FROM scenarios ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("id")).collect())
    }

    /// Persist a scenario aggregate: models are written first, then the
    /// scenario row and its model changes, all in one transaction.
    async fn create_scenario(&self, scenario: &Scenario) -> anyhow::Result<i64> {
        let mut tx = self.pool.begin().await?;

        let tgc_model_id = insert_tgc_model(&mut tx, &scenario.tgc_model).await?;
        let fcr_model_id = insert_fcr_model(&mut tx, &scenario.fcr_model).await?;
        let mortality_model_id = insert_mortality_model(&mut tx, &scenario.mortality_model).await?;

        let constraints_id = match &scenario.biological_constraints {
            Some(constraints) => Some(insert_constraints(&mut tx, constraints).await?),
            None => None,
        };

        let result = query(
            "INSERT INTO scenarios
             (name, start_date, duration_days, initial_count, initial_weight_g,
              tgc_model_id, fcr_model_id, mortality_model_id, biological_constraints_id, batch_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&scenario.name)
        .bind(date_str(scenario.start_date))
        .bind(scenario.duration_days)
        .bind(scenario.initial_count)
        .bind(scenario.initial_weight_g)
        .bind(tgc_model_id)
        .bind(fcr_model_id)
        .bind(mortality_model_id)
        .bind(constraints_id)
        .bind(scenario.batch_id)
        .execute(&mut *tx)
        .await?;
        let scenario_id = result.last_insert_rowid();

        for change in &scenario.model_changes {
            let new_tgc = match &change.new_tgc_model {
                Some(m) => Some(insert_tgc_model(&mut tx, m).await?),
                None => None,
            };
            let new_fcr = match &change.new_fcr_model {
                Some(m) => Some(insert_fcr_model(&mut tx, m).await?),
                None => None,
            };
            let new_mortality = match &change.new_mortality_model {
                Some(m) => Some(insert_mortality_model(&mut tx, m).await?),
                None => None,
            };

            query(
                "INSERT INTO scenario_model_changes
                 (scenario_id, change_day, new_tgc_model_id, new_fcr_model_id, new_mortality_model_id)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(scenario_id)
            .bind(change.change_day)
            .bind(new_tgc)
            .bind(new_fcr)
            .bind(new_mortality)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(scenario_id)
    }
}

type Tx<'a> = sqlx::Transaction<'a, sqlx::Sqlite>;

async fn insert_tgc_model(tx: &mut Tx<'_>, model: &TgcModel) -> anyhow::Result<i64> {
    let profile_id = match &model.profile {
        Some(profile) => {
            let result = query("INSERT INTO temperature_profiles (name) VALUES (?)")
                .bind(&profile.name)
                .execute(&mut **tx)
                .await?;
            let id = result.last_insert_rowid();
            for reading in profile.readings() {
                query(
                    "INSERT INTO profile_readings (profile_id, day_number, temperature_c)
                     VALUES (?, ?, ?)",
                )
                .bind(id)
                .bind(reading.day_number)
                .bind(reading.temperature_c)
                .execute(&mut **tx)
                .await?;
            }
            Some(id)
        }
        None => None,
    };

    let result = query(
        "INSERT INTO tgc_models (name, tgc_value, exponent_n, exponent_m, profile_id)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&model.name)
    .bind(model.tgc_value)
    .bind(model.exponent_n)
    .bind(model.exponent_m)
    .bind(profile_id)
    .execute(&mut **tx)
    .await?;
    let model_id = result.last_insert_rowid();

    for (stage, value) in &model.stage_overrides {
        query(
            "INSERT INTO tgc_stage_overrides (tgc_model_id, lifecycle_stage, tgc_value)
             VALUES (?, ?, ?)",
        )
        .bind(model_id)
        .bind(stage.as_str())
        .bind(value)
        .execute(&mut **tx)
        .await?;
    }

    Ok(model_id)
}

async fn insert_fcr_model(tx: &mut Tx<'_>, model: &FcrModel) -> anyhow::Result<i64> {
    let result = query("INSERT INTO fcr_models (name) VALUES (?)")
        .bind(&model.name)
        .execute(&mut **tx)
        .await?;
    let model_id = result.last_insert_rowid();

    for (position, stage) in model.stages.iter().enumerate() {
        let stage_result = query(
            "INSERT INTO fcr_model_stages
             (fcr_model_id, lifecycle_stage, fcr_value, duration_days, position)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(model_id)
        .bind(stage.stage.as_str())
        .bind(stage.fcr_value)
        .bind(stage.duration_days)
        .bind(position as i64)
        .execute(&mut **tx)
        .await?;
        let stage_id = stage_result.last_insert_rowid();

        for band in &stage.overrides {
            query(
                "INSERT INTO fcr_weight_overrides
                 (fcr_model_stage_id, min_weight_g, max_weight_g, fcr_value)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(stage_id)
            .bind(band.min_weight_g)
            .bind(band.max_weight_g)
            .bind(band.fcr_value)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(model_id)
}

async fn insert_mortality_model(tx: &mut Tx<'_>, model: &MortalityModel) -> anyhow::Result<i64> {
    let result = query(
        "INSERT INTO mortality_models (name, frequency, rate_percent) VALUES (?, ?, ?)",
    )
    .bind(&model.name)
    .bind(model.frequency.as_str())
    .bind(model.rate_percent)
    .execute(&mut **tx)
    .await?;
    let model_id = result.last_insert_rowid();

    for (stage, o) in &model.stage_overrides {
        query(
            "INSERT INTO mortality_stage_overrides
             (mortality_model_id, lifecycle_stage, daily_rate_percent, weekly_rate_percent)
             VALUES (?, ?, ?, ?)",
        )
        .bind(model_id)
        .bind(stage.as_str())
        .bind(o.daily_rate_percent)
        .bind(o.weekly_rate_percent)
        .execute(&mut **tx)
        .await?;
    }

    Ok(model_id)
}

async fn insert_constraints(
    tx: &mut Tx<'_>,
    constraints: &BiologicalConstraints,
) -> anyhow::Result<i64> {
    let result = query("INSERT INTO biological_constraints (name) VALUES (?)")
        .bind(&constraints.name)
        .execute(&mut **tx)
        .await?;
    let id = result.last_insert_rowid();

    for (stage, c) in &constraints.stages {
        query(
            "INSERT INTO stage_constraints
             (constraint_set_id, lifecycle_stage, min_weight_g, max_weight_g)
             VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(stage.as_str())
        .bind(c.min_weight_g)
        .bind(c.max_weight_g)
        .execute(&mut **tx)
        .await?;
    }

    Ok(id)
}
