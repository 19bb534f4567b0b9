use aquamind_core::domain::*;
use aquamind_core::ports::{
    BatchRepository, ObservationRepository, PlanningRepository, StateRepository,
};
use aquamind_storage::{
    init_db, SqliteBatchRepository, SqliteObservationRepository, SqlitePlanningRepository,
    SqliteStateRepository,
};
use chrono::{NaiveDate, TimeZone};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tempfile::TempDir;

struct TestDb {
    pool: SqlitePool,
    // Held so the database file outlives the pool.
    _dir: TempDir,
}

async fn test_db() -> TestDb {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("aquamind.db");
    let pool = init_db(path.to_str().unwrap()).await.unwrap();
    TestDb { pool, _dir: dir }
}

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).unwrap()
}

async fn seed_batch(pool: &SqlitePool) -> i64 {
    sqlx::query(
        "INSERT INTO batches (batch_number, species, start_date, status)
         VALUES ('B2024-01', 'Atlantic salmon', '2024-01-01', 'ACTIVE')",
    )
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

async fn seed_container(pool: &SqlitePool, name: &str) -> i64 {
    sqlx::query("INSERT INTO containers (name, water_type) VALUES (?, 'seawater')")
        .bind(name)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

async fn seed_assignment(pool: &SqlitePool, batch_id: i64, container_id: i64, population: i64) -> i64 {
    sqlx::query(
        "INSERT INTO assignments
         (batch_id, container_id, lifecycle_stage, assignment_date, population_count,
          avg_weight_g, biomass_kg, is_active)
         VALUES (?, ?, 'post_smolt', '2024-01-01', ?, 200.0, ?, 1)",
    )
    .bind(batch_id)
    .bind(container_id)
    .bind(population)
    .bind(population as f64 * 0.2)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

fn daily_state(assignment_id: i64, batch_id: i64, container_id: i64, d: NaiveDate, weight: f64) -> DailyState {
    DailyState {
        assignment_id,
        batch_id,
        container_id,
        lifecycle_stage: LifecycleStage::PostSmolt,
        date: d,
        day_number: (d - date(1, 1)).num_days() + 1,
        avg_weight_g: weight,
        population: 10_000,
        biomass_kg: weight * 10.0,
        temp_c: Some(10.5),
        mortality_count: 3,
        feed_kg: 25.0,
        observed_fcr: Some(1.25),
        anchor_type: Some(AnchorKind::GrowthSample),
        provenance: StateProvenance {
            weight: Sourced::new(SourceTag::Measured, 1.0),
            temp: Sourced::new(SourceTag::Measured, 1.0),
            mortality: Sourced::new(SourceTag::Actual, 1.0),
            feed: Sourced::new(SourceTag::Actual, 1.0),
            fcr: Some(Sourced::new(SourceTag::Observed, 1.0)),
        },
    }
}

#[tokio::test]
async fn migrations_create_schema() {
    let db = test_db().await;
    let row = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='daily_states'")
        .fetch_optional(&db.pool)
        .await
        .unwrap();
    assert!(row.is_some(), "daily_states table should exist");
}

#[tokio::test]
async fn daily_state_upsert_round_trips_and_counts() {
    let db = test_db().await;
    let batch_id = seed_batch(&db.pool).await;
    let container_id = seed_container(&db.pool, "C-01").await;
    let assignment_id = seed_assignment(&db.pool, batch_id, container_id, 10_000).await;

    let repo = SqliteStateRepository::new(db.pool.clone());

    let states: Vec<DailyState> = (1..=5)
        .map(|d| daily_state(assignment_id, batch_id, container_id, date(1, d), 200.0 + d as f64))
        .collect();

    let counts = repo.upsert_daily_states(&states).await.unwrap();
    assert_eq!(counts.created, 5);
    assert_eq!(counts.updated, 0);

    // Second pass over the same window updates in place.
    let counts = repo.upsert_daily_states(&states).await.unwrap();
    assert_eq!(counts.created, 0);
    assert_eq!(counts.updated, 5);

    let loaded = repo
        .states_in_range(assignment_id, date(1, 1), date(1, 5))
        .await
        .unwrap();
    assert_eq!(loaded, states);

    let latest = repo.latest_state(assignment_id).await.unwrap().unwrap();
    assert_eq!(latest.date, date(1, 5));

    let before = repo
        .latest_state_before(assignment_id, date(1, 3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.date, date(1, 2));
}

#[tokio::test]
async fn mortality_distributes_proportionally() {
    let db = test_db().await;
    let batch_id = seed_batch(&db.pool).await;
    let c1 = seed_container(&db.pool, "C-01").await;
    let c2 = seed_container(&db.pool, "C-02").await;
    let a1 = seed_assignment(&db.pool, batch_id, c1, 1_000).await;
    let a2 = seed_assignment(&db.pool, batch_id, c2, 500).await;

    let repo = SqliteObservationRepository::new(db.pool.clone());

    let application = repo
        .apply_mortality_event(&MortalityEvent {
            id: 0,
            batch_id,
            container_id: None,
            event_date: date(3, 10),
            count: 300,
            biomass_kg: 60.0,
            cause: "disease".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(application.total_applied, 300);
    assert!(!application.over_subscribed);

    let by_id: HashMap<i64, i64> = application
        .allocations
        .iter()
        .map(|a| (a.assignment_id, a.count))
        .collect();
    assert_eq!(by_id[&a1], 200);
    assert_eq!(by_id[&a2], 100);

    let batches = SqliteBatchRepository::new(db.pool.clone());
    let a1_after = batches.assignment(a1).await.unwrap().unwrap();
    let a2_after = batches.assignment(a2).await.unwrap().unwrap();
    assert_eq!(a1_after.population_count, 800);
    assert!(a1_after.is_active);
    assert_eq!(a2_after.population_count, 400);
    assert!(a2_after.is_active);

    // Totals are queryable per assignment for assimilation.
    let totals = repo
        .mortality_totals(a1, date(3, 1), date(3, 31))
        .await
        .unwrap();
    assert_eq!(totals[&date(3, 10)], 200);
}

#[tokio::test]
async fn mortality_depletion_closes_assignment() {
    let db = test_db().await;
    let batch_id = seed_batch(&db.pool).await;
    let c1 = seed_container(&db.pool, "C-01").await;
    let a1 = seed_assignment(&db.pool, batch_id, c1, 100).await;

    let repo = SqliteObservationRepository::new(db.pool.clone());
    let application = repo
        .apply_mortality_event(&MortalityEvent {
            id: 0,
            batch_id,
            container_id: None,
            event_date: date(4, 2),
            count: 100,
            biomass_kg: 20.0,
            cause: "oxygen crash".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(application.total_applied, 100);
    assert!(application.allocations[0].closed);

    let batches = SqliteBatchRepository::new(db.pool.clone());
    let after = batches.assignment(a1).await.unwrap().unwrap();
    assert_eq!(after.population_count, 0);
    assert!(!after.is_active);
    assert_eq!(after.departure_date, Some(date(4, 2)));
}

#[tokio::test]
async fn mortality_over_subscription_clamps() {
    let db = test_db().await;
    let batch_id = seed_batch(&db.pool).await;
    let c1 = seed_container(&db.pool, "C-01").await;
    seed_assignment(&db.pool, batch_id, c1, 50).await;

    let repo = SqliteObservationRepository::new(db.pool.clone());
    let application = repo
        .apply_mortality_event(&MortalityEvent {
            id: 0,
            batch_id,
            container_id: None,
            event_date: date(4, 2),
            count: 500,
            biomass_kg: 10.0,
            cause: "".to_string(),
        })
        .await
        .unwrap();

    assert!(application.over_subscribed);
    assert_eq!(application.total_applied, 50);
}

#[tokio::test]
async fn container_scoped_mortality_leaves_other_containers_alone() {
    let db = test_db().await;
    let batch_id = seed_batch(&db.pool).await;
    let c1 = seed_container(&db.pool, "C-01").await;
    let c2 = seed_container(&db.pool, "C-02").await;
    let a1 = seed_assignment(&db.pool, batch_id, c1, 1_000).await;
    let a2 = seed_assignment(&db.pool, batch_id, c2, 500).await;

    let repo = SqliteObservationRepository::new(db.pool.clone());
    repo.apply_mortality_event(&MortalityEvent {
        id: 0,
        batch_id,
        container_id: Some(c1),
        event_date: date(5, 1),
        count: 200,
        biomass_kg: 40.0,
        cause: "".to_string(),
    })
    .await
    .unwrap();

    let batches = SqliteBatchRepository::new(db.pool.clone());
    assert_eq!(batches.assignment(a1).await.unwrap().unwrap().population_count, 800);
    assert_eq!(batches.assignment(a2).await.unwrap().unwrap().population_count, 500);
}

#[tokio::test]
async fn observation_reads_aggregate_per_day() {
    let db = test_db().await;
    let batch_id = seed_batch(&db.pool).await;
    let c1 = seed_container(&db.pool, "C-01").await;
    let a1 = seed_assignment(&db.pool, batch_id, c1, 10_000).await;

    let repo = SqliteObservationRepository::new(db.pool.clone());

    // Two readings on one day average out.
    for (hour, value) in [(6, 9.0), (18, 11.0)] {
        let reading_time = chrono::Utc
            .with_ymd_and_hms(2024, 2, 3, hour, 0, 0)
            .unwrap();
        repo.insert_environmental_reading(&EnvironmentalReading {
            id: 0,
            container_id: c1,
            parameter: "temperature".to_string(),
            reading_time,
            value,
        })
        .await
        .unwrap();
    }

    let temps = repo
        .daily_mean_temperatures(c1, date(2, 1), date(2, 28))
        .await
        .unwrap();
    assert_eq!(temps[&date(2, 3)], 10.0);

    // Feeding sums per day.
    for amount in [10.0, 15.5] {
        repo.insert_feeding_event(&FeedingEvent {
            id: 0,
            container_id: c1,
            assignment_id: Some(a1),
            feeding_date: date(2, 3),
            amount_kg: amount,
            batch_biomass_kg: None,
        })
        .await
        .unwrap();
    }
    let feed = repo.feeding_totals(c1, date(2, 1), date(2, 28)).await.unwrap();
    assert!((feed[&date(2, 3)] - 25.5).abs() < 1e-9);

    // Growth samples and treatment weighings come back in window order.
    repo.insert_growth_sample(&GrowthSample {
        id: 0,
        assignment_id: a1,
        sample_date: date(2, 4),
        avg_weight_g: Some(210.0),
        sample_size: Some(30),
    })
    .await
    .unwrap();
    let samples = repo.growth_samples(a1, date(2, 1), date(2, 28)).await.unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].avg_weight_g, Some(210.0));

    repo.insert_treatment(&Treatment {
        id: 0,
        assignment_id: a1,
        treatment_date: date(2, 6),
        includes_weighing: true,
        sampled_avg_weight_g: Some(215.0),
        description: "vaccination".to_string(),
    })
    .await
    .unwrap();
    let weighings = repo
        .treatment_weighings(a1, date(2, 1), date(2, 28))
        .await
        .unwrap();
    assert_eq!(weighings, vec![(date(2, 6), 215.0)]);
}

#[tokio::test]
async fn live_projection_generations_replace_idempotently() {
    let db = test_db().await;
    let batch_id = seed_batch(&db.pool).await;
    let c1 = seed_container(&db.pool, "C-01").await;
    let a1 = seed_assignment(&db.pool, batch_id, c1, 10_000).await;

    let repo = SqliteStateRepository::new(db.pool.clone());

    let projection = |offset: i64, weight: f64| LiveForwardProjection {
        assignment_id: a1,
        batch_id,
        container_id: c1,
        computed_date: date(6, 1),
        projection_date: date(6, 1) + chrono::Days::new(offset as u64),
        day_number: 150 + offset,
        projected_weight_g: weight,
        projected_population: 10_000,
        projected_biomass_kg: weight * 10.0,
        temperature_used_c: 10.0,
        tgc_value_used: 2.5,
        temp_profile_id: None,
        temp_profile_name: "P".to_string(),
        temp_bias_c: 0.5,
        temp_bias_window_days: 10,
        temp_bias_clamp_min_c: -2.0,
        temp_bias_clamp_max_c: 2.0,
    };

    let first = vec![projection(1, 205.0), projection(2, 210.0), projection(3, 215.0)];
    repo.replace_live_projections(a1, date(6, 1), &first).await.unwrap();

    // Rewriting the same generation replaces rather than accumulates.
    let second = vec![projection(1, 206.0), projection(2, 211.0)];
    repo.replace_live_projections(a1, date(6, 1), &second).await.unwrap();

    let loaded = repo.live_projections(a1, date(6, 1)).await.unwrap();
    assert_eq!(loaded, second);

    // Old generations can be pruned away.
    repo.replace_live_projections(a1, date(3, 1), &[projection(1, 180.0)])
        .await
        .unwrap();
    let deleted = repo.prune_live_projections(a1, date(5, 1)).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(repo.live_projections(a1, date(3, 1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn forecast_summary_upserts() {
    let db = test_db().await;
    let batch_id = seed_batch(&db.pool).await;
    let c1 = seed_container(&db.pool, "C-01").await;
    let a1 = seed_assignment(&db.pool, batch_id, c1, 10_000).await;

    let repo = SqliteStateRepository::new(db.pool.clone());

    let mut summary = ContainerForecastSummary {
        assignment_id: a1,
        current_weight_g: 200.0,
        current_population: 10_000,
        current_biomass_kg: 2000.0,
        state_date: date(6, 1),
        state_day_number: 150,
        state_confidence: 0.4,
        projected_harvest_date: None,
        projected_harvest_weight_g: None,
        days_to_harvest: None,
        harvest_threshold_g: 5000.0,
        projected_transfer_date: Some(date(6, 21)),
        projected_transfer_weight_g: Some(101.2),
        days_to_transfer: Some(20),
        transfer_threshold_g: 100.0,
        original_harvest_date: None,
        harvest_variance_days: None,
        has_planned_harvest: false,
        has_planned_transfer: false,
        needs_planning_attention: true,
        temp_profile_name: "P".to_string(),
        temp_bias_c: 0.0,
        temp_bias_window_days: 0,
        computed_date: date(6, 1),
    };

    repo.upsert_forecast_summary(&summary).await.unwrap();
    summary.needs_planning_attention = false;
    summary.has_planned_transfer = true;
    repo.upsert_forecast_summary(&summary).await.unwrap();

    let loaded = repo.forecast_summary(a1).await.unwrap().unwrap();
    assert!(loaded.has_planned_transfer);
    assert!(!loaded.needs_planning_attention);
    assert_eq!(loaded.projected_transfer_date, Some(date(6, 21)));
}

#[tokio::test]
async fn scenario_aggregate_round_trips() {
    let db = test_db().await;
    let repo = SqliteBatchRepository::new(db.pool.clone());

    let scenario = Scenario {
        id: 0,
        name: "spring smolt".to_string(),
        start_date: date(4, 1),
        duration_days: 600,
        initial_count: 250_000,
        initial_weight_g: Some(85.0),
        tgc_model: TgcModel {
            id: 0,
            name: "north tgc".to_string(),
            tgc_value: 2.6,
            exponent_n: 1.0,
            exponent_m: 1.0 / 3.0,
            profile: Some(TemperatureProfile::new(
                0,
                "north profile",
                vec![
                    ProfileReading { day_number: 1, temperature_c: 7.5 },
                    ProfileReading { day_number: 180, temperature_c: 12.0 },
                ],
            )),
            stage_overrides: HashMap::from([(LifecycleStage::Adult, 2.9)]),
        },
        fcr_model: FcrModel {
            id: 0,
            name: "north fcr".to_string(),
            stages: vec![
                FcrStage {
                    stage: LifecycleStage::PostSmolt,
                    fcr_value: 1.1,
                    duration_days: Some(120),
                    overrides: vec![FcrWeightBand {
                        min_weight_g: 180.0,
                        max_weight_g: 300.0,
                        fcr_value: 1.05,
                    }],
                },
                FcrStage {
                    stage: LifecycleStage::Adult,
                    fcr_value: 1.3,
                    duration_days: Some(480),
                    overrides: vec![],
                },
            ],
        },
        mortality_model: MortalityModel {
            id: 0,
            name: "north mortality".to_string(),
            frequency: RateFrequency::Weekly,
            rate_percent: 0.4,
            stage_overrides: HashMap::from([(
                LifecycleStage::PostSmolt,
                MortalityStageOverride {
                    daily_rate_percent: Some(0.08),
                    weekly_rate_percent: None,
                },
            )]),
        },
        biological_constraints: Some(BiologicalConstraints {
            id: 0,
            name: "site limits".to_string(),
            stages: HashMap::from([(
                LifecycleStage::Smolt,
                StageConstraint {
                    min_weight_g: Some(60.0),
                    max_weight_g: Some(120.0),
                },
            )]),
        }),
        batch_id: None,
        model_changes: vec![ScenarioModelChange {
            change_day: 200,
            new_tgc_model: Some(TgcModel {
                id: 0,
                name: "winter tgc".to_string(),
                tgc_value: 2.1,
                exponent_n: 1.0,
                exponent_m: 1.0 / 3.0,
                profile: None,
                stage_overrides: HashMap::new(),
            }),
            new_fcr_model: None,
            new_mortality_model: None,
        }],
    };

    let id = repo.create_scenario(&scenario).await.unwrap();
    let loaded = repo.scenario(id).await.unwrap().unwrap();

    assert_eq!(loaded.name, "spring smolt");
    assert_eq!(loaded.duration_days, 600);
    assert_eq!(loaded.tgc_model.tgc_value, 2.6);
    assert_eq!(loaded.tgc_model.stage_overrides[&LifecycleStage::Adult], 2.9);
    let profile = loaded.tgc_model.profile.as_ref().unwrap();
    assert_eq!(profile.temperature_for_day(1), 7.5);
    assert_eq!(loaded.fcr_model.stages.len(), 2);
    assert_eq!(loaded.fcr_model.stages[0].overrides.len(), 1);
    assert_eq!(loaded.mortality_model.frequency, RateFrequency::Weekly);
    assert_eq!(
        loaded
            .biological_constraints
            .as_ref()
            .unwrap()
            .stages[&LifecycleStage::Smolt]
            .max_weight_g,
        Some(120.0)
    );
    assert_eq!(loaded.model_changes.len(), 1);
    assert_eq!(loaded.model_changes[0].change_day, 200);
    assert_eq!(
        loaded.model_changes[0].new_tgc_model.as_ref().unwrap().tgc_value,
        2.1
    );
}

#[tokio::test]
async fn planning_repository_checks_pending_activities() {
    let db = test_db().await;
    let batch_id = seed_batch(&db.pool).await;

    let repo = SqlitePlanningRepository::new(db.pool.clone());
    assert!(!repo
        .has_pending_activity(batch_id, PlannedActivityKind::Transfer)
        .await
        .unwrap());

    sqlx::query(
        "INSERT INTO planned_activities (batch_id, activity_type, status)
         VALUES (?, 'TRANSFER', 'PENDING')",
    )
    .bind(batch_id)
    .execute(&db.pool)
    .await
    .unwrap();

    assert!(repo
        .has_pending_activity(batch_id, PlannedActivityKind::Transfer)
        .await
        .unwrap());
    assert!(!repo
        .has_pending_activity(batch_id, PlannedActivityKind::Harvest)
        .await
        .unwrap());

    // Completed plans no longer count.
    sqlx::query("UPDATE planned_activities SET status = 'COMPLETED'")
        .execute(&db.pool)
        .await
        .unwrap();
    assert!(!repo
        .has_pending_activity(batch_id, PlannedActivityKind::Transfer)
        .await
        .unwrap());
}
