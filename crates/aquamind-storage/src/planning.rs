use aquamind_core::domain::PlannedActivityKind;
use aquamind_core::ports::PlanningRepository;
use async_trait::async_trait;
use sqlx::{query, SqlitePool};

pub struct SqlitePlanningRepository {
    pool: SqlitePool,
}

impl SqlitePlanningRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanningRepository for SqlitePlanningRepository {
    async fn has_pending_activity(
        &self,
        batch_id: i64,
        kind: PlannedActivityKind,
    ) -> anyhow::Result<bool> {
        let row = query(
            "SELECT 1 FROM planned_activities
             WHERE batch_id = ? AND activity_type = ?
               AND status IN ('PENDING', 'IN_PROGRESS')
             LIMIT 1",
        )
        .bind(batch_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }
}
