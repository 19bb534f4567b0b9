pub mod batch;
pub mod error;
pub mod models;
pub mod observations;
pub mod planning;
pub mod state;

pub use batch::SqliteBatchRepository;
pub use error::{Result, StorageError};
pub use observations::SqliteObservationRepository;
pub use planning::SqlitePlanningRepository;
pub use state::SqliteStateRepository;

use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::str::FromStr;

/// Open (creating if needed) the database and run embedded migrations.
pub async fn init_db(db_path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_path)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!(db_path, "Database initialized");

    Ok(pool)
}
