use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl StorageError {
    pub fn corrupt(context: impl Into<String>) -> Self {
        StorageError::CorruptRow(context.into())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
