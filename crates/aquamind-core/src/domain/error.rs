use thiserror::Error;

/// Domain-level failures surfaced across engine boundaries.
///
/// Engines never panic on these: configuration problems abort a projection
/// before the first day, lookups that miss become structured failure
/// payloads, and integrity violations are clamped with a warning wherever
/// the daily loop can keep going.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("data integrity error: {0}")]
    DataIntegrity(String),
}

impl DomainError {
    pub fn not_found(what: impl Into<String>) -> Self {
        DomainError::NotFound(what.into())
    }
}
