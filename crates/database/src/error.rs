use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Referenced row does not exist: {0}")]
    ForeignKeyViolation(String),

    #[error("Stored row could not be decoded: {0}")]
    Corrupt(String),

    #[error("Storage fault: {0}")]
    Storage(String),

    #[error("The requested data was not found in the database.")]
    NotFound,
}

impl DbError {
    /// Maps constraint violations reported by PostgreSQL onto dedicated variants
    /// so callers can recover from them without inspecting SQLSTATE codes.
    pub(crate) fn classify(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return DbError::UniqueViolation(db_err.message().to_string());
            }
            if db_err.is_foreign_key_violation() {
                return DbError::ForeignKeyViolation(db_err.message().to_string());
            }
        }
        DbError::Query(err)
    }
}
