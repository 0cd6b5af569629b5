use database::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Failed to load portfolio data: {0}")]
    Database(#[from] DbError),

    #[error("Error in calculation: {0}")]
    Calculation(String),
}
