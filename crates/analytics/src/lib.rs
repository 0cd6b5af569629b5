//! # Analytics Crate
//!
//! Read-only portfolio valuation.
//!
//! - `AnalyticsEngine::project`: pure mark-to-market of an account's positions
//!   at given prices.
//! - `get_portfolio_metrics`: loads the inputs from a `LedgerStore` (latest
//!   close per symbol) and projects them.
//! - `PortfolioMetrics` / `PositionMetrics`: the resulting report.

pub mod engine;
pub mod error;
pub mod report;

pub use engine::{AnalyticsEngine, get_portfolio_metrics};
pub use error::AnalyticsError;
pub use report::{PortfolioMetrics, PositionMetrics};
