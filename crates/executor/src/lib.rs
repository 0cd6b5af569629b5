//! # Executor Crate
//!
//! Order intake and execution against a [`database::LedgerStore`].
//!
//! - **Intake** (`intake::create_order`) validates a request and inserts a
//!   `pending` order, deduplicated by idempotency key. A lost insert race is
//!   resolved by returning the winner's id.
//! - **Execution** (`execution::execute_order`) is the transactional state
//!   machine: it locks Order → Account → Position, applies the fill to cash
//!   and position, appends the two ledger legs and marks the order terminal,
//!   all in one commit.
//! - **Portfolio** holds the average-cost accumulator.
//! - `OrderEngine` bundles the above with the read-only query surface.

pub mod engine;
pub mod error;
pub mod execution;
pub mod intake;
pub mod portfolio;

pub use engine::{DEFAULT_PRICE_HISTORY_LIMIT, OrderEngine};
pub use error::ExecutorError;
pub use execution::execute_order;
pub use intake::create_order;
pub use portfolio::{PositionChange, apply_buy, apply_sell};
