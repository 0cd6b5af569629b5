pub mod enums;
pub mod error;
pub mod money;
pub mod request;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{FailureReason, OrderSide, OrderStatus};
pub use error::CoreError;
pub use money::{MAX_MONEY, MONEY_SCALE};
pub use request::{AccountRequest, OrderRequest, normalize_symbol};
pub use structs::{
    Account, AccountId, CASH_ASSET, ExecutionOutcome, LedgerEntry, NewLedgerEntry, NewOrder,
    NewPriceQuote, Order, OrderId, Position, PriceQuote, TradeQuery, TradeRecord,
};
