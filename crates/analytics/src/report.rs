use chrono::{DateTime, Utc};
use core_types::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Mark-to-market view of one priced position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionMetrics {
    pub symbol: String,
    pub quantity: i64,
    pub average_cost: Decimal,
    pub market_price: Decimal,
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Account valuation at `as_of`.
///
/// Positions without any price bar are left out of `positions` and of every
/// total. `realized_pnl` is always zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub account_id: AccountId,
    pub as_of: DateTime<Utc>,
    pub cash_balance: Decimal,
    pub total_market_value: Decimal,
    pub total_portfolio_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub positions: Vec<PositionMetrics>,
    /// Held symbols that had no price and were excluded.
    pub unpriced_symbols: Vec<String>,
}
