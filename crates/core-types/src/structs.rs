use crate::enums::{FailureReason, OrderSide, OrderStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Store-assigned account identifier.
pub type AccountId = i64;
/// Store-assigned order identifier.
pub type OrderId = i64;

/// Ledger asset name for cash movements. Every other asset is a symbol.
pub const CASH_ASSET: &str = "CASH";

/// A trading account. Only the execution engine changes `cash_balance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub account_name: String,
    pub cash_balance: Decimal,
}

/// Holding of one symbol in one account. A position with quantity zero is
/// deleted rather than kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub account_id: AccountId,
    pub symbol: String,
    pub quantity: i64,
    pub average_cost: Decimal,
}

/// An order as stored. Immutable once `status` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub idempotency_key: String,
    pub account_id: AccountId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub price: Decimal,
    pub status: OrderStatus,
    pub failure_reason: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// `quantity * price`, exact at the money scale.
    pub fn notional(&self) -> Option<Decimal> {
        crate::money::notional(self.quantity, self.price)
    }
}

/// A validated order ready for insertion. Produced by [`crate::OrderRequest::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub account_id: AccountId,
    pub idempotency_key: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub price: Decimal,
}

/// Append-only record of a signed balance change for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: i64,
    pub account_id: AccountId,
    pub order_id: Option<OrderId>,
    pub asset: String,
    pub change: Decimal,
    pub new_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub account_id: AccountId,
    pub order_id: Option<OrderId>,
    pub asset: String,
    pub change: Decimal,
    pub new_balance: Decimal,
    pub description: String,
}

impl NewLedgerEntry {
    /// The CASH leg of an executed order.
    pub fn cash_leg(order: &Order, change: Decimal, cash_balance: Decimal) -> Self {
        Self {
            account_id: order.account_id,
            order_id: Some(order.order_id),
            asset: CASH_ASSET.to_string(),
            change,
            new_balance: cash_balance,
            description: Self::describe(order),
        }
    }

    /// The asset leg of an executed order; balances are share counts.
    pub fn asset_leg(order: &Order, change: i64, quantity_after: i64) -> Self {
        Self {
            account_id: order.account_id,
            order_id: Some(order.order_id),
            asset: order.symbol.clone(),
            change: Decimal::from(change),
            new_balance: Decimal::from(quantity_after),
            description: Self::describe(order),
        }
    }

    /// Opening balance written when an account is bootstrapped.
    pub fn initial_funding(account_id: AccountId, amount: Decimal) -> Self {
        Self {
            account_id,
            order_id: None,
            asset: CASH_ASSET.to_string(),
            change: amount,
            new_balance: amount,
            description: "Initial account funding".to_string(),
        }
    }

    fn describe(order: &Order) -> String {
        format!("{} {} {}", order.side, order.quantity, order.symbol)
    }
}

/// One OHLCV bar. The close of the latest bar per symbol is its market price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price_id: i64,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPriceQuote {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

/// Projection of an executed order for trade-history reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: OrderId,
    pub account_id: AccountId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub price: Decimal,
    pub notional: Decimal,
    pub executed_at: DateTime<Utc>,
}

impl TradeRecord {
    /// Returns `None` for orders that never executed.
    pub fn from_order(order: &Order) -> Option<Self> {
        if order.status != OrderStatus::Executed {
            return None;
        }
        Some(Self {
            trade_id: order.order_id,
            account_id: order.account_id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price: order.price,
            notional: order.price * Decimal::from(order.quantity),
            executed_at: order.executed_at.unwrap_or(order.created_at),
        })
    }
}

/// Filter and page for trade-history reads. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeQuery {
    pub account_id: AccountId,
    pub limit: i64,
    pub offset: i64,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TradeQuery {
    pub const DEFAULT_LIMIT: i64 = 50;

    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
            start: None,
            end: None,
        }
    }
}

/// Result of one `execute_order` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: OrderStatus,
    pub reason: Option<FailureReason>,
}

impl ExecutionOutcome {
    pub fn executed() -> Self {
        Self {
            status: OrderStatus::Executed,
            reason: None,
        }
    }

    pub fn failed(reason: FailureReason) -> Self {
        Self {
            status: OrderStatus::Failed,
            reason: Some(reason),
        }
    }

    pub fn is_executed(&self) -> bool {
        self.status == OrderStatus::Executed
    }
}
