//! The transactional repository interface.
//!
//! The execution engine is written against these two traits only, so the same
//! algorithm runs on PostgreSQL in production and on [`crate::InMemoryStore`]
//! in tests.
//!
//! Locking contract: every `lock_*` method on [`StoreTx`] takes an exclusive
//! lock on the matching row *before* reading it, and holds the lock until the
//! transaction commits, rolls back, or is dropped. Callers must lock in the
//! order Order → Account → Position.

use crate::error::DbError;
use async_trait::async_trait;
use core_types::{
    Account, AccountId, FailureReason, LedgerEntry, NewLedgerEntry, NewOrder, NewPriceQuote,
    Order, OrderId, OrderStatus, Position, PriceQuote, TradeQuery,
};
use rust_decimal::Decimal;

/// Shared handle to the entity store. Reads run outside any transaction and
/// never take locks.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens one atomic unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DbError>;

    /// Bootstraps an account together with its opening CASH ledger entry.
    async fn create_account(
        &self,
        account_name: &str,
        initial_cash: Decimal,
    ) -> Result<Account, DbError>;

    /// Inserts a `pending` order and returns its store-assigned id.
    ///
    /// Fails with [`DbError::UniqueViolation`] when the idempotency key is
    /// already taken and [`DbError::ForeignKeyViolation`] when the account is unknown.
    async fn insert_order(&self, order: &NewOrder) -> Result<OrderId, DbError>;

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>, DbError>;

    async fn find_order_by_key(&self, idempotency_key: &str) -> Result<Option<Order>, DbError>;

    async fn find_account(&self, account_id: AccountId) -> Result<Option<Account>, DbError>;

    /// Positions ordered by symbol.
    async fn list_positions(&self, account_id: AccountId) -> Result<Vec<Position>, DbError>;

    /// All orders for the account, most recent first.
    async fn list_orders(&self, account_id: AccountId) -> Result<Vec<Order>, DbError>;

    /// Executed orders, most recent execution first, filtered and paged by `query`.
    async fn list_trades(&self, query: &TradeQuery) -> Result<Vec<Order>, DbError>;

    /// Ledger entries for the account in append order.
    async fn ledger_for_account(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, DbError>;

    async fn ledger_for_order(&self, order_id: OrderId) -> Result<Vec<LedgerEntry>, DbError>;

    /// Idempotent on (symbol, timestamp): a repeated bar returns the stored one.
    async fn insert_price(&self, quote: &NewPriceQuote) -> Result<PriceQuote, DbError>;

    /// Close of the most recent bar for `symbol`.
    async fn latest_close(&self, symbol: &str) -> Result<Option<Decimal>, DbError>;

    /// Bars for `symbol`, most recent first.
    async fn price_history(&self, symbol: &str, limit: i64) -> Result<Vec<PriceQuote>, DbError>;
}

/// One open transaction. Dropping it without [`StoreTx::commit`] rolls back
/// every write and releases every lock.
#[async_trait]
pub trait StoreTx: Send {
    /// Locks the order if, and only if, it is still `pending`.
    async fn lock_pending_order(&mut self, order_id: OrderId) -> Result<Option<Order>, DbError>;

    async fn order_exists(&mut self, order_id: OrderId) -> Result<bool, DbError>;

    async fn lock_account(&mut self, account_id: AccountId) -> Result<Option<Account>, DbError>;

    async fn lock_position(
        &mut self,
        account_id: AccountId,
        symbol: &str,
    ) -> Result<Option<Position>, DbError>;

    async fn update_cash_balance(
        &mut self,
        account_id: AccountId,
        cash_balance: Decimal,
    ) -> Result<(), DbError>;

    /// Inserts the position or overwrites quantity and average cost.
    async fn upsert_position(&mut self, position: &Position) -> Result<(), DbError>;

    async fn delete_position(&mut self, account_id: AccountId, symbol: &str)
    -> Result<(), DbError>;

    async fn append_ledger_entry(&mut self, entry: &NewLedgerEntry) -> Result<(), DbError>;

    /// Moves a `pending` order to a terminal status. Fails with
    /// [`DbError::NotFound`] if the order is no longer pending.
    async fn finish_order(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        reason: Option<FailureReason>,
    ) -> Result<(), DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    async fn rollback(&mut self) -> Result<(), DbError>;
}
