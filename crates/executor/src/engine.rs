use crate::error::ExecutorError;
use crate::{execution, intake};
use core_types::{
    Account, AccountId, AccountRequest, ExecutionOutcome, LedgerEntry, NewPriceQuote, Order,
    OrderId, OrderRequest, Position, PriceQuote, TradeQuery, TradeRecord, normalize_symbol,
};
use database::LedgerStore;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Default page size for price history reads.
pub const DEFAULT_PRICE_HISTORY_LIMIT: i64 = 100;

/// The public face of the ledger: order intake, execution and the read-only
/// query surface, all over one shared [`LedgerStore`].
#[derive(Clone)]
pub struct OrderEngine {
    store: Arc<dyn LedgerStore>,
}

impl OrderEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Bootstraps a funded account.
    pub async fn open_account(&self, request: AccountRequest) -> Result<Account, ExecutorError> {
        let request = request.validate()?;
        let account = self
            .store
            .create_account(&request.account_name, request.initial_cash)
            .await?;
        info!(
            account_id = account.account_id,
            name = %account.account_name,
            cash = %account.cash_balance,
            "Account opened."
        );
        Ok(account)
    }

    pub async fn create_order(&self, request: OrderRequest) -> Result<OrderId, ExecutorError> {
        intake::create_order(self.store.as_ref(), request).await
    }

    pub async fn execute_order(&self, order_id: OrderId) -> Result<ExecutionOutcome, ExecutorError> {
        execution::execute_order(self.store.as_ref(), order_id).await
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, ExecutorError> {
        Ok(self.store.find_order(order_id).await?)
    }

    pub async fn get_account(&self, account_id: AccountId) -> Result<Option<Account>, ExecutorError> {
        Ok(self.store.find_account(account_id).await?)
    }

    pub async fn get_account_balance(
        &self,
        account_id: AccountId,
    ) -> Result<Option<Decimal>, ExecutorError> {
        Ok(self.get_account(account_id).await?.map(|a| a.cash_balance))
    }

    /// Open positions ordered by symbol.
    pub async fn get_positions(&self, account_id: AccountId) -> Result<Vec<Position>, ExecutorError> {
        Ok(self.store.list_positions(account_id).await?)
    }

    /// Every order of the account, most recent first.
    pub async fn get_order_history(&self, account_id: AccountId) -> Result<Vec<Order>, ExecutorError> {
        Ok(self.store.list_orders(account_id).await?)
    }

    /// Executed orders, most recent first.
    pub async fn get_trade_history(
        &self,
        query: &TradeQuery,
    ) -> Result<Vec<TradeRecord>, ExecutorError> {
        for (field, value) in [("limit", query.limit), ("offset", query.offset)] {
            if value < 0 {
                return Err(core_types::CoreError::InvalidInput(
                    field.to_string(),
                    format!("must not be negative, got {value}"),
                )
                .into());
            }
        }
        let orders = self.store.list_trades(query).await?;
        Ok(orders.iter().filter_map(TradeRecord::from_order).collect())
    }

    /// Ledger rows of the account, oldest first.
    pub async fn get_ledger(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, ExecutorError> {
        Ok(self.store.ledger_for_account(account_id).await?)
    }

    pub async fn get_order_ledger(&self, order_id: OrderId) -> Result<Vec<LedgerEntry>, ExecutorError> {
        Ok(self.store.ledger_for_order(order_id).await?)
    }

    /// Stores one bar. Re-adding a bar for the same symbol and timestamp
    /// returns the stored bar unchanged.
    pub async fn add_price(&self, quote: NewPriceQuote) -> Result<PriceQuote, ExecutorError> {
        let quote = quote.validate()?;
        Ok(self.store.insert_price(&quote).await?)
    }

    /// Bars for `symbol`, newest first.
    pub async fn get_price_history(
        &self,
        symbol: &str,
        limit: Option<i64>,
    ) -> Result<Vec<PriceQuote>, ExecutorError> {
        let symbol = normalize_symbol(symbol)?;
        let limit = limit.unwrap_or(DEFAULT_PRICE_HISTORY_LIMIT).max(0);
        Ok(self.store.price_history(&symbol, limit).await?)
    }

    /// Close of the most recent bar, the market price used for valuation.
    pub async fn latest_price(&self, symbol: &str) -> Result<Option<Decimal>, ExecutorError> {
        let symbol = normalize_symbol(symbol)?;
        Ok(self.store.latest_close(&symbol).await?)
    }
}
