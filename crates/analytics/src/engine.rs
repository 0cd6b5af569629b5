use crate::error::AnalyticsError;
use crate::report::{PortfolioMetrics, PositionMetrics};
use chrono::{DateTime, Utc};
use core_types::{Account, AccountId, Position};
use database::LedgerStore;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// A stateless calculator that values an account's holdings at market prices.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values `positions` at `prices` (latest close per symbol).
    ///
    /// `market_value = quantity * price` and
    /// `unrealized_pnl = (price - average_cost) * quantity`. Symbols missing
    /// from `prices` are skipped and reported in `unpriced_symbols`.
    pub fn project(
        &self,
        account: &Account,
        positions: &[Position],
        prices: &HashMap<String, Decimal>,
        as_of: DateTime<Utc>,
    ) -> Result<PortfolioMetrics, AnalyticsError> {
        let mut metrics = PortfolioMetrics {
            account_id: account.account_id,
            as_of,
            cash_balance: account.cash_balance,
            total_market_value: Decimal::ZERO,
            total_portfolio_value: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            positions: Vec::with_capacity(positions.len()),
            unpriced_symbols: Vec::new(),
        };

        for position in positions {
            let Some(&market_price) = prices.get(&position.symbol) else {
                metrics.unpriced_symbols.push(position.symbol.clone());
                continue;
            };

            let quantity = Decimal::from(position.quantity);
            let market_value = checked(quantity.checked_mul(market_price), "market_value")?;
            let unrealized_pnl = checked(
                (market_price - position.average_cost).checked_mul(quantity),
                "unrealized_pnl",
            )?;

            metrics.total_market_value =
                checked(metrics.total_market_value.checked_add(market_value), "total_market_value")?;
            metrics.unrealized_pnl =
                checked(metrics.unrealized_pnl.checked_add(unrealized_pnl), "unrealized_pnl")?;

            metrics.positions.push(PositionMetrics {
                symbol: position.symbol.clone(),
                quantity: position.quantity,
                average_cost: position.average_cost,
                market_price,
                market_value,
                unrealized_pnl,
            });
        }

        metrics.total_portfolio_value = checked(
            metrics.cash_balance.checked_add(metrics.total_market_value),
            "total_portfolio_value",
        )?;
        Ok(metrics)
    }
}

/// Loads the account, its positions and their latest closes, then projects.
///
/// Takes no locks: positions and prices are read one after another, so the
/// result is not a single consistent snapshot under concurrent execution.
/// Returns `None` for an unknown account.
pub async fn get_portfolio_metrics(
    store: &dyn LedgerStore,
    account_id: AccountId,
) -> Result<Option<PortfolioMetrics>, AnalyticsError> {
    let Some(account) = store.find_account(account_id).await? else {
        return Ok(None);
    };
    let positions = store.list_positions(account_id).await?;

    let mut prices = HashMap::with_capacity(positions.len());
    for position in &positions {
        if let Some(close) = store.latest_close(&position.symbol).await? {
            prices.insert(position.symbol.clone(), close);
        }
    }

    AnalyticsEngine::new()
        .project(&account, &positions, &prices, Utc::now())
        .map(Some)
}

fn checked(value: Option<Decimal>, metric: &str) -> Result<Decimal, AnalyticsError> {
    value.ok_or_else(|| AnalyticsError::Calculation(format!("overflow computing {metric}")))
}
