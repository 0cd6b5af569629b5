//! Scenario: portfolio metrics mark executed holdings to the latest close.
//!
//! GREEN when:
//! - Each priced position is valued at the close of its most recent bar.
//! - A position with no bar is excluded from every total.
//! - `total_portfolio_value = cash + Σ market_value`; `realized_pnl` is zero.
//! - An unknown account yields no metrics.

use analytics::get_portfolio_metrics;
use chrono::{Duration, Utc};
use core_types::{NewPriceQuote, OrderRequest, OrderSide};
use database::{InMemoryStore, LedgerStore};
use executor::OrderEngine;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn bar(symbol: &str, minutes_ago: i64, close: Decimal) -> NewPriceQuote {
    NewPriceQuote {
        symbol: symbol.to_string(),
        timestamp: Utc::now() - Duration::minutes(minutes_ago),
        open: close,
        high: close,
        low: close,
        close,
        volume: 1_000,
    }
}

#[tokio::test]
async fn metrics_use_latest_close_and_skip_unpriced_positions() {
    let store = InMemoryStore::new();
    let account = store.create_account("main", dec!(10000)).await.unwrap();
    let engine = OrderEngine::new(Arc::new(store.clone()));

    for (i, (symbol, qty, price)) in [("AAPL", 10, dec!(100)), ("MSFT", 5, dec!(200)), ("IBM", 2, dec!(50))]
        .into_iter()
        .enumerate()
    {
        let order_id = engine
            .create_order(OrderRequest {
                account_id: account.account_id,
                idempotency_key: format!("seed-{i}"),
                symbol: symbol.to_string(),
                side: OrderSide::Buy,
                quantity: qty,
                price,
            })
            .await
            .unwrap();
        assert!(engine.execute_order(order_id).await.unwrap().is_executed());
    }

    engine.add_price(bar("AAPL", 60, dec!(90))).await.unwrap();
    engine.add_price(bar("AAPL", 1, dec!(110))).await.unwrap();
    engine.add_price(bar("MSFT", 5, dec!(190.5))).await.unwrap();

    let metrics = get_portfolio_metrics(&store, account.account_id)
        .await
        .unwrap()
        .unwrap();

    // 10000 - 1000 - 1000 - 100
    assert_eq!(metrics.cash_balance, dec!(7900));
    assert_eq!(metrics.positions.len(), 2);

    let aapl = &metrics.positions[0];
    assert_eq!((aapl.symbol.as_str(), aapl.market_price), ("AAPL", dec!(110)));
    assert_eq!(aapl.market_value, dec!(1100));
    assert_eq!(aapl.unrealized_pnl, dec!(100));

    let msft = &metrics.positions[1];
    assert_eq!(msft.market_value, dec!(952.5));
    assert_eq!(msft.unrealized_pnl, dec!(-47.5));

    assert_eq!(metrics.unpriced_symbols, vec!["IBM".to_string()]);
    assert_eq!(metrics.total_market_value, dec!(2052.5));
    assert_eq!(metrics.unrealized_pnl, dec!(52.5));
    assert_eq!(metrics.total_portfolio_value, dec!(9952.5));
    assert_eq!(metrics.realized_pnl, Decimal::ZERO);
}

#[tokio::test]
async fn unknown_account_has_no_metrics() {
    let store = InMemoryStore::new();
    assert!(get_portfolio_metrics(&store, 77).await.unwrap().is_none());
}
