use crate::{AppState, error::AppError};
use analytics::PortfolioMetrics;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use core_types::{
    Account, AccountId, AccountRequest, ExecutionOutcome, FailureReason, LedgerEntry,
    NewPriceQuote, Order, OrderId, OrderRequest, Position, PriceQuote, TradeQuery, TradeRecord,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
}

#[derive(Debug, Serialize)]
pub struct Balance {
    pub account_id: AccountId,
    pub cash_balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TradeParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

async fn require_account(state: &AppState, account_id: AccountId) -> Result<Account, AppError> {
    state
        .engine
        .get_account(account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("account {account_id} not found")))
}

/// # POST /api/accounts
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AccountRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let account = state.engine.open_account(request).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// # GET /api/accounts/:account_id
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<Account>, AppError> {
    Ok(Json(require_account(&state, account_id).await?))
}

/// # GET /api/accounts/:account_id/balance
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<Balance>, AppError> {
    let account = require_account(&state, account_id).await?;
    Ok(Json(Balance {
        account_id,
        cash_balance: account.cash_balance,
    }))
}

/// # GET /api/accounts/:account_id/positions
pub async fn get_positions(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<Vec<Position>>, AppError> {
    require_account(&state, account_id).await?;
    Ok(Json(state.engine.get_positions(account_id).await?))
}

/// # GET /api/accounts/:account_id/orders
pub async fn get_orders(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<Vec<Order>>, AppError> {
    require_account(&state, account_id).await?;
    Ok(Json(state.engine.get_order_history(account_id).await?))
}

/// # GET /api/accounts/:account_id/trades?limit=&offset=&start=&end=
pub async fn get_trades(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<AccountId>,
    Query(params): Query<TradeParams>,
) -> Result<Json<Vec<TradeRecord>>, AppError> {
    require_account(&state, account_id).await?;
    let defaults = TradeQuery::new(account_id);
    let query = TradeQuery {
        limit: params.limit.unwrap_or(defaults.limit),
        offset: params.offset.unwrap_or(defaults.offset),
        start: params.start,
        end: params.end,
        ..defaults
    };
    Ok(Json(state.engine.get_trade_history(&query).await?))
}

/// # GET /api/accounts/:account_id/ledger
pub async fn get_ledger(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    require_account(&state, account_id).await?;
    Ok(Json(state.engine.get_ledger(account_id).await?))
}

/// # GET /api/accounts/:account_id/metrics
pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<PortfolioMetrics>, AppError> {
    analytics::get_portfolio_metrics(state.engine.store().as_ref(), account_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("account {account_id} not found")))
}

/// # POST /api/orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OrderRequest>,
) -> Result<(StatusCode, Json<OrderCreated>), AppError> {
    let order_id = state.engine.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(OrderCreated { order_id })))
}

/// # GET /api/orders/:order_id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    state
        .engine
        .get_order(order_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
}

/// # POST /api/orders/:order_id/execute
///
/// Business failures are a 200 carrying `status: "failed"`. A non-pending
/// order is a 409 and an unknown one a 404, with the same body shape.
pub async fn execute_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<impl IntoResponse, AppError> {
    let outcome: ExecutionOutcome = state.engine.execute_order(order_id).await?;
    let status = match outcome.reason {
        Some(FailureReason::InvalidState) => StatusCode::CONFLICT,
        Some(FailureReason::OrderNotFound) => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// # GET /api/orders/:order_id/ledger
pub async fn get_order_ledger(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    Ok(Json(state.engine.get_order_ledger(order_id).await?))
}

/// # POST /api/prices
pub async fn add_price(
    State(state): State<Arc<AppState>>,
    Json(quote): Json<NewPriceQuote>,
) -> Result<(StatusCode, Json<PriceQuote>), AppError> {
    let stored = state.engine.add_price(quote).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// # GET /api/prices/:symbol?limit=
pub async fn get_price_history(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<PriceQuote>>, AppError> {
    Ok(Json(
        state.engine.get_price_history(&symbol, params.limit).await?,
    ))
}
