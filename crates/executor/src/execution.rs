//! The order execution state machine.
//!
//! One call is one store transaction. Rows are locked before they are read,
//! always in the order Order → Account → Position. Every early `?` return
//! drops the transaction, which rolls it back.

use crate::error::ExecutorError;
use crate::portfolio::{self, PositionChange};
use core_types::{
    Account, ExecutionOutcome, FailureReason, NewLedgerEntry, Order, OrderId, OrderSide,
    OrderStatus,
};
use database::{DbError, LedgerStore, StoreTx};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

/// Moves a pending order to `executed` or `failed`.
///
/// Business failures (`insufficient_funds`, `insufficient_shares`) are
/// recorded on the order and returned as a normal outcome. An order that is
/// no longer pending yields `invalid_state`, an unknown id `order_not_found`;
/// neither touches the order. Errors are reserved for integrity and storage
/// faults, after which nothing has changed.
pub async fn execute_order(
    store: &dyn LedgerStore,
    order_id: OrderId,
) -> Result<ExecutionOutcome, ExecutorError> {
    let mut tx = store.begin().await?;

    let Some(order) = tx.lock_pending_order(order_id).await? else {
        let exists = tx.order_exists(order_id).await?;
        tx.rollback().await?;
        let reason = if exists {
            FailureReason::InvalidState
        } else {
            FailureReason::OrderNotFound
        };
        warn!(order_id, %reason, "Order is not executable.");
        return Ok(ExecutionOutcome::failed(reason));
    };

    let account = tx.lock_account(order.account_id).await?.ok_or_else(|| {
        error!(
            order_id,
            account_id = order.account_id,
            "Order references a missing account."
        );
        ExecutorError::Integrity(format!(
            "order {order_id} references missing account {}",
            order.account_id
        ))
    })?;

    let notional = order.notional().ok_or_else(|| {
        ExecutorError::Integrity(format!("notional of order {order_id} is out of range"))
    })?;

    let outcome = match order.side {
        OrderSide::Buy => execute_buy(&mut *tx, &order, &account, notional).await,
        OrderSide::Sell => execute_sell(&mut *tx, &order, &account, notional).await,
    }
    .inspect_err(|e| error!(order_id, error = %e, "Execution aborted; rolled back."))?;

    tx.commit().await?;

    match outcome.reason {
        None => info!(
            order_id,
            account_id = order.account_id,
            side = %order.side,
            quantity = order.quantity,
            symbol = %order.symbol,
            %notional,
            "Order executed."
        ),
        Some(reason) => warn!(order_id, account_id = order.account_id, %reason, "Order failed."),
    }
    Ok(outcome)
}

async fn execute_buy(
    tx: &mut dyn StoreTx,
    order: &Order,
    account: &Account,
    notional: Decimal,
) -> Result<ExecutionOutcome, ExecutorError> {
    if account.cash_balance < notional {
        return fail(tx, order, FailureReason::InsufficientFunds).await;
    }
    let cash_after = account.cash_balance - notional;

    let existing = tx.lock_position(order.account_id, &order.symbol).await?;
    let position = portfolio::apply_buy(existing.as_ref(), order)?;

    tx.update_cash_balance(order.account_id, cash_after)
        .await
        .map_err(|e| vanished(e, order))?;
    tx.upsert_position(&position).await?;
    tx.append_ledger_entry(&NewLedgerEntry::cash_leg(order, -notional, cash_after))
        .await?;
    tx.append_ledger_entry(&NewLedgerEntry::asset_leg(
        order,
        order.quantity,
        position.quantity,
    ))
    .await?;

    finish(tx, order, OrderStatus::Executed, None).await?;
    Ok(ExecutionOutcome::executed())
}

async fn execute_sell(
    tx: &mut dyn StoreTx,
    order: &Order,
    account: &Account,
    notional: Decimal,
) -> Result<ExecutionOutcome, ExecutorError> {
    let position = match tx.lock_position(order.account_id, &order.symbol).await? {
        Some(position) if position.quantity >= order.quantity => position,
        _ => return fail(tx, order, FailureReason::InsufficientShares).await,
    };

    let cash_after = account
        .cash_balance
        .checked_add(notional)
        .filter(|cash| *cash <= core_types::MAX_MONEY)
        .ok_or_else(|| {
            ExecutorError::Integrity(format!(
                "cash balance of account {} would overflow",
                order.account_id
            ))
        })?;

    let quantity_after = match portfolio::apply_sell(&position, order.quantity)? {
        PositionChange::Reduce(reduced) => {
            tx.upsert_position(&reduced).await?;
            reduced.quantity
        }
        PositionChange::Close => {
            tx.delete_position(order.account_id, &order.symbol).await?;
            0
        }
    };

    tx.update_cash_balance(order.account_id, cash_after)
        .await
        .map_err(|e| vanished(e, order))?;
    tx.append_ledger_entry(&NewLedgerEntry::cash_leg(order, notional, cash_after))
        .await?;
    tx.append_ledger_entry(&NewLedgerEntry::asset_leg(
        order,
        -order.quantity,
        quantity_after,
    ))
    .await?;

    finish(tx, order, OrderStatus::Executed, None).await?;
    Ok(ExecutionOutcome::executed())
}

/// Records a business failure on the order. Nothing else is written.
async fn fail(
    tx: &mut dyn StoreTx,
    order: &Order,
    reason: FailureReason,
) -> Result<ExecutionOutcome, ExecutorError> {
    finish(tx, order, OrderStatus::Failed, Some(reason)).await?;
    Ok(ExecutionOutcome::failed(reason))
}

async fn finish(
    tx: &mut dyn StoreTx,
    order: &Order,
    status: OrderStatus,
    reason: Option<FailureReason>,
) -> Result<(), ExecutorError> {
    tx.finish_order(order.order_id, status, reason)
        .await
        .map_err(|e| vanished(e, order))
}

/// A row locked earlier in this transaction was not there to update.
fn vanished(err: DbError, order: &Order) -> ExecutorError {
    match err {
        DbError::NotFound => ExecutorError::Integrity(format!(
            "rows of order {} changed underneath its lock",
            order.order_id
        )),
        other => other.into(),
    }
}
