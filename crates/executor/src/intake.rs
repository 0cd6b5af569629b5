use crate::error::ExecutorError;
use core_types::{OrderId, OrderRequest};
use database::{DbError, LedgerStore};
use tracing::{debug, info};

/// Creates a `pending` order, or returns the id of the order already holding
/// the request's idempotency key. Replays have no side effects.
pub async fn create_order(
    store: &dyn LedgerStore,
    request: OrderRequest,
) -> Result<OrderId, ExecutorError> {
    let order = request.validate()?;

    if let Some(existing) = store.find_order_by_key(&order.idempotency_key).await? {
        debug!(
            order_id = existing.order_id,
            key = %order.idempotency_key,
            "Idempotency key replayed; returning existing order."
        );
        return Ok(existing.order_id);
    }

    match store.insert_order(&order).await {
        Ok(order_id) => {
            info!(
                order_id,
                account_id = order.account_id,
                symbol = %order.symbol,
                side = %order.side,
                quantity = order.quantity,
                price = %order.price,
                "Order accepted."
            );
            Ok(order_id)
        }
        // A concurrent request with the same key won the insert.
        Err(DbError::UniqueViolation(_)) => {
            let winner = store
                .find_order_by_key(&order.idempotency_key)
                .await?
                .ok_or_else(|| {
                    ExecutorError::Integrity(format!(
                        "idempotency key {:?} conflicted but no order holds it",
                        order.idempotency_key
                    ))
                })?;
            debug!(
                order_id = winner.order_id,
                key = %order.idempotency_key,
                "Lost idempotency race; returning winner."
            );
            Ok(winner.order_id)
        }
        Err(DbError::ForeignKeyViolation(_)) => {
            Err(ExecutorError::AccountNotFound(order.account_id))
        }
        Err(e) => Err(e.into()),
    }
}
