//! The average-cost accumulator applied to a position by each fill.

use crate::error::ExecutorError;
use core_types::money::{MAX_MONEY, round_money};
use core_types::{Order, Position};
use rust_decimal::Decimal;

/// What a SELL leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionChange {
    Reduce(Position),
    Close,
}

/// Applies a BUY fill. A first fill opens the position at the fill price;
/// later fills move the average cost to the quantity-weighted mean, rounded
/// to the money scale.
pub fn apply_buy(existing: Option<&Position>, order: &Order) -> Result<Position, ExecutorError> {
    let Some(position) = existing else {
        return Ok(Position {
            account_id: order.account_id,
            symbol: order.symbol.clone(),
            quantity: order.quantity,
            average_cost: order.price,
        });
    };

    // Share counts land in the ledger's money-sized columns.
    let quantity = position
        .quantity
        .checked_add(order.quantity)
        .filter(|q| Decimal::from(*q) <= MAX_MONEY)
        .ok_or_else(|| overflow(position, "quantity"))?;

    let held_cost = position
        .average_cost
        .checked_mul(Decimal::from(position.quantity));
    let fill_cost = order.price.checked_mul(Decimal::from(order.quantity));
    let average_cost = held_cost
        .zip(fill_cost)
        .and_then(|(held, fill)| held.checked_add(fill))
        .and_then(|total| total.checked_div(Decimal::from(quantity)))
        .map(round_money)
        .filter(|avg| *avg <= MAX_MONEY)
        .ok_or_else(|| overflow(position, "average cost"))?;

    Ok(Position {
        account_id: position.account_id,
        symbol: position.symbol.clone(),
        quantity,
        average_cost,
    })
}

/// Applies a SELL fill the caller has already checked is covered.
/// The average cost is carried over unchanged.
pub fn apply_sell(position: &Position, quantity: i64) -> Result<PositionChange, ExecutorError> {
    if quantity > position.quantity {
        return Err(ExecutorError::Integrity(format!(
            "cannot sell {quantity} {} from a position of {}",
            position.symbol, position.quantity
        )));
    }
    let remaining = position.quantity - quantity;
    if remaining == 0 {
        return Ok(PositionChange::Close);
    }
    Ok(PositionChange::Reduce(Position {
        quantity: remaining,
        ..position.clone()
    }))
}

fn overflow(position: &Position, what: &str) -> ExecutorError {
    ExecutorError::Integrity(format!(
        "{what} of {} position in account {} overflows",
        position.symbol, position.account_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{OrderSide, OrderStatus};
    use rust_decimal_macros::dec;

    fn fill(quantity: i64, price: Decimal) -> Order {
        Order {
            order_id: 1,
            idempotency_key: "k".to_string(),
            account_id: 7,
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            quantity,
            price,
            status: OrderStatus::Pending,
            failure_reason: None,
            created_at: Utc::now(),
            executed_at: None,
        }
    }

    fn held(quantity: i64, average_cost: Decimal) -> Position {
        Position {
            account_id: 7,
            symbol: "AAPL".to_string(),
            quantity,
            average_cost,
        }
    }

    #[test]
    fn first_buy_opens_at_fill_price() {
        let position = apply_buy(None, &fill(10, dec!(100))).unwrap();
        assert_eq!(position.quantity, 10);
        assert_eq!(position.average_cost, dec!(100));
    }

    #[test]
    fn second_buy_averages_by_quantity() {
        let first = held(10, dec!(100));
        let position = apply_buy(Some(&first), &fill(10, dec!(200))).unwrap();
        assert_eq!(position.quantity, 20);
        assert_eq!(position.average_cost, dec!(150));

        let uneven = apply_buy(Some(&held(30, dec!(10))), &fill(10, dec!(20))).unwrap();
        assert_eq!(uneven.average_cost, dec!(12.5));
    }

    #[test]
    fn average_cost_rounds_to_five_digits() {
        // (1 * 1 + 2 * 2) / 3 = 1.666666...
        let position = apply_buy(Some(&held(1, dec!(1))), &fill(2, dec!(2))).unwrap();
        assert_eq!(position.average_cost, dec!(1.66667));
    }

    #[test]
    fn quantity_overflow_is_an_integrity_error() {
        let err = apply_buy(Some(&held(i64::MAX, dec!(1))), &fill(1, dec!(1))).unwrap_err();
        assert!(matches!(err, ExecutorError::Integrity(_)));
    }

    #[test]
    fn quantity_beyond_ledger_range_is_an_integrity_error() {
        let near_cap = held(9_999_999_999_000, dec!(0.00001));
        let err = apply_buy(Some(&near_cap), &fill(1_000, dec!(0.00001))).unwrap_err();
        assert!(matches!(err, ExecutorError::Integrity(_)));

        let at_cap = apply_buy(Some(&near_cap), &fill(999, dec!(0.00001))).unwrap();
        assert_eq!(at_cap.quantity, 9_999_999_999_999);
    }

    #[test]
    fn sell_keeps_average_cost() {
        let change = apply_sell(&held(20, dec!(150)), 5).unwrap();
        assert_eq!(change, PositionChange::Reduce(held(15, dec!(150))));
    }

    #[test]
    fn selling_everything_closes_the_position() {
        assert_eq!(
            apply_sell(&held(20, dec!(150)), 20).unwrap(),
            PositionChange::Close
        );
        assert!(apply_sell(&held(20, dec!(150)), 21).is_err());
    }
}
