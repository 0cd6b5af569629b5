//! Fixed-scale money helpers.
//!
//! Every monetary column is stored as `NUMERIC(18, 5)`: five fractional digits
//! and thirteen integer digits. Values computed in the engine are kept inside
//! that envelope so that what is committed is exactly what was computed.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Number of fractional digits carried by every monetary amount.
pub const MONEY_SCALE: u32 = 5;

/// Largest amount representable by a `NUMERIC(18, 5)` column.
pub const MAX_MONEY: Decimal = dec!(9999999999999.99999);

/// Rounds to [`MONEY_SCALE`] digits, midpoint away from zero (the rounding
/// PostgreSQL applies when it coerces into `NUMERIC(18, 5)`).
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// True when `value` needs no rounding to fit the money scale.
pub fn fits_money_scale(value: Decimal) -> bool {
    value.normalize().scale() <= MONEY_SCALE
}

/// `quantity * price`, or `None` when the result leaves the storable range.
pub fn notional(quantity: i64, price: Decimal) -> Option<Decimal> {
    Decimal::from(quantity)
        .checked_mul(price)
        .filter(|value| value.abs() <= MAX_MONEY)
}
