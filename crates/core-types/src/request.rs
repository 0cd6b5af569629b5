use crate::enums::OrderSide;
use crate::error::CoreError;
use crate::money::{MAX_MONEY, MONEY_SCALE, fits_money_scale, notional};
use crate::structs::{AccountId, CASH_ASSET, NewOrder, NewPriceQuote};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const MAX_SYMBOL_LEN: usize = 32;
const MAX_KEY_LEN: usize = 128;
const MAX_NAME_LEN: usize = 100;

/// A client's request to place an order, as received from the outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub account_id: AccountId,
    pub idempotency_key: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub price: Decimal,
}

impl OrderRequest {
    /// Checks every field and canonicalises the symbol to upper case.
    /// The idempotency key is taken verbatim. Nothing here touches storage.
    pub fn validate(self) -> Result<NewOrder, CoreError> {
        let idempotency_key = self.idempotency_key;
        if idempotency_key.is_empty() || idempotency_key.len() > MAX_KEY_LEN {
            return Err(invalid(
                "idempotency_key",
                format!("must be 1 to {MAX_KEY_LEN} characters"),
            ));
        }
        if idempotency_key.trim() != idempotency_key {
            return Err(invalid(
                "idempotency_key",
                "must not have leading or trailing whitespace".to_string(),
            ));
        }

        let symbol = normalize_symbol(&self.symbol)?;

        if self.quantity <= 0 {
            return Err(invalid(
                "quantity",
                format!("must be a positive integer, got {}", self.quantity),
            ));
        }
        // The asset ledger leg stores share counts in a money-sized column.
        if Decimal::from(self.quantity) > MAX_MONEY {
            return Err(invalid("quantity", format!("must not exceed {MAX_MONEY}")));
        }

        validate_price("price", self.price)?;
        if notional(self.quantity, self.price).is_none() {
            return Err(invalid(
                "quantity",
                format!("notional of {} x {} exceeds {MAX_MONEY}", self.quantity, self.price),
            ));
        }

        Ok(NewOrder {
            account_id: self.account_id,
            idempotency_key,
            symbol,
            side: self.side,
            quantity: self.quantity,
            price: self.price,
        })
    }
}

/// Bootstrap request for a new funded account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRequest {
    pub account_name: String,
    pub initial_cash: Decimal,
}

impl AccountRequest {
    pub fn validate(self) -> Result<Self, CoreError> {
        let account_name = self.account_name.trim().to_string();
        if account_name.is_empty() || account_name.len() > MAX_NAME_LEN {
            return Err(invalid(
                "account_name",
                format!("must be 1 to {MAX_NAME_LEN} characters"),
            ));
        }
        if self.initial_cash < Decimal::ZERO || self.initial_cash > MAX_MONEY {
            return Err(invalid(
                "initial_cash",
                format!("must be between 0 and {MAX_MONEY}"),
            ));
        }
        if !fits_money_scale(self.initial_cash) {
            return Err(invalid(
                "initial_cash",
                format!("has more than {MONEY_SCALE} fractional digits"),
            ));
        }
        Ok(Self {
            account_name,
            initial_cash: self.initial_cash,
        })
    }
}

impl NewPriceQuote {
    /// Upper-cases the symbol and checks the bar is internally consistent.
    pub fn validate(mut self) -> Result<Self, CoreError> {
        self.symbol = normalize_symbol(&self.symbol)?;
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            validate_price(field, value)?;
        }
        if self.low > self.high {
            return Err(invalid("low", "must not exceed high".to_string()));
        }
        for (field, value) in [("open", self.open), ("close", self.close)] {
            if value < self.low || value > self.high {
                return Err(invalid(field, format!("{value} is outside [low, high]")));
            }
        }
        if self.volume < 0 {
            return Err(invalid("volume", "must not be negative".to_string()));
        }
        Ok(self)
    }
}

/// Trims and upper-cases a ticker. `CASH` is reserved for the ledger.
pub fn normalize_symbol(raw: &str) -> Result<String, CoreError> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty() || symbol.len() > MAX_SYMBOL_LEN {
        return Err(invalid(
            "symbol",
            format!("must be 1 to {MAX_SYMBOL_LEN} characters"),
        ));
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/'))
    {
        return Err(invalid("symbol", format!("'{symbol}' contains invalid characters")));
    }
    if symbol == CASH_ASSET {
        return Err(invalid("symbol", format!("'{CASH_ASSET}' is reserved")));
    }
    Ok(symbol)
}

fn validate_price(field: &str, value: Decimal) -> Result<(), CoreError> {
    if value <= Decimal::ZERO {
        return Err(invalid(field, format!("must be positive, got {value}")));
    }
    if value > MAX_MONEY {
        return Err(invalid(field, format!("must not exceed {MAX_MONEY}")));
    }
    if !fits_money_scale(value) {
        return Err(invalid(
            field,
            format!("{value} has more than {MONEY_SCALE} fractional digits"),
        ));
    }
    Ok(())
}

fn invalid(field: &str, reason: String) -> CoreError {
    CoreError::InvalidInput(field.to_string(), reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn request() -> OrderRequest {
        OrderRequest {
            account_id: 1,
            idempotency_key: "k-1".to_string(),
            symbol: " goog ".to_string(),
            side: OrderSide::Buy,
            quantity: 10,
            price: dec!(175.50),
        }
    }

    #[test]
    fn valid_request_upper_cases_symbol() {
        let order = request().validate().unwrap();
        assert_eq!(order.symbol, "GOOG");
        assert_eq!(order.quantity, 10);
        assert_eq!(order.price, dec!(175.50));
    }

    #[test]
    fn rejects_non_positive_quantity() {
        for quantity in [0, -5] {
            let err = OrderRequest { quantity, ..request() }.validate().unwrap_err();
            assert!(matches!(err, CoreError::InvalidInput(field, _) if field == "quantity"));
        }
    }

    #[test]
    fn rejects_non_positive_and_over_scale_prices() {
        for price in [dec!(0), dec!(-1), dec!(1.000001)] {
            let err = OrderRequest { price, ..request() }.validate().unwrap_err();
            assert!(matches!(err, CoreError::InvalidInput(field, _) if field == "price"));
        }
    }

    #[test]
    fn rejects_blank_key_and_reserved_symbol() {
        let err = OrderRequest { idempotency_key: "  ".into(), ..request() }
            .validate()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(field, _) if field == "idempotency_key"));

        let err = OrderRequest { symbol: "cash".into(), ..request() }
            .validate()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(field, _) if field == "symbol"));
    }

    #[test]
    fn rejects_keys_with_surrounding_whitespace() {
        for key in [" k-1", "k-1 ", "\tk-1"] {
            let err = OrderRequest { idempotency_key: key.into(), ..request() }
                .validate()
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidInput(field, _) if field == "idempotency_key"));
        }
        let order = OrderRequest { idempotency_key: "k 1".into(), ..request() }
            .validate()
            .unwrap();
        assert_eq!(order.idempotency_key, "k 1");
    }

    #[test]
    fn rejects_quantity_beyond_ledger_range_even_at_tiny_price() {
        let err = OrderRequest {
            quantity: 10_000_000_000_000,
            price: dec!(0.00001),
            ..request()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(field, _) if field == "quantity"));

        let order = OrderRequest {
            quantity: 9_999_999_999_999,
            price: dec!(0.00001),
            ..request()
        }
        .validate()
        .unwrap();
        assert_eq!(order.quantity, 9_999_999_999_999);
    }

    #[test]
    fn rejects_unstorable_notional() {
        let err = OrderRequest { quantity: 2, price: MAX_MONEY, ..request() }
            .validate()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(field, _) if field == "quantity"));
    }

    #[test]
    fn price_quote_validation_normalises_symbol() {
        let quote = NewPriceQuote {
            symbol: "aapl".into(),
            timestamp: Utc::now(),
            open: dec!(10),
            high: dec!(12),
            low: dec!(9),
            close: dec!(11),
            volume: 100,
        }
        .validate()
        .unwrap();
        assert_eq!(quote.symbol, "AAPL");
    }

    #[test]
    fn price_quote_open_and_close_must_sit_inside_the_range() {
        let bar = NewPriceQuote {
            symbol: "AAPL".into(),
            timestamp: Utc::now(),
            open: dec!(10),
            high: dec!(12),
            low: dec!(9),
            close: dec!(11),
            volume: 100,
        };
        let err = NewPriceQuote { close: dec!(12.5), ..bar.clone() }.validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(field, _) if field == "close"));
        let err = NewPriceQuote { open: dec!(8), ..bar.clone() }.validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(field, _) if field == "open"));
        // Bounds are inclusive.
        assert!(NewPriceQuote { open: dec!(9), close: dec!(12), ..bar }.validate().is_ok());
    }

    #[test]
    fn account_request_trims_name_and_bounds_cash() {
        let ok = AccountRequest {
            account_name: "  main ".into(),
            initial_cash: dec!(1000000.00),
        }
        .validate()
        .unwrap();
        assert_eq!(ok.account_name, "main");

        for initial_cash in [dec!(-1), dec!(0.000001)] {
            let err = AccountRequest { account_name: "main".into(), initial_cash }
                .validate()
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidInput(field, _) if field == "initial_cash"));
        }
    }
}
