use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts any casing, so `buy`, `Buy` and `BUY` all parse.
impl FromStr for OrderSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(CoreError::InvalidInput(
                "side".to_string(),
                format!("expected BUY or SELL, got '{other}'"),
            )),
        }
    }
}

/// Lifecycle of an order.
///
/// `Pending` is the only non-terminal state. The execution engine moves an order
/// to `Executed` or `Failed` exactly once; `Cancelled` is set by out-of-band tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Executed,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Executed => "executed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "executed" => Ok(OrderStatus::Executed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(CoreError::InvalidInput(
                "status".to_string(),
                format!("unknown order status '{other}'"),
            )),
        }
    }
}

/// Why an execution attempt did not produce `executed`.
///
/// The first two are business failures and are persisted on the order.
/// `InvalidState` and `OrderNotFound` are rejections: they are reported to the
/// caller but never written, because the order is either already terminal or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InsufficientFunds,
    InsufficientShares,
    InvalidState,
    OrderNotFound,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::InsufficientFunds => "insufficient_funds",
            FailureReason::InsufficientShares => "insufficient_shares",
            FailureReason::InvalidState => "invalid_state",
            FailureReason::OrderNotFound => "order_not_found",
        }
    }

    /// True for reasons that are recorded on the order row.
    pub fn is_business_failure(&self) -> bool {
        matches!(
            self,
            FailureReason::InsufficientFunds | FailureReason::InsufficientShares
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insufficient_funds" => Ok(FailureReason::InsufficientFunds),
            "insufficient_shares" => Ok(FailureReason::InsufficientShares),
            "invalid_state" => Ok(FailureReason::InvalidState),
            "order_not_found" => Ok(FailureReason::OrderNotFound),
            other => Err(CoreError::InvalidInput(
                "failure_reason".to_string(),
                format!("unknown failure reason '{other}'"),
            )),
        }
    }
}
