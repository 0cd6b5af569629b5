use analytics::PortfolioMetrics;
use comfy_table::{Table, presets::UTF8_FULL};
use core_types::{Account, ExecutionOutcome, LedgerEntry, Order, Position, PriceQuote, TradeRecord};
use serde::Serialize;

/// Something the CLI can print either as a table or as JSON.
pub trait Render: Serialize {
    fn table(&self) -> Table;
}

pub fn emit<T: Render>(value: &T, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value.table());
    }
    Ok(())
}

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(header.to_vec());
    table
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

impl Render for Account {
    fn table(&self) -> Table {
        let mut t = table(&["account_id", "name", "cash_balance"]);
        t.add_row(vec![
            self.account_id.to_string(),
            self.account_name.clone(),
            self.cash_balance.to_string(),
        ]);
        t
    }
}

#[derive(Debug, Serialize)]
pub struct OrderCreated {
    pub order_id: i64,
    pub idempotency_key: String,
}

impl Render for OrderCreated {
    fn table(&self) -> Table {
        let mut t = table(&["order_id", "idempotency_key"]);
        t.add_row(vec![self.order_id.to_string(), self.idempotency_key.clone()]);
        t
    }
}

#[derive(Debug, Serialize)]
pub struct Executed {
    pub order_id: i64,
    #[serde(flatten)]
    pub outcome: ExecutionOutcome,
}

impl Render for Executed {
    fn table(&self) -> Table {
        let mut t = table(&["order_id", "status", "reason"]);
        t.add_row(vec![
            self.order_id.to_string(),
            self.outcome.status.to_string(),
            opt(self.outcome.reason),
        ]);
        t
    }
}

#[derive(Debug, Serialize)]
pub struct Balance {
    pub account_id: i64,
    pub cash_balance: rust_decimal::Decimal,
}

impl Render for Balance {
    fn table(&self) -> Table {
        let mut t = table(&["account_id", "cash_balance"]);
        t.add_row(vec![self.account_id.to_string(), self.cash_balance.to_string()]);
        t
    }
}

impl Render for Vec<Position> {
    fn table(&self) -> Table {
        let mut t = table(&["symbol", "quantity", "average_cost"]);
        for p in self {
            t.add_row(vec![
                p.symbol.clone(),
                p.quantity.to_string(),
                p.average_cost.to_string(),
            ]);
        }
        t
    }
}

impl Render for Vec<Order> {
    fn table(&self) -> Table {
        let mut t = table(&[
            "order_id", "key", "side", "qty", "symbol", "price", "status", "reason", "created_at",
        ]);
        for o in self {
            t.add_row(vec![
                o.order_id.to_string(),
                o.idempotency_key.clone(),
                o.side.to_string(),
                o.quantity.to_string(),
                o.symbol.clone(),
                o.price.to_string(),
                o.status.to_string(),
                opt(o.failure_reason),
                o.created_at.to_rfc3339(),
            ]);
        }
        t
    }
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub ledger: Vec<LedgerEntry>,
}

impl Render for OrderDetail {
    fn table(&self) -> Table {
        let mut t = vec![self.order.clone()].table();
        for entry in &self.ledger {
            t.add_row(vec![
                format!("ledger #{}", entry.entry_id),
                entry.description.clone(),
                entry.asset.clone(),
                entry.change.to_string(),
                entry.new_balance.to_string(),
            ]);
        }
        t
    }
}

impl Render for Vec<TradeRecord> {
    fn table(&self) -> Table {
        let mut t = table(&["trade_id", "side", "qty", "symbol", "price", "notional", "executed_at"]);
        for tr in self {
            t.add_row(vec![
                tr.trade_id.to_string(),
                tr.side.to_string(),
                tr.quantity.to_string(),
                tr.symbol.clone(),
                tr.price.to_string(),
                tr.notional.to_string(),
                tr.executed_at.to_rfc3339(),
            ]);
        }
        t
    }
}

impl Render for Vec<LedgerEntry> {
    fn table(&self) -> Table {
        let mut t = table(&["entry_id", "order_id", "asset", "change", "new_balance", "description", "created_at"]);
        for e in self {
            t.add_row(vec![
                e.entry_id.to_string(),
                opt(e.order_id),
                e.asset.clone(),
                e.change.to_string(),
                e.new_balance.to_string(),
                e.description.clone(),
                e.created_at.to_rfc3339(),
            ]);
        }
        t
    }
}

impl Render for PortfolioMetrics {
    fn table(&self) -> Table {
        let mut t = table(&["symbol", "quantity", "average_cost", "market_price", "market_value", "unrealized_pnl"]);
        for p in &self.positions {
            t.add_row(vec![
                p.symbol.clone(),
                p.quantity.to_string(),
                p.average_cost.to_string(),
                p.market_price.to_string(),
                p.market_value.to_string(),
                p.unrealized_pnl.to_string(),
            ]);
        }
        for symbol in &self.unpriced_symbols {
            t.add_row(vec![symbol.clone(), "no price".to_string()]);
        }
        t.add_row(vec![
            "TOTAL".to_string(),
            format!("cash {}", self.cash_balance),
            String::new(),
            String::new(),
            self.total_market_value.to_string(),
            self.unrealized_pnl.to_string(),
        ]);
        t.add_row(vec![
            "VALUE".to_string(),
            self.total_portfolio_value.to_string(),
            format!("realized {}", self.realized_pnl),
            format!("as of {}", self.as_of.to_rfc3339()),
        ]);
        t
    }
}

impl Render for Vec<PriceQuote> {
    fn table(&self) -> Table {
        let mut t = table(&["timestamp", "symbol", "open", "high", "low", "close", "volume"]);
        for q in self {
            t.add_row(vec![
                q.timestamp.to_rfc3339(),
                q.symbol.clone(),
                q.open.to_string(),
                q.high.to_string(),
                q.low.to_string(),
                q.close.to_string(),
                q.volume.to_string(),
            ]);
        }
        t
    }
}

impl Render for PriceQuote {
    fn table(&self) -> Table {
        vec![self.clone()].table()
    }
}
