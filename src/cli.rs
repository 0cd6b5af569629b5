use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use core_types::OrderSide;
use rust_decimal::Decimal;
use std::path::PathBuf;

/// An auditable order execution ledger: accounts, orders, positions and a
/// double-entry ledger over PostgreSQL.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file. Missing is fine unless given explicitly.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,

    /// Use a process-local store instead of PostgreSQL. State is lost on exit.
    #[arg(long, global = true)]
    pub in_memory: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply the database schema migrations.
    Migrate,
    /// Run the HTTP API.
    Serve,
    /// Manage accounts.
    #[command(subcommand)]
    Account(AccountCommand),
    /// Create, execute and list orders.
    #[command(subcommand)]
    Order(OrderCommand),
    /// Show an account's cash balance.
    Balance(AccountArg),
    /// List an account's open positions.
    Positions(AccountArg),
    /// List executed orders, most recent first.
    Trades(TradesArgs),
    /// Dump an account's ledger, oldest first.
    Ledger(AccountArg),
    /// Mark an account to market at the latest prices.
    Metrics(AccountArg),
    /// Record and inspect price bars.
    #[command(subcommand)]
    Price(PriceCommand),
}

#[derive(Debug, Args)]
pub struct AccountArg {
    #[arg(long)]
    pub account: i64,
}

#[derive(Debug, Subcommand)]
pub enum AccountCommand {
    /// Open an account with its initial cash.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        cash: Decimal,
    },
}

#[derive(Debug, Subcommand)]
pub enum OrderCommand {
    /// Submit a pending order. Replaying a key returns the original order.
    Create(CreateOrderArgs),
    /// Execute a pending order.
    Execute {
        #[arg(long)]
        id: i64,
    },
    /// List all orders of an account, most recent first.
    List(AccountArg),
    /// Show one order and its ledger entries.
    Show {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Debug, Args)]
pub struct CreateOrderArgs {
    #[arg(long)]
    pub account: i64,
    #[arg(long)]
    pub symbol: String,
    /// BUY or SELL.
    #[arg(long)]
    pub side: OrderSide,
    #[arg(long)]
    pub quantity: i64,
    #[arg(long)]
    pub price: Decimal,
    /// Idempotency key. A random one is generated when omitted.
    #[arg(long)]
    pub key: Option<String>,
}

#[derive(Debug, Args)]
pub struct TradesArgs {
    #[arg(long)]
    pub account: i64,
    #[arg(long, default_value_t = core_types::TradeQuery::DEFAULT_LIMIT)]
    pub limit: i64,
    #[arg(long, default_value_t = 0)]
    pub offset: i64,
    /// Inclusive lower bound on execution time (RFC 3339).
    #[arg(long)]
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on execution time (RFC 3339).
    #[arg(long)]
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Subcommand)]
pub enum PriceCommand {
    /// Record one bar. Open defaults to the close; high and low to the
    /// range spanned by open and close.
    Add {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        close: Decimal,
        #[arg(long)]
        open: Option<Decimal>,
        #[arg(long)]
        high: Option<Decimal>,
        #[arg(long)]
        low: Option<Decimal>,
        #[arg(long, default_value_t = 0)]
        volume: i64,
        /// Bar time (RFC 3339); now when omitted.
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Show the most recent bars of a symbol.
    History {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        limit: Option<i64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_order_create_with_global_flags() {
        let cli = Cli::try_parse_from([
            "tradeledger", "order", "create", "--account", "1", "--symbol", "goog",
            "--side", "buy", "--quantity", "10", "--price", "175.50", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Order(OrderCommand::Create(args)) => {
                assert_eq!(args.side, OrderSide::Buy);
                assert_eq!(args.price, dec!(175.50));
                assert!(args.key.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn trades_default_to_first_page() {
        let cli = Cli::try_parse_from(["tradeledger", "trades", "--account", "3"]).unwrap();
        match cli.command {
            Commands::Trades(args) => {
                assert_eq!(args.limit, 50);
                assert_eq!(args.offset, 0);
                assert!(args.start.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_side() {
        assert!(
            Cli::try_parse_from([
                "tradeledger", "order", "create", "--account", "1", "--symbol", "X",
                "--side", "hold", "--quantity", "1", "--price", "1",
            ])
            .is_err()
        );
    }
}
