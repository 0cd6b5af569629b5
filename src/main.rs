use anyhow::{Context, bail};
use chrono::Utc;
use clap::Parser;
use cli::{AccountCommand, Cli, Commands, OrderCommand, PriceCommand};
use configuration::Settings;
use core_types::{AccountRequest, NewPriceQuote, OrderRequest, TradeQuery};
use database::{DbRepository, InMemoryStore, LedgerStore, PgPool};
use executor::OrderEngine;
use output::{Balance, Executed, OrderCreated, OrderDetail, emit};
use std::path::Path;
use std::sync::Arc;

mod cli;
mod output;

/// The main entry point for the tradeledger application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => configuration::load_config_from(path, true),
        None => configuration::load_config_from(Path::new(configuration::DEFAULT_CONFIG_FILE), false),
    }
    .context("Failed to load configuration")?;
    let _log_guard = configuration::init_tracing(&settings.logging)?;

    match cli.command {
        Commands::Migrate => {
            if cli.in_memory {
                bail!("`migrate` needs a database; drop --in-memory");
            }
            let pool = connect(&settings).await?;
            database::run_migrations(&pool).await?;
            println!("Migrations applied.");
            Ok(())
        }
        Commands::Serve => {
            if cli.in_memory {
                let engine = OrderEngine::new(Arc::new(InMemoryStore::new()));
                tracing::warn!("Serving from an in-memory store; state is lost on exit.");
                web_server::run_server(settings.server.socket_addr()?, engine).await
            } else {
                web_server::serve_postgres(&settings).await
            }
        }
        command => {
            let engine = OrderEngine::new(open_store(&settings, cli.in_memory).await?);
            run_command(&engine, command, cli.json).await
        }
    }
}

async fn connect(settings: &Settings) -> anyhow::Result<PgPool> {
    let pool = database::connect(
        settings.database.require_url()?,
        settings.database.max_connections,
        settings.database.acquire_timeout(),
    )
    .await
    .context("Failed to connect to the database")?;
    Ok(pool)
}

async fn open_store(settings: &Settings, in_memory: bool) -> anyhow::Result<Arc<dyn LedgerStore>> {
    if in_memory {
        return Ok(Arc::new(InMemoryStore::new()));
    }
    let pool = connect(settings).await?;
    database::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(Arc::new(DbRepository::new(pool)))
}

async fn run_command(engine: &OrderEngine, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Account(AccountCommand::Create { name, cash }) => {
            let account = engine
                .open_account(AccountRequest {
                    account_name: name,
                    initial_cash: cash,
                })
                .await?;
            emit(&account, json)
        }
        Commands::Order(OrderCommand::Create(args)) => {
            let idempotency_key = args
                .key
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let order_id = engine
                .create_order(OrderRequest {
                    account_id: args.account,
                    idempotency_key: idempotency_key.clone(),
                    symbol: args.symbol,
                    side: args.side,
                    quantity: args.quantity,
                    price: args.price,
                })
                .await?;
            emit(&OrderCreated { order_id, idempotency_key }, json)
        }
        Commands::Order(OrderCommand::Execute { id }) => {
            let outcome = engine.execute_order(id).await?;
            emit(&Executed { order_id: id, outcome }, json)
        }
        Commands::Order(OrderCommand::List(args)) => {
            emit(&engine.get_order_history(args.account).await?, json)
        }
        Commands::Order(OrderCommand::Show { id }) => {
            let order = engine
                .get_order(id)
                .await?
                .with_context(|| format!("order {id} not found"))?;
            let ledger = engine.get_order_ledger(id).await?;
            emit(&OrderDetail { order, ledger }, json)
        }
        Commands::Balance(args) => {
            let cash_balance = engine
                .get_account_balance(args.account)
                .await?
                .with_context(|| format!("account {} not found", args.account))?;
            emit(
                &Balance {
                    account_id: args.account,
                    cash_balance,
                },
                json,
            )
        }
        Commands::Positions(args) => emit(&engine.get_positions(args.account).await?, json),
        Commands::Trades(args) => {
            let query = TradeQuery {
                account_id: args.account,
                limit: args.limit,
                offset: args.offset,
                start: args.start,
                end: args.end,
            };
            emit(&engine.get_trade_history(&query).await?, json)
        }
        Commands::Ledger(args) => emit(&engine.get_ledger(args.account).await?, json),
        Commands::Metrics(args) => {
            let metrics = analytics::get_portfolio_metrics(engine.store().as_ref(), args.account)
                .await?
                .with_context(|| format!("account {} not found", args.account))?;
            emit(&metrics, json)
        }
        Commands::Price(PriceCommand::Add {
            symbol,
            close,
            open,
            high,
            low,
            volume,
            timestamp,
        }) => {
            let open = open.unwrap_or(close);
            let stored = engine
                .add_price(NewPriceQuote {
                    symbol,
                    timestamp: timestamp.unwrap_or_else(Utc::now),
                    open,
                    high: high.unwrap_or(open.max(close)),
                    low: low.unwrap_or(open.min(close)),
                    close,
                    volume,
                })
                .await?;
            emit(&stored, json)
        }
        Commands::Price(PriceCommand::History { symbol, limit }) => {
            emit(&engine.get_price_history(&symbol, limit).await?, json)
        }
        Commands::Migrate | Commands::Serve => bail!("not a store command"),
    }
}
