use crate::error::DbError;
use crate::store::{LedgerStore, StoreTx};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    Account, AccountId, FailureReason, LedgerEntry, NewLedgerEntry, NewOrder, NewPriceQuote,
    Order, OrderId, OrderStatus, Position, PriceQuote, TradeQuery,
};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, Postgres};
use sqlx::{FromRow, Transaction};

const ORDER_COLUMNS: &str = "order_id, idempotency_key, account_id, symbol, side, quantity, \
     price, status, failure_reason, created_at, executed_at";
const LEDGER_COLUMNS: &str =
    "entry_id, account_id, order_id, asset, change, new_balance, created_at, description";
const PRICE_COLUMNS: &str = "price_id, symbol, timestamp, open, high, low, close, volume";

/// The `DbRepository` is the PostgreSQL implementation of [`LedgerStore`].
/// It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

// Rows as they come off the wire. Enum columns are TEXT and are parsed on the
// way out so that a bad value surfaces as `DbError::Corrupt`, not a panic.
#[derive(Debug, FromRow)]
struct DbAccount {
    account_id: i64,
    account_name: String,
    cash_balance: Decimal,
}

#[derive(Debug, FromRow)]
struct DbPosition {
    account_id: i64,
    symbol: String,
    quantity: i64,
    average_cost: Decimal,
}

#[derive(Debug, FromRow)]
struct DbOrder {
    order_id: i64,
    idempotency_key: String,
    account_id: i64,
    symbol: String,
    side: String,
    quantity: i64,
    price: Decimal,
    status: String,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct DbLedgerEntry {
    entry_id: i64,
    account_id: i64,
    order_id: Option<i64>,
    asset: String,
    change: Decimal,
    new_balance: Decimal,
    created_at: DateTime<Utc>,
    description: String,
}

#[derive(Debug, FromRow)]
struct DbPrice {
    price_id: i64,
    symbol: String,
    timestamp: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: i64,
}

impl From<DbAccount> for Account {
    fn from(row: DbAccount) -> Self {
        Account {
            account_id: row.account_id,
            account_name: row.account_name,
            cash_balance: row.cash_balance,
        }
    }
}

impl From<DbPosition> for Position {
    fn from(row: DbPosition) -> Self {
        Position {
            account_id: row.account_id,
            symbol: row.symbol,
            quantity: row.quantity,
            average_cost: row.average_cost,
        }
    }
}

impl TryFrom<DbOrder> for Order {
    type Error = DbError;

    fn try_from(row: DbOrder) -> Result<Self, Self::Error> {
        let corrupt = |e: core_types::CoreError| {
            DbError::Corrupt(format!("order {}: {e}", row.order_id))
        };
        let side = row.side.parse().map_err(corrupt)?;
        let status = row.status.parse().map_err(corrupt)?;
        let failure_reason = row
            .failure_reason
            .as_deref()
            .map(str::parse::<FailureReason>)
            .transpose()
            .map_err(corrupt)?;

        Ok(Order {
            order_id: row.order_id,
            idempotency_key: row.idempotency_key,
            account_id: row.account_id,
            symbol: row.symbol,
            side,
            quantity: row.quantity,
            price: row.price,
            status,
            failure_reason,
            created_at: row.created_at,
            executed_at: row.executed_at,
        })
    }
}

impl From<DbLedgerEntry> for LedgerEntry {
    fn from(row: DbLedgerEntry) -> Self {
        LedgerEntry {
            entry_id: row.entry_id,
            account_id: row.account_id,
            order_id: row.order_id,
            asset: row.asset,
            change: row.change,
            new_balance: row.new_balance,
            created_at: row.created_at,
            description: row.description,
        }
    }
}

impl From<DbPrice> for PriceQuote {
    fn from(row: DbPrice) -> Self {
        PriceQuote {
            price_id: row.price_id,
            symbol: row.symbol,
            timestamp: row.timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

fn into_orders(rows: Vec<DbOrder>) -> Result<Vec<Order>, DbError> {
    rows.into_iter().map(Order::try_from).collect()
}

async fn insert_ledger_entry(
    conn: &mut PgConnection,
    entry: &NewLedgerEntry,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO ledger (account_id, order_id, asset, change, new_balance, description)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.account_id)
    .bind(entry.order_id)
    .bind(&entry.asset)
    .bind(entry.change)
    .bind(entry.new_balance)
    .bind(&entry.description)
    .execute(conn)
    .await
    .map_err(DbError::classify)?;
    Ok(())
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for DbRepository {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DbError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx: Some(tx) }))
    }

    /// Creates the account and its funding entry within a single transaction for atomicity.
    async fn create_account(
        &self,
        account_name: &str,
        initial_cash: Decimal,
    ) -> Result<Account, DbError> {
        let mut tx: Transaction<Postgres> = self.pool.begin().await?;

        let account: Account = sqlx::query_as::<_, DbAccount>(
            r#"
            INSERT INTO accounts (account_name, cash_balance)
            VALUES ($1, $2)
            RETURNING account_id, account_name, cash_balance
            "#,
        )
        .bind(account_name)
        .bind(initial_cash)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbError::classify)?
        .into();

        insert_ledger_entry(
            &mut *tx,
            &NewLedgerEntry::initial_funding(account.account_id, initial_cash),
        )
        .await?;

        tx.commit().await?;
        Ok(account)
    }

    async fn insert_order(&self, order: &NewOrder) -> Result<OrderId, DbError> {
        let order_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (idempotency_key, account_id, symbol, side, quantity, price, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING order_id
            "#,
        )
        .bind(&order.idempotency_key)
        .bind(order.account_id)
        .bind(&order.symbol)
        .bind(order.side.as_str())
        .bind(order.quantity)
        .bind(order.price)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::classify)?;
        Ok(order_id)
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>, DbError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1");
        sqlx::query_as::<_, DbOrder>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn find_order_by_key(&self, idempotency_key: &str) -> Result<Option<Order>, DbError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE idempotency_key = $1");
        sqlx::query_as::<_, DbOrder>(&sql)
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn find_account(&self, account_id: AccountId) -> Result<Option<Account>, DbError> {
        let account = sqlx::query_as::<_, DbAccount>(
            "SELECT account_id, account_name, cash_balance FROM accounts WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account.map(Account::from))
    }

    async fn list_positions(&self, account_id: AccountId) -> Result<Vec<Position>, DbError> {
        let rows = sqlx::query_as::<_, DbPosition>(
            r#"
            SELECT account_id, symbol, quantity, average_cost
            FROM positions
            WHERE account_id = $1
            ORDER BY symbol ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Position::from).collect())
    }

    async fn list_orders(&self, account_id: AccountId) -> Result<Vec<Order>, DbError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE account_id = $1 \
             ORDER BY created_at DESC, order_id DESC"
        );
        let rows = sqlx::query_as::<_, DbOrder>(&sql)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;
        into_orders(rows)
    }

    async fn list_trades(&self, query: &TradeQuery) -> Result<Vec<Order>, DbError> {
        let sql = format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE account_id = $1
              AND status = 'executed'
              AND ($2::timestamptz IS NULL OR executed_at >= $2)
              AND ($3::timestamptz IS NULL OR executed_at <= $3)
            ORDER BY executed_at DESC, order_id DESC
            LIMIT $4 OFFSET $5
            "#
        );
        let rows = sqlx::query_as::<_, DbOrder>(&sql)
            .bind(query.account_id)
            .bind(query.start)
            .bind(query.end)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;
        into_orders(rows)
    }

    async fn ledger_for_account(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, DbError> {
        let sql = format!("SELECT {LEDGER_COLUMNS} FROM ledger WHERE account_id = $1 ORDER BY entry_id");
        let rows = sqlx::query_as::<_, DbLedgerEntry>(&sql)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(LedgerEntry::from).collect())
    }

    async fn ledger_for_order(&self, order_id: OrderId) -> Result<Vec<LedgerEntry>, DbError> {
        let sql = format!("SELECT {LEDGER_COLUMNS} FROM ledger WHERE order_id = $1 ORDER BY entry_id");
        let rows = sqlx::query_as::<_, DbLedgerEntry>(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(LedgerEntry::from).collect())
    }

    /// Uses `ON CONFLICT DO NOTHING` to be idempotent, so it can be called repeatedly
    /// without causing errors if the bar already exists.
    async fn insert_price(&self, quote: &NewPriceQuote) -> Result<PriceQuote, DbError> {
        let sql = format!(
            r#"
            INSERT INTO prices (symbol, timestamp, open, high, low, close, volume)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (symbol, timestamp) DO NOTHING
            RETURNING {PRICE_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, DbPrice>(&sql)
            .bind(&quote.symbol)
            .bind(quote.timestamp)
            .bind(quote.open)
            .bind(quote.high)
            .bind(quote.low)
            .bind(quote.close)
            .bind(quote.volume)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = inserted {
            return Ok(row.into());
        }

        let sql = format!("SELECT {PRICE_COLUMNS} FROM prices WHERE symbol = $1 AND timestamp = $2");
        let existing = sqlx::query_as::<_, DbPrice>(&sql)
            .bind(&quote.symbol)
            .bind(quote.timestamp)
            .fetch_one(&self.pool)
            .await?;
        Ok(existing.into())
    }

    async fn latest_close(&self, symbol: &str) -> Result<Option<Decimal>, DbError> {
        let close = sqlx::query_scalar::<_, Decimal>(
            "SELECT close FROM prices WHERE symbol = $1 ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(close)
    }

    async fn price_history(&self, symbol: &str, limit: i64) -> Result<Vec<PriceQuote>, DbError> {
        let sql = format!(
            "SELECT {PRICE_COLUMNS} FROM prices WHERE symbol = $1 ORDER BY timestamp DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, DbPrice>(&sql)
            .bind(symbol)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PriceQuote::from).collect())
    }
}

/// An open PostgreSQL transaction. Row locks come from `SELECT ... FOR UPDATE`
/// and are released by COMMIT or ROLLBACK; sqlx rolls back on drop.
pub struct PgStoreTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStoreTx {
    fn conn(&mut self) -> Result<&mut PgConnection, DbError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| DbError::Storage("transaction already finished".to_string()))
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_pending_order(&mut self, order_id: OrderId) -> Result<Option<Order>, DbError> {
        // Under READ COMMITTED a waiter re-checks `status` after the holder
        // commits, so a concurrent second attempt sees no row.
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE order_id = $1 AND status = 'pending' FOR UPDATE"
        );
        let conn = self.conn()?;
        sqlx::query_as::<_, DbOrder>(&sql)
            .bind(order_id)
            .fetch_optional(conn)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn order_exists(&mut self, order_id: OrderId) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE order_id = $1)")
                .bind(order_id)
                .fetch_one(conn)
                .await?;
        Ok(exists)
    }

    async fn lock_account(&mut self, account_id: AccountId) -> Result<Option<Account>, DbError> {
        let conn = self.conn()?;
        let account = sqlx::query_as::<_, DbAccount>(
            r#"
            SELECT account_id, account_name, cash_balance
            FROM accounts
            WHERE account_id = $1
            FOR UPDATE
            "#,
        )
        .bind(account_id)
        .fetch_optional(conn)
        .await?;
        Ok(account.map(Account::from))
    }

    async fn lock_position(
        &mut self,
        account_id: AccountId,
        symbol: &str,
    ) -> Result<Option<Position>, DbError> {
        let conn = self.conn()?;
        let position = sqlx::query_as::<_, DbPosition>(
            r#"
            SELECT account_id, symbol, quantity, average_cost
            FROM positions
            WHERE account_id = $1 AND symbol = $2
            FOR UPDATE
            "#,
        )
        .bind(account_id)
        .bind(symbol)
        .fetch_optional(conn)
        .await?;
        Ok(position.map(Position::from))
    }

    async fn update_cash_balance(
        &mut self,
        account_id: AccountId,
        cash_balance: Decimal,
    ) -> Result<(), DbError> {
        let conn = self.conn()?;
        let result = sqlx::query("UPDATE accounts SET cash_balance = $2 WHERE account_id = $1")
            .bind(account_id)
            .bind(cash_balance)
            .execute(conn)
            .await?;
        if result.rows_affected() != 1 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn upsert_position(&mut self, position: &Position) -> Result<(), DbError> {
        let conn = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO positions (account_id, symbol, quantity, average_cost)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (account_id, symbol)
            DO UPDATE SET quantity = EXCLUDED.quantity, average_cost = EXCLUDED.average_cost
            "#,
        )
        .bind(position.account_id)
        .bind(&position.symbol)
        .bind(position.quantity)
        .bind(position.average_cost)
        .execute(conn)
        .await
        .map_err(DbError::classify)?;
        Ok(())
    }

    async fn delete_position(
        &mut self,
        account_id: AccountId,
        symbol: &str,
    ) -> Result<(), DbError> {
        let conn = self.conn()?;
        sqlx::query("DELETE FROM positions WHERE account_id = $1 AND symbol = $2")
            .bind(account_id)
            .bind(symbol)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn append_ledger_entry(&mut self, entry: &NewLedgerEntry) -> Result<(), DbError> {
        let conn = self.conn()?;
        insert_ledger_entry(conn, entry).await
    }

    async fn finish_order(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        reason: Option<FailureReason>,
    ) -> Result<(), DbError> {
        let conn = self.conn()?;
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2,
                failure_reason = $3,
                executed_at = CASE WHEN $2::text = 'executed' THEN NOW() ELSE NULL END
            WHERE order_id = $1 AND status = 'pending'
            "#,
        )
        .bind(order_id)
        .bind(status.as_str())
        .bind(reason.map(|r| r.as_str()))
        .execute(conn)
        .await?;
        if result.rows_affected() != 1 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        match self.tx.take() {
            Some(tx) => Ok(tx.commit().await?),
            None => Err(DbError::Storage("transaction already finished".to_string())),
        }
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        match self.tx.take() {
            Some(tx) => Ok(tx.rollback().await?),
            None => Ok(()),
        }
    }
}
