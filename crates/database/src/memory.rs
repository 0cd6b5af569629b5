//! A process-local [`LedgerStore`] with the same locking and atomicity
//! behaviour as the PostgreSQL repository.
//!
//! Each row has its own `tokio` mutex. A [`MemoryTx`] keeps the owned guards
//! of every row it locked and stages its writes; `commit` applies them in one
//! step under the table lock, and dropping the transaction discards them.

use crate::error::DbError;
use crate::store::{LedgerStore, StoreTx};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    Account, AccountId, FailureReason, LedgerEntry, NewLedgerEntry, NewOrder, NewPriceQuote,
    Order, OrderId, OrderStatus, Position, PriceQuote, TradeQuery,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

#[cfg(feature = "testkit")]
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Order(OrderId),
    Account(AccountId),
    Position(AccountId, String),
}

#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    positions: BTreeMap<(AccountId, String), Position>,
    orders: BTreeMap<OrderId, Order>,
    order_keys: HashMap<String, OrderId>,
    ledger: Vec<LedgerEntry>,
    prices: BTreeMap<(String, DateTime<Utc>), PriceQuote>,
    next_account_id: i64,
    next_order_id: i64,
    next_entry_id: i64,
    next_price_id: i64,
}

impl Tables {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn push_ledger(&mut self, entry: &NewLedgerEntry, created_at: DateTime<Utc>) {
        let entry_id = Self::next_id(&mut self.next_entry_id);
        self.ledger.push(LedgerEntry {
            entry_id,
            account_id: entry.account_id,
            order_id: entry.order_id,
            asset: entry.asset.clone(),
            change: entry.change,
            new_balance: entry.new_balance,
            created_at,
            description: entry.description.clone(),
        });
    }
}

#[cfg(feature = "testkit")]
#[derive(Debug, Default)]
struct Faults {
    fail_ledger_appends: AtomicBool,
    missed_key_lookups: AtomicUsize,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
    #[cfg(feature = "testkit")]
    faults: Faults,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, key: &RowKey) -> Arc<RowMutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    #[cfg(feature = "testkit")]
    fn take_missed_lookup(&self) -> bool {
        self.faults
            .missed_key_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[cfg(not(feature = "testkit"))]
    fn take_missed_lookup(&self) -> bool {
        false
    }

    #[cfg(feature = "testkit")]
    fn ledger_append_fault(&self) -> bool {
        self.faults.fail_ledger_appends.load(Ordering::SeqCst)
    }

    #[cfg(not(feature = "testkit"))]
    fn ledger_append_fault(&self) -> bool {
        false
    }
}

/// Cheap to clone; clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "testkit")]
impl InMemoryStore {
    /// While set, every `append_ledger_entry` fails with [`DbError::Storage`].
    pub fn fail_ledger_appends(&self, fail: bool) {
        self.shared
            .faults
            .fail_ledger_appends
            .store(fail, Ordering::SeqCst);
    }

    /// Removes the account row and leaves its orders behind, as a broken
    /// foreign key would.
    pub fn detach_account(&self, account_id: AccountId) {
        self.shared.tables().accounts.remove(&account_id);
    }

    /// The next `n` calls to `find_order_by_key` report no match, the way a
    /// lookup that lost a race with a concurrent insert would.
    pub fn miss_key_lookups(&self, n: usize) {
        self.shared
            .faults
            .missed_key_lookups
            .store(n, Ordering::SeqCst);
    }
}

fn page<T>(items: impl Iterator<Item = T>, offset: i64, limit: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(0);
    items.skip(offset).take(limit).collect()
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DbError> {
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.shared),
            guards: HashMap::new(),
            staged: Staged::default(),
            open: true,
        }))
    }

    async fn create_account(
        &self,
        account_name: &str,
        initial_cash: Decimal,
    ) -> Result<Account, DbError> {
        if initial_cash < Decimal::ZERO {
            return Err(DbError::Storage(
                "accounts.cash_balance must not be negative".to_string(),
            ));
        }
        let mut tables = self.shared.tables();
        if tables
            .accounts
            .values()
            .any(|a| a.account_name == account_name)
        {
            return Err(DbError::UniqueViolation(format!(
                "account name {account_name:?} already exists"
            )));
        }

        let account = Account {
            account_id: Tables::next_id(&mut tables.next_account_id),
            account_name: account_name.to_string(),
            cash_balance: initial_cash,
        };
        tables.accounts.insert(account.account_id, account.clone());
        tables.push_ledger(
            &NewLedgerEntry::initial_funding(account.account_id, initial_cash),
            Utc::now(),
        );
        Ok(account)
    }

    async fn insert_order(&self, order: &NewOrder) -> Result<OrderId, DbError> {
        let mut tables = self.shared.tables();
        if tables.order_keys.contains_key(&order.idempotency_key) {
            return Err(DbError::UniqueViolation(format!(
                "idempotency key {:?} already exists",
                order.idempotency_key
            )));
        }
        if !tables.accounts.contains_key(&order.account_id) {
            return Err(DbError::ForeignKeyViolation(format!(
                "account {} does not exist",
                order.account_id
            )));
        }

        let order_id = Tables::next_id(&mut tables.next_order_id);
        tables.orders.insert(
            order_id,
            Order {
                order_id,
                idempotency_key: order.idempotency_key.clone(),
                account_id: order.account_id,
                symbol: order.symbol.clone(),
                side: order.side,
                quantity: order.quantity,
                price: order.price,
                status: OrderStatus::Pending,
                failure_reason: None,
                created_at: Utc::now(),
                executed_at: None,
            },
        );
        tables
            .order_keys
            .insert(order.idempotency_key.clone(), order_id);
        Ok(order_id)
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>, DbError> {
        Ok(self.shared.tables().orders.get(&order_id).cloned())
    }

    async fn find_order_by_key(&self, idempotency_key: &str) -> Result<Option<Order>, DbError> {
        if self.shared.take_missed_lookup() {
            return Ok(None);
        }
        let tables = self.shared.tables();
        Ok(tables
            .order_keys
            .get(idempotency_key)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn find_account(&self, account_id: AccountId) -> Result<Option<Account>, DbError> {
        Ok(self.shared.tables().accounts.get(&account_id).cloned())
    }

    async fn list_positions(&self, account_id: AccountId) -> Result<Vec<Position>, DbError> {
        let tables = self.shared.tables();
        Ok(tables
            .positions
            .values()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn list_orders(&self, account_id: AccountId) -> Result<Vec<Order>, DbError> {
        let tables = self.shared.tables();
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.account_id == account_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.order_id.cmp(&a.order_id))
        });
        Ok(orders)
    }

    async fn list_trades(&self, query: &TradeQuery) -> Result<Vec<Order>, DbError> {
        let tables = self.shared.tables();
        let mut trades: Vec<&Order> = tables
            .orders
            .values()
            .filter(|o| o.account_id == query.account_id && o.status == OrderStatus::Executed)
            .filter(|o| match o.executed_at {
                Some(at) => {
                    query.start.is_none_or(|start| at >= start)
                        && query.end.is_none_or(|end| at <= end)
                }
                None => false,
            })
            .collect();
        trades.sort_by(|a, b| {
            b.executed_at
                .cmp(&a.executed_at)
                .then(b.order_id.cmp(&a.order_id))
        });
        Ok(page(trades.into_iter().cloned(), query.offset, query.limit))
    }

    async fn ledger_for_account(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, DbError> {
        let tables = self.shared.tables();
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn ledger_for_order(&self, order_id: OrderId) -> Result<Vec<LedgerEntry>, DbError> {
        let tables = self.shared.tables();
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.order_id == Some(order_id))
            .cloned()
            .collect())
    }

    async fn insert_price(&self, quote: &NewPriceQuote) -> Result<PriceQuote, DbError> {
        let mut tables = self.shared.tables();
        let key = (quote.symbol.clone(), quote.timestamp);
        if let Some(existing) = tables.prices.get(&key) {
            return Ok(existing.clone());
        }
        let stored = PriceQuote {
            price_id: Tables::next_id(&mut tables.next_price_id),
            symbol: quote.symbol.clone(),
            timestamp: quote.timestamp,
            open: quote.open,
            high: quote.high,
            low: quote.low,
            close: quote.close,
            volume: quote.volume,
        };
        tables.prices.insert(key, stored.clone());
        Ok(stored)
    }

    async fn latest_close(&self, symbol: &str) -> Result<Option<Decimal>, DbError> {
        let tables = self.shared.tables();
        Ok(tables
            .prices
            .values()
            .filter(|p| p.symbol == symbol)
            .max_by_key(|p| p.timestamp)
            .map(|p| p.close))
    }

    async fn price_history(&self, symbol: &str, limit: i64) -> Result<Vec<PriceQuote>, DbError> {
        let tables = self.shared.tables();
        let bars = tables
            .prices
            .values()
            .filter(|p| p.symbol == symbol)
            .rev()
            .cloned();
        Ok(page(bars, 0, limit))
    }
}

#[derive(Debug, Default)]
struct Staged {
    cash: HashMap<AccountId, Decimal>,
    // `None` marks a deleted position.
    positions: HashMap<(AccountId, String), Option<Position>>,
    ledger: Vec<NewLedgerEntry>,
    finished: HashMap<OrderId, (OrderStatus, Option<FailureReason>)>,
}

/// An open in-memory transaction. See the module docs.
pub struct MemoryTx {
    shared: Arc<Shared>,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    staged: Staged,
    open: bool,
}

impl MemoryTx {
    fn ensure_open(&self) -> Result<(), DbError> {
        if self.open {
            Ok(())
        } else {
            Err(DbError::Storage("transaction already finished".to_string()))
        }
    }

    /// Blocks until this transaction owns `key`. Re-locking a held row is a no-op.
    async fn acquire(&mut self, key: RowKey) {
        if self.guards.contains_key(&key) {
            return;
        }
        let lock = self.shared.row_lock(&key);
        let guard = lock.lock_owned().await;
        self.guards.insert(key, guard);
    }

    fn order_status(&self, order: &Order) -> OrderStatus {
        self.staged
            .finished
            .get(&order.order_id)
            .map(|(status, _)| *status)
            .unwrap_or(order.status)
    }

    fn release(&mut self) {
        self.open = false;
        self.staged = Staged::default();
        self.guards.clear();
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_pending_order(&mut self, order_id: OrderId) -> Result<Option<Order>, DbError> {
        self.ensure_open()?;
        if !self.shared.tables().orders.contains_key(&order_id) {
            return Ok(None);
        }

        let key = RowKey::Order(order_id);
        self.acquire(key.clone()).await;

        let order = self.shared.tables().orders.get(&order_id).cloned();
        match order {
            Some(order) if self.order_status(&order) == OrderStatus::Pending => Ok(Some(order)),
            _ => {
                // Only matching rows stay locked.
                self.guards.remove(&key);
                Ok(None)
            }
        }
    }

    async fn order_exists(&mut self, order_id: OrderId) -> Result<bool, DbError> {
        self.ensure_open()?;
        Ok(self.shared.tables().orders.contains_key(&order_id))
    }

    async fn lock_account(&mut self, account_id: AccountId) -> Result<Option<Account>, DbError> {
        self.ensure_open()?;
        self.acquire(RowKey::Account(account_id)).await;

        let account = self.shared.tables().accounts.get(&account_id).cloned();
        Ok(account.map(|mut account| {
            if let Some(cash) = self.staged.cash.get(&account_id) {
                account.cash_balance = *cash;
            }
            account
        }))
    }

    async fn lock_position(
        &mut self,
        account_id: AccountId,
        symbol: &str,
    ) -> Result<Option<Position>, DbError> {
        self.ensure_open()?;
        self.acquire(RowKey::Position(account_id, symbol.to_string()))
            .await;

        let row_key = (account_id, symbol.to_string());
        if let Some(staged) = self.staged.positions.get(&row_key) {
            return Ok(staged.clone());
        }
        Ok(self.shared.tables().positions.get(&row_key).cloned())
    }

    async fn update_cash_balance(
        &mut self,
        account_id: AccountId,
        cash_balance: Decimal,
    ) -> Result<(), DbError> {
        self.ensure_open()?;
        if cash_balance < Decimal::ZERO {
            return Err(DbError::Storage(
                "accounts.cash_balance must not be negative".to_string(),
            ));
        }
        if !self.shared.tables().accounts.contains_key(&account_id) {
            return Err(DbError::NotFound);
        }
        self.staged.cash.insert(account_id, cash_balance);
        Ok(())
    }

    async fn upsert_position(&mut self, position: &Position) -> Result<(), DbError> {
        self.ensure_open()?;
        if position.quantity <= 0 {
            return Err(DbError::Storage(
                "positions.quantity must be positive".to_string(),
            ));
        }
        self.staged.positions.insert(
            (position.account_id, position.symbol.clone()),
            Some(position.clone()),
        );
        Ok(())
    }

    async fn delete_position(
        &mut self,
        account_id: AccountId,
        symbol: &str,
    ) -> Result<(), DbError> {
        self.ensure_open()?;
        self.staged
            .positions
            .insert((account_id, symbol.to_string()), None);
        Ok(())
    }

    async fn append_ledger_entry(&mut self, entry: &NewLedgerEntry) -> Result<(), DbError> {
        self.ensure_open()?;
        if self.shared.ledger_append_fault() {
            return Err(DbError::Storage("injected ledger append failure".to_string()));
        }
        if !self.shared.tables().accounts.contains_key(&entry.account_id) {
            return Err(DbError::ForeignKeyViolation(format!(
                "account {} does not exist",
                entry.account_id
            )));
        }
        self.staged.ledger.push(entry.clone());
        Ok(())
    }

    async fn finish_order(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        reason: Option<FailureReason>,
    ) -> Result<(), DbError> {
        self.ensure_open()?;
        let order = self.shared.tables().orders.get(&order_id).cloned();
        match order {
            Some(order) if self.order_status(&order) == OrderStatus::Pending => {
                self.staged.finished.insert(order_id, (status, reason));
                Ok(())
            }
            _ => Err(DbError::NotFound),
        }
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.ensure_open()?;
        let staged = std::mem::take(&mut self.staged);
        let now = Utc::now();
        {
            let mut tables = self.shared.tables();
            for (account_id, cash) in staged.cash {
                if let Some(account) = tables.accounts.get_mut(&account_id) {
                    account.cash_balance = cash;
                }
            }
            for (key, position) in staged.positions {
                match position {
                    Some(position) => {
                        tables.positions.insert(key, position);
                    }
                    None => {
                        tables.positions.remove(&key);
                    }
                }
            }
            for entry in &staged.ledger {
                tables.push_ledger(entry, now);
            }
            for (order_id, (status, reason)) in staged.finished {
                if let Some(order) = tables.orders.get_mut(&order_id) {
                    order.status = status;
                    order.failure_reason = reason;
                    order.executed_at = (status == OrderStatus::Executed).then_some(now);
                }
            }
        }
        self.release();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        self.release();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::OrderSide;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn new_order(account_id: AccountId, key: &str) -> NewOrder {
        NewOrder {
            account_id,
            idempotency_key: key.to_string(),
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            quantity: 10,
            price: dec!(150),
        }
    }

    #[tokio::test]
    async fn create_account_writes_funding_entry() {
        let store = InMemoryStore::new();
        let account = store.create_account("alice", dec!(1000)).await.unwrap();

        let ledger = store.ledger_for_account(account.account_id).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].asset, "CASH");
        assert_eq!(ledger[0].change, dec!(1000));
        assert_eq!(ledger[0].order_id, None);
    }

    #[tokio::test]
    async fn duplicate_account_name_is_rejected() {
        let store = InMemoryStore::new();
        store.create_account("alice", dec!(1)).await.unwrap();
        let err = store.create_account("alice", dec!(1)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn insert_order_enforces_key_and_account() {
        let store = InMemoryStore::new();
        let account = store.create_account("alice", dec!(1000)).await.unwrap();

        store
            .insert_order(&new_order(account.account_id, "k1"))
            .await
            .unwrap();
        let dup = store
            .insert_order(&new_order(account.account_id, "k1"))
            .await
            .unwrap_err();
        assert!(matches!(dup, DbError::UniqueViolation(_)));

        let orphan = store.insert_order(&new_order(999, "k2")).await.unwrap_err();
        assert!(matches!(orphan, DbError::ForeignKeyViolation(_)));
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = InMemoryStore::new();
        let account = store.create_account("alice", dec!(1000)).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_account(account.account_id).await.unwrap();
            tx.update_cash_balance(account.account_id, dec!(1))
                .await
                .unwrap();
        }

        let after = store.find_account(account.account_id).await.unwrap().unwrap();
        assert_eq!(after.cash_balance, dec!(1000));
    }

    #[tokio::test]
    async fn transaction_reads_its_own_writes() {
        let store = InMemoryStore::new();
        let account = store.create_account("alice", dec!(1000)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.lock_account(account.account_id).await.unwrap();
        tx.update_cash_balance(account.account_id, dec!(400))
            .await
            .unwrap();
        let seen = tx.lock_account(account.account_id).await.unwrap().unwrap();
        assert_eq!(seen.cash_balance, dec!(400));
        tx.commit().await.unwrap();

        let after = store.find_account(account.account_id).await.unwrap().unwrap();
        assert_eq!(after.cash_balance, dec!(400));
    }

    #[tokio::test]
    async fn row_lock_blocks_second_transaction_until_commit() {
        let store = InMemoryStore::new();
        let account = store.create_account("alice", dec!(1000)).await.unwrap();
        let id = account.account_id;

        let mut first = store.begin().await.unwrap();
        first.lock_account(id).await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut second = store.begin().await.unwrap();
                second.lock_account(id).await.unwrap().unwrap().cash_balance
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        first.update_cash_balance(id, dec!(250)).await.unwrap();
        first.commit().await.unwrap();

        assert_eq!(contender.await.unwrap(), dec!(250));
    }

    #[tokio::test]
    async fn finished_order_is_no_longer_lockable() {
        let store = InMemoryStore::new();
        let account = store.create_account("alice", dec!(1000)).await.unwrap();
        let order_id = store
            .insert_order(&new_order(account.account_id, "k1"))
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_pending_order(order_id).await.unwrap().is_some());
        tx.finish_order(order_id, OrderStatus::Executed, None)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_pending_order(order_id).await.unwrap().is_none());
        assert!(tx.order_exists(order_id).await.unwrap());
        let err = tx
            .finish_order(order_id, OrderStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));

        let order = store.find_order(order_id).await.unwrap().unwrap();
        assert!(order.executed_at.is_some());
    }

    #[tokio::test]
    async fn price_insert_is_idempotent_per_bar() {
        let store = InMemoryStore::new();
        let ts = Utc::now();
        let quote = NewPriceQuote {
            symbol: "AAPL".to_string(),
            timestamp: ts,
            open: dec!(1),
            high: dec!(2),
            low: dec!(1),
            close: dec!(2),
            volume: 10,
        };
        let first = store.insert_price(&quote).await.unwrap();
        let again = store
            .insert_price(&NewPriceQuote {
                close: dec!(9),
                ..quote
            })
            .await
            .unwrap();

        assert_eq!(first, again);
        assert_eq!(store.latest_close("AAPL").await.unwrap(), Some(dec!(2)));
    }
}
