// src/db/locker.rs

use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Mutex;

use crate::db::monitoring::LOCK_CONTENTION_COUNTER;
use crate::error::{ContactError, Result};

/// Неблокирующая "рекомендательная" блокировка по строковому ключу.
///
/// Владельца у ключа нет: снять его может кто угодно. Не реентерабельна,
/// не честная, ожиданий нет — кто не успел, тот получает отказ.
pub trait LockTable: Send + Sync {
    /// `true`, если ключ вставлен именно этим вызовом.
    fn try_lock(&self, key: &str) -> Result<bool>;

    fn unlock(&self, key: &str) -> Result<()>;
}

/// Таблица блокировок в памяти: множество занятых ключей под одним мьютексом.
/// Мьютекс держится только на время проверки/вставки.
#[derive(Debug, Default)]
pub struct InMemoryLockTable {
    held: Mutex<HashSet<String>>,
}

impl InMemoryLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.lock().map(|h| h.contains(key)).unwrap_or(false)
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().map(|h| h.len()).unwrap_or(0)
    }
}

impl LockTable for InMemoryLockTable {
    fn try_lock(&self, key: &str) -> Result<bool> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| ContactError::internal("lock_table.try_lock: mutex poisoned"))?;
        Ok(held.insert(key.to_string()))
    }

    fn unlock(&self, key: &str) -> Result<()> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| ContactError::internal("lock_table.unlock: mutex poisoned"))?;
        held.remove(key);
        Ok(())
    }
}

/// Захваченный ключ. Освобождается в `Drop` на любом пути выхода;
/// ошибка освобождения только логируется.
pub struct LockGuard<'a> {
    table: &'a dyn LockTable,
    key: String,
    operation: &'static str,
}

impl<'a> LockGuard<'a> {
    /// Пытается захватить `key`. Занятый ключ — это `Internal`, без повторов.
    pub fn acquire(
        table: &'a dyn LockTable,
        key: String,
        operation: &'static str,
    ) -> Result<Self> {
        if !table.try_lock(&key).map_err(|e| e.wrap("lock"))? {
            LOCK_CONTENTION_COUNTER.with_label_values(&[operation]).inc();
            warn!("{operation}: lock {key} is already held");
            return Err(ContactError::internal(format!(
                "lock: failed to lock contact with key {key}"
            )));
        }

        debug!("{operation}: acquired lock {key}");
        Ok(Self { table, key, operation })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.table.unlock(&self.key) {
            warn!("{}: {}", self.operation, e.wrap("unlock"));
        }
    }
}
