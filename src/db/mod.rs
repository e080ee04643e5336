// src/db/mod.rs
//
// Слой хранения контактов:
// 1) contact       — модель и фильтры
// 2) handler       — контракт хранилища (общий для хранилища и кэша)
// 3) contact_store — основное хранилище в памяти
// 4) cache         — LRU-обёртка над хранилищем
// 5) locker        — таблица неблокирующих блокировок
// 6) monitoring    — метрики Prometheus

pub mod cache;
pub mod contact;
pub mod contact_store;
pub mod handler;
pub mod locker;
pub mod monitoring;

pub use cache::LruCacheRepository;
pub use contact::{Contact, Filters};
pub use contact_store::InMemoryContactStore;
pub use handler::ContactRepository;
pub use locker::{InMemoryLockTable, LockGuard, LockTable};
