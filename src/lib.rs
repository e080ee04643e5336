// src/lib.rs

pub mod config;
pub mod db;
pub mod error;
pub mod service;
pub mod transport;

use std::sync::Arc;

use crate::config::Config;
use crate::db::{InMemoryContactStore, InMemoryLockTable, LruCacheRepository};
use crate::service::ContactService;
use crate::transport::AppState;

pub use crate::error::{ContactError, ErrorKind};

/// Собирает граф объектов сервиса: хранилище -> LRU-кэш -> сервис.
/// Никаких глобальных синглтонов, всё владеется явно.
pub fn build_state(config: &Config) -> AppState {
    let store = InMemoryContactStore::new();
    let cache = LruCacheRepository::new(store, config.cache_capacity);
    let locks = InMemoryLockTable::new();

    let service = ContactService::new(Arc::new(cache), Arc::new(locks));

    AppState {
        service: Arc::new(service),
        max_page_size: config.max_page_size,
    }
}
