// src/config.rs

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use thiserror::Error;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_CACHE_CAPACITY: usize = 5;
/// Максимальный размер страницы поиска
pub const DEFAULT_MAX_PAGE_SIZE: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Настройки сервиса.
///
/// Переменные окружения:
/// - `CONTACTS_LISTEN_ADDR` (по умолчанию `0.0.0.0:8080`)
/// - `CONTACTS_CACHE_CAPACITY` — ёмкость LRU-кэша, > 0 (по умолчанию 5)
/// - `CONTACTS_MAX_PAGE_SIZE` — лимит поиска, > 0 (по умолчанию 10)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub cache_capacity: NonZeroUsize,
    pub max_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            cache_capacity: NonZeroUsize::MIN.saturating_add(DEFAULT_CACHE_CAPACITY - 1),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// То же, что `from_env`, но с произвольным источником значений (для тестов).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let listen_addr = match lookup("CONTACTS_LISTEN_ADDR") {
            Some(v) => v.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "CONTACTS_LISTEN_ADDR",
                value: v.clone(),
                reason: e.to_string(),
            })?,
            None => defaults.listen_addr,
        };

        let cache_capacity = match lookup("CONTACTS_CACHE_CAPACITY") {
            Some(v) => parse_positive("CONTACTS_CACHE_CAPACITY", &v)?,
            None => defaults.cache_capacity,
        };

        let max_page_size = match lookup("CONTACTS_MAX_PAGE_SIZE") {
            Some(v) => parse_positive("CONTACTS_MAX_PAGE_SIZE", &v)?.get(),
            None => defaults.max_page_size,
        };

        Ok(Self {
            listen_addr,
            cache_capacity,
            max_page_size,
        })
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<NonZeroUsize, ConfigError> {
    value.trim().parse::<NonZeroUsize>().map_err(|e| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
