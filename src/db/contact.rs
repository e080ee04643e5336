// src/db/contact.rs

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static DIGITS_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]+$").expect("digits-only regex must compile")
});

/// Контакт пользователя. Идентичность: пара (`user_id`, `id`).
///
/// `updated_at` одновременно служит токеном оптимистичной блокировки:
/// клиент обязан прислать значение, которое он прочитал.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub user_id: String,
    pub id: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Contact {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            id: String::new(),
            phone: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            address: String::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl Contact {
    /// Составной ключ `"{user_id}:{id}"` для хранилища и кэша.
    pub fn key(&self) -> String {
        contact_key(&self.user_id, &self.id)
    }

    /// Проверяет фильтры поиска (кроме пагинации).
    pub fn matches(&self, filters: &Filters) -> bool {
        fn eq(pred: &Option<String>, value: &str) -> bool {
            pred.as_deref().map_or(true, |p| p == value)
        }

        self.user_id == filters.user_id
            && eq(&filters.phone, &self.phone)
            && eq(&filters.first_name, &self.first_name)
            && eq(&filters.last_name, &self.last_name)
            && eq(&filters.address, &self.address)
    }
}

pub fn contact_key(user_id: &str, contact_id: &str) -> String {
    format!("{user_id}:{contact_id}")
}

pub fn is_digits_only(phone: &str) -> bool {
    DIGITS_ONLY.is_match(phone)
}

/// Параметры поиска. Используются только некэшируемым путём.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub user_id: String,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    /// `None` — без ограничения
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Filters {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }
}
