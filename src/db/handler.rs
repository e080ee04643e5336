// src/db/handler.rs

use async_trait::async_trait;
use std::sync::Arc;

use crate::db::contact::{Contact, Filters};
use crate::error::Result;

/// Контракт хранилища контактов.
///
/// Его реализуют и основное хранилище, и LRU-обёртка над ним,
/// поэтому сервис не знает, работает ли он с кэшем.
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Безусловный upsert по составному ключу.
    async fn create_contact(&self, contact: &Contact) -> Result<()>;

    /// Точный поиск, `NotFound` если контакта нет.
    async fn get_contact(&self, user_id: &str, contact_id: &str) -> Result<Contact>;

    /// Безусловная перезапись. Существование и версию проверяет сервис.
    async fn update_contact(&self, contact: &Contact) -> Result<()>;

    /// Идемпотентное удаление.
    async fn delete_contact(&self, user_id: &str, contact_id: &str) -> Result<()>;

    async fn search_contacts(&self, filters: &Filters) -> Result<Vec<Contact>>;

    async fn phone_exists_for_user(&self, user_id: &str, phone: &str) -> Result<bool>;
}

#[async_trait]
impl<T: ContactRepository + ?Sized> ContactRepository for Arc<T> {
    async fn create_contact(&self, contact: &Contact) -> Result<()> {
        (**self).create_contact(contact).await
    }

    async fn get_contact(&self, user_id: &str, contact_id: &str) -> Result<Contact> {
        (**self).get_contact(user_id, contact_id).await
    }

    async fn update_contact(&self, contact: &Contact) -> Result<()> {
        (**self).update_contact(contact).await
    }

    async fn delete_contact(&self, user_id: &str, contact_id: &str) -> Result<()> {
        (**self).delete_contact(user_id, contact_id).await
    }

    async fn search_contacts(&self, filters: &Filters) -> Result<Vec<Contact>> {
        (**self).search_contacts(filters).await
    }

    async fn phone_exists_for_user(&self, user_id: &str, phone: &str) -> Result<bool> {
        (**self).phone_exists_for_user(user_id, phone).await
    }
}
