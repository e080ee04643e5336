// src/db/contact_store.rs

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::db::contact::{contact_key, Contact, Filters};
use crate::db::handler::ContactRepository;
use crate::error::{ContactError, Result};

/// Запись хранилища: контакт + порядковый номер первой вставки.
/// Номер нужен для детерминированного порядка при равных `first_name`.
#[derive(Debug, Clone)]
struct StoredContact {
    seq: u64,
    contact: Contact,
}

#[derive(Debug, Default)]
struct StoreInner {
    contacts: HashMap<String, StoredContact>,
    next_seq: u64,
}

impl StoreInner {
    fn upsert(&mut self, contact: &Contact) {
        let key = contact.key();
        match self.contacts.get_mut(&key) {
            Some(stored) => stored.contact = contact.clone(),
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.contacts.insert(
                    key,
                    StoredContact {
                        seq,
                        contact: contact.clone(),
                    },
                );
            }
        }
    }
}

/// Основное (авторитетное) хранилище контактов в памяти процесса.
///
/// Мутации берут эксклюзивную блокировку, чтения — разделяемую.
/// Поиск не изолирован от параллельных записей между вызовами.
#[derive(Debug, Default)]
pub struct InMemoryContactStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read("inmem.len")?.contacts.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self, op: &str) -> Result<RwLockReadGuard<'_, StoreInner>> {
        self.inner
            .read()
            .map_err(|_| ContactError::internal(format!("{op}: store lock poisoned")))
    }

    fn write(&self, op: &str) -> Result<RwLockWriteGuard<'_, StoreInner>> {
        self.inner
            .write()
            .map_err(|_| ContactError::internal(format!("{op}: store lock poisoned")))
    }
}

#[async_trait]
impl ContactRepository for InMemoryContactStore {
    async fn create_contact(&self, contact: &Contact) -> Result<()> {
        self.write("inmem.create_contact")?.upsert(contact);
        Ok(())
    }

    async fn get_contact(&self, user_id: &str, contact_id: &str) -> Result<Contact> {
        let inner = self.read("inmem.get_contact")?;
        inner
            .contacts
            .get(&contact_key(user_id, contact_id))
            .map(|stored| stored.contact.clone())
            .ok_or_else(|| {
                ContactError::not_found(format!(
                    "inmem.get_contact: contact with ID {contact_id} not found for user {user_id}"
                ))
            })
    }

    async fn update_contact(&self, contact: &Contact) -> Result<()> {
        self.write("inmem.update_contact")?.upsert(contact);
        Ok(())
    }

    async fn delete_contact(&self, user_id: &str, contact_id: &str) -> Result<()> {
        self.write("inmem.delete_contact")?
            .contacts
            .remove(&contact_key(user_id, contact_id));
        Ok(())
    }

    async fn search_contacts(&self, filters: &Filters) -> Result<Vec<Contact>> {
        let inner = self.read("inmem.search_contacts")?;

        // Сначала фильтруем, потом сортируем, и только потом режем окно
        let mut matched: Vec<&StoredContact> = inner
            .contacts
            .values()
            .filter(|stored| stored.contact.matches(filters))
            .collect();

        matched.sort_by(|a, b| {
            a.contact
                .first_name
                .cmp(&b.contact.first_name)
                .then(a.seq.cmp(&b.seq))
        });

        let window = matched.into_iter().skip(filters.offset);
        let contacts = match filters.limit {
            Some(limit) => window.take(limit).map(|s| s.contact.clone()).collect(),
            None => window.map(|s| s.contact.clone()).collect(),
        };

        Ok(contacts)
    }

    async fn phone_exists_for_user(&self, user_id: &str, phone: &str) -> Result<bool> {
        let inner = self.read("inmem.phone_exists_for_user")?;
        Ok(inner
            .contacts
            .values()
            .any(|s| s.contact.user_id == user_id && s.contact.phone == phone))
    }
}
