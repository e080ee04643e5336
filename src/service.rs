// src/service.rs

use chrono::{DateTime, Utc};
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::contact::{is_digits_only, Contact, Filters};
use crate::db::handler::ContactRepository;
use crate::db::locker::{LockGuard, LockTable};
use crate::db::monitoring::measure_operation;
use crate::error::{ContactError, Result, ResultExt};

/// Источник времени для `created_at`/`updated_at`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Генератор глобально уникальных идентификаторов.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::now_v7().to_string()
    }
}

fn lock_key(operation: &str, user_id: &str, phone: &str) -> String {
    format!("{operation}:{user_id}:{phone}")
}

/// Сервис управления контактами.
///
/// Создание и обновление выполняются под рекомендательной блокировкой
/// `"{op}:{user_id}:{phone}"`: она защищает уникальность телефона в пределах
/// пользователя и атомарность цепочки "прочитать-проверить-записать".
/// Внутренности кэша и хранилища защищают себя сами.
pub struct ContactService {
    repo: Arc<dyn ContactRepository>,
    locks: Arc<dyn LockTable>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl ContactService {
    pub fn new(repo: Arc<dyn ContactRepository>, locks: Arc<dyn LockTable>) -> Self {
        Self {
            repo,
            locks,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Создаёт контакт и возвращает его новый ID.
    pub async fn create_contact(&self, contact: Contact) -> Result<String> {
        measure_operation("create_contact", self.create_contact_inner(contact))
            .await
            .context("service.create_contact")
    }

    async fn create_contact_inner(&self, mut contact: Contact) -> Result<String> {
        let key = lock_key("create", &contact.user_id, &contact.phone);
        let _guard = LockGuard::acquire(self.locks.as_ref(), key, "service.create_contact")?;

        let now = self.clock.now();
        contact.id = self.ids.generate();
        contact.created_at = now;
        contact.updated_at = now;

        self.validate_contact_to_create(&contact).await?;
        self.repo.create_contact(&contact).await?;

        info!("service.create_contact: created contact {} for user {}", contact.id, contact.user_id);
        Ok(contact.id)
    }

    /// Обновляет контакт, если `contact.updated_at` совпадает с сохранённым.
    /// Возвращает новое состояние (с новым `updated_at`).
    pub async fn update_contact(&self, contact: Contact) -> Result<Contact> {
        measure_operation("update_contact", self.update_contact_inner(contact))
            .await
            .context("service.update_contact")
    }

    async fn update_contact_inner(&self, contact: Contact) -> Result<Contact> {
        let key = lock_key("update", &contact.user_id, &contact.phone);
        let _guard = LockGuard::acquire(self.locks.as_ref(), key, "service.update_contact")?;

        if !is_digits_only(&contact.phone) {
            return Err(ContactError::bad_request("phone must be digits only"));
        }

        let prev = self.repo.get_contact(&contact.user_id, &contact.id).await?;

        if prev.user_id != contact.user_id {
            return Err(ContactError::forbidden(format!(
                "contact {} does not belong to user {}",
                contact.id, contact.user_id
            )));
        }

        if prev.updated_at != contact.updated_at {
            return Err(ContactError::bad_request(
                "contact has changed since the last read",
            ));
        }

        if prev.phone != contact.phone
            && self
                .repo
                .phone_exists_for_user(&contact.user_id, &contact.phone)
                .await?
        {
            return Err(ContactError::bad_request(format!(
                "contact with phone {} already exists for user {}",
                contact.phone, contact.user_id
            )));
        }

        let updated = self.update_contact_fields(prev, contact);
        self.repo.update_contact(&updated).await?;

        info!("service.update_contact: updated contact {} for user {}", updated.id, updated.user_id);
        Ok(updated)
    }

    pub async fn get_contact(&self, user_id: &str, contact_id: &str) -> Result<Contact> {
        measure_operation("get_contact", self.repo.get_contact(user_id, contact_id))
            .await
            .context("service.get_contact")
    }

    pub async fn delete_contact(&self, user_id: &str, contact_id: &str) -> Result<()> {
        measure_operation("delete_contact", self.repo.delete_contact(user_id, contact_id))
            .await
            .context("service.delete_contact")?;

        info!("service.delete_contact: deleted contact {} for user {}", contact_id, user_id);
        Ok(())
    }

    pub async fn search_contacts(&self, filters: &Filters) -> Result<Vec<Contact>> {
        measure_operation("search_contacts", self.repo.search_contacts(filters))
            .await
            .context("service.search_contacts")
    }

    /// Переносит изменяемые поля и продвигает версию.
    ///
    /// Новая метка строго больше предыдущей: при грубых часах два обновления
    /// в один тик иначе получили бы одинаковый токен.
    fn update_contact_fields(&self, mut prev: Contact, incoming: Contact) -> Contact {
        let now = self.clock.now();
        let version = if now > prev.updated_at {
            now
        } else {
            prev.updated_at + chrono::Duration::nanoseconds(1)
        };

        prev.first_name = incoming.first_name;
        prev.last_name = incoming.last_name;
        prev.address = incoming.address;
        prev.phone = incoming.phone;
        prev.updated_at = version;
        prev
    }

    async fn validate_contact_to_create(&self, contact: &Contact) -> Result<()> {
        if !is_digits_only(&contact.phone) {
            return Err(ContactError::bad_request(
                "validate_contact_to_create: phone must be digits only",
            ));
        }

        let exists = self
            .repo
            .phone_exists_for_user(&contact.user_id, &contact.phone)
            .await
            .context("validate_contact_to_create")?;
        if exists {
            return Err(ContactError::bad_request(format!(
                "validate_contact_to_create: contact with phone {} already exists for user {}",
                contact.phone, contact.user_id
            )));
        }

        Ok(())
    }
}
