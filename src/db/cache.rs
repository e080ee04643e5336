// src/db/cache.rs

use async_trait::async_trait;
use log::debug;
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

use crate::db::contact::{contact_key, Contact, Filters};
use crate::db::handler::ContactRepository;
use crate::db::monitoring::{CACHE_EVICTION_COUNTER, CACHE_REQUEST_COUNTER};
use crate::error::{Result, ResultExt};

/// Тип кэша контактов: составной ключ `"{user_id}:{id}"` -> контакт
pub type ContactCache = LruCache<String, Contact>;

/// LRU-кэш поверх любого `ContactRepository` (read-through + write-through).
///
/// Все операции, затрагивающие кэш, идут под одним мьютексом — даже чтение,
/// потому что попадание меняет порядок давности. Мьютекс держится и на время
/// обращения к хранилищу, чтобы порядок записей в кэше совпадал с порядком
/// записей в хранилище.
///
/// `search_contacts` и `phone_exists_for_user` кэш не трогают.
pub struct LruCacheRepository<R> {
    repo: R,
    cache: Mutex<ContactCache>,
}

impl<R: ContactRepository> LruCacheRepository<R> {
    /// Создаёт кэш с заданной ёмкостью
    pub fn new(repo: R, capacity: NonZeroUsize) -> Self {
        Self {
            repo,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Обёрнутое хранилище
    pub fn inner(&self) -> &R {
        &self.repo
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }

    /// Ключи от самого свежего к самому старому. Порядок не меняет.
    pub async fn cached_keys(&self) -> Vec<String> {
        self.cache
            .lock()
            .await
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Проверка наличия без продвижения записи
    pub async fn contains(&self, user_id: &str, contact_id: &str) -> bool {
        self.cache
            .lock()
            .await
            .contains(&contact_key(user_id, contact_id))
    }

    /// Вытесняет запись, только если добавляется *новый* ключ в полный кэш.
    /// Существующий ключ обновляется на месте и поднимается в начало.
    fn add_cache_entry(cache: &mut ContactCache, key: String, contact: Contact) {
        if let Some(entry) = cache.get_mut(&key) {
            *entry = contact;
            debug!("cache.add_cache_entry: updated cache entry {}", key);
            return;
        }

        if cache.len() == cache.cap().get() {
            if let Some((evicted, _)) = cache.pop_lru() {
                CACHE_EVICTION_COUNTER.inc();
                debug!("cache.add_cache_entry: cache is full, evicted {}", evicted);
            }
        }

        debug!("cache.add_cache_entry: adding new cache entry {}", key);
        cache.put(key, contact);
    }
}

#[async_trait]
impl<R: ContactRepository> ContactRepository for LruCacheRepository<R> {
    async fn create_contact(&self, contact: &Contact) -> Result<()> {
        let mut cache = self.cache.lock().await;

        self.repo
            .create_contact(contact)
            .await
            .context("cache.create_contact")?;

        Self::add_cache_entry(&mut cache, contact.key(), contact.clone());
        Ok(())
    }

    async fn get_contact(&self, user_id: &str, contact_id: &str) -> Result<Contact> {
        let mut cache = self.cache.lock().await;
        let key = contact_key(user_id, contact_id);

        if let Some(contact) = cache.get(&key) {
            CACHE_REQUEST_COUNTER.with_label_values(&["hit"]).inc();
            return Ok(contact.clone());
        }
        CACHE_REQUEST_COUNTER.with_label_values(&["miss"]).inc();

        let contact = self
            .repo
            .get_contact(user_id, contact_id)
            .await
            .context("cache.get_contact")?;

        Self::add_cache_entry(&mut cache, key, contact.clone());
        Ok(contact)
    }

    async fn update_contact(&self, contact: &Contact) -> Result<()> {
        let mut cache = self.cache.lock().await;

        self.repo
            .update_contact(contact)
            .await
            .context("cache.update_contact")?;

        Self::add_cache_entry(&mut cache, contact.key(), contact.clone());
        Ok(())
    }

    async fn delete_contact(&self, user_id: &str, contact_id: &str) -> Result<()> {
        let mut cache = self.cache.lock().await;

        self.repo
            .delete_contact(user_id, contact_id)
            .await
            .context("cache.delete_contact")?;

        cache.pop(&contact_key(user_id, contact_id));
        Ok(())
    }

    async fn search_contacts(&self, filters: &Filters) -> Result<Vec<Contact>> {
        self.repo
            .search_contacts(filters)
            .await
            .context("cache.search_contacts")
    }

    async fn phone_exists_for_user(&self, user_id: &str, phone: &str) -> Result<bool> {
        self.repo
            .phone_exists_for_user(user_id, phone)
            .await
            .context("cache.phone_exists_for_user")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::contact_store::InMemoryContactStore;
    use crate::error::{ContactError, ErrorKind};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).expect("capacity must be nonzero")
    }

    fn contact(user_id: &str, id: &str) -> Contact {
        Contact {
            user_id: user_id.to_string(),
            id: id.to_string(),
            phone: format!("{}", id.len() * 7),
            first_name: format!("User {id}"),
            last_name: "Doe".to_string(),
            address: "123 Main St".to_string(),
            ..Contact::default()
        }
    }

    /// Хранилище-заглушка: считает чтения и умеет ломаться по флагам.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryContactStore,
        gets: AtomicUsize,
        fail_gets: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl FlakyStore {
        fn check_writes(&self) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(ContactError::internal("flaky: write failed"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ContactRepository for FlakyStore {
        async fn create_contact(&self, contact: &Contact) -> Result<()> {
            self.check_writes()?;
            self.inner.create_contact(contact).await
        }

        async fn get_contact(&self, user_id: &str, contact_id: &str) -> Result<Contact> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.fail_gets.load(Ordering::SeqCst) {
                return Err(ContactError::internal("flaky: read failed"));
            }
            self.inner.get_contact(user_id, contact_id).await
        }

        async fn update_contact(&self, contact: &Contact) -> Result<()> {
            self.check_writes()?;
            self.inner.update_contact(contact).await
        }

        async fn delete_contact(&self, user_id: &str, contact_id: &str) -> Result<()> {
            self.check_writes()?;
            self.inner.delete_contact(user_id, contact_id).await
        }

        async fn search_contacts(&self, filters: &Filters) -> Result<Vec<Contact>> {
            self.inner.search_contacts(filters).await
        }

        async fn phone_exists_for_user(&self, user_id: &str, phone: &str) -> Result<bool> {
            self.inner.phone_exists_for_user(user_id, phone).await
        }
    }

    #[tokio::test]
    async fn test_lru_bound_keeps_last_inserted() {
        let cache = LruCacheRepository::new(InMemoryContactStore::new(), capacity(3));

        for id in ["a", "b", "c", "d", "e"] {
            cache.create_contact(&contact("u1", id)).await.unwrap();
        }

        assert_eq!(cache.len().await, 3);
        assert_eq!(cache.cached_keys().await, vec!["u1:e", "u1:d", "u1:c"]);
    }

    #[tokio::test]
    async fn test_hit_promotes_entry() {
        let cache = LruCacheRepository::new(InMemoryContactStore::new(), capacity(3));
        for id in ["a", "b", "c"] {
            cache.create_contact(&contact("u1", id)).await.unwrap();
        }

        // Чтение A делает её самой свежей, значит следующей вытесняется B
        cache.get_contact("u1", "a").await.unwrap();
        cache.create_contact(&contact("u1", "d")).await.unwrap();

        assert!(cache.contains("u1", "a").await);
        assert!(!cache.contains("u1", "b").await);
        assert_eq!(cache.cached_keys().await, vec!["u1:d", "u1:a", "u1:c"]);
    }

    #[tokio::test]
    async fn test_refresh_existing_key_never_evicts() {
        let cache = LruCacheRepository::new(InMemoryContactStore::new(), capacity(2));
        cache.create_contact(&contact("u1", "a")).await.unwrap();
        cache.create_contact(&contact("u1", "b")).await.unwrap();

        let mut a = contact("u1", "a");
        a.first_name = "Renamed".to_string();
        cache.update_contact(&a).await.unwrap();

        assert_eq!(cache.cached_keys().await, vec!["u1:a", "u1:b"]);
        assert_eq!(cache.get_contact("u1", "a").await.unwrap().first_name, "Renamed");
    }

    #[tokio::test]
    async fn test_write_through_serves_from_cache() {
        let cache = LruCacheRepository::new(FlakyStore::default(), capacity(5));
        let mut c = contact("u1", "a");
        cache.create_contact(&c).await.unwrap();

        // Хранилище больше не отвечает на чтения — кэш должен справиться сам
        cache.inner().fail_gets.store(true, Ordering::SeqCst);
        assert_eq!(cache.get_contact("u1", "a").await.unwrap(), c);

        c.last_name = "Smith".to_string();
        cache.update_contact(&c).await.unwrap();
        assert_eq!(cache.get_contact("u1", "a").await.unwrap().last_name, "Smith");

        assert_eq!(cache.inner().gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_miss_reads_through_once() {
        let store = FlakyStore::default();
        store.inner.create_contact(&contact("u1", "a")).await.unwrap();
        let cache = LruCacheRepository::new(store, capacity(5));

        cache.get_contact("u1", "a").await.unwrap();
        cache.get_contact("u1", "a").await.unwrap();

        assert_eq!(cache.inner().gets.load(Ordering::SeqCst), 1);
        assert!(cache.contains("u1", "a").await);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_cache_untouched() {
        let cache = LruCacheRepository::new(FlakyStore::default(), capacity(5));
        let original = contact("u1", "a");
        cache.create_contact(&original).await.unwrap();

        cache.inner().fail_writes.store(true, Ordering::SeqCst);

        let mut changed = original.clone();
        changed.first_name = "Changed".to_string();
        let err = cache.update_contact(&changed).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.message.starts_with("cache.update_contact: "));

        // Неудачная запись нового ключа тоже ничего не добавляет
        assert!(cache.create_contact(&contact("u1", "b")).await.is_err());
        assert!(!cache.contains("u1", "b").await);

        cache.inner().fail_gets.store(true, Ordering::SeqCst);
        assert_eq!(cache.get_contact("u1", "a").await.unwrap(), original);
        assert_eq!(cache.cached_keys().await, vec!["u1:a"]);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_entry() {
        let cache = LruCacheRepository::new(FlakyStore::default(), capacity(5));
        cache.create_contact(&contact("u1", "a")).await.unwrap();

        cache.inner().fail_writes.store(true, Ordering::SeqCst);
        assert!(cache.delete_contact("u1", "a").await.is_err());
        assert!(cache.contains("u1", "a").await);
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let cache = LruCacheRepository::new(InMemoryContactStore::new(), capacity(5));
        cache.create_contact(&contact("u1", "a")).await.unwrap();

        cache.delete_contact("u1", "a").await.unwrap();
        assert!(!cache.contains("u1", "a").await);

        let err = cache.get_contact("u1", "a").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(err.message.starts_with("cache.get_contact: "));
        // Промах не должен оставлять запись
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_search_and_phone_check_bypass_cache() {
        // Хранилище разделяется через Arc, чтобы проверять его напрямую
        let store = Arc::new(InMemoryContactStore::new());
        let cache = LruCacheRepository::new(Arc::clone(&store), capacity(1));
        cache.create_contact(&contact("u1", "a")).await.unwrap();
        cache.create_contact(&contact("u1", "b")).await.unwrap();
        assert_eq!(store.len().unwrap(), 2);

        let keys_before = cache.cached_keys().await;
        let found = cache.search_contacts(&Filters::for_user("u1")).await.unwrap();
        assert_eq!(found.len(), 2);

        let phone = contact("u1", "a").phone;
        assert!(cache.phone_exists_for_user("u1", &phone).await.unwrap());
        assert_eq!(cache.cached_keys().await, keys_before);
    }

    #[tokio::test]
    async fn test_capacity_five_six_contacts_scenario() {
        let cache = LruCacheRepository::new(FlakyStore::default(), capacity(5));
        for id in ["A", "B", "C", "D", "E", "F"] {
            cache.create_contact(&contact(&format!("user-{id}"), id)).await.unwrap();
        }

        // A вытеснена, но в хранилище есть
        assert!(!cache.contains("user-A", "A").await);
        assert_eq!(cache.inner().inner.len().unwrap(), 6);

        let a = cache.get_contact("user-A", "A").await.expect("fallback to store");
        assert_eq!(a.id, "A");
        assert_eq!(cache.inner().gets.load(Ordering::SeqCst), 1);

        // Возврат A вытеснил самую старую из оставшихся — B
        assert!(cache.contains("user-A", "A").await);
        assert!(!cache.contains("user-B", "B").await);
        assert_eq!(cache.len().await, 5);
    }
}
