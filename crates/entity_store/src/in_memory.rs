//! In-memory service store.
//!
//! Both maps live behind one `RwLock`, so an update that renames an entity is
//! never observed half-applied: readers see either the old id/name pair or the
//! new one.
//!
//! The name index assumes names are unique but does not enforce it. A second
//! entity saved under an existing name takes over the index entry, and
//! deleting or renaming either one drops the entry for both.

use std::collections::HashMap;

use async_trait::async_trait;
use common::{RequestContext, Service};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{ServiceRepository, StoreError};

#[derive(Debug, Default)]
struct Inner {
    services: HashMap<String, Service>,
    /// name → id
    name_index: HashMap<String, String>,
}

/// Thread-safe service store. Share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct InMemoryServiceStore {
    inner: RwLock<Inner>,
}

impl InMemoryServiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.services.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ServiceRepository for InMemoryServiceStore {
    async fn find_by_id(&self, _ctx: &RequestContext, id: &str) -> Result<Service, StoreError> {
        let inner = self.inner.read().await;
        inner.services.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn find_all(&self, _ctx: &RequestContext) -> Result<Vec<Service>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.services.values().cloned().collect())
    }

    async fn find_by_name(
        &self,
        _ctx: &RequestContext,
        name: &str,
    ) -> Result<Service, StoreError> {
        let inner = self.inner.read().await;
        inner
            .name_index
            .get(name)
            .and_then(|id| inner.services.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn save(&self, _ctx: &RequestContext, service: Service) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        if inner.services.contains_key(&service.id) {
            return Err(StoreError::AlreadyExists(service.id));
        }

        if let Some(previous) = inner
            .name_index
            .insert(service.name.clone(), service.id.clone())
        {
            warn!(
                "Name {:?} re-pointed from {} to {}",
                service.name, previous, service.id
            );
        }
        debug!("Saved service {} ({})", service.id, service.name);
        inner.services.insert(service.id.clone(), service);

        Ok(())
    }

    async fn update(&self, _ctx: &RequestContext, service: Service) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        let old_name = match inner.services.get(&service.id) {
            Some(existing) => existing.name.clone(),
            None => return Err(StoreError::NotFound),
        };

        if old_name != service.name {
            inner.name_index.remove(&old_name);
            inner
                .name_index
                .insert(service.name.clone(), service.id.clone());
            debug!(
                "Renamed service {}: {:?} -> {:?}",
                service.id, old_name, service.name
            );
        }
        inner.services.insert(service.id.clone(), service);

        Ok(())
    }

    async fn delete(&self, _ctx: &RequestContext, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        let removed = inner.services.remove(id).ok_or(StoreError::NotFound)?;
        inner.name_index.remove(&removed.name);
        debug!("Deleted service {} ({})", id, removed.name);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn ctx() -> RequestContext {
        RequestContext::background()
    }

    fn make_service(name: &str, data: &str) -> Service {
        Service::new(name, data).expect("valid service")
    }

    #[tokio::test]
    async fn test_save_then_find_by_id_returns_equal_entity() {
        let store = InMemoryServiceStore::new();
        let service = make_service("alpha", "payload");

        store.save(&ctx(), service.clone()).await.unwrap();

        let found = store.find_by_id(&ctx(), &service.id).await.unwrap();
        assert_eq!(found, service);
    }

    #[tokio::test]
    async fn test_cancelled_context_is_ignored() {
        let store = InMemoryServiceStore::new();
        let cancelled = RequestContext::background();
        cancelled.cancel();
        assert!(cancelled.is_cancelled());

        let service = make_service("alpha", "payload");
        store.save(&cancelled, service.clone()).await.unwrap();
        assert_eq!(store.find_by_id(&cancelled, &service.id).await.unwrap(), service);
        assert_eq!(store.find_by_name(&cancelled, "alpha").await.unwrap(), service);
        store.delete(&cancelled, &service.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_save_fails_and_keeps_existing() {
        let store = InMemoryServiceStore::new();
        let original = make_service("alpha", "first");
        store.save(&ctx(), original.clone()).await.unwrap();

        let mut duplicate = original.clone();
        duplicate.name = "beta".into();
        duplicate.data = "second".into();

        let err = store.save(&ctx(), duplicate).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists(original.id.clone()));

        let found = store.find_by_id(&ctx(), &original.id).await.unwrap();
        assert_eq!(found, original);
        assert_eq!(store.find_by_name(&ctx(), "beta").await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_find_missing_is_not_found() {
        let store = InMemoryServiceStore::new();
        assert_eq!(store.find_by_id(&ctx(), "nope").await, Err(StoreError::NotFound));
        assert_eq!(store.find_by_name(&ctx(), "nope").await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_then_find_is_not_found() {
        let store = InMemoryServiceStore::new();
        let service = make_service("alpha", "");
        store.save(&ctx(), service.clone()).await.unwrap();

        store.delete(&ctx(), &service.id).await.unwrap();

        assert_eq!(store.find_by_id(&ctx(), &service.id).await, Err(StoreError::NotFound));
        assert_eq!(store.find_by_name(&ctx(), "alpha").await, Err(StoreError::NotFound));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = InMemoryServiceStore::new();
        let keep = make_service("keep", "");
        store.save(&ctx(), keep.clone()).await.unwrap();

        assert_eq!(store.delete(&ctx(), "missing").await, Err(StoreError::NotFound));
        assert_eq!(store.len().await, 1);
        assert_eq!(store.find_by_name(&ctx(), "keep").await.unwrap(), keep);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = InMemoryServiceStore::new();
        let service = make_service("ghost", "");
        assert_eq!(store.update(&ctx(), service).await, Err(StoreError::NotFound));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_rename_moves_name_index() {
        let store = InMemoryServiceStore::new();
        let mut service = make_service("old-name", "data");
        store.save(&ctx(), service.clone()).await.unwrap();

        service.rename("new-name").unwrap();
        store.update(&ctx(), service.clone()).await.unwrap();

        assert_eq!(store.find_by_name(&ctx(), "old-name").await, Err(StoreError::NotFound));
        let found = store.find_by_name(&ctx(), "new-name").await.unwrap();
        assert_eq!(found.id, service.id);
        assert_eq!(found.name, "new-name");
    }

    #[tokio::test]
    async fn test_update_same_name_replaces_value() {
        let store = InMemoryServiceStore::new();
        let mut service = make_service("alpha", "v1");
        store.save(&ctx(), service.clone()).await.unwrap();

        service.update_data("v2");
        store.update(&ctx(), service.clone()).await.unwrap();

        let found = store.find_by_name(&ctx(), "alpha").await.unwrap();
        assert_eq!(found.data, "v2");
    }

    #[tokio::test]
    async fn test_returned_entities_are_copies() {
        let store = InMemoryServiceStore::new();
        let service = make_service("alpha", "v1");
        store.save(&ctx(), service.clone()).await.unwrap();

        let mut copy = store.find_by_id(&ctx(), &service.id).await.unwrap();
        copy.update_data("changed outside the store");

        let stored = store.find_by_id(&ctx(), &service.id).await.unwrap();
        assert_eq!(stored.data, "v1");
    }

    #[tokio::test]
    async fn test_find_all_snapshot() {
        let store = InMemoryServiceStore::new();
        let mut ids = HashSet::new();
        for i in 0..5 {
            let s = make_service(&format!("svc-{i}"), "");
            ids.insert(s.id.clone());
            store.save(&ctx(), s).await.unwrap();
        }

        let all = store.find_all(&ctx()).await.unwrap();
        let found: HashSet<String> = all.into_iter().map(|s| s.id).collect();
        assert_eq!(found, ids);
    }

    #[tokio::test]
    async fn test_duplicate_name_last_writer_wins() {
        let store = InMemoryServiceStore::new();
        let first = make_service("shared", "first");
        let second = make_service("shared", "second");
        store.save(&ctx(), first.clone()).await.unwrap();
        store.save(&ctx(), second.clone()).await.unwrap();

        let found = store.find_by_name(&ctx(), "shared").await.unwrap();
        assert_eq!(found.id, second.id);

        // Deleting the winner drops the entry even though `first` still has the name.
        store.delete(&ctx(), &second.id).await.unwrap();
        assert_eq!(store.find_by_name(&ctx(), "shared").await, Err(StoreError::NotFound));
        assert!(store.find_by_id(&ctx(), &first.id).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_all_land() {
        let store = Arc::new(InMemoryServiceStore::new());
        let mut handles = Vec::new();

        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let s = Service::new(format!("svc-{i}"), "x").unwrap();
                store.save(&RequestContext::background(), s).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(store.len().await, 64);
        for i in 0..64 {
            assert!(store.find_by_name(&ctx(), &format!("svc-{i}")).await.is_ok());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rename_never_observed_half_applied() {
        let store = Arc::new(InMemoryServiceStore::new());
        let service = make_service("ping", "");
        let id = service.id.clone();
        store.save(&ctx(), service.clone()).await.unwrap();

        let writer = {
            let store = store.clone();
            let mut service = service.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    let name = if i % 2 == 0 { "pong" } else { "ping" };
                    service.rename(name).unwrap();
                    store
                        .update(&RequestContext::background(), service.clone())
                        .await
                        .unwrap();
                }
            })
        };

        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..2000 {
                    for name in ["ping", "pong"] {
                        if let Ok(found) = store
                            .find_by_name(&RequestContext::background(), name)
                            .await
                        {
                            assert_eq!(found.name, name);
                            assert_eq!(found.id, id);
                        }
                    }
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
    }
}
