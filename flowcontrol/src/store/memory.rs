//! In-memory barrier store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{BarrierFilter, BarrierStore, BarrierUpdate};
use crate::errors::StoreError;
use crate::model::BarrierExecutionInstance;
use crate::utils::now_utc;

/// Barrier store backed by a map, keyed by uuid.
///
/// Every write holds the map's write lock for the whole filter-and-apply,
/// which gives each operation document-level atomicity.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBarrierStore {
    documents: Arc<RwLock<BTreeMap<String, BarrierExecutionInstance>>>,
}

impl InMemoryBarrierStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Removes every document.
    pub fn clear(&self) {
        self.documents.write().clear();
    }
}

fn apply_and_touch(update: &BarrierUpdate, document: &mut BarrierExecutionInstance) -> bool {
    let changed = update.apply(document);
    if changed {
        document.last_updated_at = now_utc();
    }
    changed
}

#[async_trait]
impl BarrierStore for InMemoryBarrierStore {
    async fn save(
        &self,
        mut instance: BarrierExecutionInstance,
    ) -> Result<BarrierExecutionInstance, StoreError> {
        let mut documents = self.documents.write();
        let clash = documents.values().any(|doc| {
            doc.uuid != instance.uuid
                && doc.plan_execution_id == instance.plan_execution_id
                && doc.identifier == instance.identifier
        });
        if clash {
            return Err(StoreError::Duplicate {
                key: format!("{}/{}", instance.plan_execution_id, instance.identifier),
            });
        }
        instance.last_updated_at = now_utc();
        documents.insert(instance.uuid.clone(), instance.clone());
        Ok(instance)
    }

    async fn get(&self, uuid: &str) -> Result<Option<BarrierExecutionInstance>, StoreError> {
        Ok(self.documents.read().get(uuid).cloned())
    }

    async fn find_many(
        &self,
        filter: &BarrierFilter,
    ) -> Result<Vec<BarrierExecutionInstance>, StoreError> {
        Ok(self
            .documents
            .read()
            .values()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect())
    }

    async fn find_and_modify(
        &self,
        filter: &BarrierFilter,
        update: &BarrierUpdate,
    ) -> Result<Option<BarrierExecutionInstance>, StoreError> {
        let mut documents = self.documents.write();
        let Some(document) = documents.values_mut().find(|doc| filter.matches(doc)) else {
            return Ok(None);
        };
        if apply_and_touch(update, document) {
            Ok(Some(document.clone()))
        } else {
            Ok(None)
        }
    }

    async fn find_and_upsert(
        &self,
        filter: &BarrierFilter,
        update: &BarrierUpdate,
        seed: BarrierExecutionInstance,
    ) -> Result<BarrierExecutionInstance, StoreError> {
        let mut documents = self.documents.write();
        if let Some(document) = documents.values_mut().find(|doc| filter.matches(doc)) {
            apply_and_touch(update, document);
            return Ok(document.clone());
        }
        documents.insert(seed.uuid.clone(), seed.clone());
        Ok(seed)
    }

    async fn update_many(
        &self,
        filter: &BarrierFilter,
        update: &BarrierUpdate,
    ) -> Result<usize, StoreError> {
        let mut documents = self.documents.write();
        Ok(documents
            .values_mut()
            .filter(|doc| filter.matches(doc))
            .map(|doc| apply_and_touch(update, doc))
            .filter(|changed| *changed)
            .count())
    }

    async fn delete_many(&self, filter: &BarrierFilter) -> Result<usize, StoreError> {
        let mut documents = self.documents.write();
        let before = documents.len();
        documents.retain(|_, doc| !filter.matches(doc));
        Ok(before - documents.len())
    }
}
