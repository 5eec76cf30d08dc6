//! Repository contract for barrier execution instances.
//!
//! The coordinator never reads, mutates and writes back a document. Every
//! mutation is described as a [`BarrierUpdate`] and handed to the store,
//! which applies it atomically to each document matching a
//! [`BarrierFilter`]. A database backend translates both descriptors into
//! its own conditional-update primitive; [`InMemoryBarrierStore`] applies
//! them under a write lock.

mod filter;
mod memory;
mod update;

use async_trait::async_trait;

pub use filter::{BarrierFilter, PositionFilter};
pub use memory::InMemoryBarrierStore;
pub use update::{AncestorRuntimeIds, BarrierUpdate, PositionSelector};

use crate::errors::StoreError;
use crate::model::BarrierExecutionInstance;

/// Narrow persisted-document store for barrier instances.
#[async_trait]
pub trait BarrierStore: Send + Sync {
    /// Inserts a document, or replaces the one with the same uuid.
    ///
    /// Fails with [`StoreError::Duplicate`] if a different document already
    /// owns the same `(plan_execution_id, identifier)`.
    async fn save(
        &self,
        instance: BarrierExecutionInstance,
    ) -> Result<BarrierExecutionInstance, StoreError>;

    /// Point lookup by uuid.
    async fn get(&self, uuid: &str) -> Result<Option<BarrierExecutionInstance>, StoreError>;

    /// Set lookup.
    async fn find_many(
        &self,
        filter: &BarrierFilter,
    ) -> Result<Vec<BarrierExecutionInstance>, StoreError>;

    /// Atomically applies `update` to the first matching document.
    ///
    /// Returns the document after the update, or `None` if nothing matched
    /// or the update was a no-op on the matched document.
    async fn find_and_modify(
        &self,
        filter: &BarrierFilter,
        update: &BarrierUpdate,
    ) -> Result<Option<BarrierExecutionInstance>, StoreError>;

    /// Atomically applies `update` to the first matching document, inserting
    /// `seed` instead if nothing matches.
    async fn find_and_upsert(
        &self,
        filter: &BarrierFilter,
        update: &BarrierUpdate,
        seed: BarrierExecutionInstance,
    ) -> Result<BarrierExecutionInstance, StoreError>;

    /// Atomically applies `update` to every matching document.
    ///
    /// Returns the number of documents actually modified.
    async fn update_many(
        &self,
        filter: &BarrierFilter,
        update: &BarrierUpdate,
    ) -> Result<usize, StoreError>;

    /// Deletes every matching document and returns how many were removed.
    async fn delete_many(&self, filter: &BarrierFilter) -> Result<usize, StoreError>;
}
