//! Request-scoped batch loader.
//!
//! Collapses lookups of many ids into a single `get_many` call per distinct
//! set of cache misses and memoizes results (including misses) for the life
//! of the loader.

use crate::error::StorageError;
use crate::store::{Record, Repository};
use crate::types::{CallerId, EntityId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct BatchLoader<R: Record> {
    repo: Arc<dyn Repository<R>>,
    caller: CallerId,
    cache: Mutex<HashMap<EntityId, Option<R>>>,
}

impl<R: Record> BatchLoader<R> {
    pub fn new(repo: Arc<dyn Repository<R>>, caller: CallerId) -> Self {
        Self {
            repo,
            caller,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn load(&self, id: &EntityId) -> Result<Option<R>, StorageError> {
        let mut loaded = self.load_many(std::slice::from_ref(id)).await?;
        Ok(loaded.pop().flatten())
    }

    /// Load records in input order; `None` marks ids that were not found.
    pub async fn load_many(&self, ids: &[EntityId]) -> Result<Vec<Option<R>>, StorageError> {
        let misses: Vec<EntityId> = {
            let cache = self.cache.lock();
            let mut seen = HashSet::new();
            ids.iter()
                .filter(|id| !cache.contains_key(*id) && seen.insert((*id).clone()))
                .cloned()
                .collect()
        };

        if !misses.is_empty() {
            let found = self.repo.get_many(&self.caller, &misses).await?;
            let mut cache = self.cache.lock();
            for record in found {
                cache.insert(record.id().clone(), Some(record));
            }
            for id in misses {
                cache.entry(id).or_insert(None);
            }
        }

        let cache = self.cache.lock();
        Ok(ids
            .iter()
            .map(|id| cache.get(id).cloned().flatten())
            .collect())
    }

    /// Load and drop the ids that were not found, reporting them separately.
    pub async fn load_found(
        &self,
        ids: &[EntityId],
    ) -> Result<(Vec<R>, Vec<EntityId>), StorageError> {
        let loaded = self.load_many(ids).await?;
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for (id, record) in ids.iter().zip(loaded) {
            match record {
                Some(record) => found.push(record),
                None => missing.push(id.clone()),
            }
        }
        Ok((found, missing))
    }
}
