//! Sled-backed repositories, one tree per record type.

use crate::error::{ApiError, StorageError};
use crate::job::GenerationJob;
use crate::store::{Encoding, JobMutation, JobRepository, Record, Repository};
use crate::types::{now_millis, CallerId, EntityId};
use async_trait::async_trait;
use std::marker::PhantomData;
use tracing::debug;

/// Sled-based implementation of [`Repository`]
pub struct SledRepository<R> {
    tree: sled::Tree,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> SledRepository<R> {
    pub fn open(db: &sled::Db) -> Result<Self, StorageError> {
        let tree = db.open_tree(R::TREE).map_err(|e| backend::<R>(e))?;
        Ok(Self {
            tree,
            _record: PhantomData,
        })
    }

    fn read(&self, id: &EntityId) -> Result<Option<R>, StorageError> {
        match self.tree.get(id.as_str().as_bytes()).map_err(|e| backend::<R>(e))? {
            Some(raw) => Ok(Some(decode::<R>(&raw)?)),
            None => Ok(None),
        }
    }

    fn scan_visible(
        &self,
        caller: &CallerId,
        filter: impl Fn(&R) -> bool,
    ) -> Result<Vec<R>, StorageError> {
        let mut out = Vec::new();
        for item in self.tree.iter() {
            let (_, value) = item.map_err(|e| backend::<R>(e))?;
            let record: R = decode(&value)?;
            if record.is_visible_to(caller) && filter(&record) {
                out.push(record);
            }
        }
        out.sort_by_key(|r| r.created_at_ms());
        Ok(out)
    }
}

#[async_trait]
impl<R: Record> Repository<R> for SledRepository<R> {
    async fn get(&self, caller: &CallerId, id: &EntityId) -> Result<Option<R>, StorageError> {
        Ok(self.read(id)?.filter(|r| r.is_visible_to(caller)))
    }

    async fn get_many(&self, caller: &CallerId, ids: &[EntityId]) -> Result<Vec<R>, StorageError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.read(id)?.filter(|r| r.is_visible_to(caller)) {
                out.push(record);
            }
        }
        debug!(tree = R::TREE, requested = ids.len(), found = out.len(), "Batch lookup");
        Ok(out)
    }

    async fn list(&self, caller: &CallerId) -> Result<Vec<R>, StorageError> {
        self.scan_visible(caller, |_| true)
    }

    async fn list_for_athlete(
        &self,
        caller: &CallerId,
        athlete_id: &EntityId,
    ) -> Result<Vec<R>, StorageError> {
        self.scan_visible(caller, |r| r.athlete_id() == Some(athlete_id))
    }

    async fn put(&self, caller: &CallerId, mut record: R) -> Result<R, StorageError> {
        if record.owner() != caller {
            return Err(StorageError::Backend {
                tree: R::TREE,
                message: format!("{} {} is not owned by {}", R::KIND, record.id(), caller),
            });
        }
        let now = now_millis();
        let created = match self.read(record.id())? {
            Some(existing) if existing.owner() != caller => {
                return Err(StorageError::Backend {
                    tree: R::TREE,
                    message: format!("{} {} is owned by another caller", R::KIND, record.id()),
                });
            }
            Some(existing) => existing.created_at_ms(),
            None => now,
        };
        record.set_timestamps(created, now);
        let value = encode(&record)?;
        self.tree
            .insert(record.id().as_str().as_bytes(), value)
            .map_err(|e| backend::<R>(e))?;
        Ok(record)
    }

    async fn soft_delete(&self, caller: &CallerId, id: &EntityId) -> Result<bool, StorageError> {
        let Some(mut record) = self.read(id)?.filter(|r| r.is_visible_to(caller)) else {
            return Ok(false);
        };
        record.set_deleted_at(now_millis());
        let value = encode(&record)?;
        self.tree
            .insert(id.as_str().as_bytes(), value)
            .map_err(|e| backend::<R>(e))?;
        Ok(true)
    }
}

#[async_trait]
impl JobRepository for SledRepository<GenerationJob> {
    async fn update(
        &self,
        caller: &CallerId,
        id: &EntityId,
        mutate: JobMutation<'_>,
    ) -> Result<GenerationJob, ApiError> {
        let key = id.as_str().as_bytes();
        loop {
            let current = self
                .tree
                .get(key)
                .map_err(|e| backend::<GenerationJob>(e))?;
            let Some(raw) = current else {
                return Err(job_not_found(id));
            };
            let mut job: GenerationJob = decode(&raw)?;
            if !job.is_visible_to(caller) {
                return Err(job_not_found(id));
            }
            mutate(&mut job)?;
            job.updated_at_ms = now_millis().max(job.updated_at_ms);
            let value = encode(&job)?;

            match self
                .tree
                .compare_and_swap(key, Some(raw), Some(value))
                .map_err(|e| backend::<GenerationJob>(e))?
            {
                Ok(()) => return Ok(job),
                Err(_) => {
                    debug!(job_id = %id, "Concurrent job write detected, retrying update");
                    continue;
                }
            }
        }
    }
}

fn job_not_found(id: &EntityId) -> ApiError {
    ApiError::NotFound {
        kind: "job",
        id: id.to_string(),
    }
}

fn backend<R: Record>(err: sled::Error) -> StorageError {
    StorageError::Backend {
        tree: R::TREE,
        message: err.to_string(),
    }
}

fn encode<R: Record>(record: &R) -> Result<Vec<u8>, StorageError> {
    let result = match R::ENCODING {
        Encoding::Bincode => bincode::serialize(record).map_err(|e| e.to_string()),
        Encoding::Json => serde_json::to_vec(record).map_err(|e| e.to_string()),
    };
    result.map_err(|message| StorageError::Encode {
        tree: R::TREE,
        message,
    })
}

fn decode<R: Record>(raw: &[u8]) -> Result<R, StorageError> {
    let result = match R::ENCODING {
        Encoding::Bincode => bincode::deserialize(raw).map_err(|e| e.to_string()),
        Encoding::Json => serde_json::from_slice(raw).map_err(|e| e.to_string()),
    };
    result.map_err(|message| StorageError::Decode {
        tree: R::TREE,
        message,
    })
}
