//! Repository layer
//!
//! Caller-scoped CRUD over domain records and generation jobs. Lookups of
//! records that are missing, soft-deleted or owned by another caller return
//! `Ok(None)` (or an empty list); only storage faults surface as errors.

pub mod loader;
pub mod persistence;

pub use loader::BatchLoader;
pub use persistence::SledRepository;

use crate::error::{ApiError, StorageError};
use crate::job::GenerationJob;
use crate::model::{Assistant, Athlete, Goal, SessionLog};
use crate::types::{CallerId, EntityId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// On-disk encoding of a record tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Bincode,
    /// Records embedding `serde_json::Value` cannot round-trip through bincode.
    Json,
}

/// A stored, caller-owned record.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TREE: &'static str;
    const KIND: &'static str;
    const ENCODING: Encoding;

    fn id(&self) -> &EntityId;
    fn owner(&self) -> &CallerId;
    /// Athlete this record hangs off, if any.
    fn athlete_id(&self) -> Option<&EntityId>;
    fn created_at_ms(&self) -> u64;
    fn deleted_at_ms(&self) -> Option<u64>;
    fn set_timestamps(&mut self, created_at_ms: u64, updated_at_ms: u64);
    fn set_deleted_at(&mut self, deleted_at_ms: u64);

    fn is_visible_to(&self, caller: &CallerId) -> bool {
        self.owner() == caller && self.deleted_at_ms().is_none()
    }
}

/// Caller-scoped repository for one record type
#[async_trait]
pub trait Repository<R: Record>: Send + Sync {
    async fn get(&self, caller: &CallerId, id: &EntityId) -> Result<Option<R>, StorageError>;

    /// Fetch several records in one call; missing ids are simply absent from the result.
    async fn get_many(&self, caller: &CallerId, ids: &[EntityId]) -> Result<Vec<R>, StorageError>;

    async fn list(&self, caller: &CallerId) -> Result<Vec<R>, StorageError>;

    async fn list_for_athlete(
        &self,
        caller: &CallerId,
        athlete_id: &EntityId,
    ) -> Result<Vec<R>, StorageError>;

    /// Insert or replace. The store maintains `created_at_ms` / `updated_at_ms`.
    async fn put(&self, caller: &CallerId, record: R) -> Result<R, StorageError>;

    /// Returns false when nothing visible to the caller was deleted.
    async fn soft_delete(&self, caller: &CallerId, id: &EntityId) -> Result<bool, StorageError>;
}

pub type JobMutation<'a> = &'a (dyn Fn(&mut GenerationJob) -> Result<(), ApiError> + Send + Sync);

/// Jobs additionally support atomic read-modify-write of a single row.
#[async_trait]
pub trait JobRepository: Repository<GenerationJob> {
    /// Apply `mutate` to the current stored job and write it back atomically.
    /// Concurrent writers are retried against the fresh value, never merged.
    async fn update(
        &self,
        caller: &CallerId,
        id: &EntityId,
        mutate: JobMutation<'_>,
    ) -> Result<GenerationJob, ApiError>;
}

/// The full set of repositories the application works against.
#[derive(Clone)]
pub struct Repositories {
    pub athletes: Arc<dyn Repository<Athlete>>,
    pub goals: Arc<dyn Repository<Goal>>,
    pub session_logs: Arc<dyn Repository<SessionLog>>,
    pub assistants: Arc<dyn Repository<Assistant>>,
    pub jobs: Arc<dyn JobRepository>,
}

impl Repositories {
    /// Open (or create) a sled database at `path` and build every repository over it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            StorageError::Open(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_db(&db)
    }

    /// Repositories over a throwaway database, removed on drop.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StorageError::Open(e.to_string()))?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            athletes: Arc::new(SledRepository::<Athlete>::open(db)?),
            goals: Arc::new(SledRepository::<Goal>::open(db)?),
            session_logs: Arc::new(SledRepository::<SessionLog>::open(db)?),
            assistants: Arc::new(SledRepository::<Assistant>::open(db)?),
            jobs: Arc::new(SledRepository::<GenerationJob>::open(db)?),
        })
    }
}

macro_rules! impl_record {
    ($ty:ty, $tree:literal, $kind:literal, $encoding:expr, athlete = |$r:ident| $athlete:expr) => {
        impl Record for $ty {
            const TREE: &'static str = $tree;
            const KIND: &'static str = $kind;
            const ENCODING: Encoding = $encoding;

            fn id(&self) -> &EntityId {
                &self.id
            }

            fn owner(&self) -> &CallerId {
                &self.owner
            }

            fn athlete_id(&self) -> Option<&EntityId> {
                let $r = self;
                $athlete
            }

            fn created_at_ms(&self) -> u64 {
                self.created_at_ms
            }

            fn deleted_at_ms(&self) -> Option<u64> {
                self.deleted_at_ms
            }

            fn set_timestamps(&mut self, created_at_ms: u64, updated_at_ms: u64) {
                self.created_at_ms = created_at_ms;
                self.updated_at_ms = updated_at_ms;
            }

            fn set_deleted_at(&mut self, deleted_at_ms: u64) {
                self.deleted_at_ms = Some(deleted_at_ms);
            }
        }
    };
}

impl_record!(Athlete, "athletes", "athlete", Encoding::Bincode, athlete = |_r| None);
impl_record!(Goal, "goals", "goal", Encoding::Bincode, athlete = |r| Some(&r.athlete_id));
impl_record!(
    SessionLog,
    "session_logs",
    "session log",
    Encoding::Bincode,
    athlete = |r| Some(&r.athlete_id)
);
impl_record!(Assistant, "assistants", "assistant", Encoding::Bincode, athlete = |_r| None);
impl_record!(
    GenerationJob,
    "jobs",
    "job",
    Encoding::Json,
    athlete = |r| Some(&r.subject_id)
);
