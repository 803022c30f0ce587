//! Job supervisor
//!
//! Runs generation attempts as detached tokio tasks. Each run ends in exactly
//! one terminal status write and one published event, whether the worker
//! returns an error, panics, or the final write itself fails.

use crate::config::InFlightPolicy;
use crate::error::ApiError;
use crate::generation::worker::GenerationWorker;
use crate::job::{GenerationJob, JobKind};
use crate::notify::{JobEvent, NotificationBus};
use crate::store::Repositories;
use crate::types::{CallerId, EntityId, JobId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, info_span, warn, Instrument};

type InFlightKey = (JobKind, EntityId);
type InFlightIndex = Arc<Mutex<HashMap<InFlightKey, Vec<JobId>>>>;

/// Supervisor counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    pub submitted: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

/// A registered in-flight run. Dropping it releases the (kind, subject) entry.
pub struct InFlightSlot {
    index: InFlightIndex,
    key: InFlightKey,
    job_id: JobId,
}

impl InFlightSlot {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        let mut index = self.index.lock();
        if let Some(live) = index.get_mut(&self.key) {
            live.retain(|id| id != &self.job_id);
            if live.is_empty() {
                index.remove(&self.key);
            }
        }
    }
}

/// Handle to a submitted run. Drop it to detach, or await [`JobHandle::wait`].
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    handle: JoinHandle<JobEvent>,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Wait for the run's terminal event.
    pub async fn wait(self) -> Result<JobEvent, ApiError> {
        self.handle
            .await
            .map_err(|e| ApiError::TaskAborted(describe_join_error(e)))
    }
}

#[derive(Clone)]
pub struct JobSupervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    worker: GenerationWorker,
    repos: Repositories,
    bus: NotificationBus,
    policy: InFlightPolicy,
    in_flight: InFlightIndex,
    stats: RwLock<SupervisorStats>,
}

impl JobSupervisor {
    pub fn new(
        worker: GenerationWorker,
        repos: Repositories,
        bus: NotificationBus,
        policy: InFlightPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                worker,
                repos,
                bus,
                policy,
                in_flight: Arc::new(Mutex::new(HashMap::new())),
                stats: RwLock::new(SupervisorStats::default()),
            }),
        }
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.inner.bus
    }

    pub fn policy(&self) -> InFlightPolicy {
        self.inner.policy
    }

    pub fn stats(&self) -> SupervisorStats {
        self.inner.stats.read().clone()
    }

    /// Jobs currently running for a subject.
    pub fn in_flight(&self, kind: JobKind, subject_id: &EntityId) -> Vec<JobId> {
        self.inner
            .in_flight
            .lock()
            .get(&(kind, subject_id.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// Register a run before anything is written. Under `RejectDuplicate`
    /// a live run for the same kind and subject is `GenerationInFlight`.
    pub fn reserve(
        &self,
        kind: JobKind,
        subject_id: &EntityId,
        job_id: &JobId,
    ) -> Result<InFlightSlot, ApiError> {
        let key = (kind, subject_id.clone());
        let mut index = self.inner.in_flight.lock();
        let live = index.entry(key.clone()).or_default();
        if self.inner.policy == InFlightPolicy::RejectDuplicate && !live.is_empty() {
            debug!(
                kind = %kind,
                subject_id = %subject_id,
                live = live.len(),
                "Rejecting duplicate generation request"
            );
            return Err(ApiError::GenerationInFlight {
                kind: kind.to_string(),
                subject_id: subject_id.to_string(),
            });
        }
        live.push(job_id.clone());
        Ok(InFlightSlot {
            index: Arc::clone(&self.inner.in_flight),
            key,
            job_id: job_id.clone(),
        })
    }

    /// Spawn a detached run of `job`. Must be called within a tokio runtime.
    pub fn submit(&self, job: &GenerationJob, caller: CallerId, slot: InFlightSlot) -> JobHandle {
        let inner = Arc::clone(&self.inner);
        let job_id = job.id.clone();
        let kind = job.kind;
        inner.stats.write().submitted += 1;

        let span = info_span!("generation", job_id = %job_id, kind = %kind, caller = %caller);
        let task_job_id = job_id.clone();
        let handle = tokio::spawn(
            async move {
                let _slot = slot;
                inner.stats.write().running += 1;

                // Nested task so a panicking worker surfaces as a JoinError here.
                let worker = inner.worker.clone();
                let run_id = task_job_id.clone();
                let run_caller = caller.clone();
                let attempt = tokio::spawn(async move { worker.run(&run_id, &run_caller).await });
                let result = match attempt.await {
                    Ok(result) => result,
                    Err(join_error) => Err(ApiError::TaskAborted(describe_join_error(join_error))),
                };

                inner.finish(kind, &task_job_id, &caller, result).await
            }
            .instrument(span),
        );

        JobHandle { job_id, handle }
    }
}

impl SupervisorInner {
    async fn finish(
        &self,
        kind: JobKind,
        job_id: &JobId,
        caller: &CallerId,
        result: Result<GenerationJob, ApiError>,
    ) -> JobEvent {
        let event = match result {
            Ok(job) => {
                self.stats.write().completed += 1;
                self.bus.completed(job)
            }
            Err(err) => {
                let message = err.to_string();
                warn!(job_id = %job_id, kind = %kind, error = %message, "Generation failed");
                let job = self.persist_failure(caller, job_id, &message).await;
                self.stats.write().failed += 1;
                self.bus.failed(kind, job_id.clone(), caller.clone(), job, message)
            }
        };

        let stats = {
            let mut stats = self.stats.write();
            stats.running = stats.running.saturating_sub(1);
            stats.clone()
        };
        info!(
            job_id = %job_id,
            topic = %event.topic,
            completed = stats.completed,
            failed = stats.failed,
            running = stats.running,
            "Generation run finished"
        );
        event
    }

    /// Write `Error` for the job, forcing it when the regular transition is refused.
    async fn persist_failure(
        &self,
        caller: &CallerId,
        job_id: &JobId,
        message: &str,
    ) -> Option<GenerationJob> {
        let failed = self
            .repos
            .jobs
            .update(caller, job_id, &|job: &mut GenerationJob| job.fail(message))
            .await;
        let err = match failed {
            Ok(job) => return Some(job),
            Err(err) => err,
        };
        warn!(job_id = %job_id, error = %err, "Failure transition refused, forcing error status");

        let forced = self
            .repos
            .jobs
            .update(caller, job_id, &|job: &mut GenerationJob| {
                job.force_error(message);
                Ok(())
            })
            .await;
        match forced {
            Ok(job) => Some(job),
            Err(err) => {
                error!(job_id = %job_id, error = %err, "Failed to persist error status");
                None
            }
        }
    }
}

fn describe_join_error(err: JoinError) -> String {
    if !err.is_panic() {
        return "generation task was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("generation task panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("generation task panicked: {}", message)
    } else {
        "generation task panicked".to_string()
    }
}
