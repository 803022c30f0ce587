//! In-process notification bus for job outcomes.
//!
//! The bus is an explicit handle: whoever needs to publish or subscribe is
//! given a clone. Delivery is best-effort to subscribers connected at publish
//! time; nothing is persisted or replayed, and a subscriber that falls behind
//! the channel capacity skips the events it missed.

use crate::job::{GenerationJob, JobKind};
use crate::types::{CallerId, JobId};
use chrono::{SecondsFormat, Utc};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Failed => "failed",
        }
    }
}

/// Named event type, rendered as `<kind>.<outcome>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub kind: JobKind,
    pub outcome: Outcome,
}

impl Topic {
    pub fn completed(kind: JobKind) -> Self {
        Self {
            kind,
            outcome: Outcome::Completed,
        }
    }

    pub fn failed(kind: JobKind) -> Self {
        Self {
            kind,
            outcome: Outcome::Failed,
        }
    }

    pub fn name(&self) -> String {
        self.to_string()
    }

    pub fn parse(name: &str) -> Option<Self> {
        let (kind, outcome) = name.rsplit_once('.')?;
        let kind = JobKind::parse(kind)?;
        let outcome = match outcome {
            "completed" => Outcome::Completed,
            "failed" => Outcome::Failed,
            _ => return None,
        };
        Some(Self { kind, outcome })
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.as_str(), self.outcome.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub topic: Topic,
    pub seq: u64,
    pub ts: String,
    pub job_id: JobId,
    pub owner: CallerId,
    /// Present on completion, and on failure when the stored job could be read back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<GenerationJob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<JobEvent>,
    seq: Arc<AtomicU64>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn completed(&self, job: GenerationJob) -> JobEvent {
        let event = JobEvent {
            topic: Topic::completed(job.kind),
            seq: self.next_seq(),
            ts: now_rfc3339(),
            job_id: job.id.clone(),
            owner: job.owner.clone(),
            job: Some(job),
            error: None,
        };
        self.publish(event.clone());
        event
    }

    pub fn failed(
        &self,
        kind: JobKind,
        job_id: JobId,
        owner: CallerId,
        job: Option<GenerationJob>,
        error: impl Into<String>,
    ) -> JobEvent {
        let event = JobEvent {
            topic: Topic::failed(kind),
            seq: self.next_seq(),
            ts: now_rfc3339(),
            job_id,
            owner,
            job,
            error: Some(error.into()),
        };
        self.publish(event.clone());
        event
    }

    /// Fire and forget. Returns the number of subscribers reached.
    pub fn publish(&self, event: JobEvent) -> usize {
        let topic = event.topic;
        let job_id = event.job_id.clone();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(topic = %topic, job_id = %job_id, receivers, "Published job event");
                receivers
            }
            Err(_) => {
                debug!(topic = %topic, job_id = %job_id, "Published job event with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            topics: None,
            owner: None,
        }
    }

    /// Subscribe to a subset of topics.
    pub fn subscribe_to(&self, topics: impl IntoIterator<Item = Topic>) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            topics: Some(topics.into_iter().collect()),
            owner: None,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

pub struct Subscription {
    receiver: broadcast::Receiver<JobEvent>,
    topics: Option<Vec<Topic>>,
    owner: Option<CallerId>,
}

impl Subscription {
    /// Only deliver events for jobs owned by `owner`.
    pub fn for_owner(mut self, owner: CallerId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Next matching event, or `None` once every bus handle is dropped.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged behind, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the terminal event of one job.
    pub async fn wait_for(&mut self, job_id: &JobId) -> Option<JobEvent> {
        while let Some(event) = self.recv().await {
            if &event.job_id == job_id {
                return Some(event);
            }
        }
        None
    }

    pub fn into_stream(self) -> impl Stream<Item = JobEvent> {
        stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
    }

    fn matches(&self, event: &JobEvent) -> bool {
        let topic_ok = match &self.topics {
            Some(topics) => topics.contains(&event.topic),
            None => true,
        };
        topic_ok && self.owner.as_ref().map_or(true, |owner| owner == &event.owner)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
