//! Job watch events as seen by the handler chain

mod classifier;

pub use classifier::EventClassifier;

use std::fmt;

use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;

/// Kind of change a watch event describes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

impl EventType {
    /// Upper-case name used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change to a Job
#[derive(Clone, Debug)]
pub struct JobEvent {
    pub event_type: EventType,
    pub job: Job,
}

impl JobEvent {
    pub fn new(event_type: EventType, job: Job) -> Self {
        Self { event_type, job }
    }

    /// `namespace/name` of the Job
    pub fn key(&self) -> String {
        job_key(&self.job)
    }

    pub fn job_name(&self) -> String {
        self.job.name_any()
    }
}

/// `namespace/name` identifying a Job across events
pub fn job_key(job: &Job) -> String {
    format!("{}/{}", job.namespace().unwrap_or_default(), job.name_any())
}
