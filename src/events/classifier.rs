//! Turns raw watcher events into ADDED / MODIFIED / DELETED

use std::collections::{HashMap, HashSet};

use k8s_openapi::api::batch::v1::Job;
use kube::runtime::watcher::Event;
use kube::ResourceExt;
use tracing::debug;

use super::{job_key, EventType, JobEvent};

/// Tracks the Jobs seen so far so that watcher output, which only says
/// "this object exists now", can be reported as a typed change.
///
/// A watcher restart relists every object. Events from a relist are held
/// back and released together once the relist completes, so handlers see
/// the whole list before acting on any of it. Objects that are known from
/// before the restart but missing from the relist were deleted while the
/// watch was down and are reported as `Deleted` at the head of that batch.
///
/// A Job recreated under the same name shows up with a new UID; it is
/// reported as `Deleted` for the old object followed by `Added`.
#[derive(Debug, Default)]
pub struct EventClassifier {
    known: HashMap<String, Job>,
    relisted: Option<HashSet<String>>,
    pending: Vec<JobEvent>,
}

impl EventClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of Jobs currently known to exist
    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Classify one watcher event. Returns the events ready for handlers,
    /// possibly none while a relist is in progress.
    pub fn classify(&mut self, event: Event<Job>) -> Vec<JobEvent> {
        match event {
            Event::Init => {
                debug!(known = self.known.len(), "Watch (re)list started");
                self.relisted = Some(HashSet::new());
                self.pending.clear();
                Vec::new()
            }
            Event::InitApply(job) => {
                let events = self.apply(job.clone());
                match self.relisted.as_mut() {
                    Some(relisted) => {
                        relisted.insert(job_key(&job));
                        self.pending.extend(events);
                        Vec::new()
                    }
                    None => events,
                }
            }
            Event::InitDone => self.finish_relist(),
            Event::Apply(job) => self.apply(job),
            Event::Delete(job) => {
                self.known.remove(&job_key(&job));
                vec![JobEvent::new(EventType::Deleted, job)]
            }
        }
    }

    fn apply(&mut self, job: Job) -> Vec<JobEvent> {
        let key = job_key(&job);
        let events = match self.known.get(&key) {
            None => vec![JobEvent::new(EventType::Added, job.clone())],
            Some(previous) if previous.uid() != job.uid() => vec![
                JobEvent::new(EventType::Deleted, previous.clone()),
                JobEvent::new(EventType::Added, job.clone()),
            ],
            Some(previous) if previous.resource_version() == job.resource_version() => {
                return Vec::new();
            }
            Some(_) => vec![JobEvent::new(EventType::Modified, job.clone())],
        };
        self.known.insert(key, job);
        events
    }

    fn finish_relist(&mut self) -> Vec<JobEvent> {
        let Some(relisted) = self.relisted.take() else {
            return Vec::new();
        };

        let gone: Vec<String> = self
            .known
            .keys()
            .filter(|key| !relisted.contains(*key))
            .cloned()
            .collect();

        debug!(
            relisted = relisted.len(),
            gone = gone.len(),
            "Watch (re)list finished"
        );

        let mut events: Vec<JobEvent> = gone
            .into_iter()
            .filter_map(|key| self.known.remove(&key))
            .map(|job| JobEvent::new(EventType::Deleted, job))
            .collect();
        events.append(&mut self.pending);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn job(name: &str, version: &str) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("batch".to_string()),
                resource_version: Some(version.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn job_with_uid(name: &str, version: &str, uid: &str) -> Job {
        let mut job = job(name, version);
        job.metadata.uid = Some(uid.to_string());
        job
    }

    fn types(events: &[JobEvent]) -> Vec<EventType> {
        events.iter().map(|e| e.event_type).collect()
    }

    #[test]
    fn first_sighting_is_added() {
        let mut classifier = EventClassifier::new();
        let events = classifier.classify(Event::Apply(job("a", "1")));
        assert_eq!(types(&events), vec![EventType::Added]);
        assert_eq!(events[0].key(), "batch/a");
    }

    #[test]
    fn new_resource_version_is_modified() {
        let mut classifier = EventClassifier::new();
        classifier.classify(Event::Apply(job("a", "1")));
        let events = classifier.classify(Event::Apply(job("a", "2")));
        assert_eq!(types(&events), vec![EventType::Modified]);
    }

    #[test]
    fn same_resource_version_is_ignored() {
        let mut classifier = EventClassifier::new();
        classifier.classify(Event::Apply(job("a", "1")));
        assert!(classifier.classify(Event::Apply(job("a", "1"))).is_empty());
    }

    #[test]
    fn delete_forgets_the_job() {
        let mut classifier = EventClassifier::new();
        classifier.classify(Event::Apply(job("a", "1")));
        let events = classifier.classify(Event::Delete(job("a", "1")));
        assert_eq!(types(&events), vec![EventType::Deleted]);
        assert_eq!(classifier.known_count(), 0);

        let events = classifier.classify(Event::Apply(job("a", "3")));
        assert_eq!(types(&events), vec![EventType::Added]);
    }

    #[test]
    fn initial_list_is_released_as_one_batch() {
        let mut classifier = EventClassifier::new();
        assert!(classifier.classify(Event::Init).is_empty());
        assert!(classifier.classify(Event::InitApply(job("a", "1"))).is_empty());
        assert!(classifier.classify(Event::InitApply(job("b", "1"))).is_empty());
        let batch = classifier.classify(Event::InitDone);
        assert_eq!(types(&batch), vec![EventType::Added, EventType::Added]);
        assert_eq!(batch[0].job_name(), "a");
        assert_eq!(batch[1].job_name(), "b");
        assert_eq!(classifier.known_count(), 2);
    }

    #[test]
    fn relist_reports_jobs_deleted_while_disconnected() {
        let mut classifier = EventClassifier::new();
        classifier.classify(Event::Apply(job("a", "1")));
        classifier.classify(Event::Apply(job("b", "1")));

        classifier.classify(Event::Init);
        let unchanged = classifier.classify(Event::InitApply(job("a", "1")));
        assert!(unchanged.is_empty());
        let done = classifier.classify(Event::InitDone);

        assert_eq!(types(&done), vec![EventType::Deleted]);
        assert_eq!(done[0].job_name(), "b");
        assert_eq!(classifier.known_count(), 1);
    }

    #[test]
    fn recreated_job_is_deleted_then_added() {
        let mut classifier = EventClassifier::new();
        classifier.classify(Event::Apply(job_with_uid("train", "1", "old-uid")));

        classifier.classify(Event::Init);
        assert!(classifier
            .classify(Event::InitApply(job_with_uid("train", "9", "new-uid")))
            .is_empty());
        let batch = classifier.classify(Event::InitDone);

        assert_eq!(types(&batch), vec![EventType::Deleted, EventType::Added]);
        assert_eq!(batch[0].job.uid().as_deref(), Some("old-uid"));
        assert_eq!(batch[1].job.uid().as_deref(), Some("new-uid"));
        assert_eq!(classifier.known_count(), 1);
    }

    #[test]
    fn recreated_job_outside_relist_is_deleted_then_added() {
        let mut classifier = EventClassifier::new();
        classifier.classify(Event::Apply(job_with_uid("train", "1", "old-uid")));
        let events = classifier.classify(Event::Apply(job_with_uid("train", "2", "new-uid")));
        assert_eq!(types(&events), vec![EventType::Deleted, EventType::Added]);
    }

    #[test]
    fn init_done_without_init_is_a_noop() {
        let mut classifier = EventClassifier::new();
        classifier.classify(Event::Apply(job("a", "1")));
        assert!(classifier.classify(Event::InitDone).is_empty());
        assert_eq!(classifier.known_count(), 1);
    }
}
