//! Marking Jobs whose owner already got a coffee

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::batch::v1::Job;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::info;

use crate::reconcilers::coffee::SERVED_ANNOTATION;
use crate::{Error, Result};

/// Field manager used for patches
pub const FIELD_MANAGER: &str = "kubespresso";

/// Records on the Job itself that it has been served, so the decision
/// survives controller restarts.
#[async_trait]
pub trait JobMarker: Send + Sync {
    async fn mark_served(&self, job: &Job, at: DateTime<Utc>) -> Result<()>;
}

/// Patch body setting the served annotation
pub fn served_patch(at: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "annotations": {
                SERVED_ANNOTATION: at.to_rfc3339_opts(SecondsFormat::Secs, true)
            }
        }
    })
}

/// Annotates Jobs through the API server
pub struct KubeJobMarker {
    client: Client,
}

impl KubeJobMarker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobMarker for KubeJobMarker {
    async fn mark_served(&self, job: &Job, at: DateTime<Utc>) -> Result<()> {
        let ns = job.namespace().unwrap_or_default();
        let name = job.name_any();

        let jobs: Api<Job> = Api::namespaced(self.client.clone(), &ns);
        jobs.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&served_patch(at)),
        )
        .await
        .map_err(|e| Error::Kube(format!("Failed to annotate Job {}/{}: {}", ns, name, e)))?;

        info!("Marked Job {}/{} as served", ns, name);
        Ok(())
    }
}

/// Leaves Jobs untouched, for dry runs
pub struct NoopJobMarker;

#[async_trait]
impl JobMarker for NoopJobMarker {
    async fn mark_served(&self, job: &Job, _at: DateTime<Utc>) -> Result<()> {
        info!(
            "Dry run: not annotating Job {}/{}",
            job.namespace().unwrap_or_default(),
            job.name_any()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn patch_sets_rfc3339_annotation() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap();
        let patch = served_patch(at);
        assert_eq!(
            patch["metadata"]["annotations"][SERVED_ANNOTATION],
            "2024-03-01T09:15:00Z"
        );
    }

    #[test]
    fn noop_marker_always_succeeds() {
        let job = Job {
            metadata: ObjectMeta {
                name: Some("train".to_string()),
                namespace: Some("ml".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let result = tokio_test::block_on(NoopJobMarker.mark_served(&job, Utc::now()));
        assert!(result.is_ok());
    }
}
