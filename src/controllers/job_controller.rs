//! Controller for batch/v1 Jobs

use chrono::Utc;
use futures::{future, Stream, StreamExt};
use k8s_openapi::api::batch::v1::Job;
use kube::runtime::watcher::{self, watcher, Event};
use kube::runtime::WatchStreamExt;
use kube::Api;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::controllers::Context;
use crate::events::{EventClassifier, JobEvent};
use crate::handlers::process_until;
use crate::metrics::prometheus::{set_ready, KNOWN_JOBS, WATCH_ERRORS};
use crate::reconcilers::coffee::today;

/// Watch Jobs and run the handler chain until `shutdown` fires
pub async fn run(ctx: Arc<Context>, shutdown: CancellationToken) {
    let jobs: Api<Job> = match &ctx.settings.namespace {
        Some(ns) => Api::namespaced(ctx.client.clone(), ns),
        None => Api::all(ctx.client.clone()),
    };

    info!(
        namespace = ctx.settings.namespace.as_deref().unwrap_or("*"),
        "Starting Job controller"
    );

    let raw = watcher(jobs, watcher::Config::default().any_semantic()).default_backoff();
    let events = classify_stream(raw);

    process_until(events, &ctx.handlers, &shutdown).await;
    if shutdown.is_cancelled() {
        info!("Shutdown requested");
    } else {
        warn!("Job watch ended");
    }

    set_ready(false);
    let owners = ctx
        .settings
        .day_offset()
        .map(|offset| ctx.ledger.owners_served_on(today(Utc::now(), offset)))
        .unwrap_or_default();
    info!(
        served = ctx.ledger.served_count(),
        owners_today = ?owners,
        "Job controller stopped"
    );
}

/// Turn raw watcher output into batches of typed Job events. A (re)list
/// comes out as one batch, every other watch event as its own. Watch
/// errors are counted and dropped; the watcher's backoff takes care of
/// reconnecting.
pub fn classify_stream<S>(raw: S) -> impl Stream<Item = Vec<JobEvent>>
where
    S: Stream<Item = watcher::Result<Event<Job>>>,
{
    let mut classifier = EventClassifier::new();

    raw.filter_map(|res| {
        future::ready(match res {
            Ok(event) => Some(event),
            Err(e) => {
                WATCH_ERRORS.inc();
                warn!("Job watch error: {}", e);
                None
            }
        })
    })
    .filter_map(move |event| {
        let list_done = matches!(event, Event::InitDone);
        let events = classifier.classify(event);
        KNOWN_JOBS.set(classifier.known_count() as f64);
        if list_done {
            set_ready(true);
        }
        future::ready((!events.is_empty()).then_some(events))
    })
}
