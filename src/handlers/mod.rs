//! Handlers run for every Job event, in order

pub mod coffee;
pub mod logger;

pub use coffee::CoffeeHandler;
pub use logger::LoggingHandler;

use std::sync::Arc;

use async_trait::async_trait;
use futures::{pin_mut, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::events::JobEvent;
use crate::metrics::prometheus::{HANDLER_ERRORS, JOB_EVENTS};
use crate::Result;

/// Something that reacts to Job events
#[async_trait]
pub trait JobEventHandler: Send + Sync {
    /// Name used in logs and metric labels
    fn name(&self) -> &'static str;

    /// Called with a whole batch of events before any of them is handled.
    /// After a (re)list the batch holds every Job in the cluster.
    async fn prime(&self, _events: &[JobEvent]) -> Result<()> {
        Ok(())
    }

    async fn handle(&self, event: &JobEvent) -> Result<()>;
}

/// The ordered handler chain
pub type Handlers = Vec<Arc<dyn JobEventHandler>>;

/// Run every handler for one event. A failing handler does not stop the
/// ones after it. Returns the number of failed handlers.
#[instrument(skip_all, fields(event = %event.event_type, job = %event.key()))]
pub async fn dispatch(event: &JobEvent, handlers: &[Arc<dyn JobEventHandler>]) -> usize {
    JOB_EVENTS
        .with_label_values(&[event.event_type.as_str()])
        .inc();

    let mut failures = 0;
    for handler in handlers {
        if let Err(e) = handler.handle(event).await {
            failures += 1;
            HANDLER_ERRORS.with_label_values(&[handler.name()]).inc();
            error!(handler = handler.name(), "Handler failed: {}", e);
        }
    }
    failures
}

/// Prime every handler with a batch, then dispatch its events in order
async fn dispatch_batch(batch: &[JobEvent], handlers: &[Arc<dyn JobEventHandler>]) {
    for handler in handlers {
        if let Err(e) = handler.prime(batch).await {
            HANDLER_ERRORS.with_label_values(&[handler.name()]).inc();
            error!(handler = handler.name(), "Handler failed to prime: {}", e);
        }
    }

    for event in batch {
        dispatch(event, handlers).await;
    }
}

/// Feed a stream of event batches through the handlers until it ends.
/// Returns the number of events processed.
pub async fn process_stream<S>(stream: S, handlers: &[Arc<dyn JobEventHandler>]) -> usize
where
    S: Stream<Item = Vec<JobEvent>>,
{
    info!("Start processing event stream");
    pin_mut!(stream);

    let mut processed = 0;
    while let Some(batch) = stream.next().await {
        dispatch_batch(&batch, handlers).await;
        processed += batch.len();
    }

    info!(processed, "Event stream ended");
    processed
}

/// Like [`process_stream`], but stops taking new batches once `shutdown`
/// is cancelled. A batch already being handled runs to completion.
pub async fn process_until<S>(
    stream: S,
    handlers: &[Arc<dyn JobEventHandler>],
    shutdown: &CancellationToken,
) -> usize
where
    S: Stream<Item = Vec<JobEvent>>,
{
    process_stream(stream.take_until(shutdown.cancelled()), handlers).await
}
