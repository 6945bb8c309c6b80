//! Logs every Job event

use async_trait::async_trait;
use tracing::info;

use super::JobEventHandler;
use crate::events::JobEvent;
use crate::Result;

pub struct LoggingHandler;

#[async_trait]
impl JobEventHandler for LoggingHandler {
    fn name(&self) -> &'static str {
        "logger"
    }

    async fn handle(&self, event: &JobEvent) -> Result<()> {
        info!(
            "handling event {} for {}",
            event.event_type,
            event.job_name()
        );
        Ok(())
    }
}
