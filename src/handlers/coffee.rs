//! Brews a coffee for the owners of long-running Jobs

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use k8s_openapi::api::batch::v1::Job;
use tracing::{debug, info};

use super::JobEventHandler;
use crate::adapters::coffee_machine::{BrewOrder, CoffeeMachine};
use crate::adapters::job_marker::JobMarker;
use crate::config::Settings;
use crate::events::{EventType, JobEvent};
use crate::ledger::CoffeeLedger;
use crate::metrics::prometheus::{BREW_DURATION, BREW_ERRORS, COFFEES_BREWED, COFFEE_DECISIONS};
use crate::reconcilers::coffee::{
    ledger_id, resolve_owner, served_on, should_make_coffee, today, CoffeeRules, Decision,
    SkipReason,
};
use crate::{Error, Result};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct CoffeeHandler {
    rules: CoffeeRules,
    recipe: String,
    offset: FixedOffset,
    dry_run: bool,
    ledger: Arc<CoffeeLedger>,
    machine: Arc<dyn CoffeeMachine>,
    marker: Arc<dyn JobMarker>,
    clock: Clock,
}

impl CoffeeHandler {
    pub fn new(
        settings: &Settings,
        ledger: Arc<CoffeeLedger>,
        machine: Arc<dyn CoffeeMachine>,
        marker: Arc<dyn JobMarker>,
    ) -> Result<Self> {
        Ok(Self {
            rules: CoffeeRules::from_settings(settings)?,
            recipe: settings.recipe.clone(),
            offset: settings.day_offset()?,
            dry_run: settings.dry_run,
            ledger,
            machine,
            marker,
            clock: Arc::new(Utc::now),
        })
    }

    /// Replace the wall clock, for tests
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    async fn make_coffee(
        &self,
        job: &Job,
        owner: &str,
        expected: Duration,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let order = BrewOrder::new(job, owner, &self.recipe, expected, day);

        if self.dry_run {
            info!(
                "Dry run: would brew {} for {} ({}/{})",
                order.recipe, owner, order.job.namespace, order.job.name
            );
        } else {
            let start = Instant::now();
            let result = self.machine.brew(&order).await;
            BREW_DURATION.observe(start.elapsed().as_secs_f64());

            match result {
                Ok(receipt) => {
                    COFFEES_BREWED.inc();
                    info!(
                        receipt = ?receipt.id,
                        "Brewing {} for {} ({}/{})",
                        order.recipe, owner, order.job.namespace, order.job.name
                    );
                }
                Err(e) => {
                    BREW_ERRORS.inc();
                    return Err(e);
                }
            }
        }

        self.ledger.record_coffee(owner, day);
        self.ledger.mark_served(&ledger_id(job));

        self.marker.mark_served(job, now).await.map_err(|e| match e {
            Error::Kube(msg) => Error::Kube(format!("coffee brewed but {}", msg)),
            other => other,
        })
    }

    /// Carry a served annotation from a previous run into the ledger
    fn remember_served(&self, job: &Job) {
        let Some(day) = served_on(job, self.offset) else {
            return;
        };
        let owner = resolve_owner(job, &self.rules.owner_label);
        debug!("{} was served on {} for Job {}", owner, day, ledger_id(job));
        self.ledger.record_coffee(&owner, day);
        self.ledger.mark_served(&ledger_id(job));
    }
}

#[async_trait]
impl JobEventHandler for CoffeeHandler {
    fn name(&self) -> &'static str {
        "coffee"
    }

    async fn prime(&self, events: &[JobEvent]) -> Result<()> {
        events
            .iter()
            .filter(|event| event.event_type != EventType::Deleted)
            .for_each(|event| self.remember_served(&event.job));
        Ok(())
    }

    async fn handle(&self, event: &JobEvent) -> Result<()> {
        if event.event_type == EventType::Deleted {
            COFFEE_DECISIONS
                .with_label_values(&[Decision::Skip(SkipReason::Deleted).outcome()])
                .inc();
            if self.ledger.forget(&ledger_id(&event.job)) {
                debug!("Forgot deleted Job {}", event.key());
            }
            return Ok(());
        }

        self.remember_served(&event.job);

        let now = (self.clock)();
        let day = today(now, self.offset);
        let decision = should_make_coffee(event, &self.rules, &self.ledger, day);
        COFFEE_DECISIONS
            .with_label_values(&[decision.outcome()])
            .inc();

        match decision {
            Decision::Brew { owner, expected } => {
                self.make_coffee(&event.job, &owner, expected, day, now)
                    .await
            }
            Decision::AlreadyHadCoffee { owner } => {
                info!(
                    "{} already had a coffee today, skipping Job {}",
                    owner,
                    event.key()
                );
                self.ledger.mark_served(&ledger_id(&event.job));
                Ok(())
            }
            Decision::Skip(reason) => {
                debug!(reason = reason.as_str(), "No coffee for Job {}", event.key());
                Ok(())
            }
        }
    }
}
