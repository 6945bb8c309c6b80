//! Controller implementations for watching Jobs

pub mod job_controller;

use kube::Client;
use std::sync::Arc;

use crate::adapters::coffee_machine::HttpCoffeeMachine;
use crate::adapters::job_marker::{JobMarker, KubeJobMarker, NoopJobMarker};
use crate::config::Settings;
use crate::handlers::{CoffeeHandler, Handlers, LoggingHandler};
use crate::ledger::CoffeeLedger;
use crate::Result;

/// Shared context for controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    pub settings: Settings,
    pub ledger: Arc<CoffeeLedger>,
    /// Handler chain every Job event goes through
    pub handlers: Handlers,
}

impl Context {
    /// Create a new context with the default handler chain
    pub fn new(client: Client, settings: Settings) -> Result<Arc<Self>> {
        let ledger = CoffeeLedger::new();

        let machine = Arc::new(HttpCoffeeMachine::new(
            &settings.coffee_machine_url,
            settings.coffee_machine_token.clone(),
            settings.brew_timeout(),
        )?);
        let marker: Arc<dyn JobMarker> = if settings.dry_run {
            Arc::new(NoopJobMarker)
        } else {
            Arc::new(KubeJobMarker::new(client.clone()))
        };
        let coffee = CoffeeHandler::new(&settings, ledger.clone(), machine, marker)?;

        let handlers: Handlers = vec![Arc::new(LoggingHandler), Arc::new(coffee)];

        Ok(Arc::new(Self {
            client,
            settings,
            ledger,
            handlers,
        }))
    }
}
