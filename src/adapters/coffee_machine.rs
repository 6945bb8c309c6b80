//! Client for the coffee machine HTTP API

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Path of the brew endpoint, relative to the machine's base URL
pub const BREW_PATH: &str = "/api/v1/brew";

/// Header the machine uses to drop duplicate orders
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// The Job a cup is brewed for
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

/// Body of a brew request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrewOrder {
    pub owner: String,
    pub recipe: String,
    pub job: JobRef,
    pub expected_duration_seconds: u64,

    /// Sent as a header, not in the body
    #[serde(skip)]
    pub idempotency_key: String,
}

impl BrewOrder {
    pub fn new(job: &Job, owner: &str, recipe: &str, expected: Duration, day: NaiveDate) -> Self {
        let uid = job.uid().unwrap_or_default();
        Self {
            owner: owner.to_string(),
            recipe: recipe.to_string(),
            job: JobRef {
                namespace: job.namespace().unwrap_or_default(),
                name: job.name_any(),
                uid: uid.clone(),
            },
            expected_duration_seconds: expected.as_secs(),
            idempotency_key: idempotency_key(&uid, owner, day),
        }
    }
}

/// What the machine answers to an accepted order
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrewReceipt {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub eta_seconds: Option<u64>,
}

/// Hex SHA-256 of `uid|owner|day`, truncated to 32 characters
pub fn idempotency_key(uid: &str, owner: &str, day: NaiveDate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", uid, owner, day).as_bytes());
    format!("{:x}", hasher.finalize())[..32].to_string()
}

/// Something that can brew a cup of coffee
#[async_trait]
pub trait CoffeeMachine: Send + Sync {
    async fn brew(&self, order: &BrewOrder) -> Result<BrewReceipt>;
}

/// Coffee machine reached over HTTP
pub struct HttpCoffeeMachine {
    client: reqwest::Client,
    brew_url: String,
    token: Option<String>,
}

impl HttpCoffeeMachine {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kubespresso/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::CoffeeMachine(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            brew_url: format!("{}{}", base_url.trim_end_matches('/'), BREW_PATH),
            token,
        })
    }

    pub fn brew_url(&self) -> &str {
        &self.brew_url
    }
}

#[async_trait]
impl CoffeeMachine for HttpCoffeeMachine {
    async fn brew(&self, order: &BrewOrder) -> Result<BrewReceipt> {
        let mut request = self
            .client
            .post(&self.brew_url)
            .header(IDEMPOTENCY_HEADER, order.idempotency_key.as_str())
            .json(order);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| Error::CoffeeMachine(format!("brew request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::CoffeeMachine(format!(
                "brew rejected with {}: {}",
                status,
                body.trim()
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::CoffeeMachine(format!("reading brew response: {}", e)))?;
        if body.is_empty() {
            return Ok(BrewReceipt::default());
        }

        let receipt = serde_json::from_slice::<BrewReceipt>(&body).unwrap_or_else(|e| {
            warn!("Unexpected brew response body, ignoring it: {}", e);
            BrewReceipt::default()
        });
        debug!(id = ?receipt.id, eta_seconds = ?receipt.eta_seconds, "Brew accepted");

        Ok(receipt)
    }
}
