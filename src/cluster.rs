//! Connecting to the Kubernetes API server

use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use tracing::debug;

use crate::{Error, Result};

/// Environment variable the kubelet injects into every pod
const IN_CLUSTER_ENV: &str = "KUBERNETES_PORT";

/// Whether the process runs inside a pod
pub fn running_in_cluster() -> bool {
    std::env::var_os(IN_CLUSTER_ENV).is_some()
}

/// Build a client from the service account when running in a pod,
/// from the local kubeconfig otherwise.
pub async fn cluster_login() -> Result<Client> {
    let config = if running_in_cluster() {
        debug!("Running inside of a cluster");
        Config::incluster()
            .map_err(|e| Error::ClusterLogin(format!("in-cluster config: {}", e)))?
    } else {
        debug!("Running outside of a cluster");
        Config::from_kubeconfig(&KubeConfigOptions::default())
            .await
            .map_err(|e| Error::ClusterLogin(format!("kubeconfig: {}", e)))?
    };

    debug!(cluster_url = %config.cluster_url, "Loaded cluster config");

    Client::try_from(config).map_err(|e| Error::ClusterLogin(e.to_string()))
}
