//! Manifest Generator
//!
//! This binary prints the Kubernetes manifest that deploys the controller:
//! namespace, RBAC, Deployment and metrics Service.
//!
//! Usage: cargo run --bin manifestgen > manifests/controller.yaml

use clap::Parser;

use kubespresso::adapters::manifest_builder::{render_manifest, ManifestOptions};

#[derive(Parser, Debug)]
#[command(name = "manifestgen", about = "Print the kubespresso deployment manifest")]
struct Args {
    /// Namespace the controller runs in
    #[arg(long, default_value = "kubespresso")]
    namespace: String,

    /// Controller image
    #[arg(long, default_value = "ghcr.io/kubespresso/kubespresso:latest")]
    image: String,

    /// Port for metrics and health probes
    #[arg(long, default_value_t = 8080)]
    metrics_port: u16,

    /// Coffee machine base URL passed to the controller
    #[arg(long, default_value = "http://coffee-machine.local")]
    coffee_machine_url: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let opts = ManifestOptions {
        namespace: args.namespace,
        image: args.image,
        metrics_port: args.metrics_port,
        coffee_machine_url: args.coffee_machine_url,
    };

    print!("{}", render_manifest(&opts)?);
    Ok(())
}
