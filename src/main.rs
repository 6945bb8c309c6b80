//! kubespresso
//!
//! Main entry point for the controller. Logs in to the cluster, starts the
//! metrics server and the Job controller, and waits for a shutdown signal.

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kubespresso::{
    cluster::cluster_login,
    config::{LogFormat, Settings},
    controllers::{job_controller, Context},
    metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();

    init_tracing(settings.log_format);

    settings.validate()?;

    info!("Starting kubespresso");

    let client = cluster_login().await?;
    info!("Connected to Kubernetes API server");

    let context = Context::new(client, settings.clone())?;
    if settings.dry_run {
        info!("Dry run: no coffee will be brewed and no Job will be modified");
    }

    let metrics_handle = tokio::spawn(metrics::serve(settings.metrics_port));
    info!("Metrics server starting on port {}", settings.metrics_port);

    let shutdown = CancellationToken::new();
    let mut controller_handle = tokio::spawn(job_controller::run(context, shutdown.clone()));

    tokio::select! {
        _ = &mut controller_handle => {
            error!("Job controller exited unexpectedly");
            anyhow::bail!("Job controller exited unexpectedly");
        }
        res = metrics_handle => {
            error!("Metrics server exited unexpectedly: {:?}", res);
            anyhow::bail!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping controller");
            shutdown.cancel();
            if let Err(e) = controller_handle.await {
                error!("Job controller did not stop cleanly: {}", e);
            }
        }
    }

    info!("kubespresso stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,kubespresso=debug,kube=warn,hyper=warn")
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
