//! Confidential Controller
//!
//! Reconciles the confidential computing feature of the sandboxed
//! containers operator:
//! - prepares the pod VM image configuration for the detected cloud provider
//! - drives the image creation Job and reports progress on the KataConfig
//! - toggles confidential VMs in the peer pods configuration
//!
//! The feature is switched with the `confidential` key of the
//! `osc-feature-gates` ConfigMap.

mod backoff;
mod conditions;
mod config;
mod controller;
mod error;
mod feature_gates;
mod metrics;
mod probes;
mod reconcile_helpers;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // kube and rustls both pull in crypto backends; pick one explicitly
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Confidential Controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace);
    info!("  Template directory: {}", config.template_dir.display());
    info!(
        "  Cloud provider: {}",
        config
            .cloud_provider
            .map(|p| p.to_string())
            .unwrap_or_else(|| "detect from nodes".to_string())
    );
    info!("  Probe address: {}", config.probe_addr);
    info!("  Resync interval: {:?}", config.resync_interval);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
