//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the pod VM image
//! collaborators into the reconciler and runs the KataConfig watcher next to
//! the probe server.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::probes::{self, ProbeState};
use crate::reconciler::confidential::FeatureReconciler;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crds::KataConfig;
use kube::{Api, Client};
use podvm_image::{
    ConfigMapClientTrait, GeneratorSettings, ImageGenerator, JobPreconfigurator, KubeConfigMapClient,
    NodeProviderDetector, PodVmImageGenerator, ProviderDetector,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Field manager recorded on every write
pub const FIELD_MANAGER: &str = "confidential-controller";

/// Main controller for the confidential feature.
pub struct Controller {
    kata_config_watcher: JoinHandle<Result<(), ControllerError>>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing confidential controller");

        let kube_client = Client::try_default().await?;

        let config_maps: Arc<dyn ConfigMapClientTrait> =
            Arc::new(KubeConfigMapClient::new(kube_client.clone(), FIELD_MANAGER));

        let detector: Arc<dyn ProviderDetector> = match config.cloud_provider {
            Some(provider) => {
                info!("Using cloud provider {} from configuration", provider);
                Arc::new(provider)
            }
            None => Arc::new(NodeProviderDetector::new(kube_client.clone())),
        };

        // One generator for the whole process; it detects the provider once
        let generator: Arc<dyn ImageGenerator> = Arc::new(PodVmImageGenerator::new(
            config_maps.clone(),
            detector,
            GeneratorSettings {
                namespace: config.namespace.clone(),
                template_dir: config.template_dir.clone(),
            },
        ));
        let preconfigurator = Arc::new(JobPreconfigurator::new(
            kube_client.clone(),
            &config.namespace,
            generator.clone(),
            config.template_dir.clone(),
        ));

        let metrics = Arc::new(Metrics::new()?);
        let feature = FeatureReconciler::new(
            generator,
            preconfigurator,
            config_maps.clone(),
            config.namespace.clone(),
            metrics.clone(),
        );

        let kata_config_api: Api<KataConfig> = Api::all(kube_client);
        let reconciler = Arc::new(Reconciler::new(
            feature,
            config_maps,
            kata_config_api.clone(),
            config.namespace.clone(),
            metrics.clone(),
        ));

        let ready = Arc::new(AtomicBool::new(false));
        let watcher = Watcher::new(reconciler, kata_config_api, config.resync_interval, ready.clone());
        let kata_config_watcher = tokio::spawn(async move { watcher.watch_kata_configs().await });

        let probe_state = ProbeState { metrics, ready };
        let probe_addr = config.probe_addr;
        let probe_server = tokio::spawn(async move { probes::serve(probe_addr, probe_state).await });

        Ok(Self {
            kata_config_watcher,
            probe_server,
        })
    }

    /// Runs until the watcher stops or the probe server fails.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Confidential controller running");

        tokio::select! {
            result = &mut self.kata_config_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("KataConfig watcher panicked: {}", e)))??;
                info!("KataConfig watcher exited, shutting down");
            }
            result = &mut self.probe_server => {
                result.map_err(|e| ControllerError::Watch(format!("Probe server panicked: {}", e)))??;
            }
        }

        self.probe_server.abort();
        Ok(())
    }
}
