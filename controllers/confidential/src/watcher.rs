//! KataConfig watcher.
//!
//! Drives reconciliation with `kube_runtime::Controller`, which handles
//! reconnection, deduplicates queued objects and retries with the
//! requeue delay each pass returns.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::KataConfig;
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{watcher, Controller};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// State shared with every reconciliation
struct Context {
    reconciler: Arc<Reconciler>,
    resync_interval: Duration,
}

async fn reconcile(kata_config: Arc<KataConfig>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let name = kata_config.name_any();
    debug!("Reconciling KataConfig {}", name);

    ctx.reconciler.reconcile_kata_config(&kata_config).await?;
    ctx.reconciler.reset_backoff(&name);
    Ok(Action::requeue(ctx.resync_interval))
}

fn error_policy(kata_config: Arc<KataConfig>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let name = kata_config.name_any();
    let delay = ctx.reconciler.next_backoff(&name);
    error!("Reconciliation error for KataConfig {}: {} (retry in {:?})", name, error, delay);
    Action::requeue(delay)
}

/// Watches `KataConfig` resources and reconciles the confidential feature.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    kata_config_api: Api<KataConfig>,
    resync_interval: Duration,
    ready: Arc<AtomicBool>,
}

impl Watcher {
    /// Creates a watcher that flips `ready` once the controller is running.
    pub fn new(
        reconciler: Arc<Reconciler>,
        kata_config_api: Api<KataConfig>,
        resync_interval: Duration,
        ready: Arc<AtomicBool>,
    ) -> Self {
        Self {
            reconciler,
            kata_config_api,
            resync_interval,
            ready,
        }
    }

    /// Runs until the process receives a shutdown signal.
    pub async fn watch_kata_configs(&self) -> Result<(), ControllerError> {
        info!("Starting KataConfig watcher");

        let context = Arc::new(Context {
            reconciler: self.reconciler.clone(),
            resync_interval: self.resync_interval,
        });

        // Passes mutate shared ConfigMaps, so never run two at once
        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(5))
            .concurrency(1);

        let controller = Controller::new(self.kata_config_api.clone(), watcher::Config::default())
            .with_config(controller_config)
            .shutdown_on_signal();

        self.ready.store(true, Ordering::Relaxed);

        controller
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled KataConfig {}", obj.name),
                    Err(e) => error!("KataConfig controller error: {}", e),
                }
            })
            .await;

        self.ready.store(false, Ordering::Relaxed);
        info!("KataConfig watcher stopped");
        Ok(())
    }
}
