//! Controller configuration.
//!
//! Read once at start-up from environment variables.

use crate::error::ControllerError;
use podvm_image::CloudProvider;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Namespace the sandboxed containers operator runs in
pub const DEFAULT_NAMESPACE: &str = "openshift-sandboxed-containers-operator";
const DEFAULT_TEMPLATE_DIR: &str = "/config/peerpods";
const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8081";
const DEFAULT_RESYNC_SECONDS: u64 = 60;

/// Runtime configuration for the confidential controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace holding the feature gate, peer pods and image ConfigMaps
    pub namespace: String,
    /// Directory with ConfigMap and Job templates
    pub template_dir: PathBuf,
    /// Skip node based provider detection when set
    pub cloud_provider: Option<CloudProvider>,
    /// Listen address for /healthz, /readyz and /metrics
    pub probe_addr: SocketAddr,
    /// Requeue interval after a successful reconciliation
    pub resync_interval: Duration,
}

impl ControllerConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let namespace = get("OPERATOR_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let template_dir = PathBuf::from(
            get("PODVM_TEMPLATE_DIR").unwrap_or_else(|| DEFAULT_TEMPLATE_DIR.to_string()),
        );

        let cloud_provider = get("CLOUD_PROVIDER")
            .map(|raw| {
                raw.parse::<CloudProvider>().map_err(|e| {
                    ControllerError::InvalidConfig(format!("CLOUD_PROVIDER: {}", e))
                })
            })
            .transpose()?;

        let probe_addr_raw = get("PROBE_ADDR").unwrap_or_else(|| DEFAULT_PROBE_ADDR.to_string());
        let probe_addr = probe_addr_raw.parse::<SocketAddr>().map_err(|e| {
            ControllerError::InvalidConfig(format!("PROBE_ADDR '{}': {}", probe_addr_raw, e))
        })?;

        let resync_seconds = match get("RESYNC_INTERVAL_SECONDS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                ControllerError::InvalidConfig(format!("RESYNC_INTERVAL_SECONDS '{}': {}", raw, e))
            })?,
            None => DEFAULT_RESYNC_SECONDS,
        };
        if resync_seconds == 0 {
            return Err(ControllerError::InvalidConfig(
                "RESYNC_INTERVAL_SECONDS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            namespace,
            template_dir,
            cloud_provider,
            probe_addr,
            resync_interval: Duration::from_secs(resync_seconds),
        })
    }
}
