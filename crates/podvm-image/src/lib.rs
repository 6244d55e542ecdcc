//! Pod VM image support for confidential peer pods
//!
//! Collaborators used by the confidential feature reconciler:
//!
//! - **ConfigMap access** (`ConfigMapClientTrait`): read, create and merge-patch
//!   ConfigMaps, with a distinguishable `NotFound` error kind.
//! - **Image generator** (`ImageGenerator`): cloud provider detection and the
//!   readiness questions asked before image configuration is touched.
//! - **Preconfiguration** (`Preconfigurator`): prepares provider prerequisites
//!   (a Job for libvirt storage) and reports a `PreConfigOutcome`.
//!
//! # Example
//!
//! ```no_run
//! use podvm_image::{
//!     GeneratorSettings, ImageGenerator, KubeConfigMapClient, NodeProviderDetector,
//!     PodVmImageGenerator,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let generator = PodVmImageGenerator::new(
//!     Arc::new(KubeConfigMapClient::new(client.clone(), "confidential-controller")),
//!     Arc::new(NodeProviderDetector::new(client)),
//!     GeneratorSettings {
//!         namespace: "openshift-sandboxed-containers-operator".to_string(),
//!         template_dir: "/config/peerpods".into(),
//!     },
//! );
//! generator.initialize().await?;
//! let snapshot = generator.snapshot().await?;
//! println!("image already assigned: {}", snapshot.image_id_already_set);
//! # Ok(())
//! # }
//! ```

pub mod config_map;
pub mod error;
pub mod generator;
pub mod preconfig;
pub mod provider;
pub mod template;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use config_map::{get_optional, ConfigMapClientTrait, ConfigResource, KubeConfigMapClient};
pub use error::{ImageError, ResourceError};
pub use generator::{
    GeneratorSettings, ImageGenerator, ImageGeneratorSnapshot, PodVmImageGenerator, PEER_PODS_CM_NAME,
};
pub use preconfig::{
    classify_job, prerequisite_job, JobPreconfigurator, PreConfigOutcome, PreconfigPlan, Preconfigurator,
    PRECONFIG_JOB_NAME, PROVIDER_LABEL,
};
pub use provider::{CloudProvider, NodeProviderDetector, ProviderDetector};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockConfigMapClient, MockImageGenerator, MockPreconfigurator, PatchCall};
