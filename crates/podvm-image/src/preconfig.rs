//! Pod VM image preconfiguration
//!
//! Preconfiguration prepares what a provider needs before an image build
//! can be configured at all. For libvirt that is the storage pool and
//! volume the image is uploaded to; a Job creates them and records
//! `LIBVIRT_URI`, `LIBVIRT_POOL` and `LIBVIRT_VOL_NAME` in the image
//! ConfigMap. Cloud providers need nothing and succeed immediately.
//!
//! Preconfiguration never starts the image build. The build reads the image
//! ConfigMap, which the reconciler flags only after preconfiguration has
//! let the pass continue. Each `run()` advances the Job by at most one step
//! (create it, or read its status).

use crate::error::{ImageError, ResourceError};
use crate::generator::ImageGenerator;
use crate::provider::CloudProvider;
use crate::template;
use k8s_openapi::api::batch::v1::Job;
use kube::api::PostParams;
use kube::{Api, Client};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the provider prerequisite Job
pub const PRECONFIG_JOB_NAME: &str = "osc-podvm-preconfig";

/// Label naming the provider a prerequisite Job was created for
pub const PROVIDER_LABEL: &str = "podvm.openshift.io/provider";

/// Result of one preconfiguration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreConfigOutcome {
    /// Prerequisites are in place
    Succeeded,
    /// The provider has no pod VM image support
    UnsupportedProvider,
    /// Work is in progress; ask again later
    RequeueNeeded,
    /// Prerequisites could not be prepared, so no image can be built
    ImageCreationFailed,
    /// Progress could not be read
    StatusUnknown,
    /// Anything the reconciler has no specific handling for
    Other,
}

impl PreConfigOutcome {
    /// Stable label value for metrics and logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::UnsupportedProvider => "unsupported_provider",
            Self::RequeueNeeded => "requeue_needed",
            Self::ImageCreationFailed => "image_creation_failed",
            Self::StatusUnknown => "status_unknown",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for PreConfigOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for the preconfiguration subsystem
///
/// Returns the outcome together with an optional error. An outcome may
/// carry an error (e.g. `StatusUnknown` because the status read failed) or
/// none (e.g. `ImageCreationFailed` already recorded by the Job itself).
#[async_trait::async_trait]
pub trait Preconfigurator: Send + Sync {
    /// Advances preconfiguration by at most one step.
    async fn run(&self) -> (PreConfigOutcome, Option<ImageError>);
}

/// What preconfiguration has to do for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconfigPlan {
    /// No pod VM image support
    Unsupported,
    /// No prerequisites; the image ConfigMap can be configured right away
    NothingToPrepare,
    /// Run the prerequisite Job
    RunJob,
}

impl PreconfigPlan {
    /// Plan for `provider`.
    pub fn for_provider(provider: CloudProvider) -> Self {
        if !provider.is_supported() {
            Self::Unsupported
        } else if provider.required_config_keys().is_empty() {
            Self::NothingToPrepare
        } else {
            Self::RunJob
        }
    }
}

/// Turns a Job template into the prerequisite Job for `provider`.
pub fn prerequisite_job(mut job: Job, provider: CloudProvider) -> Job {
    job.metadata.name = Some(PRECONFIG_JOB_NAME.to_string());
    job.metadata.namespace = None;
    job.metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(PROVIDER_LABEL.to_string(), provider.to_string());
    job
}

/// Classifies a prerequisite Job by its status.
pub fn classify_job(job: &Job) -> PreConfigOutcome {
    if job.spec.as_ref().and_then(|s| s.suspend) == Some(true) {
        return PreConfigOutcome::Other;
    }
    let Some(status) = job.status.as_ref() else {
        return PreConfigOutcome::RequeueNeeded;
    };

    let condition_true = |type_: &str| {
        status
            .conditions
            .as_ref()
            .is_some_and(|cs| cs.iter().any(|c| c.type_ == type_ && c.status == "True"))
    };

    if condition_true("Failed") {
        PreConfigOutcome::ImageCreationFailed
    } else if condition_true("Complete") || status.succeeded.unwrap_or(0) > 0 {
        PreConfigOutcome::Succeeded
    } else {
        PreConfigOutcome::RequeueNeeded
    }
}

/// Preconfiguration through the provider prerequisite Job.
pub struct JobPreconfigurator {
    jobs: Api<Job>,
    generator: Arc<dyn ImageGenerator>,
    template_dir: PathBuf,
}

impl JobPreconfigurator {
    /// Creates a preconfigurator running its Job in `namespace`.
    pub fn new(
        client: Client,
        namespace: &str,
        generator: Arc<dyn ImageGenerator>,
        template_dir: PathBuf,
    ) -> Self {
        Self {
            jobs: Api::namespaced(client, namespace),
            generator,
            template_dir,
        }
    }

    fn job_template_path(&self) -> PathBuf {
        self.template_dir.join(format!("{}-job.yaml", PRECONFIG_JOB_NAME))
    }

    async fn start_job(&self, provider: CloudProvider) -> (PreConfigOutcome, Option<ImageError>) {
        let path = self.job_template_path();
        let job = match template::load_optional::<Job>(&path).await {
            Ok(Some(job)) => prerequisite_job(job, provider),
            Ok(None) => {
                let err = ImageError::Template {
                    path: path.display().to_string(),
                    reason: "preconfiguration job template is missing".to_string(),
                };
                return (PreConfigOutcome::ImageCreationFailed, Some(err));
            }
            Err(e) => return (PreConfigOutcome::ImageCreationFailed, Some(e)),
        };

        match self.jobs.create(&PostParams::default(), &job).await {
            Ok(_) => {
                info!("Started {} preconfiguration job {}", provider, PRECONFIG_JOB_NAME);
                (PreConfigOutcome::RequeueNeeded, None)
            }
            Err(e) => match ResourceError::from_kube(e, PRECONFIG_JOB_NAME) {
                // Created by a concurrent pass; its status is read next time
                ResourceError::AlreadyExists(_) => (PreConfigOutcome::RequeueNeeded, None),
                other => (PreConfigOutcome::StatusUnknown, Some(other.into())),
            },
        }
    }
}

#[async_trait::async_trait]
impl Preconfigurator for JobPreconfigurator {
    async fn run(&self) -> (PreConfigOutcome, Option<ImageError>) {
        let provider = self.generator.provider();
        match PreconfigPlan::for_provider(provider) {
            PreconfigPlan::Unsupported => return (PreConfigOutcome::UnsupportedProvider, None),
            PreconfigPlan::NothingToPrepare => {
                debug!("Provider {} has no preconfiguration prerequisites", provider);
                return (PreConfigOutcome::Succeeded, None);
            }
            PreconfigPlan::RunJob => {}
        }

        match self.jobs.get_opt(PRECONFIG_JOB_NAME).await {
            Ok(Some(job)) => {
                let outcome = classify_job(&job);
                debug!("Preconfiguration job status: {}", outcome);
                if outcome == PreConfigOutcome::ImageCreationFailed {
                    warn!("Preconfiguration job {} failed, see its pod logs", PRECONFIG_JOB_NAME);
                }
                (outcome, None)
            }
            Ok(None) => self.start_job(provider).await,
            Err(e) => (
                PreConfigOutcome::StatusUnknown,
                Some(ResourceError::from_kube(e, PRECONFIG_JOB_NAME).into()),
            ),
        }
    }
}
