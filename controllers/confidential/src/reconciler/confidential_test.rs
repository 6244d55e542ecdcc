//! Unit tests for the confidential feature reconciler

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::feature_gates::FeatureGateState;
    use crate::metrics::Metrics;
    use crate::reconciler::confidential::{
        FeatureReconciler, CONFIDENTIAL_COMPUTE_ENABLED, DISABLECVM,
    };
    use crate::test_utils::*;
    use crds::ProgressCondition;
    use podvm_image::{
        CloudProvider, ImageError, ImageGenerator, ImageGeneratorSnapshot, MockConfigMapClient,
        MockImageGenerator, MockPreconfigurator, PreConfigOutcome, PreconfigPlan, Preconfigurator,
        ResourceError, PEER_PODS_CM_NAME,
    };
    use std::sync::{Arc, Mutex};

    /// Follows the real preconfiguration plan and records the image
    /// ConfigMap flag every time it runs.
    struct ObservingPreconfigurator {
        provider: CloudProvider,
        config_maps: MockConfigMapClient,
        seen: Mutex<Vec<Option<String>>>,
    }

    #[async_trait::async_trait]
    impl Preconfigurator for ObservingPreconfigurator {
        async fn run(&self) -> (PreConfigOutcome, Option<ImageError>) {
            let flag = self
                .config_maps
                .stored(&self.provider.image_config_map_name(), TEST_NAMESPACE)
                .and_then(|cm| cm.data.get(CONFIDENTIAL_COMPUTE_ENABLED).cloned());
            self.seen.lock().unwrap().push(flag);
            match PreconfigPlan::for_provider(self.provider) {
                PreconfigPlan::Unsupported => (PreConfigOutcome::UnsupportedProvider, None),
                PreconfigPlan::NothingToPrepare => (PreConfigOutcome::Succeeded, None),
                PreconfigPlan::RunJob => (PreConfigOutcome::RequeueNeeded, None),
            }
        }
    }

    const ENABLED: FeatureGateState = FeatureGateState::Enabled;
    const DISABLED: FeatureGateState = FeatureGateState::Disabled;

    fn snapshot(image_id_already_set: bool, valid_config_exists: bool) -> ImageGeneratorSnapshot {
        ImageGeneratorSnapshot {
            provider_supported: true,
            image_id_already_set,
            valid_config_exists,
        }
    }

    fn failing(outcome: PreConfigOutcome) -> Harness {
        Harness::with(
            CloudProvider::Aws,
            MockPreconfigurator::with_error(outcome, "preconfiguration error"),
        )
        .with_peer_pods_cm()
    }

    async fn run(harness: &Harness, state: FeatureGateState) -> Result<(), ControllerError> {
        harness
            .reconciler
            .reconcile_feature(state, &harness.conditions)
            .await
    }

    #[tokio::test]
    async fn test_enable_full_scenario() {
        let h = Harness::new(PreConfigOutcome::Succeeded).with_peer_pods_cm();

        run(&h, ENABLED).await.unwrap();

        assert_eq!(h.preconfigurator.calls(), 1);
        assert_eq!(h.generator.materialize_calls(), 1);
        assert_eq!(h.value(&h.image_cm_name(), CONFIDENTIAL_COMPUTE_ENABLED).as_deref(), Some("yes"));
        assert_eq!(h.value(PEER_PODS_CM_NAME, DISABLECVM).as_deref(), Some("false"));
        assert_eq!(h.conditions.reported(), vec![ProgressCondition::ImagePreConfigured]);
        assert_eq!(h.metrics.preconfig_count(PreConfigOutcome::Succeeded), 1);
    }

    #[tokio::test]
    async fn test_image_cm_flagged_in_first_pass_without_prerequisites() {
        let config_maps = MockConfigMapClient::new();
        let generator =
            MockImageGenerator::new(CloudProvider::Aws, TEST_NAMESPACE, config_maps.clone());
        let preconfigurator = Arc::new(ObservingPreconfigurator {
            provider: CloudProvider::Aws,
            config_maps: config_maps.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let reconciler = FeatureReconciler::new(
            Arc::new(generator.clone()),
            preconfigurator.clone(),
            Arc::new(config_maps.clone()),
            TEST_NAMESPACE,
            Arc::new(Metrics::new().unwrap()),
        );
        let conditions = RecordingConditionReporter::default();
        let image_cm = generator.config_resource_name();
        let flag = || {
            config_maps
                .stored(&image_cm, TEST_NAMESPACE)
                .and_then(|cm| cm.data.get(CONFIDENTIAL_COMPUTE_ENABLED).cloned())
        };

        // Nothing to prepare on aws, so the flag is written before any image build can read it
        reconciler.reconcile_feature(ENABLED, &conditions).await.unwrap();
        assert_eq!(flag().as_deref(), Some("yes"));

        reconciler.reconcile_feature(ENABLED, &conditions).await.unwrap();
        assert_eq!(
            *preconfigurator.seen.lock().unwrap(),
            vec![None, Some("yes".to_string())]
        );
        assert_eq!(flag().as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn test_enable_twice_is_idempotent() {
        let h = Harness::new(PreConfigOutcome::Succeeded).with_peer_pods_cm();

        run(&h, ENABLED).await.unwrap();
        let image_cm = h.config_maps.stored(&h.image_cm_name(), TEST_NAMESPACE);
        let peer_cm = h.config_maps.stored(PEER_PODS_CM_NAME, TEST_NAMESPACE);

        run(&h, ENABLED).await.unwrap();
        assert_eq!(h.config_maps.stored(&h.image_cm_name(), TEST_NAMESPACE), image_cm);
        assert_eq!(h.config_maps.stored(PEER_PODS_CM_NAME, TEST_NAMESPACE), peer_cm);
        assert_eq!(h.generator.initialize_calls(), 2);
    }

    #[tokio::test]
    async fn test_disable_without_peer_pods_cm_succeeds() {
        let h = Harness::new(PreConfigOutcome::Succeeded);

        run(&h, DISABLED).await.unwrap();
        assert!(h.config_maps.stored(PEER_PODS_CM_NAME, TEST_NAMESPACE).is_none());
    }

    #[tokio::test]
    async fn test_enable_without_peer_pods_cm_succeeds() {
        let h = Harness::new(PreConfigOutcome::Succeeded);

        run(&h, ENABLED).await.unwrap();
        assert!(h.config_maps.stored(PEER_PODS_CM_NAME, TEST_NAMESPACE).is_none());
        assert_eq!(h.value(&h.image_cm_name(), CONFIDENTIAL_COMPUTE_ENABLED).as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn test_disable_with_image_cm_absent_creates_nothing() {
        let h = Harness::new(PreConfigOutcome::Succeeded).with_peer_pods_cm();

        run(&h, DISABLED).await.unwrap();
        assert!(h.config_maps.creates().is_empty(), "Disabling must not create ConfigMaps");
        assert_eq!(h.generator.materialize_calls(), 0);
        assert!(h.config_maps.stored(&h.image_cm_name(), TEST_NAMESPACE).is_none());
        assert_eq!(h.value(PEER_PODS_CM_NAME, DISABLECVM).as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn test_disable_with_image_cm_present_sets_no() {
        let h = Harness::new(PreConfigOutcome::Succeeded)
            .with_peer_pods_cm()
            .with_image_cm();

        run(&h, DISABLED).await.unwrap();
        assert_eq!(h.value(&h.image_cm_name(), CONFIDENTIAL_COMPUTE_ENABLED).as_deref(), Some("no"));
        assert_eq!(h.value(PEER_PODS_CM_NAME, DISABLECVM).as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn test_unsupported_provider_skips_image_work() {
        let h = Harness::with(
            CloudProvider::Unsupported,
            MockPreconfigurator::new(PreConfigOutcome::Succeeded),
        )
        .with_peer_pods_cm();

        run(&h, ENABLED).await.unwrap();
        assert_eq!(h.preconfigurator.calls(), 0);
        assert_eq!(h.generator.materialize_calls(), 0);
        assert!(h.config_maps.creates().is_empty());
        assert!(h.config_maps.patches_for(&h.image_cm_name()).is_empty());
        assert_eq!(h.value(PEER_PODS_CM_NAME, DISABLECVM).as_deref(), Some("false"));
        assert!(h.conditions.reported().is_empty());
    }

    #[tokio::test]
    async fn test_image_id_already_set_leaves_image_cm_untouched() {
        let h = Harness::new(PreConfigOutcome::Succeeded)
            .with_snapshot(snapshot(true, false))
            .with_peer_pods_cm()
            .with_image_cm();

        run(&h, ENABLED).await.unwrap();
        assert_eq!(h.preconfigurator.calls(), 0);
        assert!(h.config_maps.patches_for(&h.image_cm_name()).is_empty());
        assert!(h.config_maps.creates().is_empty());
        assert_eq!(h.value(PEER_PODS_CM_NAME, DISABLECVM).as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn test_valid_config_skips_preconfiguration_only() {
        let h = Harness::new(PreConfigOutcome::Succeeded)
            .with_snapshot(snapshot(false, true))
            .with_peer_pods_cm()
            .with_image_cm();

        run(&h, ENABLED).await.unwrap();
        assert_eq!(h.preconfigurator.calls(), 0);
        assert_eq!(h.value(&h.image_cm_name(), CONFIDENTIAL_COMPUTE_ENABLED).as_deref(), Some("yes"));
        assert_eq!(h.value(PEER_PODS_CM_NAME, DISABLECVM).as_deref(), Some("false"));
        assert!(h.conditions.reported().is_empty());
    }

    #[tokio::test]
    async fn test_requeue_needed_without_error_stops_cleanly() {
        let h = Harness::new(PreConfigOutcome::RequeueNeeded).with_peer_pods_cm();

        run(&h, ENABLED).await.unwrap();
        assert_eq!(h.conditions.reported(), vec![ProgressCondition::PreConfiguring]);
        assert!(h.config_maps.creates().is_empty());
        assert!(h.config_maps.patches().is_empty(), "No ConfigMap should be patched while pending");
        assert_eq!(h.metrics.preconfig_count(PreConfigOutcome::RequeueNeeded), 1);
    }

    #[tokio::test]
    async fn test_requeue_needed_with_error_propagates() {
        let h = failing(PreConfigOutcome::RequeueNeeded);

        let result = run(&h, ENABLED).await;
        assert!(matches!(result, Err(ControllerError::Image(_))));
        assert!(h.config_maps.patches().is_empty());
    }

    #[tokio::test]
    async fn test_status_unknown_stops() {
        let h = Harness::new(PreConfigOutcome::StatusUnknown).with_peer_pods_cm();
        run(&h, ENABLED).await.unwrap();
        assert_eq!(h.conditions.reported(), vec![ProgressCondition::PreConfigurationUnknown]);
        assert!(h.config_maps.patches().is_empty());

        let h = failing(PreConfigOutcome::StatusUnknown);
        assert!(matches!(run(&h, ENABLED).await, Err(ControllerError::Image(_))));
        assert!(h.config_maps.patches().is_empty());
    }

    #[tokio::test]
    async fn test_image_creation_failed_without_error_continues() {
        let h = Harness::new(PreConfigOutcome::ImageCreationFailed).with_peer_pods_cm();

        run(&h, ENABLED).await.unwrap();
        assert_eq!(h.conditions.reported(), vec![ProgressCondition::ImageCreationFailed]);
        assert_eq!(h.value(&h.image_cm_name(), CONFIDENTIAL_COMPUTE_ENABLED).as_deref(), Some("yes"));
        assert_eq!(h.value(PEER_PODS_CM_NAME, DISABLECVM).as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn test_image_creation_failed_with_error_stops() {
        let h = failing(PreConfigOutcome::ImageCreationFailed);

        let result = run(&h, ENABLED).await;
        assert!(matches!(result, Err(ControllerError::Image(_))));
        assert_eq!(h.conditions.reported(), vec![ProgressCondition::ImageCreationFailed]);
        assert!(h.config_maps.patches().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_provider_outcome_continues() {
        let h = Harness::new(PreConfigOutcome::UnsupportedProvider).with_peer_pods_cm();

        run(&h, ENABLED).await.unwrap();
        assert_eq!(h.conditions.reported(), vec![ProgressCondition::ConfigUnsupportedProvider]);
        assert_eq!(h.value(PEER_PODS_CM_NAME, DISABLECVM).as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn test_other_outcome_continues_without_condition() {
        let h = Harness::new(PreConfigOutcome::Other).with_peer_pods_cm();

        run(&h, ENABLED).await.unwrap();
        assert!(h.conditions.reported().is_empty());
        assert_eq!(h.value(&h.image_cm_name(), CONFIDENTIAL_COMPUTE_ENABLED).as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn test_continuing_outcomes_ignore_attached_error() {
        for outcome in [
            PreConfigOutcome::Succeeded,
            PreConfigOutcome::UnsupportedProvider,
            PreConfigOutcome::Other,
        ] {
            let h = failing(outcome);
            run(&h, ENABLED).await.unwrap();
            assert_eq!(h.value(PEER_PODS_CM_NAME, DISABLECVM).as_deref(), Some("false"), "{}", outcome);
        }
    }

    #[tokio::test]
    async fn test_image_cm_patch_failure_is_fatal() {
        let h = Harness::new(PreConfigOutcome::Succeeded).with_peer_pods_cm();
        h.config_maps.fail_patch(&h.image_cm_name(), "quota exceeded");

        let result = run(&h, ENABLED).await;
        assert!(matches!(result, Err(ControllerError::Resource(ResourceError::Rejected(_)))));
        assert!(h.config_maps.patches_for(PEER_PODS_CM_NAME).is_empty());
    }

    #[tokio::test]
    async fn test_peer_pods_cm_patch_failure_is_fatal() {
        for state in [ENABLED, DISABLED] {
            let h = Harness::new(PreConfigOutcome::Succeeded).with_peer_pods_cm();
            h.config_maps.fail_patch(PEER_PODS_CM_NAME, "admission webhook denied");

            let result = run(&h, state).await;
            assert!(
                matches!(result, Err(ControllerError::Resource(ResourceError::Rejected(_)))),
                "{}",
                state
            );
        }
    }
}
