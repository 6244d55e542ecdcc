//! Helper functions for common reconciliation patterns
//!
//! Shared by the feature reconciler and the condition reporter.

use crds::KataConfigCondition;
use podvm_image::{ConfigMapClientTrait, ResourceError};
use std::collections::BTreeMap;
use tracing::debug;

/// Inserts or replaces the condition with the same type.
///
/// Returns `false` when an equal condition is already present, so callers
/// can skip the status write. The transition time of an unchanged condition
/// is kept.
pub fn upsert_condition(
    conditions: &mut Vec<KataConfigCondition>,
    condition: KataConfigCondition,
) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) if existing.same_state(&condition) => false,
        Some(existing) => {
            *existing = condition;
            true
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}

/// Merge-patches `data` into a ConfigMap that may not exist.
///
/// Returns `Ok(false)` when the ConfigMap is absent. Other errors propagate.
pub async fn patch_if_exists(
    config_maps: &dyn ConfigMapClientTrait,
    name: &str,
    namespace: &str,
    data: &BTreeMap<String, String>,
) -> Result<bool, ResourceError> {
    match config_maps.patch(name, namespace, data).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => {
            debug!("ConfigMap {}/{} not found, skipping patch", namespace, name);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Single-entry ConfigMap data
pub fn single_entry(key: &str, value: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(key.to_string(), value.to_string())])
}
