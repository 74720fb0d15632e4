//! Persisted cluster configuration (spec.md §6 "Tunable runtime options"),
//! the explicit enumerated options record called for in spec.md §9 in place
//! of reflection-based option setters: unknown keys in a patch fail the
//! update rather than being silently absorbed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single `label-properties` entry, notably the `reject-leader` property
/// used to keep leaders off stores carrying a given label value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPropertyEntry {
    pub label_key: String,
    pub label_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LabelProperties {
    #[serde(default)]
    pub reject_leader: Vec<LabelPropertyEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PdConfig {
    pub max_replicas: u32,
    pub max_snapshot_count: u32,
    pub max_pending_peer_count: u32,
    pub max_store_down_time_secs: u64,

    pub leader_schedule_limit: u32,
    pub region_schedule_limit: u32,
    pub merge_schedule_limit: u32,
    pub replica_schedule_limit: u32,

    pub max_merge_region_size: u64,
    pub max_merge_region_keys: u64,
    pub split_merge_interval_secs: u64,

    pub tolerant_size_ratio: f64,
    pub low_space_ratio: f64,
    pub high_space_ratio: f64,

    pub enable_one_way_merge: bool,
    pub enable_two_way_merge: bool,
    pub enable_placement_rules: bool,
    pub enable_remove_down_replica: bool,
    pub enable_replace_offline_replica: bool,
    pub enable_make_up_replica: bool,
    pub enable_remove_extra_replica: bool,
    pub enable_location_replacement: bool,

    pub location_labels: Vec<String>,
    pub isolation_level: String,
    pub label_properties: LabelProperties,
}

impl Default for PdConfig {
    fn default() -> Self {
        Self {
            max_replicas: 3,
            max_snapshot_count: 3,
            max_pending_peer_count: 16,
            max_store_down_time_secs: 30 * 60,

            leader_schedule_limit: 4,
            region_schedule_limit: 2048,
            merge_schedule_limit: 8,
            replica_schedule_limit: 64,

            max_merge_region_size: 20 * 1024 * 1024,
            max_merge_region_keys: 200_000,
            split_merge_interval_secs: 60 * 60,

            tolerant_size_ratio: 0.0,
            low_space_ratio: 0.8,
            high_space_ratio: 0.7,

            enable_one_way_merge: false,
            enable_two_way_merge: true,
            enable_placement_rules: false,
            enable_remove_down_replica: true,
            enable_replace_offline_replica: true,
            enable_make_up_replica: true,
            enable_remove_extra_replica: true,
            enable_location_replacement: true,

            location_labels: Vec::new(),
            isolation_level: String::new(),
            label_properties: LabelProperties::default(),
        }
    }
}

impl PdConfig {
    /// Applies a JSON patch keyed by the same kebab-case field names the
    /// config is serialized with. Unknown keys are rejected rather than
    /// silently ignored, per spec.md §9's "explicit enumerated options
    /// record" decision in place of reflection-based setters.
    pub fn apply_patch(&self, patch: &BTreeMap<String, serde_json::Value>) -> crate::Result<Self> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| crate::error::PdError::InvalidConfig(e.to_string()))?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| crate::error::PdError::InvalidConfig("config is not an object".into()))?;

        for (key, patched_value) in patch {
            if !object.contains_key(key) {
                return Err(crate::error::PdError::InvalidConfig(format!("unknown config key: {key}")));
            }
            object.insert(key.clone(), patched_value.clone());
        }

        serde_json::from_value(value).map_err(|e| crate::error::PdError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_rejects_unknown_key() {
        let cfg = PdConfig::default();
        let mut patch = BTreeMap::new();
        patch.insert("not-a-real-field".to_string(), json!(true));
        assert!(cfg.apply_patch(&patch).is_err());
    }

    #[test]
    fn patch_updates_known_field() {
        let cfg = PdConfig::default();
        let mut patch = BTreeMap::new();
        patch.insert("max-replicas".to_string(), json!(5));
        let patched = cfg.apply_patch(&patch).expect("valid patch");
        assert_eq!(patched.max_replicas, 5);
        assert_eq!(patched.max_snapshot_count, cfg.max_snapshot_count);
    }
}
