//! Persisted key layout for the embedded KV store (spec.md §6). Prefix
//! order matters: numeric ids are fixed-width zero-padded decimal so
//! lexical order matches numeric order for range scans.

use crate::ids::{PeerId, RegionId, StoreId};

/// Width chosen so a `u64` id never overflows the zero-padded field.
const ID_WIDTH: usize = 20;

pub fn store_key(id: StoreId) -> String {
    format!("raft/s/{:0width$}", id.get(), width = ID_WIDTH)
}

pub fn region_key(id: RegionId) -> String {
    format!("raft/r/{:0width$}", id.get(), width = ID_WIDTH)
}

pub fn status_key(option: &str) -> String {
    format!("raft/status/{option}")
}

pub fn store_leader_weight_key(id: StoreId) -> String {
    format!("schedule/store_weight/{:0width$}/leader", id.get(), width = ID_WIDTH)
}

pub fn store_region_weight_key(id: StoreId) -> String {
    format!("schedule/store_weight/{:0width$}/region", id.get(), width = ID_WIDTH)
}

pub const CONFIG_KEY: &str = "config";

pub fn scheduler_config_key(name: &str) -> String {
    format!("scheduler_config/{name}")
}

pub fn rule_key(group: &str, id: &str) -> String {
    format!("rules/{}-{}", hex::encode(group), hex::encode(id))
}

pub fn rule_group_key(id: &str) -> String {
    format!("rule_group/{id}")
}

pub fn replication_mode_key(mode: &str) -> String {
    format!("replication_mode/{mode}")
}

pub fn component_key(name: &str) -> String {
    format!("component/{name}")
}

pub fn namespace_key(name: &str) -> String {
    format!("namespace/{name}")
}

pub const GC_SAFE_POINT_KEY: &str = "gc/safe_point";

pub fn gc_service_safe_point_key(service_id: &str) -> String {
    format!("gc/safe_point/service/{service_id}")
}

pub const TSO_TIMESTAMP_KEY: &str = "tso/timestamp";

/// `raft/meta/next_id`, the monotonic counter region and peer ids are
/// allocated from in batches of 1000.
pub const NEXT_ID_KEY: &str = "raft/meta/next_id";

pub fn encode_gc_safe_point(watermark: u64) -> String {
    format!("{watermark:016x}")
}

pub fn decode_gc_safe_point(s: &str) -> Option<u64> {
    u64::from_str_radix(s, 16).ok()
}

/// Formats a raw region/peer id for display in the `raft/meta/next_id`
/// range; not persisted, just a shared helper for log lines.
pub fn display_peer_id(id: PeerId) -> String {
    id.get().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_keys_sort_lexically_in_numeric_order() {
        let a = store_key(StoreId::new(2));
        let b = store_key(StoreId::new(10));
        assert!(a < b, "zero-padded keys must sort numerically: {a} vs {b}");
    }

    #[test]
    fn gc_safe_point_round_trips() {
        let encoded = encode_gc_safe_point(0xdead_beef);
        assert_eq!(decode_gc_safe_point(&encoded), Some(0xdead_beef));
    }

    #[test]
    fn rule_key_hex_encodes_components() {
        let key = rule_key("default", "rule-1");
        assert!(key.starts_with("rules/"));
        assert!(key.contains('-'));
    }
}
