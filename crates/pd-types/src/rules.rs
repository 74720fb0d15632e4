//! Placement rules and the isolation-score calculation the replica/rule
//! checker uses to pick repair targets (spec.md §4.F, §4.F.1).

use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelConstraintOp {
    In,
    NotIn,
    Exists,
    NotExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelConstraint {
    pub key: String,
    pub op: LabelConstraintOp,
    pub values: Vec<String>,
}

impl LabelConstraint {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self.op {
            LabelConstraintOp::Exists => labels.contains_key(&self.key),
            LabelConstraintOp::NotExists => !labels.contains_key(&self.key),
            LabelConstraintOp::In => labels.get(&self.key).map(|v| self.values.contains(v)).unwrap_or(false),
            LabelConstraintOp::NotIn => labels.get(&self.key).map(|v| !self.values.contains(v)).unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RulePeerRole {
    Voter,
    Leader,
    Follower,
    Learner,
}

/// One placement rule (spec.md §6 `rules/<hex(group)>-<hex(id)>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub group_id: String,
    pub id: String,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub role: RulePeerRole,
    pub count: u32,
    pub label_constraints: Vec<LabelConstraint>,
    pub location_labels: Vec<String>,
    pub isolation_level: String,
}

impl Rule {
    pub fn covers(&self, start_key: &[u8], end_key: &[u8]) -> bool {
        self.start_key.as_slice() <= start_key
            && (self.end_key.is_empty() || (!end_key.is_empty() && self.end_key.as_slice() >= end_key))
    }

    pub fn store_satisfies(&self, labels: &BTreeMap<String, String>) -> bool {
        self.label_constraints.iter().all(|c| c.matches(labels))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub index: i32,
    pub overridden: bool,
}

/// The isolation score of `candidate` against the stores already hosting a
/// region's peers, per spec.md §4.F.1: `100^(k-i)` for the outermost
/// differing label index `i`, summed over every existing peer store, with
/// `location_labels` ordered outermost-first (e.g. `[zone, rack, host]`).
pub fn isolation_score(location_labels: &[String], candidate: &Store, existing: &[&Store]) -> f64 {
    existing
        .iter()
        .map(|other| distinct_score(location_labels, candidate, other))
        .sum()
}

fn distinct_score(location_labels: &[String], a: &Store, b: &Store) -> f64 {
    let k = location_labels.len();
    for (i, label) in location_labels.iter().enumerate() {
        if a.label(label) != b.label(label) {
            return 100f64.powi((k - i) as i32);
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::StoreId;

    fn store_with(id: u64, pairs: &[(&str, &str)]) -> Store {
        let mut s = Store::new(StoreId::new(id), format!("127.0.0.1:{id}"));
        for (k, v) in pairs {
            s.labels.insert(k.to_string(), v.to_string());
        }
        s
    }

    #[test]
    fn distinct_score_rewards_outermost_difference() {
        let labels = vec!["zone".to_string(), "rack".to_string(), "host".to_string()];
        let a = store_with(1, &[("zone", "z1"), ("rack", "r1"), ("host", "h1")]);
        let b_same_zone = store_with(2, &[("zone", "z1"), ("rack", "r2"), ("host", "h2")]);
        let b_diff_zone = store_with(3, &[("zone", "z2"), ("rack", "r1"), ("host", "h1")]);

        let same_zone_score = distinct_score(&labels, &a, &b_same_zone);
        let diff_zone_score = distinct_score(&labels, &a, &b_diff_zone);
        assert!(diff_zone_score > same_zone_score);
    }

    #[test]
    fn identical_labels_score_zero() {
        let labels = vec!["zone".to_string()];
        let a = store_with(1, &[("zone", "z1")]);
        let b = store_with(2, &[("zone", "z1")]);
        assert_eq!(distinct_score(&labels, &a, &b), 0.0);
    }

    #[test]
    fn label_constraint_not_in_passes_when_label_absent() {
        let c = LabelConstraint { key: "dc".into(), op: LabelConstraintOp::NotIn, values: vec!["dc1".into()] };
        assert!(c.matches(&BTreeMap::new()));
    }
}
