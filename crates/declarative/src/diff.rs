//! Diff computation between recorded and desired attributes

use crate::planner::PlanEntry;
use crate::types::Action;
use crate::value::{Attributes, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Change of one attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub attribute: String,
    /// Recorded value; `None` when the attribute is new
    pub before: Option<Value>,
    /// Desired value; `None` when the attribute goes away
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Check if this change adds an attribute
    pub fn is_addition(&self) -> bool {
        self.before.is_none() && self.after.is_some()
    }

    /// Check if this change removes an attribute
    pub fn is_removal(&self) -> bool {
        self.before.is_some() && self.after.is_none()
    }

    /// Whether the new value depends on outputs not known until apply
    pub fn known_after_apply(&self) -> bool {
        self.after.as_ref().is_some_and(Value::has_references)
    }
}

/// Compute per-attribute changes
///
/// With no recorded state every desired attribute is an addition.
pub fn diff_attributes(
    recorded: Option<&Attributes>,
    desired: &Attributes,
) -> Vec<AttributeChange> {
    let empty = Attributes::new();
    let recorded = recorded.unwrap_or(&empty);

    let mut keys: Vec<&String> = recorded.keys().chain(desired.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter_map(|key| {
            let before = recorded.get(key);
            let after = desired.get(key);
            (before != after).then(|| AttributeChange {
                attribute: key.clone(),
                before: before.cloned(),
                after: after.cloned(),
            })
        })
        .collect()
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    /// Number of resources to create
    pub creates: usize,
    /// Number of resources to update in place
    pub updates: usize,
    /// Number of resources to delete
    pub deletes: usize,
    /// Number of resources already converged
    pub unchanged: usize,
}

impl DiffSummary {
    /// Create a summary from plan entries
    pub fn from_entries(entries: &[PlanEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            match entry.action {
                Action::Create => summary.creates += 1,
                Action::Update => summary.updates += 1,
                Action::Delete => summary.deletes += 1,
                Action::NoOp => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.deletes
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group plan entries by resource type
pub fn group_by_type(entries: &[PlanEntry]) -> BTreeMap<&str, Vec<&PlanEntry>> {
    let mut groups: BTreeMap<&str, Vec<&PlanEntry>> = BTreeMap::new();
    for entry in entries {
        groups
            .entry(entry.node.resource_type.as_str())
            .or_default()
            .push(entry);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;
    use crate::value::Reference;

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_diff_without_record_is_all_additions() {
        let desired = attrs(&[("sku", Value::from("basic")), ("tier", Value::from("hot"))]);
        let diff = diff_attributes(None, &desired);
        assert_eq!(diff.len(), 2);
        assert!(diff.iter().all(AttributeChange::is_addition));
    }

    #[test]
    fn test_diff_detects_change_and_removal() {
        let recorded = attrs(&[
            ("shared_key_access", Value::Bool(true)),
            ("legacy", Value::from("x")),
            ("sku", Value::from("basic")),
        ]);
        let desired = attrs(&[
            ("shared_key_access", Value::Bool(false)),
            ("sku", Value::from("basic")),
        ]);
        let diff = diff_attributes(Some(&recorded), &desired);

        assert_eq!(diff.len(), 2);
        assert_eq!(diff[0].attribute, "legacy");
        assert!(diff[0].is_removal());
        assert_eq!(diff[1].attribute, "shared_key_access");
        assert_eq!(diff[1].after, Some(Value::Bool(false)));
    }

    #[test]
    fn test_unresolved_reference_is_known_after_apply() {
        let reference = Value::Reference(Reference::new(NodeId::new("storage_account", "s"), "id"));
        let diff = diff_attributes(None, &attrs(&[("storage", reference)]));
        assert!(diff[0].known_after_apply());
    }

    #[test]
    fn test_summary_and_grouping() {
        let entries = vec![
            PlanEntry {
                node: NodeId::new("storage_account", "s"),
                action: Action::Create,
                diff: Vec::new(),
            },
            PlanEntry {
                node: NodeId::new("storage_account", "t"),
                action: Action::NoOp,
                diff: Vec::new(),
            },
            PlanEntry {
                node: NodeId::new("workspace", "w"),
                action: Action::Update,
                diff: Vec::new(),
            },
        ];
        let summary = DiffSummary::from_entries(&entries);
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.unchanged, 1);
        assert!(summary.has_changes());

        let groups = group_by_type(&entries);
        assert_eq!(groups["storage_account"].len(), 2);
        assert_eq!(groups["workspace"].len(), 1);
    }
}
