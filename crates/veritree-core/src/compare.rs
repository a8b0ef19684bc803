//! Structural diff of two hierarchy trees, keyed by instance identity.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use veritree_contracts::{MISSING_MARKER, TOP_LEVEL_FILE_MARKER};

use crate::hier::HierarchyNode;

/// Malformed comparator input (a tree JSON missing required fields).
#[derive(Debug)]
pub struct CompareError {
    pub message: String,
}

impl CompareError {
    pub fn new(msg: impl Into<String>) -> Self {
        CompareError {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for CompareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompareError {}

/// What one side of a mismatch looked like. Ports keep their original,
/// unnormalized order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    #[serde(rename = "Module_name")]
    pub module_name: String,
    #[serde(rename = "Instance_name")]
    pub instance_name: String,
    #[serde(rename = "Port")]
    pub ports: Vec<String>,
}

impl NodeSummary {
    fn of(node: &HierarchyNode) -> NodeSummary {
        NodeSummary {
            module_name: node.module_name.clone(),
            instance_name: node.instance_name.clone(),
            ports: node.ports.clone(),
        }
    }
}

/// One side of a diff record: a node summary, or absent entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffSide {
    Present(NodeSummary),
    Missing,
}

impl DiffSide {
    pub fn is_missing(&self) -> bool {
        matches!(self, DiffSide::Missing)
    }
}

// On the wire a side is either a summary object or the literal "missing".
#[derive(Deserialize)]
#[serde(untagged)]
enum DiffSideRepr {
    Present(NodeSummary),
    Marker(String),
}

impl Serialize for DiffSide {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DiffSide::Present(summary) => summary.serialize(serializer),
            DiffSide::Missing => MISSING_MARKER.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DiffSide {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match DiffSideRepr::deserialize(deserializer)? {
            DiffSideRepr::Present(summary) => Ok(DiffSide::Present(summary)),
            DiffSideRepr::Marker(m) if m == MISSING_MARKER => Ok(DiffSide::Missing),
            DiffSideRepr::Marker(m) => Err(serde::de::Error::custom(format!(
                "unknown diff side marker: {m:?}"
            ))),
        }
    }
}

/// One reported structural mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub file: String,
    pub expected: DiffSide,
    pub actual: DiffSide,
}

/// The on-disk diff artifact shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    #[serde(rename = "Diff_Arch")]
    pub records: Vec<DiffRecord>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_json_pretty(&self) -> String {
        let mut s = serde_json::to_string_pretty(self).unwrap_or_default();
        s.push('\n');
        s
    }
}

/// A diff report plus anomaly warnings that accompany it without being part
/// of the artifact.
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    pub report: DiffReport,
    pub warnings: Vec<String>,
}

/// Diffs `expected` against `actual` over the whole tree in one pass, with
/// no early exit on first mismatch.
pub fn compare(expected: &HierarchyNode, actual: &HierarchyNode) -> Comparison {
    let mut cmp = Comparison::default();
    diff_nodes(expected, actual, None, &mut cmp);
    cmp
}

/// Loads both trees from JSON files and compares. Malformed tree JSON is a
/// [`CompareError`].
pub fn compare_files(expected: &Path, actual: &Path) -> Result<Comparison, CompareError> {
    let expected = HierarchyNode::load(expected).map_err(|e| CompareError::new(e.to_string()))?;
    let actual = HierarchyNode::load(actual).map_err(|e| CompareError::new(e.to_string()))?;
    Ok(compare(&expected, &actual))
}

/// Whitespace-stripped, sorted copy of a port list; used for comparison
/// only. Duplicates are kept (multiset semantics).
fn normalized_ports(ports: &[String]) -> Vec<String> {
    let mut out: Vec<String> = ports
        .iter()
        .map(|p| p.chars().filter(|c| !c.is_whitespace()).collect())
        .collect();
    out.sort();
    out
}

fn diff_nodes(
    expected: &HierarchyNode,
    actual: &HierarchyNode,
    parent_file: Option<&str>,
    cmp: &mut Comparison,
) {
    // The resolved file: the actual node's own, else inherited, else the
    // root marker.
    let resolved: String = if !actual.file_path.is_empty() {
        actual.file_path.clone()
    } else {
        parent_file
            .unwrap_or(TOP_LEVEL_FILE_MARKER)
            .to_string()
    };

    if expected.module_name != actual.module_name
        || normalized_ports(&expected.ports) != normalized_ports(&actual.ports)
    {
        cmp.report.records.push(DiffRecord {
            file: resolved.clone(),
            expected: DiffSide::Present(NodeSummary::of(expected)),
            actual: DiffSide::Present(NodeSummary::of(actual)),
        });
    }

    let expected_children = child_map(expected, "expected", &mut cmp.warnings);
    let actual_children = child_map(actual, "actual", &mut cmp.warnings);

    let keys: BTreeSet<&str> = expected_children
        .keys()
        .chain(actual_children.keys())
        .copied()
        .collect();

    for key in keys {
        match (expected_children.get(key), actual_children.get(key)) {
            (Some(e), Some(a)) => diff_nodes(e, a, Some(&resolved), cmp),
            (Some(e), None) => cmp.report.records.push(DiffRecord {
                file: resolved.clone(),
                expected: DiffSide::Present(NodeSummary::of(e)),
                actual: DiffSide::Missing,
            }),
            (None, Some(a)) => {
                let file = if a.file_path.is_empty() {
                    resolved.clone()
                } else {
                    a.file_path.clone()
                };
                cmp.report.records.push(DiffRecord {
                    file,
                    expected: DiffSide::Missing,
                    actual: DiffSide::Present(NodeSummary::of(a)),
                });
            }
            (None, None) => unreachable!("key came from one of the maps"),
        }
    }
}

/// Children keyed by instance name, last writer wins on collision.
fn child_map<'a>(
    node: &'a HierarchyNode,
    side: &str,
    warnings: &mut Vec<String>,
) -> BTreeMap<&'a str, &'a HierarchyNode> {
    let mut map: BTreeMap<&str, &HierarchyNode> = BTreeMap::new();
    for child in &node.instances {
        if map.insert(child.instance_name.as_str(), child).is_some() {
            warnings.push(format!(
                "{side}: duplicate instance name {:?} under {} ({}); keeping the last occurrence",
                child.instance_name, node.instance_name, node.module_name
            ));
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(module: &str, instance: &str, ports: &[&str]) -> HierarchyNode {
        let mut n = HierarchyNode::new(module, instance);
        n.ports = ports.iter().map(|p| p.to_string()).collect();
        n
    }

    #[test]
    fn identical_trees_yield_empty_report() {
        let mut top = node("ChipTop", "Top", &["clk", "rst_n"]);
        top.instances.push(node("ModA", "U1", &["p1 : sig_a"]));
        let cmp = compare(&top, &top.clone());
        assert!(cmp.report.is_empty());
        assert!(cmp.warnings.is_empty());
    }

    #[test]
    fn port_comparison_ignores_whitespace_and_order() {
        let expected = node("M", "Top", &["a : x", "b : y"]);
        let actual = node("M", "Top", &["b:y", "a:x"]);
        assert!(compare(&expected, &actual).report.is_empty());
    }

    #[test]
    fn duplicate_ports_are_a_multiset_not_a_set() {
        let expected = node("M", "Top", &["a", "a"]);
        let actual = node("M", "Top", &["a"]);
        assert_eq!(compare(&expected, &actual).report.records.len(), 1);
    }

    #[test]
    fn module_name_mismatch_reported_even_with_matching_ports() {
        let expected = node("ModA", "Top", &["p"]);
        let actual = node("ModB", "Top", &["p"]);
        let report = compare(&expected, &actual).report;
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].file, "Top Level");
    }

    #[test]
    fn port_mismatch_reported_even_with_matching_module_name() {
        let expected = node("ModA", "Top", &["p1"]);
        let actual = node("ModA", "Top", &["p2"]);
        assert_eq!(compare(&expected, &actual).report.records.len(), 1);
    }

    #[test]
    fn instance_only_in_expected_is_one_missing_actual_record() {
        let mut expected = node("Top", "Top", &[]);
        let mut inner = node("ModB", "U2", &["p : s"]);
        // Deeper structure on the missing side must not be walked into.
        inner.instances.push(node("Deep", "D1", &[]));
        expected.instances.push(inner);
        let actual = node("Top", "Top", &[]);

        let report = compare(&expected, &actual).report;
        assert_eq!(report.records.len(), 1);
        let rec = &report.records[0];
        assert!(rec.actual.is_missing());
        match &rec.expected {
            DiffSide::Present(s) => {
                assert_eq!(s.module_name, "ModB");
                assert_eq!(s.instance_name, "U2");
            }
            DiffSide::Missing => panic!("expected side must be present"),
        }
    }

    #[test]
    fn instance_only_in_actual_files_under_its_own_source() {
        let expected = node("Top", "Top", &[]);
        let mut actual = node("Top", "Top", &[]);
        let mut extra = node("ModC", "U3", &[]);
        extra.file_path = "rtl/mod_c.v".to_string();
        actual.instances.push(extra);

        let report = compare(&expected, &actual).report;
        assert_eq!(report.records.len(), 1);
        assert!(report.records[0].expected.is_missing());
        assert_eq!(report.records[0].file, "rtl/mod_c.v");
    }

    #[test]
    fn reordered_siblings_match_by_instance_name() {
        let mut expected = node("Top", "Top", &[]);
        expected.instances.push(node("A", "U1", &[]));
        expected.instances.push(node("B", "U2", &[]));
        let mut actual = node("Top", "Top", &[]);
        actual.instances.push(node("B", "U2", &[]));
        actual.instances.push(node("A", "U1", &[]));
        assert!(compare(&expected, &actual).report.is_empty());
    }

    #[test]
    fn parent_mismatch_does_not_suppress_deeper_mismatches() {
        let mut expected = node("TopA", "Top", &[]);
        let mut e_child = node("Mid", "U1", &[]);
        e_child.instances.push(node("LeafX", "L1", &[]));
        expected.instances.push(e_child);

        let mut actual = node("TopB", "Top", &[]);
        let mut a_child = node("Mid", "U1", &[]);
        a_child.instances.push(node("LeafY", "L1", &[]));
        actual.instances.push(a_child);

        let report = compare(&expected, &actual).report;
        // One for the root rename, one for the leaf rename.
        assert_eq!(report.records.len(), 2);
    }

    #[test]
    fn resolved_file_context_passes_down_to_children() {
        let mut expected = node("Top", "Top", &[]);
        expected.instances.push(node("ModB", "U2", &[]));
        let mut actual = node("Top", "Top", &[]);
        actual.file_path = "rtl/top.v".to_string();

        let report = compare(&expected, &actual).report;
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].file, "rtl/top.v");
    }

    #[test]
    fn comparator_is_idempotent() {
        let mut expected = node("Top", "Top", &["clk"]);
        expected.instances.push(node("ModA", "U1", &["p : s"]));
        let actual = node("Top", "Top", &["clk"]);

        let first = compare(&expected, &actual).report;
        let second = compare(&expected, &actual).report;
        assert_eq!(first, second);
    }

    #[test]
    fn sibling_collisions_fold_last_writer_and_warn() {
        let mut expected = node("Top", "Top", &[]);
        expected.instances.push(node("Old", "U1", &[]));
        expected.instances.push(node("New", "U1", &[]));
        let mut actual = node("Top", "Top", &[]);
        actual.instances.push(node("New", "U1", &[]));

        let cmp = compare(&expected, &actual);
        assert!(cmp.report.is_empty());
        assert_eq!(cmp.warnings.len(), 1);
        assert!(cmp.warnings[0].starts_with("expected:"));
    }

    #[test]
    fn diff_artifact_shape_is_pinned() {
        let mut expected = node("Top", "Top", &[]);
        expected.instances.push(node("ModB", "U2", &["p : s"]));
        let actual = node("Top", "Top", &[]);

        let report = compare(&expected, &actual).report;
        let v: serde_json::Value =
            serde_json::from_str(&report.to_json_pretty()).expect("parse");
        let records = v["Diff_Arch"].as_array().expect("Diff_Arch[]");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["actual"], "missing");
        assert_eq!(records[0]["expected"]["Module_name"], "ModB");
        assert_eq!(records[0]["expected"]["Instance_name"], "U2");
        assert_eq!(records[0]["expected"]["Port"][0], "p : s");
        assert_eq!(records[0]["file"], "Top Level");

        let back: DiffReport = serde_json::from_value(v).expect("round trip");
        assert_eq!(back, report);
    }

    #[test]
    fn both_trees_empty_is_a_valid_empty_report() {
        let expected = node("", "Top", &[]);
        let actual = node("", "Top", &[]);
        assert!(compare(&expected, &actual).report.is_empty());
    }
}
