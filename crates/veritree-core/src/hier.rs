//! The Tree Model: one normalized hierarchy representation shared by the
//! extractor's output and the expected-architecture input.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// One module instantiation site.
///
/// The serde field names are a wire contract: the same JSON shape is produced
/// by the external spec-inference service, written by the extractor as the
/// actual-architecture artifact, and embedded in diff records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    #[serde(rename = "Module_name")]
    pub module_name: String,
    /// Unique among siblings under the same parent; `"Top"` for the root.
    #[serde(rename = "Instance_name")]
    pub instance_name: String,
    /// Path of the file declaring this module; empty when unknown.
    /// Typically absent in spec-inference output.
    #[serde(rename = "File_path", default)]
    pub file_path: String,
    /// Bare port names for a root/standalone module; `"port : signal"`
    /// (signal possibly a comma-joined fanout list) for an instantiated
    /// submodule. No ordering guarantee; compared as a multiset.
    #[serde(rename = "Port", default)]
    pub ports: Vec<String>,
    /// Submodule instances in discovery order; order carries no
    /// architectural meaning.
    #[serde(rename = "Instances", default)]
    pub instances: Vec<HierarchyNode>,
}

impl HierarchyNode {
    pub fn new(module_name: impl Into<String>, instance_name: impl Into<String>) -> Self {
        HierarchyNode {
            module_name: module_name.into(),
            instance_name: instance_name.into(),
            file_path: String::new(),
            ports: Vec::new(),
            instances: Vec::new(),
        }
    }

    /// Loads a tree from a JSON file. Missing `Module_name`/`Instance_name`
    /// fields are malformed input.
    pub fn load(path: &Path) -> Result<HierarchyNode, TreeLoadError> {
        let bytes = std::fs::read(path).map_err(|e| TreeLoadError {
            path: path.display().to_string(),
            message: format!("read: {e}"),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| TreeLoadError {
            path: path.display().to_string(),
            message: format!("not a well-formed hierarchy tree: {e}"),
        })
    }

    pub fn to_json_pretty(&self) -> String {
        let mut s = serde_json::to_string_pretty(self).unwrap_or_default();
        s.push('\n');
        s
    }
}

/// A tree JSON file that could not be read or does not deserialize.
#[derive(Debug)]
pub struct TreeLoadError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for TreeLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for TreeLoadError {}
