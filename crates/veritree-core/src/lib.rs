//! Hierarchy verification core: the Tree Model, the elaborated-netlist
//! reader, the structural comparator, and the bounded repair loop.

pub mod compare;
pub mod extract;
pub mod hier;
pub mod netlist;
pub mod orchestrate;
pub mod render;
pub mod util;

pub use compare::{compare, Comparison, CompareError, DiffRecord, DiffReport, DiffSide, NodeSummary};
pub use extract::{extract, Extraction, TopDetection};
pub use hier::HierarchyNode;
pub use netlist::{ExtractError, Netlist};
pub use orchestrate::{
    run_loop, DesignHarness, HarnessError, InferError, InferenceService, IterationRecord, Outcome,
    RepairRecord, RunConfig, RunReport,
};
