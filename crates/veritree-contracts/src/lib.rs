//! Shared, version-pinned protocol identifiers and artifact-name conventions.
//!
//! These constants are the single source of truth for schema/version strings
//! that appear in machine-readable I/O, and for the conventional on-disk
//! artifact filenames shared between the extractor, the comparator, and the
//! repair loop.

pub const VERITREE_RUN_REPORT_SCHEMA_VERSION: &str = "veritree.run.report@0.1.0";
pub const VERITREE_EXTRACT_REPORT_SCHEMA_VERSION: &str = "veritree.extract.report@0.1.0";
pub const VERITREE_COMPARE_REPORT_SCHEMA_VERSION: &str = "veritree.compare.report@0.1.0";
pub const VERITREE_DOCTOR_REPORT_SCHEMA_VERSION: &str = "veritree.doctor.report@0.1.0";

/// Expected-architecture JSON, produced once per run by spec interpretation.
pub const SPEC_JSON_FILE: &str = "SPEC.json";
/// Default actual-architecture JSON name when the XML stem is `Vtop`.
pub const DEFAULT_ACTUAL_JSON_FILE: &str = "Vtop_hierarchy.json";
/// Diff report artifact, regenerated every iteration.
pub const DIFF_REPORT_FILE: &str = "Diff_Arch.json";
/// Combined stdout+stderr of the build/simulation harness, overwritten per iteration.
pub const SIM_LOG_FILE: &str = "sim.log";
/// Appended to a source file's path for its one-time per-run backup copy.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Missing-side marker in diff records.
pub const MISSING_MARKER: &str = "missing";
/// Resolved-file marker for a root node with no known source file.
pub const TOP_LEVEL_FILE_MARKER: &str = "Top Level";

/// Case-insensitive substrings that classify a simulation log as passing.
pub const DEFAULT_PASS_MARKERS: &[&str] = &["sim passed", "simulation passed"];
