//! The bounded repair loop: Extract → Compare → Decide → (Repair →
//! Validate), iterated until success, exhaustion, or non-progress.
//!
//! External collaborators are trait objects so the loop can run against an
//! OpenAI-compatible inference backend and a make-driven harness in
//! production, and against fakes in tests.

use std::path::{Path, PathBuf};

use serde::Serialize;
use veritree_contracts::{BACKUP_SUFFIX, SPEC_JSON_FILE, TOP_LEVEL_FILE_MARKER};

use crate::compare::{compare, DiffRecord};
use crate::extract::{extract, Extraction};
use crate::hier::HierarchyNode;
use crate::netlist::Netlist;
use crate::render;
use crate::util::{resolve_existing_path_from, sha256_hex};

/// The spec-inference and repair-inference side of the loop.
pub trait InferenceService {
    /// Turns a free-text specification document into the expected tree.
    fn interpret_spec(&self, spec_text: &str) -> Result<HierarchyNode, InferError>;
    /// Proposes a full corrected file body for one mismatch.
    fn propose_repair(&self, diff: &DiffRecord, file_text: &str) -> Result<String, InferError>;
}

/// The elaboration/build side of the loop.
pub trait DesignHarness {
    /// Regenerates the elaborated-design XML. Non-zero exit is a hard
    /// failure.
    fn elaborate(&self) -> Result<(), HarnessError>;
    /// Runs the build/simulation step, writing its combined output to the
    /// configured sim log. The captured log decides pass/fail, not the exit
    /// status.
    fn simulate(&self) -> Result<(), HarnessError>;
}

#[derive(Debug)]
pub struct InferError {
    pub message: String,
}

impl InferError {
    pub fn new(msg: impl Into<String>) -> Self {
        InferError {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for InferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for InferError {}

#[derive(Debug)]
pub struct HarnessError {
    pub message: String,
}

impl HarnessError {
    pub fn new(msg: impl Into<String>) -> Self {
        HarnessError {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for HarnessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HarnessError {}

/// Invalid run configuration, raised before any iteration runs.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Free-text specification document, interpreted once before iteration 1.
    pub spec_path: PathBuf,
    /// Pre-built expected-architecture JSON; skips spec interpretation.
    pub spec_json: Option<PathBuf>,
    /// Where the elaboration tool leaves its XML dump.
    pub xml_path: PathBuf,
    /// Directory the harness commands run in. Source filenames recorded in
    /// the XML are relative to it, so repairs resolve against it too.
    pub work_dir: PathBuf,
    /// Where artifacts (SPEC.json, hierarchy listings, diff report) go.
    pub out_dir: PathBuf,
    /// The harness's captured-output log, overwritten each validation.
    pub sim_log: PathBuf,
    pub max_iters: u32,
    /// Case-insensitive substrings classifying the sim log as passing.
    pub pass_markers: Vec<String>,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iters == 0 {
            return Err(ConfigError {
                message: "max_iters must be at least 1".to_string(),
            });
        }
        if self.pass_markers.is_empty() {
            return Err(ConfigError {
                message: "at least one pass marker is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Outcome {
    /// No diffs and the simulation log carried a pass marker.
    Success,
    /// Iteration bound reached without success.
    Exhausted,
    /// Structural conformance without a passing simulation; not retried.
    StructurallyCleanButFailing,
    /// Fatal stage failure or a repair pass that modified nothing.
    Aborted { stage: String, message: String },
}

impl Outcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::StructurallyCleanButFailing => 10,
            Outcome::Exhausted => 11,
            Outcome::Aborted { .. } => 12,
        }
    }
}

/// Why a diff record produced no file write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// The record carries no resolvable file ("" or the root marker).
    NoFile,
    /// The named file does not exist or could not be read.
    MissingFile,
    /// The repair-inference call failed.
    InferenceFailed,
    /// The repair-inference call returned nothing usable.
    EmptyOutput,
    /// Backup or overwrite failed on disk.
    WriteFailed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RepairStatus {
    Applied {
        backup: String,
        sha256_before: String,
        sha256_after: String,
    },
    Skipped {
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairRecord {
    pub file: String,
    #[serde(flatten)]
    pub status: RepairStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub diff_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub repairs: Vec<RepairRecord>,
    /// `None` when the iteration never reached validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub iterations: Vec<IterationRecord>,
    pub outcome: Outcome,
}

/// Runs the full bounded loop. Fatal stage failures become
/// [`Outcome::Aborted`] with a stage label rather than an `Err`; every
/// intermediate artifact stays on disk for post-mortem inspection.
pub fn run_loop<I: InferenceService, H: DesignHarness>(
    cfg: &RunConfig,
    infer: &I,
    harness: &H,
) -> RunReport {
    let mut iterations: Vec<IterationRecord> = Vec::new();

    let expected = match obtain_expected(cfg, infer) {
        Ok(tree) => tree,
        Err(message) => {
            return abort(iterations, "spec-interpretation", message);
        }
    };

    let stem = cfg
        .xml_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("design")
        .to_string();

    for iteration in 1..=cfg.max_iters {
        if let Err(e) = harness.elaborate() {
            return abort(iterations, "elaboration", e.to_string());
        }

        let extraction = match extract_current(cfg, &stem) {
            Ok(ex) => ex,
            Err(message) => return abort(iterations, "extraction", message),
        };
        if extraction.detection.best_effort() {
            eprintln!(
                "warning: best-effort top-module detection ({:?}): {}",
                extraction.detection, extraction.top_module
            );
        }

        let cmp = compare(&expected, &extraction.tree);
        for warning in &cmp.warnings {
            eprintln!("warning: {warning}");
        }
        let diff_path = cfg.out_dir.join(veritree_contracts::DIFF_REPORT_FILE);
        if let Err(e) = std::fs::write(&diff_path, cmp.report.to_json_pretty()) {
            return abort(
                iterations,
                "compare",
                format!("write {}: {e}", diff_path.display()),
            );
        }

        let mut record = IterationRecord {
            iteration,
            diff_count: cmp.report.records.len(),
            warnings: cmp.warnings.clone(),
            repairs: Vec::new(),
            validated: None,
        };
        eprintln!(
            "iteration {iteration}/{}: {} diffs",
            cfg.max_iters, record.diff_count
        );

        if cmp.report.is_empty() {
            let passed = run_validation(cfg, harness);
            record.validated = Some(passed);
            iterations.push(record);
            let outcome = if passed {
                Outcome::Success
            } else {
                Outcome::StructurallyCleanButFailing
            };
            return finish(iterations, outcome);
        }

        let mut modified = 0usize;
        for diff in &cmp.report.records {
            let repair = repair_one(diff, &cfg.work_dir, infer);
            if matches!(repair.status, RepairStatus::Applied { .. }) {
                modified += 1;
            } else {
                eprintln!("repair: skipped {:?} ({:?})", repair.file, repair.status);
            }
            record.repairs.push(repair);
        }

        if modified == 0 {
            iterations.push(record);
            return abort(
                iterations,
                "repair",
                "no files modified this iteration (non-progress)".to_string(),
            );
        }

        let passed = run_validation(cfg, harness);
        record.validated = Some(passed);
        iterations.push(record);
        if passed {
            return finish(iterations, Outcome::Success);
        }
    }

    finish(iterations, Outcome::Exhausted)
}

fn finish(iterations: Vec<IterationRecord>, outcome: Outcome) -> RunReport {
    eprintln!("outcome: {outcome:?}");
    RunReport {
        iterations,
        outcome,
    }
}

fn abort(iterations: Vec<IterationRecord>, stage: &str, message: String) -> RunReport {
    eprintln!("{stage}: {message}");
    finish(
        iterations,
        Outcome::Aborted {
            stage: stage.to_string(),
            message,
        },
    )
}

/// The expected tree is built exactly once per run: either loaded from a
/// caller-provided JSON, or interpreted from the spec document and persisted
/// as `SPEC.json`.
fn obtain_expected<I: InferenceService>(
    cfg: &RunConfig,
    infer: &I,
) -> Result<HierarchyNode, String> {
    if let Some(path) = &cfg.spec_json {
        return HierarchyNode::load(path).map_err(|e| e.to_string());
    }

    let spec_text = std::fs::read_to_string(&cfg.spec_path)
        .map_err(|e| format!("read {}: {e}", cfg.spec_path.display()))?;
    let tree = infer
        .interpret_spec(&spec_text)
        .map_err(|e| e.to_string())?;

    let spec_json = cfg.out_dir.join(SPEC_JSON_FILE);
    std::fs::write(&spec_json, tree.to_json_pretty())
        .map_err(|e| format!("write {}: {e}", spec_json.display()))?;
    Ok(tree)
}

fn extract_current(cfg: &RunConfig, stem: &str) -> Result<Extraction, String> {
    let netlist = Netlist::from_file(&cfg.xml_path).map_err(|e| e.to_string())?;
    let extraction = extract(&netlist, stem).map_err(|e| e.to_string())?;
    for anomaly in crate::extract::sibling_collisions(&extraction.tree) {
        eprintln!("warning: {anomaly}");
    }
    write_extraction_artifacts(&cfg.out_dir, stem, &netlist, &extraction, false)
        .map_err(|e| format!("write artifacts: {e}"))?;
    Ok(extraction)
}

/// Writes the hierarchy JSON/text/ports projections (and optionally the DOT
/// export) next to each other under `out_dir`. Returns the written paths.
pub fn write_extraction_artifacts(
    out_dir: &Path,
    stem: &str,
    netlist: &Netlist,
    extraction: &Extraction,
    dot: bool,
) -> std::io::Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let json_path = out_dir.join(format!("{stem}_hierarchy.json"));
    std::fs::write(&json_path, extraction.tree.to_json_pretty())?;
    written.push(json_path);

    let text_path = out_dir.join(format!("{stem}_hierarchy.txt"));
    std::fs::write(&text_path, render::hierarchy_text(&extraction.tree))?;
    written.push(text_path);

    let ports_path = out_dir.join(format!("{stem}_ports.txt"));
    std::fs::write(&ports_path, render::ports_text(netlist))?;
    written.push(ports_path);

    if dot {
        let dot_path = out_dir.join(format!("{stem}_hierarchy.dot"));
        std::fs::write(&dot_path, render::dot_text(netlist, &extraction.top_module))?;
        written.push(dot_path);
    }

    Ok(written)
}

/// One repair attempt for one diff record. Per-file failures are isolated:
/// the file is skipped with a coded reason and the iteration continues.
/// Recorded filenames are relative to wherever the elaboration ran, so they
/// resolve against `work_dir`, not this process's working directory.
fn repair_one<I: InferenceService>(
    diff: &DiffRecord,
    work_dir: &Path,
    infer: &I,
) -> RepairRecord {
    let file = diff.file.clone();
    let skipped = |reason| RepairRecord {
        file: file.clone(),
        status: RepairStatus::Skipped { reason },
    };

    if file.is_empty() || file == TOP_LEVEL_FILE_MARKER {
        return skipped(SkipReason::NoFile);
    }
    let path = resolve_existing_path_from(work_dir, Path::new(&file));
    if !path.is_file() {
        return skipped(SkipReason::MissingFile);
    }
    let current = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(_) => return skipped(SkipReason::MissingFile),
    };

    let proposed = match infer.propose_repair(diff, &current) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("repair: inference failed for {file}: {e}");
            return skipped(SkipReason::InferenceFailed);
        }
    };
    if proposed.trim().is_empty() {
        return skipped(SkipReason::EmptyOutput);
    }

    // First touch in the run backs the original up; an existing backup is
    // never overwritten, so retried iterations stay recoverable.
    let backup = format!("{}{BACKUP_SUFFIX}", path.display());
    if !Path::new(&backup).exists() {
        if let Err(e) = std::fs::copy(&path, &backup) {
            eprintln!("repair: backup failed for {file}: {e}");
            return skipped(SkipReason::WriteFailed);
        }
    }
    if let Err(e) = std::fs::write(&path, &proposed) {
        eprintln!("repair: write failed for {file}: {e}");
        return skipped(SkipReason::WriteFailed);
    }

    RepairRecord {
        file,
        status: RepairStatus::Applied {
            backup,
            sha256_before: sha256_hex(current.as_bytes()),
            sha256_after: sha256_hex(proposed.as_bytes()),
        },
    }
}

fn run_validation<H: DesignHarness>(cfg: &RunConfig, harness: &H) -> bool {
    // A stale log from an earlier iteration must never classify a failed
    // harness spawn as a pass.
    let _ = std::fs::remove_file(&cfg.sim_log);
    if let Err(e) = harness.simulate() {
        eprintln!("validation: harness failed: {e}");
    }
    log_indicates_pass(&cfg.sim_log, &cfg.pass_markers)
}

/// Case-insensitive pass-marker scan. A missing or unreadable log is a
/// failure.
pub fn log_indicates_pass(path: &Path, markers: &[String]) -> bool {
    let Ok(text) = std::fs::read_to_string(path) else {
        return false;
    };
    let lower = text.to_lowercase();
    markers.iter().any(|m| lower.contains(&m.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn tmp_file(name: &str) -> PathBuf {
        let n = TMP_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "veritree-orch-unit-{}-{n}-{name}",
            std::process::id()
        ))
    }

    fn markers() -> Vec<String> {
        veritree_contracts::DEFAULT_PASS_MARKERS
            .iter()
            .map(|m| m.to_string())
            .collect()
    }

    #[test]
    fn missing_log_is_a_failure() {
        assert!(!log_indicates_pass(
            Path::new("/nonexistent/veritree/sim.log"),
            &markers()
        ));
    }

    #[test]
    fn pass_marker_match_is_case_insensitive() {
        let log = tmp_file("sim.log");
        std::fs::write(&log, "... SIM PASSED after 120 cycles\n").expect("write log");
        assert!(log_indicates_pass(&log, &markers()));
        std::fs::remove_file(&log).ok();
    }

    #[test]
    fn failing_log_has_no_marker() {
        let log = tmp_file("sim.log");
        std::fs::write(&log, "assertion failed at t=10\n").expect("write log");
        assert!(!log_indicates_pass(&log, &markers()));
        std::fs::remove_file(&log).ok();
    }

    #[test]
    fn zero_iterations_is_invalid_config() {
        let cfg = RunConfig {
            spec_path: PathBuf::from("spec.md"),
            spec_json: None,
            xml_path: PathBuf::from("Vtop.xml"),
            work_dir: PathBuf::from("."),
            out_dir: PathBuf::from("."),
            sim_log: PathBuf::from("sim.log"),
            max_iters: 0,
            pass_markers: markers(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn outcome_exit_codes_are_stable() {
        assert_eq!(Outcome::Success.exit_code(), 0);
        assert_eq!(Outcome::StructurallyCleanButFailing.exit_code(), 10);
        assert_eq!(Outcome::Exhausted.exit_code(), 11);
        assert_eq!(
            Outcome::Aborted {
                stage: "repair".to_string(),
                message: String::new()
            }
            .exit_code(),
            12
        );
    }
}
