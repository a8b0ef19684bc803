//! `veritree compare`: comparison alone, given three JSON paths.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use veritree_contracts::{
    DEFAULT_ACTUAL_JSON_FILE, DIFF_REPORT_FILE, SPEC_JSON_FILE,
    VERITREE_COMPARE_REPORT_SCHEMA_VERSION,
};
use veritree_core::compare::compare_files;

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Expected-architecture JSON.
    #[arg(default_value = SPEC_JSON_FILE)]
    pub expected: PathBuf,

    /// Actual-architecture JSON from extraction.
    #[arg(default_value = DEFAULT_ACTUAL_JSON_FILE)]
    pub actual: PathBuf,

    /// Diff report output path.
    #[arg(default_value = DIFF_REPORT_FILE)]
    pub output: PathBuf,
}

#[derive(Debug, Serialize)]
struct CompareReport {
    schema_version: &'static str,
    tool: crate::ToolInfo,
    expected: String,
    actual: String,
    output: String,
    diff_count: usize,
    matches: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

pub fn cmd_compare(args: CompareArgs) -> Result<std::process::ExitCode> {
    let cmp = compare_files(&args.expected, &args.actual).map_err(anyhow::Error::new)?;
    for warning in &cmp.warnings {
        eprintln!("warning: {warning}");
    }
    std::fs::write(&args.output, cmp.report.to_json_pretty())
        .with_context(|| format!("write diff report: {}", args.output.display()))?;

    let report = CompareReport {
        schema_version: VERITREE_COMPARE_REPORT_SCHEMA_VERSION,
        tool: crate::tool_info(),
        expected: args.expected.display().to_string(),
        actual: args.actual.display().to_string(),
        output: args.output.display().to_string(),
        diff_count: cmp.report.records.len(),
        matches: cmp.report.is_empty(),
        warnings: cmp.warnings,
    };
    crate::print_json_line(&report)?;
    Ok(std::process::ExitCode::SUCCESS)
}
