//! `veritree extract`: extraction alone, with its artifact projections.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use veritree_contracts::VERITREE_EXTRACT_REPORT_SCHEMA_VERSION;
use veritree_core::extract::{extract, sibling_collisions, TopDetection};
use veritree_core::netlist::Netlist;
use veritree_core::orchestrate::write_extraction_artifacts;

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Elaborated-design XML.
    pub xml: PathBuf,

    /// Directory receiving the hierarchy JSON/text/ports artifacts.
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Also write the Graphviz DOT export.
    #[arg(long)]
    pub dot: bool,
}

#[derive(Debug, Serialize)]
struct ExtractReport {
    schema_version: &'static str,
    tool: crate::ToolInfo,
    xml: String,
    top_module: String,
    detection: TopDetection,
    best_effort: bool,
    module_count: usize,
    artifacts: Vec<String>,
}

pub fn cmd_extract(args: ExtractArgs) -> Result<std::process::ExitCode> {
    let netlist = Netlist::from_file(&args.xml).map_err(anyhow::Error::new)?;
    let stem = args
        .xml
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("design")
        .to_string();
    let extraction = extract(&netlist, &stem).map_err(anyhow::Error::new)?;
    if extraction.detection.best_effort() {
        eprintln!(
            "warning: best-effort top-module detection ({:?}): {}",
            extraction.detection, extraction.top_module
        );
    }
    for anomaly in sibling_collisions(&extraction.tree) {
        eprintln!("warning: {anomaly}");
    }

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create out dir: {}", args.out_dir.display()))?;
    let written =
        write_extraction_artifacts(&args.out_dir, &stem, &netlist, &extraction, args.dot)
            .context("write extraction artifacts")?;

    let report = ExtractReport {
        schema_version: VERITREE_EXTRACT_REPORT_SCHEMA_VERSION,
        tool: crate::tool_info(),
        xml: args.xml.display().to_string(),
        top_module: extraction.top_module.clone(),
        detection: extraction.detection,
        best_effort: extraction.detection.best_effort(),
        module_count: netlist.modules.len(),
        artifacts: written.iter().map(|p| p.display().to_string()).collect(),
    };
    crate::print_json_line(&report)?;
    Ok(std::process::ExitCode::SUCCESS)
}
