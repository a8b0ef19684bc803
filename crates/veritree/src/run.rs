//! `veritree run`: the full bounded verify/repair loop.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use veritree_contracts::{
    DEFAULT_PASS_MARKERS, SIM_LOG_FILE, VERITREE_RUN_REPORT_SCHEMA_VERSION,
};
use veritree_core::orchestrate::{run_loop, IterationRecord, Outcome, RunConfig};
use veritree_infer::{InferConfig, OpenAiClient};

use crate::harness::{split_command, CmdHarness};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Free-text specification document to interpret.
    #[arg(long, default_value = "docs/spec.md")]
    pub spec: PathBuf,

    /// Reuse an existing expected-architecture JSON instead of calling the
    /// spec-inference service.
    #[arg(long)]
    pub spec_json: Option<PathBuf>,

    /// Elaborated-design XML the elaboration command produces.
    #[arg(long, default_value = "work/obj_dir/Vtop.xml")]
    pub xml: PathBuf,

    /// Command regenerating the XML, run in the work directory.
    #[arg(long, default_value = "make xml")]
    pub elab_cmd: String,

    /// Build/simulation command, run in the work directory.
    #[arg(long, default_value = "make all")]
    pub sim_cmd: String,

    /// Directory the elaboration/simulation commands run in.
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Directory receiving the run artifacts (SPEC.json, hierarchy
    /// listings, Diff_Arch.json, sim.log).
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Iteration bound for the repair loop.
    #[arg(long, default_value_t = 5)]
    pub max_iters: u32,

    /// Case-insensitive substring classifying the sim log as passing.
    /// Repeatable; defaults to "sim passed" and "simulation passed".
    #[arg(long = "pass-marker")]
    pub pass_markers: Vec<String>,

    /// Inference model name.
    #[arg(long)]
    pub model: Option<String>,

    /// Inference API key; falls back to OPENAI_API_KEY.
    #[arg(long)]
    pub api_key: Option<String>,

    /// OpenAI-compatible endpoint base URL.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Wall-clock bound for each external call (subprocess or HTTP).
    #[arg(long, default_value_t = 600)]
    pub timeout_secs: u64,

    /// Also write the JSON run report to this file.
    #[arg(long)]
    pub report_out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunInvocation {
    spec: String,
    spec_json: Option<String>,
    xml: String,
    elab_cmd: String,
    sim_cmd: String,
    max_iters: u32,
    pass_markers: Vec<String>,
    model: String,
}

#[derive(Debug, Serialize)]
struct RunCliReport {
    schema_version: &'static str,
    tool: crate::ToolInfo,
    invocation: RunInvocation,
    iterations: Vec<IterationRecord>,
    outcome: Outcome,
}

pub fn cmd_run(args: RunArgs) -> Result<std::process::ExitCode> {
    let pass_markers = if args.pass_markers.is_empty() {
        DEFAULT_PASS_MARKERS.iter().map(|m| m.to_string()).collect()
    } else {
        args.pass_markers.clone()
    };

    let cfg = RunConfig {
        spec_path: args.spec.clone(),
        spec_json: args.spec_json.clone(),
        xml_path: args.xml.clone(),
        work_dir: args.work_dir.clone(),
        out_dir: args.out_dir.clone(),
        sim_log: args.out_dir.join(SIM_LOG_FILE),
        max_iters: args.max_iters,
        pass_markers,
    };
    cfg.validate().map_err(anyhow::Error::new)?;

    // The environment is consulted exactly once, here, as the API key
    // fallback. A missing key fails before any iteration runs.
    let api_key = args
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    let infer_cfg = InferConfig::new(
        api_key,
        args.model.clone(),
        args.base_url.clone(),
        Some(args.timeout_secs),
    )
    .map_err(anyhow::Error::new)?;
    let model = infer_cfg.model.clone();
    let client = OpenAiClient::new(infer_cfg);

    let harness = CmdHarness {
        elab_cmd: split_command(&args.elab_cmd).map_err(anyhow::Error::new)?,
        sim_cmd: split_command(&args.sim_cmd).map_err(anyhow::Error::new)?,
        work_dir: args.work_dir.clone(),
        sim_log: cfg.sim_log.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    };

    std::fs::create_dir_all(&cfg.out_dir)
        .with_context(|| format!("create out dir: {}", cfg.out_dir.display()))?;

    let report = run_loop(&cfg, &client, &harness);
    let exit = report.outcome.exit_code();

    let cli_report = RunCliReport {
        schema_version: VERITREE_RUN_REPORT_SCHEMA_VERSION,
        tool: crate::tool_info(),
        invocation: RunInvocation {
            spec: args.spec.display().to_string(),
            spec_json: args.spec_json.map(|p| p.display().to_string()),
            xml: args.xml.display().to_string(),
            elab_cmd: args.elab_cmd,
            sim_cmd: args.sim_cmd,
            max_iters: args.max_iters,
            pass_markers: cfg.pass_markers.clone(),
            model,
        },
        iterations: report.iterations,
        outcome: report.outcome,
    };

    crate::print_json_line(&cli_report)?;
    if let Some(path) = &args.report_out {
        let mut bytes = serde_json::to_vec_pretty(&cli_report)?;
        bytes.push(b'\n');
        std::fs::write(path, bytes)
            .with_context(|| format!("write report: {}", path.display()))?;
    }

    Ok(std::process::ExitCode::from(exit))
}
