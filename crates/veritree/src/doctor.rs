//! `veritree doctor`: platform prerequisite checks for the repair loop.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use veritree_contracts::VERITREE_DOCTOR_REPORT_SCHEMA_VERSION;

static TMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Args)]
pub struct DoctorArgs {
    /// Work directory the elaboration/simulation commands would run in.
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    schema_version: &'static str,
    tool: crate::ToolInfo,
    ok: bool,
    checks: Vec<Check>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    suggestions: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Check {
    name: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

pub fn cmd_doctor(args: DoctorArgs) -> Result<std::process::ExitCode> {
    let mut checks: Vec<Check> = Vec::new();
    let mut suggestions: Vec<String> = Vec::new();

    let make = find_in_path("make");
    checks.push(Check {
        name: "make_on_path".to_string(),
        ok: make.is_some(),
        detail: make.as_ref().map(|p| format!("found: {}", p.display())),
    });
    if make.is_none() {
        suggestions.push("Install make and ensure it is on PATH.".to_string());
    }

    let verilator = find_in_path("verilator");
    checks.push(Check {
        name: "verilator_on_path".to_string(),
        ok: verilator.is_some(),
        detail: verilator.as_ref().map(|p| format!("found: {}", p.display())),
    });
    if verilator.is_none() {
        suggestions
            .push("Install verilator (the elaboration tool) and ensure it is on PATH.".to_string());
    }

    let key_present = std::env::var("OPENAI_API_KEY")
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false);
    checks.push(Check {
        name: "api_key_present".to_string(),
        ok: key_present,
        detail: None,
    });
    if !key_present {
        suggestions.push(
            "Set OPENAI_API_KEY (or pass --api-key) so the inference services can run."
                .to_string(),
        );
    }

    let writable = check_writable(&args.work_dir);
    checks.push(Check {
        name: "work_dir_writable".to_string(),
        ok: writable.is_ok(),
        detail: writable.err(),
    });

    let ok = checks.iter().all(|c| c.ok);
    let report = DoctorReport {
        schema_version: VERITREE_DOCTOR_REPORT_SCHEMA_VERSION,
        tool: crate::tool_info(),
        ok,
        checks,
        suggestions,
    };
    crate::print_json_line(&report)?;

    Ok(if ok {
        std::process::ExitCode::SUCCESS
    } else {
        std::process::ExitCode::from(1)
    })
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let cand = dir.join(name);
        if cand.is_file() {
            return Some(cand);
        }
    }
    None
}

fn check_writable(dir: &Path) -> Result<(), String> {
    let n = TMP_COUNTER.fetch_add(1, Ordering::SeqCst);
    let probe = dir.join(format!(".veritree-doctor-{}-{n}", std::process::id()));
    std::fs::write(&probe, b"probe").map_err(|e| format!("{}: {e}", dir.display()))?;
    std::fs::remove_file(&probe).map_err(|e| format!("{}: {e}", probe.display()))?;
    Ok(())
}
