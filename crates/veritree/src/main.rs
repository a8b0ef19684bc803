use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

mod compare_cmd;
mod doctor;
mod extract_cmd;
mod harness;
mod run;

#[derive(Parser, Debug)]
#[command(name = "veritree")]
#[command(
    about = "Hierarchy verification and bounded auto-repair for elaborated RTL designs.",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the full bounded verify/repair loop.
    Run(Box<run::RunArgs>),
    /// Extract the hierarchy tree from an elaborated-design XML.
    Extract(extract_cmd::ExtractArgs),
    /// Compare an expected and an actual hierarchy JSON.
    Compare(compare_cmd::CompareArgs),
    /// Check platform prerequisites for the repair loop.
    Doctor(doctor::DoctorArgs),
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run::cmd_run(*args),
        Command::Extract(args) => extract_cmd::cmd_extract(args),
        Command::Compare(args) => compare_cmd::cmd_compare(args),
        Command::Doctor(args) => doctor::cmd_doctor(args),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ToolInfo {
    name: &'static str,
    version: &'static str,
}

pub(crate) fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "veritree",
        version: env!("CARGO_PKG_VERSION"),
    }
}

/// Single-line JSON report on stdout, trailing newline included.
pub(crate) fn print_json_line<T: Serialize>(value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    std::io::Write::write_all(&mut std::io::stdout(), &bytes).context("write stdout")?;
    Ok(())
}
