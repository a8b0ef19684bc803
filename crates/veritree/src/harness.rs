//! Process-backed [`DesignHarness`]: elaboration and simulation run as
//! external commands in the work directory, bounded by a wall-clock
//! deadline. The simulation's combined output stream overwrites the sim log
//! each invocation.

use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use veritree_core::orchestrate::{DesignHarness, HarnessError};

pub struct CmdHarness {
    pub elab_cmd: Vec<String>,
    pub sim_cmd: Vec<String>,
    pub work_dir: PathBuf,
    pub sim_log: PathBuf,
    pub timeout: Duration,
}

impl CmdHarness {
    fn run(
        &self,
        argv: &[String],
        log: Option<std::fs::File>,
    ) -> Result<(ExitStatus, bool), HarnessError> {
        let (prog, rest) = argv
            .split_first()
            .ok_or_else(|| HarnessError::new("empty command"))?;
        let mut cmd = Command::new(prog);
        cmd.args(rest).current_dir(&self.work_dir);
        if let Some(file) = log {
            let err = file
                .try_clone()
                .map_err(|e| HarnessError::new(format!("clone log handle: {e}")))?;
            cmd.stdout(Stdio::from(file)).stderr(Stdio::from(err));
        }
        let mut child = cmd
            .spawn()
            .map_err(|e| HarnessError::new(format!("spawn {prog}: {e}")))?;
        wait_with_deadline(&mut child, self.timeout)
    }
}

impl DesignHarness for CmdHarness {
    fn elaborate(&self) -> Result<(), HarnessError> {
        let (status, timed_out) = self.run(&self.elab_cmd, None)?;
        if timed_out {
            return Err(HarnessError::new(format!(
                "elaboration timed out after {:?}: {}",
                self.timeout,
                self.elab_cmd.join(" ")
            )));
        }
        if !status.success() {
            return Err(HarnessError::new(format!(
                "elaboration failed ({status}): {}",
                self.elab_cmd.join(" ")
            )));
        }
        Ok(())
    }

    fn simulate(&self) -> Result<(), HarnessError> {
        let log = std::fs::File::create(&self.sim_log).map_err(|e| {
            HarnessError::new(format!("create {}: {e}", self.sim_log.display()))
        })?;
        let (_status, timed_out) = self.run(&self.sim_cmd, Some(log))?;
        if timed_out {
            return Err(HarnessError::new(format!(
                "simulation timed out after {:?}: {}",
                self.timeout,
                self.sim_cmd.join(" ")
            )));
        }
        // Exit status is ignored; the captured log decides pass/fail.
        Ok(())
    }
}

fn wait_with_deadline(
    child: &mut std::process::Child,
    timeout: Duration,
) -> Result<(ExitStatus, bool), HarnessError> {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| HarnessError::new(format!("try_wait child: {e}")))?
        {
            return Ok((status, false));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            let _ = child.kill();
            let status = child
                .wait()
                .map_err(|e| HarnessError::new(format!("wait child after kill: {e}")))?;
            return Ok((status, true));
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Whitespace-split argv form of a command-line flag value.
pub fn split_command(s: &str) -> Result<Vec<String>, HarnessError> {
    let argv: Vec<String> = s.split_whitespace().map(|p| p.to_string()).collect();
    if argv.is_empty() {
        return Err(HarnessError::new(format!("empty command: {s:?}")));
    }
    Ok(argv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_command_handles_extra_whitespace() {
        assert_eq!(
            split_command("  make   xml ").expect("split"),
            vec!["make".to_string(), "xml".to_string()]
        );
        assert!(split_command("   ").is_err());
    }
}
