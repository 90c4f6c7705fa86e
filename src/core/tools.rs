//! External command-line tool invocation

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A fully built external tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment for the child process
    pub env: Vec<(String, String)>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Single-line rendering, as it would be typed in a shell
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// External tool failed to start or exited unsuccessfully
#[derive(Debug, thiserror::Error)]
pub enum ToolFailure {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}")]
    ExitStatus { command: String, status: String },
}

/// Capability to run external tools.
///
/// `Sync` so the clip step can share one runner across worker threads.
pub trait ToolRunner: Sync {
    fn run(&self, command: &ToolCommand) -> Result<(), ToolFailure>;
}

/// Runs tools as blocking child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    working_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(dir: &Path) -> Self {
        Self {
            working_dir: Some(dir.to_path_buf()),
        }
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, command: &ToolCommand) -> Result<(), ToolFailure> {
        log::debug!("Executing: {}", command);

        let mut child = Command::new(&command.program);
        child.args(command.args.iter().map(OsString::from));
        for (key, value) in &command.env {
            child.env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            child.current_dir(dir);
        }

        let status = child.status().map_err(|source| ToolFailure::Spawn {
            program: command.program.display().to_string(),
            source,
        })?;

        if !status.success() {
            log::error!("{} failed with {}", command.program.display(), status);
            return Err(ToolFailure::ExitStatus {
                command: command.command_line(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_rendering() {
        let command = ToolCommand::new("F:/FUSION/cloudmetrics.exe")
            .arg("/id")
            .args(["/above:2", "in.las", "out.csv"]);
        assert_eq!(command.command_line(), "F:/FUSION/cloudmetrics.exe /id /above:2 in.las out.csv");
    }

    #[test]
    fn test_missing_program_is_spawn_failure() {
        let runner = ProcessRunner::new();
        let result = runner.run(&ToolCommand::new("/definitely/not/a/real/tool"));
        assert!(matches!(result, Err(ToolFailure::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_reported() {
        let runner = ProcessRunner::new();
        let result = runner.run(&ToolCommand::new("sh").args(["-c", "exit 3"]));
        match result {
            Err(ToolFailure::ExitStatus { command, .. }) => assert_eq!(command, "sh -c exit 3"),
            other => panic!("expected exit failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_working_dir_and_env() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("marker"), b"").expect("marker");
        let runner = ProcessRunner::with_working_dir(dir.path());
        let command = ToolCommand::new("sh")
            .args(["-c", "test -f marker && test \"$QGIS_DEBUG\" = 1"])
            .env("QGIS_DEBUG", "1");
        assert!(runner.run(&command).is_ok());
    }
}
