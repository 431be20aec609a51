use std::fmt::{self, Debug};
use std::fs::File;
use std::path::Path;
use std::process::Stdio;

/// A program invocation, kept as data so it can be logged and faked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
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
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {code:?}: {output}")]
    Exit {
        program: String,
        code: Option<i32>,
        output: String,
    },
}

/// Executes external programs on behalf of a backend.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync + Debug {
    /// Run to completion; returns combined stdout and stderr on success.
    async fn run(&self, command: &CommandLine) -> Result<String, CommandError>;

    /// Start detached with stdout and stderr appended to `log_path`.
    async fn spawn_background(
        &self,
        command: &CommandLine,
        log_path: &Path,
    ) -> Result<(), CommandError>;
}

#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

#[async_trait::async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandLine) -> Result<String, CommandError> {
        tracing::debug!("running: {}", command);
        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            Err(CommandError::Exit {
                program: command.program.clone(),
                code: output.status.code(),
                output: combined.trim().to_string(),
            })
        }
    }

    async fn spawn_background(
        &self,
        command: &CommandLine,
        log_path: &Path,
    ) -> Result<(), CommandError> {
        tracing::debug!("spawning: {} (log: {})", command, log_path.display());
        let spawn_err = |source| CommandError::Spawn {
            program: command.program.clone(),
            source,
        };

        let log = File::options()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(spawn_err)?;
        let log_err = log.try_clone().map_err(spawn_err)?;

        // The child outlives this process; it is never waited on here.
        std::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(spawn_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_display() {
        let command = CommandLine::new("fusermount").arg("-u").args(["/mnt/a b"]);
        assert_eq!(command.to_string(), "fusermount -u /mnt/a b");
        assert_eq!(command.args, vec!["-u", "/mnt/a b"]);
    }

    #[tokio::test]
    async fn test_system_runner_reports_missing_program() {
        let err = SystemRunner
            .run(&CommandLine::new("sdm-definitely-not-a-real-program"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
