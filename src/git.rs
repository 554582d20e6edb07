use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command \"{command}\" failed with exit code {code}:\n{output}")]
    Failed {
        command: String,
        code: i32,
        output: String,
    },
}

/// Gateway to the version-control tool.
///
/// Every method blocks until the child exits. Implementations must not
/// retry; a failure is reported to the caller exactly once.
pub trait Git {
    /// Run `git <args>` and return its stdout, failing on a non-zero exit.
    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let (code, output) = self.run_with_code(args)?;
        if code != 0 {
            return Err(GitError::Failed {
                command: format!("git {}", args.join(" ")),
                code,
                output,
            });
        }
        Ok(output)
    }

    /// Run `git <args>` and return the exit code alongside stdout.
    fn run_with_code(&self, args: &[&str]) -> Result<(i32, String), GitError>;

    /// Run `git <args>` with `input` written to its stdin.
    fn run_with_input(&self, args: &[&str], input: &[u8]) -> Result<(i32, String), GitError>;

    /// Run `git <args>` attached to the terminal so it can prompt, echoing
    /// stdout as it arrives. Returns the exit code and the echoed stdout.
    fn run_interactive(&self, args: &[&str]) -> Result<(i32, String), GitError>;
}

/// The real `git` binary found on `PATH`.
#[derive(Debug, Default)]
pub struct GitCli {
    workdir: Option<PathBuf>,
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every command inside `dir` instead of the process working directory.
    #[cfg(test)]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: Some(dir.into()),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new("git");
        command.args(args);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        command
    }
}

impl Git for GitCli {
    fn run_with_code(&self, args: &[&str]) -> Result<(i32, String), GitError> {
        debug!(args = ?args, "running git");
        let output = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| spawn_error("git", source))?;
        Ok(collect("git", args, output))
    }

    fn run_with_input(&self, args: &[&str], input: &[u8]) -> Result<(i32, String), GitError> {
        debug!(args = ?args, input_bytes = input.len(), "running git with stdin");
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| spawn_error("git", source))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .map_err(|source| spawn_error("git", source))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|source| spawn_error("git", source))?;
        Ok(collect("git", args, output))
    }

    fn run_interactive(&self, args: &[&str]) -> Result<(i32, String), GitError> {
        debug!(args = ?args, "running git interactively");
        tee("git", self.command(args), &mut io::stdout())
    }
}

/// Run an arbitrary program attached to the terminal, echoing its stdout as
/// it arrives and returning a copy of it.
pub fn run_external(program: &str, args: &[String]) -> Result<(i32, String), GitError> {
    debug!(program, args = ?args, "running external tool");
    let mut command = Command::new(program);
    command.args(args);
    let (code, output) = tee(program, command, &mut io::stdout())?;
    debug!(program, code, "external tool finished");
    Ok((code, output))
}

/// Spawn `command` with our stdin and stderr, copying its stdout to `echo`
/// chunk by chunk. Prompts without a trailing newline show up immediately.
fn tee(program: &str, mut command: Command, echo: &mut dyn Write) -> Result<(i32, String), GitError> {
    let mut child = command
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| spawn_error(program, source))?;

    let mut captured = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        let mut buf = [0u8; 4096];
        loop {
            let read = match stdout.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => return Err(spawn_error(program, source)),
            };
            captured.extend_from_slice(&buf[..read]);
            // Losing the echo must not lose the child's result.
            let _ = echo.write_all(&buf[..read]).and_then(|()| echo.flush());
        }
    }

    let status = child.wait().map_err(|source| spawn_error(program, source))?;
    Ok((
        status.code().unwrap_or(-1),
        String::from_utf8_lossy(&captured).into_owned(),
    ))
}

fn spawn_error(program: &str, source: std::io::Error) -> GitError {
    GitError::Spawn {
        program: program.to_string(),
        source,
    }
}

fn collect(program: &str, args: &[&str], output: Output) -> (i32, String) {
    let code = output.status.code().unwrap_or(-1);
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    if code != 0 {
        // The diagnostic is usually on stderr; keep it with the output.
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!(program, args = ?args, code, "command failed");
    }
    (code, text)
}

/// `refs/heads/foo` -> `foo`. Anything else is returned unchanged.
pub fn short_branch_name(branch: &str) -> &str {
    branch.strip_prefix("refs/heads/").unwrap_or(branch)
}
