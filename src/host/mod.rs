//! Host command execution
//!
//! Every interaction with the managed host (service manager, package
//! database, subscription tooling) goes through the [`Host`] trait so the
//! engine can be exercised against a scripted host and wrapped for dry runs.
//!
//! # Command classes
//!
//! A [`HostCommand`] is either a *query* (read-only, e.g. `rpm -q`) or an
//! *action* (mutates the host, e.g. `systemctl stop`). [`DryRunHost`] uses
//! that distinction to run queries for a realistic preview while skipping
//! every action.

mod scripted;

pub use scripted::ScriptedHost;

use anyhow::{Context, Result};
use std::fmt;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// A single program invocation on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    program: String,
    args: Vec<String>,
    mutating: bool,
}

impl HostCommand {
    /// A read-only command. Always executed, including in dry-run mode.
    pub fn query<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            mutating: false,
        }
    }

    /// A command that changes host state.
    pub fn action<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mutating: true,
            ..Self::query(program, args)
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns true if running this command changes the host
    pub fn is_mutating(&self) -> bool {
        self.mutating
    }

    /// Space-joined command line, as logged and as matched by [`ScriptedHost`].
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line())
    }
}

/// Output captured from a host command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// Output with the given exit code and stdout.
    pub fn with_status(exit_code: i32, stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(exit_code),
        }
    }

    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Exit status as an integer; signal termination maps to -1.
    pub fn status_code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }

    /// Trimmed stdout followed by trimmed stderr, for user-facing reports.
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }

    /// Return an error carrying the captured output if the command failed.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success() {
            Ok(())
        } else {
            anyhow::bail!(
                "{} failed (exit code {}): {}",
                context,
                self.status_code(),
                self.combined()
            )
        }
    }
}

/// Executes commands on the managed host.
pub trait Host {
    /// Run a command to completion and capture its output.
    ///
    /// A non-zero exit is *not* an error: callers inspect
    /// [`CommandOutput::exit_code`]. `Err` means the command could not be run
    /// at all (binary missing, spawn failure).
    fn run(&self, command: &HostCommand) -> Result<CommandOutput>;
}

impl<H: Host + ?Sized> Host for &H {
    fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        (**self).run(command)
    }
}

/// The local machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl Host for SystemHost {
    fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        info!(command = %command, mutating = command.is_mutating(), "running host command");

        let output = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to run: {}", command))?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        };
        debug!(command = %command, exit_code = result.status_code(), "host command finished");
        Ok(result)
    }
}

/// Runs queries against the wrapped host and skips every mutating action.
#[derive(Debug, Clone)]
pub struct DryRunHost<H> {
    inner: H,
}

impl<H: Host> DryRunHost<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H: Host> Host for DryRunHost<H> {
    fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        if command.is_mutating() {
            info!(command = %command, "[DRY RUN] skipped");
            return Ok(CommandOutput::ok(format!("[DRY RUN] Skipped: {}\n", command)));
        }
        self.inner.run(command)
    }
}
