//! Pre-flight sanity checks for runtime environment
//!
//! Verified before any scenario or service action runs:
//! - Running with root privileges (EUID 0)
//! - Required host tools are present
//!
//! Dry runs skip the checks, as does `UPKEEP_SKIP_ROOT_CHECK=1`.

use crate::host::{Host, HostCommand};
use tracing::{debug, info};

/// Environment variable that disables the pre-flight checks
pub const SKIP_ENV: &str = "UPKEEP_SKIP_ROOT_CHECK";

/// Result of environment verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.is_root
    }

    /// Operator-facing explanation of what failed.
    pub fn error_message(&self) -> String {
        let mut lines = vec!["Pre-flight check failed".to_string()];
        if !self.is_root {
            lines.push("  ERROR: Root privileges required.".to_string());
            lines.push("    Run with sudo or as the root user.".to_string());
        }
        if !self.missing_binaries.is_empty() {
            lines.push(format!(
                "  ERROR: Missing required binaries: {}",
                self.missing_binaries.join(", ")
            ));
        }
        lines.join("\n")
    }
}

/// Required runtime binaries
const REQUIRED_BINARIES: &[&str] = &["systemctl", "rpm"];

fn binary_exists(host: &dyn Host, name: &str) -> bool {
    host.run(&HostCommand::query("which", [name]))
        .map(|output| output.success())
        .unwrap_or(false)
}

fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Whether the operator asked to skip the checks.
pub fn skip_requested() -> bool {
    std::env::var(SKIP_ENV).is_ok_and(|v| v.trim() == "1")
}

/// Perform all sanity checks and return the result
pub fn verify_environment(host: &dyn Host) -> SanityCheckResult {
    let missing = REQUIRED_BINARIES
        .iter()
        .filter(|binary| !binary_exists(host, binary))
        .map(|binary| (*binary).to_string())
        .collect();

    SanityCheckResult {
        missing_binaries: missing,
        is_root: is_running_as_root(),
    }
}

/// Run the checks unless skipped; `Err` carries the message to print.
pub fn run_preflight_checks(host: &dyn Host, dry_run: bool) -> Result<(), String> {
    if dry_run || skip_requested() {
        debug!("Skipping pre-flight checks");
        return Ok(());
    }

    let result = verify_environment(host);
    if !result.is_ok() {
        return Err(result.error_message());
    }

    info!("Pre-flight checks passed: root={}, all binaries present", result.is_root);
    Ok(())
}
