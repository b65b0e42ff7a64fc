//! Verification of rendered rulesets
//!
//! Feeds restore text to `iptables-restore --test` (or the IPv6 loader),
//! which parses and resolves every rule against the running kernel without
//! committing anything.

use crate::core::cidr::Family;
use crate::core::error::{Error, Result};
use tracing::{info, warn};

/// Result of a ruleset verification operation
#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub success: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl VerifyResult {
    /// Creates a successful verification result
    pub fn success() -> Self {
        Self {
            success: true,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Creates a failed verification result with errors
    pub fn failure(errors: Vec<String>) -> Self {
        Self {
            success: false,
            warnings: Vec::new(),
            errors,
        }
    }
}

/// Verifies restore text for `family` without applying it
///
/// A loader that runs and rejects the text yields `Ok` with a failed
/// [`VerifyResult`]. Failing to run the loader at all is an `Err`.
///
/// # Errors
///
/// Returns `Err` if:
/// - no elevation method is usable
/// - the loader cannot be spawned
/// - communication with the loader fails
pub async fn verify_ruleset(text: &str, family: Family) -> Result<VerifyResult> {
    let program = crate::elevation::restore_program(family);
    info!("Verifying {family} ruleset via {program} --test (elevated)");

    let mut child = crate::elevation::create_elevated_restore_command(family, &["--test"])?
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| Error::Restore {
            message: format!("failed to spawn {program}: {e}"),
            stderr: None,
            exit_code: None,
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        use tokio::io::AsyncWriteExt;
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| Error::Internal(format!("Failed to write to {program} stdin: {e}")))?;
        // Dropping stdin closes the pipe so the loader sees EOF
    }

    let output = child.wait_with_output().await?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    let warnings = parse_restore_warnings(&stderr);

    if output.status.success() {
        info!("Ruleset verification passed");
        let mut result = VerifyResult::success();
        result.warnings = warnings;
        Ok(result)
    } else {
        warn!(
            "Ruleset verification failed (exit {:?}): {}",
            output.status.code(),
            stderr.trim()
        );
        let mut result = VerifyResult::failure(parse_restore_errors(&stderr));
        result.warnings = warnings;
        Ok(result)
    }
}

/// Parses loader stderr into user-facing messages
///
/// Strips the `iptables-restore vX.Y.Z: ` / `ip6tables-restore: ` banner the
/// loaders prefix to every line and drops warnings.
pub fn parse_restore_errors(stderr: &str) -> Vec<String> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_warning(line))
        .map(|line| strip_loader_prefix(line).to_string())
        .collect()
}

fn parse_restore_warnings(stderr: &str) -> Vec<String> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| is_warning(line))
        .map(|line| strip_loader_prefix(line).to_string())
        .collect()
}

fn is_warning(line: &str) -> bool {
    strip_loader_prefix(line)
        .to_ascii_lowercase()
        .starts_with("warning")
}

fn strip_loader_prefix(line: &str) -> &str {
    for loader in ["ip6tables-restore", "iptables-restore"] {
        if let Some(rest) = line.strip_prefix(loader) {
            // Optional version banner, e.g. "iptables-restore v1.8.9 (nf_tables): "
            return rest
                .split_once(": ")
                .map_or(rest, |(_, message)| message)
                .trim();
        }
    }
    line
}
