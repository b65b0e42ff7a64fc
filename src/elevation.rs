//! Privilege elevation for the packet-filter loader
//!
//! `iptables-restore --test` needs `CAP_NET_ADMIN` even though it never
//! commits anything. vpnfw runs unprivileged and only elevates that one call.
//!
//! # Elevation Strategy
//!
//! - **Root**: the loader runs directly
//! - **Preferred**: `run0` when available (systemd v256+, no SUID)
//! - **Fallback**: `sudo`
//!
//! # Environment Variables
//!
//! - `VPNFW_ELEVATION_METHOD`: Force `sudo` or `run0`. Useful for scripts with
//!   sudoers NOPASSWD rules.
//! - `VPNFW_RESTORE_COMMAND`: Loader binary to run instead of
//!   `iptables-restore` / `ip6tables-restore`.
//! - `VPNFW_TEST_NO_ELEVATION`: Bypass elevation entirely (for testing only).

use crate::core::cidr::Family;
use tokio::process::Command;

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    /// Invalid value for `VPNFW_ELEVATION_METHOD`
    #[error("Invalid VPNFW_ELEVATION_METHOD '{0}'. Valid options: sudo, run0")]
    InvalidMethod(String),

    /// Neither run0 nor sudo is installed
    #[error("No elevation method available - install sudo or run as root")]
    NoMethod,
}

/// Checks if a binary exists in PATH
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                if full_path.is_file() {
                    Some(full_path)
                } else {
                    None
                }
            })
        })
        .is_some()
}

/// Loader binary for `family`, honouring `VPNFW_RESTORE_COMMAND`
pub fn restore_program(family: Family) -> String {
    if let Ok(program) = std::env::var("VPNFW_RESTORE_COMMAND")
        && !program.is_empty()
    {
        return program;
    }
    match family {
        Family::V4 => "iptables-restore".to_string(),
        Family::V6 => "ip6tables-restore".to_string(),
    }
}

fn wrap(method: &str, program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(method);
    cmd.arg(program).args(args);
    cmd
}

fn build_elevated_command(program: &str, args: &[&str]) -> Result<Command, ElevationError> {
    // 1. Strict Test Mode Override (Highest Priority)
    if std::env::var("VPNFW_TEST_NO_ELEVATION").is_ok() {
        let mut cmd = Command::new(program);
        cmd.args(args);
        return Ok(cmd);
    }

    // 2. Explicit method, validated even when it ends up unused
    let forced = match std::env::var("VPNFW_ELEVATION_METHOD") {
        Ok(method) if !method.is_empty() => {
            let method = method.to_lowercase();
            if method != "sudo" && method != "run0" {
                return Err(ElevationError::InvalidMethod(method));
            }
            Some(method)
        }
        _ => None,
    };

    // 3. Direct Root Execution
    if nix::unistd::getuid().is_root() {
        let mut cmd = Command::new(program);
        cmd.args(args);
        return Ok(cmd);
    }

    if let Some(method) = forced {
        if !binary_exists(&method) {
            return Err(ElevationError::MethodNotAvailable(method));
        }
        return Ok(wrap(&method, program, args));
    }

    // 4. Automatic detection
    if binary_exists("run0") {
        return Ok(wrap("run0", program, args));
    }
    if binary_exists("sudo") {
        return Ok(wrap("sudo", program, args));
    }
    Err(ElevationError::NoMethod)
}

/// Creates an elevated loader command for `family` with the specified arguments
///
/// Arguments are passed directly without shell interpretation.
///
/// # Errors
///
/// Returns `Err` if elevation is needed but no usable method exists, or
/// `VPNFW_ELEVATION_METHOD` holds an unknown value.
pub fn create_elevated_restore_command(
    family: Family,
    args: &[&str],
) -> Result<Command, ElevationError> {
    build_elevated_command(&restore_program(family), args)
}

/// Whether stdin is an interactive terminal (sudo may prompt for a password)
pub fn is_interactive() -> bool {
    use std::os::fd::AsFd;
    nix::unistd::isatty(std::io::stdin().as_fd()).unwrap_or(false)
}
