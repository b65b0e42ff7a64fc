use thiserror::Error;

/// Core error types for vpnfw
#[derive(Debug, Error)]
pub enum Error {
    /// Address block parsing or arithmetic failed
    #[error("CIDR error: {0}")]
    Cidr(#[from] CidrError),

    /// Compiler invoked for an address family other than 4 or 6
    #[error("unsupported address family: {0} (expected 4 or 6)")]
    UnsupportedFamily(u8),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Pool configuration failed validation
    #[error("Configuration error in pool '{pool}': {message}")]
    Config { pool: String, message: String },

    /// iptables-restore execution failed
    #[error("iptables-restore error: {message}")]
    Restore {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// Privilege escalation failed
    #[error("Elevation error: {0}")]
    Elevation(#[from] crate::elevation::ElevationError),

    /// Internal logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Builds a [`Error::Config`] for the named pool
    pub fn config(pool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            pool: pool.into(),
            message: message.into(),
        }
    }
}

/// Address block errors
///
/// Every variant carries the offending input so the caller can report it
/// without keeping the original string around.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CidrError {
    /// More than one `/` separator
    #[error("invalid address/prefix format: {0}")]
    InvalidFormat(String),

    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("IP prefix must be a number between 0 and {max}, got '{input}'")]
    InvalidPrefix { input: String, max: u8 },

    #[error("split count must be a positive power of two, got {0}")]
    InvalidSplitCount(usize),

    /// `width` is the longest prefix a sub-block may have: 32 for IPv4, 64 for IPv6
    #[error("splitting a /{prefix} into {count} blocks needs sub-blocks longer than /{width}")]
    PrefixOverflow { prefix: u8, count: usize, width: u8 },
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

/// Known iptables-restore failure messages and their translations
pub struct RestoreErrorPattern;

impl RestoreErrorPattern {
    /// Matches loader stderr against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("permission denied")
            || lower.contains("operation not permitted")
            || lower.contains("you must be root")
        {
            return ErrorTranslation::new("Insufficient permissions to test firewall rules")
                .with_suggestion("Run as root, or allow sudo/run0 for iptables-restore")
                .with_suggestion("Set VPNFW_ELEVATION_METHOD=sudo to force sudo")
                .with_suggestion("Check if CAP_NET_ADMIN capability is available");
        }

        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("iptables-restore is not installed or not found in PATH")
                .with_suggestion("Install iptables: sudo apt install iptables  (Debian/Ubuntu)")
                .with_suggestion("Or: sudo dnf install iptables  (Fedora/RHEL)")
                .with_suggestion("Or point VPNFW_RESTORE_COMMAND at the loader binary");
        }

        if lower.contains("xtables lock") || lower.contains("resource temporarily unavailable") {
            return ErrorTranslation::new("Another process holds the xtables lock")
                .with_suggestion("Another firewall manager may be modifying rules")
                .with_suggestion("Wait a moment and try again");
        }

        if lower.contains("couldn't load target") || lower.contains("couldn't load match") {
            return ErrorTranslation::new("Kernel module for a rule target or match is missing")
                .with_suggestion("Load the netfilter modules: sudo modprobe ip_tables ip6_tables")
                .with_suggestion("For MASQUERADE: sudo modprobe iptable_nat")
                .with_help("https://wiki.archlinux.org/title/Iptables");
        }

        if lower.contains("no chain/target/match by that name") {
            return ErrorTranslation::new("A rule jumps to a chain that was not declared")
                .with_suggestion("Check that every pool id is unique")
                .with_suggestion("Per-pool chains are declared before their jump rule");
        }

        if lower.contains("host/network") && lower.contains("not found") {
            return ErrorTranslation::new("Invalid IP address or network")
                .with_suggestion("Use proper CIDR format: 10.42.42.0/24 or fd00::/64")
                .with_suggestion("IPv4 ranges belong in 'range', IPv6 ranges in 'range6'");
        }

        if lower.contains("error occurred at line") || lower.contains("failed") {
            return ErrorTranslation::new("iptables-restore rejected the generated ruleset")
                .with_suggestion("Re-run with -vv to see the compiled statements")
                .with_suggestion("Check interface names and ports in the pool configuration")
                .with_help("https://man7.org/linux/man-pages/man8/iptables-restore.8.html");
        }

        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Check the detailed error message for more information")
            .with_help("https://man7.org/linux/man-pages/man8/iptables-restore.8.html")
    }
}

pub type Result<T> = std::result::Result<T, Error>;
