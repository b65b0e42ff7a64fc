//! Input validation for pool configuration
//!
//! Every identifier that ends up inside a rule line (pool ids, interface
//! names) passes through here first. Rule text is fed to the loader
//! verbatim, so anything outside these character sets is refused rather
//! than escaped.

/// Linux kernel interface name limit (IFNAMSIZ - 1)
pub const MAX_INTERFACE_LEN: usize = 15;

/// Validates a single port number.
///
/// # Errors
///
/// Returns `Err` if port is 0 (reserved).
pub fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        Err("Port must be between 1 and 65535".to_string())
    } else {
        Ok(port)
    }
}

/// Validates a network interface name.
///
/// Linux kernel interface name rules:
/// - Max 15 characters (IFNAMSIZ - 1)
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be "." or ".."
///
/// # Errors
///
/// Returns `Err` if the name is empty or violates kernel constraints.
pub fn validate_interface(name: &str) -> Result<&str, String> {
    if name.is_empty() {
        return Err("Interface name must not be empty".to_string());
    }

    if name.len() > MAX_INTERFACE_LEN {
        return Err(format!(
            "Interface name '{name}' too long (max {MAX_INTERFACE_LEN} characters)"
        ));
    }

    if name == "." || name == ".." {
        return Err("Invalid interface name".to_string());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(format!("Interface name '{name}' contains invalid characters"));
    }

    Ok(name)
}

/// Validates a pool identifier.
///
/// Ids become part of chain names (`vpn-<id>`) and tunnel interface names
/// (`tun-<id>-<n>`), so only `[A-Za-z0-9_-]` is allowed.
///
/// # Errors
///
/// Returns `Err` if the id is empty or contains other characters.
pub fn validate_pool_id(id: &str) -> Result<&str, String> {
    if id.is_empty() {
        return Err("Pool id must not be empty".to_string());
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        return Err("Pool id may only contain letters, digits, '-' and '_'".to_string());
    }

    Ok(id)
}
