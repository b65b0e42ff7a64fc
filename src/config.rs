//! Pool configuration loading
//!
//! Pools come from a JSON document of the form `{ "pools": [ ... ] }`. The
//! order of the array is the order pools are compiled in.

use crate::core::cidr::Family;
use crate::core::error::{Error, Result};
use crate::core::pool::Pool;
use crate::validators::{validate_interface, validate_pool_id, validate_port};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Upper bound on configured pools
pub const MAX_POOLS: usize = 256;

/// iptables chain names are limited to 28 characters
const MAX_CHAIN_LEN: usize = 28;

/// On-disk pool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolsConfig {
    #[serde(default)]
    pub pools: Vec<Pool>,
}

/// Parses and validates a pools document.
///
/// # Errors
///
/// Returns [`Error::Serialization`] for malformed JSON (including malformed
/// CIDR blocks) and [`Error::Config`] for the first pool failing validation.
pub fn parse_pools(json: &str) -> Result<Vec<Pool>> {
    let config: PoolsConfig = serde_json::from_str(json)?;
    validate_pools(&config.pools)?;
    Ok(config.pools)
}

/// Checks a pool collection before it reaches the compiler.
///
/// # Errors
///
/// Returns [`Error::Config`] naming the first offending pool.
pub fn validate_pools(pools: &[Pool]) -> Result<()> {
    if pools.len() > MAX_POOLS {
        return Err(Error::config(
            &pools[MAX_POOLS].id,
            format!("too many pools (max {MAX_POOLS})"),
        ));
    }

    let mut seen = HashSet::with_capacity(pools.len());
    for pool in pools {
        validate_pool(pool)?;
        if !seen.insert(pool.id.as_str()) {
            return Err(Error::config(&pool.id, "duplicate pool id"));
        }
    }

    debug!("Validated {} pools", pools.len());
    Ok(())
}

fn validate_pool(pool: &Pool) -> Result<()> {
    let fail = |message: String| Error::config(&pool.id, message);

    validate_pool_id(&pool.id).map_err(fail)?;
    validate_interface(&pool.ext_if)
        .map_err(|e| fail(format!("external interface: {e}")))?;

    if pool.chain_name().len() > MAX_CHAIN_LEN {
        return Err(fail(format!(
            "chain name '{}' exceeds {MAX_CHAIN_LEN} characters",
            pool.chain_name()
        )));
    }

    // The highest-numbered tunnel is the longest name
    let tunnel = pool.tunnel_name(pool.instances.len().saturating_sub(1));
    validate_interface(&tunnel).map_err(|e| fail(format!("tunnel interface: {e}")))?;

    if pool.range.family() != Family::V4 {
        return Err(fail(format!("range must be an IPv4 block, got {}", pool.range)));
    }
    if pool.range6.family() != Family::V6 {
        return Err(fail(format!("range6 must be an IPv6 block, got {}", pool.range6)));
    }

    for instance in &pool.instances {
        validate_port(instance.port).map_err(|e| fail(format!("instance port: {e}")))?;
    }

    Ok(())
}

/// Loads and validates pools from `path`.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read, otherwise whatever
/// [`parse_pools`] reports.
pub async fn load_pools(path: &Path) -> Result<Vec<Pool>> {
    let json = tokio::fs::read_to_string(path).await?;
    let pools = parse_pools(&json)?;
    info!("Loaded {} pools from {}", pools.len(), path.display());
    Ok(pools)
}
