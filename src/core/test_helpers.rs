//! Shared test utilities for core module tests
//!
//! Provides common test helpers to avoid duplication across test suites.
//! This module is only compiled in test mode.

use crate::core::pool::{Instance, Pool, Route, Transport};
use std::sync::Mutex;

/// Mutex for tests that need exclusive access to environment variables.
///
/// Use this when your test needs to:
/// 1. Temporarily change env vars to different values
/// 2. Restore env vars after the test
/// 3. Test behavior when env vars are absent
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("VPNFW_ELEVATION_METHOD", "sudo");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("VPNFW_ELEVATION_METHOD");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// A pool with every policy flag off except `forward6`, no routes and no
/// instances.
pub fn create_test_pool(id: &str) -> Pool {
    Pool {
        id: id.to_string(),
        ext_if: "eth0".to_string(),
        use_nat: false,
        range: "10.42.42.0/24".parse().unwrap(),
        range6: "fd00:4242:4242:4242::/64".parse().unwrap(),
        forward6: true,
        client_to_client: false,
        default_gateway: false,
        block_smb: false,
        blocks: Vec::new(),
        routes: Vec::new(),
        instances: Vec::new(),
    }
}

/// A pool with custom ranges, otherwise like [`create_test_pool`]
pub fn create_pool_with_ranges(id: &str, range: &str, range6: &str) -> Pool {
    let mut pool = create_test_pool(id);
    pool.range = range.parse().unwrap();
    pool.range6 = range6.parse().unwrap();
    pool
}

pub fn udp_instance(port: u16) -> Instance {
    Instance {
        proto: Transport::Udp,
        port,
    }
}

pub fn tcp_instance(port: u16) -> Instance {
    Instance {
        proto: Transport::Tcp,
        port,
    }
}

pub fn route(destination: &str) -> Route {
    Route::new(destination.parse().unwrap())
}
