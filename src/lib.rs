//! vpnfw - multi-tenant VPN gateway network policy
//!
//! Compiles per-pool VPN policy into `iptables-restore` rulesets for IPv4
//! and IPv6.
//!
//! # Architecture
//!
//! - [`core`] - Address blocks, the pool model, the rule compiler and rendering
//! - [`config`] - Pool configuration loading and validation
//! - [`validators`] - Identifier, interface and port validation
//! - [`elevation`] - Privilege elevation for the loader's test mode
//! - [`utils`] - Utility functions (XDG directories, atomic writes)
//!
//! # Safety Features
//!
//! - Compilation is pure: no files, environment or kernel state are read
//! - Every identifier that reaches a rule line is validated first
//! - Optional dry run through `iptables-restore --test`
//! - Atomic file output with secure permissions

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod core;
pub mod elevation;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::cidr::{CidrBlock, Family};
pub use core::error::{CidrError, Error, Result};
pub use core::firewall::{CompiledFirewall, compile};
pub use core::pool::Pool;
