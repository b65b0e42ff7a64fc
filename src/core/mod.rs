//! Core network policy functionality
//!
//! This module contains the address arithmetic, the pool model and the rule
//! compiler. It provides:
//!
//! - [`cidr`]: CIDR blocks for both address families
//! - [`pool`]: Tenant pools and their policy flags
//! - [`firewall`]: Rule records and the pool policy compiler
//! - [`render`]: `iptables-restore` text output
//! - [`verify`]: Ruleset checking through the restore loader
//! - [`error`]: Error types and loader error translation

pub mod cidr;
pub mod error;
pub mod firewall;
pub mod pool;
pub mod render;
pub mod verify;

#[cfg(test)]
pub mod test_helpers;
