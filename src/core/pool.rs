//! Pool policy model
//!
//! A [`Pool`] is a tenant group of VPN users sharing one address range and one
//! policy. Pools are read-only input to the rule compiler; their order in the
//! configuration is their order in the compiled ruleset.

use crate::core::cidr::{CidrBlock, Family};
use crate::core::error::CidrError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport protocol of a VPN instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[strum(serialize = "tcp")]
    Tcp,
    #[strum(serialize = "udp")]
    Udp,
}

/// Inclusive destination port range, rendered `start:end` as iptables expects
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub const fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// NetBIOS name/datagram/session service and SMB over TCP
const SMB_PORTS: &[PortRange] = &[PortRange::new(137, 139), PortRange::single(445)];

/// Outgoing traffic a pool may have blocked at its per-pool chain.
///
/// Blocks are rejected before any accept rule of the pool, in the order
/// [`Pool::protocol_blocks`] returns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolBlock {
    /// NetBIOS and SMB, which leak Windows credentials to remote hosts
    #[strum(serialize = "smb")]
    Smb,
}

impl ProtocolBlock {
    pub const fn transports(self) -> &'static [Transport] {
        match self {
            ProtocolBlock::Smb => &[Transport::Tcp, Transport::Udp],
        }
    }

    pub const fn ports(self) -> &'static [PortRange] {
        match self {
            ProtocolBlock::Smb => SMB_PORTS,
        }
    }
}

/// A destination network reachable through the external interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route {
    pub destination: CidrBlock,
}

impl Route {
    pub const fn new(destination: CidrBlock) -> Self {
        Self { destination }
    }

    pub const fn family(&self) -> Family {
        self.destination.family()
    }
}

/// One VPN server process of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub proto: Transport,
    pub port: u16,
}

/// Address assignment of a single instance, see [`Pool::instance_ranges`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceRange {
    pub instance: Instance,
    pub tunnel: String,
    pub range: CidrBlock,
    pub range6: CidrBlock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pool {
    pub id: String,
    /// External network interface
    pub ext_if: String,
    #[serde(default)]
    pub use_nat: bool,
    /// IPv4 range
    pub range: CidrBlock,
    /// IPv6 range
    pub range6: CidrBlock,
    #[serde(default = "default_true")]
    pub forward6: bool,
    #[serde(default)]
    pub client_to_client: bool,
    #[serde(default)]
    pub default_gateway: bool,
    /// Shorthand for listing `smb` in `blocks`
    #[serde(default)]
    pub block_smb: bool,
    #[serde(default)]
    pub blocks: Vec<ProtocolBlock>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

fn default_true() -> bool {
    true
}

impl Pool {
    /// The pool's address range for `family`
    pub fn range_for(&self, family: Family) -> CidrBlock {
        match family {
            Family::V4 => self.range,
            Family::V6 => self.range6,
        }
    }

    /// Name of the dedicated FORWARD sub-chain
    pub fn chain_name(&self) -> String {
        format!("vpn-{}", self.id)
    }

    /// Interface pattern matching the tunnel of every instance of this pool
    pub fn tunnel_pattern(&self) -> String {
        format!("tun-{}+", self.id)
    }

    /// Tunnel interface of the instance at `index`
    pub fn tunnel_name(&self, index: usize) -> String {
        format!("tun-{}-{index}", self.id)
    }

    /// Protocol blocks enabled for this pool, in rule order.
    ///
    /// `blocks` keeps its configured order with repeats dropped; `block_smb`
    /// adds SMB at the end unless it is already listed.
    pub fn protocol_blocks(&self) -> Vec<ProtocolBlock> {
        let mut blocks: Vec<ProtocolBlock> = Vec::with_capacity(self.blocks.len() + 1);
        for &block in &self.blocks {
            if !blocks.contains(&block) {
                blocks.push(block);
            }
        }
        if self.block_smb && !blocks.contains(&ProtocolBlock::Smb) {
            blocks.push(ProtocolBlock::Smb);
        }
        blocks
    }

    pub fn routes_for(&self, family: Family) -> impl Iterator<Item = &Route> {
        self.routes.iter().filter(move |r| r.family() == family)
    }

    /// Assigns every instance its share of both ranges, in instance order.
    ///
    /// The IPv4 range is divided evenly; each instance gets one /64 of the
    /// IPv6 range (see [`CidrBlock::split`]).
    ///
    /// # Errors
    ///
    /// Propagates [`CidrBlock::split`] errors: the instance count must be a
    /// power of two that fits the range.
    pub fn instance_ranges(&self) -> Result<Vec<InstanceRange>, CidrError> {
        if self.instances.is_empty() {
            return Ok(Vec::new());
        }

        let count = self.instances.len();
        let ranges = self.range.split(count)?;
        let ranges6 = self.range6.split(count)?;

        Ok(self
            .instances
            .iter()
            .zip(ranges.into_iter().zip(ranges6))
            .enumerate()
            .map(|(index, (instance, (range, range6)))| InstanceRange {
                instance: *instance,
                tunnel: self.tunnel_name(index),
                range,
                range6,
            })
            .collect())
    }
}
