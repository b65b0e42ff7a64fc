//! Firewall rule records and the pool policy compiler
//!
//! [`compile`] turns an ordered collection of [`Pool`]s into two ordered
//! statement sequences per address family: one for the `nat` table and one
//! for the `filter` table. Statement order is significant. The packet filter
//! evaluates first-match-wins, so every reject that must take precedence over
//! an accept is emitted before it.
//!
//! Compilation is a pure function of its input. Rendering to
//! `iptables-restore` text lives in [`crate::core::render`].
//!
//! # Chain layout
//!
//! ```text
//! nat     POSTROUTING  masquerade per NAT-enabled pool
//! filter  INPUT        established → icmp → loopback → ingress ports → reject
//!         FORWARD      established → per pool: jump to vpn-<id> → reject
//!         vpn-<id>     protocol blocks → client-to-client → default gateway | routes
//! ```
//!
//! # Example
//!
//! ```
//! use vpnfw::core::firewall::compile;
//!
//! let compiled = compile(&[], 4).unwrap();
//! assert!(compiled.nat_rules.is_empty());
//! assert_eq!(compiled.filter_rules.len(), 9);
//! ```

use crate::core::cidr::{CidrBlock, Family};
use crate::core::error::Result;
use crate::core::pool::{Pool, PortRange, Transport};
use serde::Serialize;
use tracing::debug;

pub const INPUT: &str = "INPUT";
pub const FORWARD: &str = "FORWARD";
pub const POSTROUTING: &str = "POSTROUTING";

/// Ports always open on the gateway itself: SSH, HTTP and HTTPS (which also
/// carries the TCP fallback of the VPN).
pub const BASE_INGRESS_PORTS: [IngressPort; 3] = [
    IngressPort::new(Transport::Tcp, 22),
    IngressPort::new(Transport::Tcp, 80),
    IngressPort::new(Transport::Tcp, 443),
];

/// Packet filter table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    #[strum(serialize = "nat")]
    Nat,
    #[strum(serialize = "filter")]
    Filter,
}

/// Connection tracking state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnState {
    #[strum(serialize = "NEW")]
    New,
    #[strum(serialize = "ESTABLISHED")]
    Established,
    #[strum(serialize = "RELATED")]
    Related,
}

/// Layer 4 protocol matched without a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum IpProtocol {
    #[strum(serialize = "icmp")]
    Icmp,
    #[strum(serialize = "ipv6-icmp")]
    Ipv6Icmp,
}

impl IpProtocol {
    /// ICMP flavour of the family, needed for path MTU discovery and diagnostics
    pub const fn icmp_for(family: Family) -> Self {
        match family {
            Family::V4 => IpProtocol::Icmp,
            Family::V6 => IpProtocol::Ipv6Icmp,
        }
    }
}

/// ICMP code sent back by a REJECT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum RejectWith {
    #[strum(serialize = "icmp-host-prohibited")]
    IcmpHostProhibited,
    #[strum(serialize = "icmp6-adm-prohibited")]
    Icmp6AdmProhibited,
}

impl RejectWith {
    /// Administrative prohibition code of the family
    pub const fn for_family(family: Family) -> Self {
        match family {
            Family::V4 => RejectWith::IcmpHostProhibited,
            Family::V6 => RejectWith::Icmp6AdmProhibited,
        }
    }
}

/// A single rule predicate. Predicates render in the order they are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Match {
    State(Vec<ConnState>),
    Protocol(IpProtocol),
    InInterface(String),
    OutInterface(String),
    Source(CidrBlock),
    Destination(CidrBlock),
    DestinationPort {
        transport: Transport,
        port: u16,
    },
    DestinationPorts {
        transport: Transport,
        ports: Vec<PortRange>,
    },
}

/// What happens to a packet that matches every predicate of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Accept,
    Reject(RejectWith),
    Masquerade,
    Jump(String),
}

/// A rule appended to a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleRecord {
    pub chain: String,
    pub matches: Vec<Match>,
    pub target: Target,
}

impl RuleRecord {
    pub fn new(chain: impl Into<String>, target: Target) -> Self {
        Self {
            chain: chain.into(),
            matches: Vec::new(),
            target,
        }
    }

    /// Appends a predicate after the existing ones
    pub fn with(mut self, predicate: Match) -> Self {
        self.matches.push(predicate);
        self
    }
}

/// One entry of a compiled table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    /// Declares a user-defined chain
    NewChain(String),
    Rule(RuleRecord),
}

impl From<RuleRecord> for Statement {
    fn from(rule: RuleRecord) -> Self {
        Statement::Rule(rule)
    }
}

/// A port opened on the gateway's INPUT chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngressPort {
    pub transport: Transport,
    pub port: u16,
}

impl IngressPort {
    pub const fn new(transport: Transport, port: u16) -> Self {
        Self { transport, port }
    }
}

impl std::fmt::Display for IngressPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.transport, self.port)
    }
}

/// Compiler output for one address family
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledFirewall {
    pub family: Family,
    pub nat_rules: Vec<Statement>,
    pub filter_rules: Vec<Statement>,
}

/// Compiles `pools` for the address family numbered `family` (4 or 6).
///
/// # Errors
///
/// Returns [`crate::Error::UnsupportedFamily`] for any other family number.
pub fn compile(pools: &[Pool], family: u8) -> Result<CompiledFirewall> {
    let family = Family::try_from(family)?;
    Ok(compile_family(pools, family))
}

/// Compiles `pools` for `family`. Identical input always yields identical output.
pub fn compile_family(pools: &[Pool], family: Family) -> CompiledFirewall {
    let nat_rules = nat_rules(pools, family);

    let mut filter_rules = Vec::with_capacity(8 + pools.len() * 4);
    add_input_chain(&mut filter_rules, pools, family);
    add_forward_chain(&mut filter_rules, pools, family);

    debug!(
        "Compiled {} nat and {} filter statements for {family} ({} pools)",
        nat_rules.len(),
        filter_rules.len(),
        pools.len()
    );

    CompiledFirewall {
        family,
        nat_rules,
        filter_rules,
    }
}

/// Distinct ingress ports: the base set followed by every UDP instance port,
/// in first-seen order.
///
/// TCP instances are not added, tcp/443 already covers the TCP fallback.
pub fn ingress_ports(pools: &[Pool]) -> Vec<IngressPort> {
    let mut ports = BASE_INGRESS_PORTS.to_vec();

    for instance in pools.iter().flat_map(|pool| &pool.instances) {
        if instance.proto != Transport::Udp {
            continue;
        }
        let port = IngressPort::new(Transport::Udp, instance.port);
        if !ports.contains(&port) {
            ports.push(port);
        }
    }

    ports
}

fn nat_rules(pools: &[Pool], family: Family) -> Vec<Statement> {
    // POSTROUTING cannot match on the input interface, only -s and -o
    pools
        .iter()
        .filter(|pool| pool.use_nat)
        .map(|pool| {
            RuleRecord::new(POSTROUTING, Target::Masquerade)
                .with(Match::Source(pool.range_for(family)))
                .with(Match::OutInterface(pool.ext_if.clone()))
                .into()
        })
        .collect()
}

fn established() -> Match {
    Match::State(vec![ConnState::Established, ConnState::Related])
}

fn add_input_chain(out: &mut Vec<Statement>, pools: &[Pool], family: Family) {
    out.push(RuleRecord::new(INPUT, Target::Accept).with(established()).into());
    out.push(
        RuleRecord::new(INPUT, Target::Accept)
            .with(Match::Protocol(IpProtocol::icmp_for(family)))
            .into(),
    );
    out.push(
        RuleRecord::new(INPUT, Target::Accept)
            .with(Match::InInterface("lo".to_string()))
            .into(),
    );

    for ingress in ingress_ports(pools) {
        out.push(
            RuleRecord::new(INPUT, Target::Accept)
                .with(Match::State(vec![ConnState::New]))
                .with(Match::DestinationPort {
                    transport: ingress.transport,
                    port: ingress.port,
                })
                .into(),
        );
    }

    out.push(RuleRecord::new(INPUT, Target::Reject(RejectWith::for_family(family))).into());
}

fn add_forward_chain(out: &mut Vec<Statement>, pools: &[Pool], family: Family) {
    out.push(RuleRecord::new(FORWARD, Target::Accept).with(established()).into());

    for pool in pools {
        if family == Family::V6 && !pool.forward6 {
            debug!("Pool '{}' has IPv6 forwarding disabled, skipping", pool.id);
            continue;
        }
        add_pool_chain(out, pool, family);
    }

    out.push(RuleRecord::new(FORWARD, Target::Reject(RejectWith::for_family(family))).into());
}

fn add_pool_chain(out: &mut Vec<Statement>, pool: &Pool, family: Family) {
    let chain = pool.chain_name();
    let source = pool.range_for(family);

    out.push(Statement::NewChain(chain.clone()));
    out.push(
        RuleRecord::new(FORWARD, Target::Jump(chain.clone()))
            .with(Match::InInterface(pool.tunnel_pattern()))
            .with(Match::Source(source))
            .into(),
    );

    // Blocks must precede every accept of the pool
    add_protocol_blocks(out, pool, family);

    if pool.client_to_client {
        out.push(
            RuleRecord::new(&chain, Target::Accept)
                .with(Match::OutInterface(pool.tunnel_pattern()))
                .with(Match::Destination(source))
                .into(),
        );
    }

    if pool.default_gateway {
        out.push(
            RuleRecord::new(&chain, Target::Accept)
                .with(Match::OutInterface(pool.ext_if.clone()))
                .into(),
        );
    } else {
        for route in pool.routes_for(family) {
            out.push(
                RuleRecord::new(&chain, Target::Accept)
                    .with(Match::OutInterface(pool.ext_if.clone()))
                    .with(Match::Destination(route.destination))
                    .into(),
            );
        }
    }
}

fn add_protocol_blocks(out: &mut Vec<Statement>, pool: &Pool, family: Family) {
    let chain = pool.chain_name();
    for block in pool.protocol_blocks() {
        for &transport in block.transports() {
            out.push(
                RuleRecord::new(&chain, Target::Reject(RejectWith::for_family(family)))
                    .with(Match::OutInterface(pool.ext_if.clone()))
                    .with(Match::DestinationPorts {
                        transport,
                        ports: block.ports().to_vec(),
                    })
                    .into(),
            );
        }
    }
}
