//! iptables-restore text rendering
//!
//! The only place compiled statements become text. Statements are written in
//! exactly the order the compiler produced them.

use crate::core::firewall::{CompiledFirewall, Match, RuleRecord, Statement, Table, Target};
use std::fmt::{self, Write};

/// Built-in chains declared at the top of each table
const NAT_CHAINS: [&str; 4] = ["PREROUTING", "INPUT", "OUTPUT", "POSTROUTING"];
const FILTER_CHAINS: [&str; 3] = ["INPUT", "FORWARD", "OUTPUT"];

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Match::State(states) => {
                let states: Vec<String> = states.iter().map(ToString::to_string).collect();
                write!(f, "-m state --state {}", states.join(","))
            }
            Match::Protocol(protocol) => write!(f, "-p {protocol}"),
            Match::InInterface(name) => write!(f, "-i {name}"),
            Match::OutInterface(name) => write!(f, "-o {name}"),
            Match::Source(block) => write!(f, "-s {block}"),
            Match::Destination(block) => write!(f, "-d {block}"),
            Match::DestinationPort { transport, port } => {
                write!(f, "-m {transport} -p {transport} --dport {port}")
            }
            Match::DestinationPorts { transport, ports } => {
                let ports: Vec<String> = ports.iter().map(ToString::to_string).collect();
                write!(f, "-m multiport -p {transport} --dports {}", ports.join(","))
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Accept => write!(f, "-j ACCEPT"),
            Target::Reject(code) => write!(f, "-j REJECT --reject-with {code}"),
            Target::Masquerade => write!(f, "-j MASQUERADE"),
            Target::Jump(chain) => write!(f, "-j {chain}"),
        }
    }
}

impl fmt::Display for RuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-A {}", self.chain)?;
        for predicate in &self.matches {
            write!(f, " {predicate}")?;
        }
        write!(f, " {}", self.target)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::NewChain(name) => write!(f, "-N {name}"),
            Statement::Rule(rule) => fmt::Display::fmt(rule, f),
        }
    }
}

/// Writes one `*table ... COMMIT` stanza
pub fn write_table(out: &mut String, table: Table, statements: &[Statement]) {
    let chains: &[&str] = match table {
        Table::Nat => &NAT_CHAINS,
        Table::Filter => &FILTER_CHAINS,
    };

    let _ = writeln!(out, "*{table}");
    for chain in chains {
        let _ = writeln!(out, ":{chain} ACCEPT [0:0]");
    }
    for statement in statements {
        let _ = writeln!(out, "{statement}");
    }
    let _ = writeln!(out, "COMMIT");
}

impl CompiledFirewall {
    /// Renders both tables in `iptables-restore` format.
    pub fn to_restore_text(&self) -> String {
        let mut out = String::new();
        write_table(&mut out, Table::Nat, &self.nat_rules);
        write_table(&mut out, Table::Filter, &self.filter_rules);
        out
    }

    /// Rendered rule lines of one table, without the stanza framing
    pub fn rule_lines(&self, table: Table) -> Vec<String> {
        let statements = match table {
            Table::Nat => &self.nat_rules,
            Table::Filter => &self.filter_rules,
        };
        statements.iter().map(ToString::to_string).collect()
    }
}
