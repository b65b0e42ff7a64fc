//! vpnfw - multi-tenant VPN gateway network policy
//!
//! Compiles the configured VPN pools into `iptables-restore` rulesets.
//!
//! # Usage
//!
//! ```bash
//! vpnfw firewall                       # Print IPv4 and IPv6 rulesets
//! vpnfw firewall --family 6            # IPv6 only
//! vpnfw firewall --output-dir /etc/vpnfw --check
//! vpnfw firewall --format json         # Structured statements
//! vpnfw pools                          # List configured pools
//! vpnfw plan                           # Per-instance address plan
//! vpnfw cidr 10.42.43.12/23            # Inspect a block
//! vpnfw split fd00:4242:4242::/48 4    # Divide a block
//! ```
//!
//! Rule text goes to stdout, logs go to stderr.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use strum::IntoEnumIterator;
use tracing::{info, warn};
use vpnfw::core::cidr::{CidrBlock, Family};
use vpnfw::core::error::RestoreErrorPattern;
use vpnfw::core::firewall::CompiledFirewall;
use vpnfw::core::pool::Pool;
use vpnfw::core::verify::verify_ruleset;
use vpnfw::{Error, config, elevation, utils};

#[derive(Parser)]
#[command(name = "vpnfw")]
#[command(about = "Multi-tenant VPN gateway firewall compiler", long_about = None)]
struct Cli {
    /// Pool configuration file (default: ~/.config/vpnfw/pools.json)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the configured pools into iptables-restore rulesets
    Firewall {
        /// Address family (4 or 6); both when omitted
        #[arg(long)]
        family: Option<u8>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Write `iptables` and `ip6tables` files here instead of printing
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
        /// Dry-run the rulesets through iptables-restore --test first
        #[arg(long)]
        check: bool,
    },
    /// List configured pools
    Pools,
    /// Show the address range and tunnel of every instance
    Plan,
    /// Show the canonical form of an address block
    Cidr {
        /// Block in `address/prefix` notation
        block: String,
    },
    /// Divide an address block into equal sub-blocks
    Split {
        /// Block in `address/prefix` notation
        block: String,
        /// Number of sub-blocks (a power of two)
        count: usize,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if let Some(Error::Restore {
                stderr: Some(stderr),
                ..
            }) = e.downcast_ref::<Error>()
            {
                let translation = RestoreErrorPattern::match_error(stderr);
                eprintln!("{}", translation.user_message);
                for suggestion in &translation.suggestions {
                    eprintln!("  - {suggestion}");
                }
                if let Some(url) = &translation.help_url {
                    eprintln!("  See {url}");
                }
            }
            ExitCode::FAILURE
        }
    }
}

async fn handle_cli(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Firewall {
            family,
            format,
            output_dir,
            check,
        } => {
            let pools = load_configured_pools(cli.config.as_deref()).await?;
            let families: Vec<u8> = match family {
                Some(family) => vec![family],
                None => Family::iter().map(Family::number).collect(),
            };

            let mut compiled = Vec::with_capacity(families.len());
            for family in families {
                compiled.push(vpnfw::compile(&pools, family)?);
            }

            if check {
                check_rulesets(&compiled).await?;
            }

            if let Some(dir) = output_dir {
                tokio::fs::create_dir_all(&dir).await?;
                for firewall in &compiled {
                    let path = dir.join(rules_file_name(firewall.family));
                    utils::write_atomic(&path, &firewall.to_restore_text()).await?;
                    info!("Wrote {} ruleset to {}", firewall.family, path.display());
                }
            } else {
                match format {
                    OutputFormat::Text => {
                        for firewall in &compiled {
                            print!("{}", firewall.to_restore_text());
                        }
                    }
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&compiled)?);
                    }
                }
            }
        }
        Commands::Pools => {
            let pools = load_configured_pools(cli.config.as_deref()).await?;
            for pool in &pools {
                println!(
                    "{:<12} {:<8} {:<18} {:<28} {}",
                    pool.id,
                    pool.ext_if,
                    pool.range.to_string(),
                    pool.range6.to_string(),
                    policy_summary(pool)
                );
            }
        }
        Commands::Plan => {
            let pools = load_configured_pools(cli.config.as_deref()).await?;
            for pool in &pools {
                let plan = pool
                    .instance_ranges()
                    .map_err(|e| Error::config(&pool.id, e.to_string()))?;
                for entry in plan {
                    println!(
                        "{:<12} {:<15} {}/{:<6} {:<18} {}",
                        pool.id,
                        entry.tunnel,
                        entry.instance.proto,
                        entry.instance.port,
                        entry.range.to_string(),
                        entry.range6
                    );
                }
            }
        }
        Commands::Cidr { block } => {
            let block: CidrBlock = block.parse()?;
            println!("block:   {block}");
            println!("family:  {}", block.family());
            println!("network: {}", block.network());
            println!("prefix:  {}", block.prefix());
            if let Some(netmask) = block.netmask() {
                println!("netmask: {netmask}");
            }
            if let Some(hosts) = block.number_of_hosts() {
                println!("hosts:   {hosts}");
            }
        }
        Commands::Split { block, count } => {
            let block: CidrBlock = block.parse()?;
            for part in block.split(count)? {
                println!("{part}");
            }
        }
    }
    Ok(())
}

async fn load_configured_pools(
    path: Option<&Path>,
) -> Result<Vec<Pool>, Box<dyn std::error::Error>> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => utils::default_pools_path()
            .ok_or("Cannot determine configuration directory; pass --config")?,
    };
    Ok(config::load_pools(&path).await?)
}

async fn check_rulesets(compiled: &[CompiledFirewall]) -> Result<(), Error> {
    if !nix::unistd::getuid().is_root() && !elevation::is_interactive() {
        warn!("Not running as root and stdin is not a terminal; elevation may be unable to prompt");
    }

    for firewall in compiled {
        let result = verify_ruleset(&firewall.to_restore_text(), firewall.family).await?;
        for warning in &result.warnings {
            warn!("{}: {warning}", firewall.family);
        }
        if !result.success {
            return Err(Error::Restore {
                message: format!("{} ruleset rejected", firewall.family),
                stderr: Some(result.errors.join("\n")),
                exit_code: None,
            });
        }
        info!("{} ruleset passed verification", firewall.family);
    }
    Ok(())
}

fn rules_file_name(family: Family) -> &'static str {
    match family {
        Family::V4 => "iptables",
        Family::V6 => "ip6tables",
    }
}

fn policy_summary(pool: &Pool) -> String {
    let mut flags = Vec::new();
    if pool.use_nat {
        flags.push("nat".to_string());
    }
    if !pool.forward6 {
        flags.push("no-forward6".to_string());
    }
    if pool.client_to_client {
        flags.push("client-to-client".to_string());
    }
    if pool.default_gateway {
        flags.push("default-gateway".to_string());
    }
    for block in pool.protocol_blocks() {
        flags.push(format!("block-{block}"));
    }
    if flags.is_empty() {
        "-".to_string()
    } else {
        flags.join(",")
    }
}
