//! Ëtrid CLI
//!
//! Formatting utilities, wallet calculators and read-only chain queries.

mod config;
mod metrics;

use clap::{Parser, Subcommand};
use crate::config::{expand_path, CliConfig, LogFormat, LoggingSettings};
use etrid_client::Client;
use etrid_core::constants::{BLOCK_TIME_SECS, DECIMALS};
use etrid_core::format::{
    format_balance, format_compact, format_duration, format_hash, format_percentage,
    parse_balance, parse_compact, BalanceFormat,
};
use etrid_sdk::{Bridge, Chain, DistributionPay, LightningBloc};
use etrid_wallet::{collateral, position_health, validate_username};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "etrid")]
#[command(author = "Ëtrid Foundation")]
#[command(version)]
#[command(about = "Ëtrid SDK command-line tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "etrid.toml", env = "ETRID_CONFIG")]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render values for display
    Format {
        #[command(subcommand)]
        what: FormatCommands,
    },

    /// Parse display values back
    Parse {
        #[command(subcommand)]
        what: ParseCommands,
    },

    /// Lending calculators
    Calc {
        #[command(subcommand)]
        calc: CalcCommands,
    },

    /// Username checks
    Username {
        #[command(subcommand)]
        username: UsernameCommands,
    },

    /// Cross-chain bridge queries
    Bridge {
        #[command(subcommand)]
        bridge: BridgeCommands,
    },

    /// Lightning-Bloc payment channels
    Channel {
        #[command(subcommand)]
        channel: ChannelCommands,
    },

    /// Distribution Pay rewards
    Rewards {
        #[command(subcommand)]
        rewards: RewardsCommands,
    },

    /// Summarise the dashboard metrics snapshot
    Metrics {
        /// Override the configured snapshot URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum FormatCommands {
    /// Smallest-unit amount as a token balance
    Balance {
        amount: u128,
        #[arg(short, long, default_value_t = DECIMALS)]
        decimals: u8,
        #[arg(short, long, default_value = "ETR")]
        symbol: String,
        /// Round to four fraction digits
        #[arg(long)]
        compact: bool,
    },
    /// Number with K/M/B suffix
    Compact { value: f64 },
    /// Block count as a duration
    Duration {
        blocks: u64,
        #[arg(long, default_value_t = BLOCK_TIME_SECS)]
        block_time: u64,
    },
    /// Shortened hash
    Hash {
        hash: String,
        #[arg(long, default_value_t = 6)]
        prefix: usize,
        #[arg(long, default_value_t = 4)]
        suffix: usize,
    },
}

#[derive(Subcommand)]
enum ParseCommands {
    /// Decimal token amount to smallest units
    Balance {
        value: String,
        #[arg(short, long, default_value_t = DECIMALS)]
        decimals: u8,
    },
    /// K/M/B notation to a number
    Compact { value: String },
}

#[derive(Subcommand)]
enum CalcCommands {
    /// Health factor of a lending position
    Health {
        /// Collateral value
        collateral: f64,
        /// Borrowed value
        borrowed: f64,
        /// Liquidation threshold, percent
        #[arg(short, long, default_value_t = 80.0)]
        threshold: f64,
    },
    /// Collateral price at which the position is liquidated
    Liquidation {
        /// Borrowed value
        borrowed: f64,
        /// Collateral units
        amount: f64,
        /// Liquidation threshold, percent
        #[arg(short, long, default_value_t = 80.0)]
        threshold: f64,
    },
}

#[derive(Subcommand)]
enum UsernameCommands {
    /// Validate a username
    Check { name: String },
}

#[derive(Subcommand)]
enum BridgeCommands {
    /// Supported chains and their finality
    Chains,
    /// Fee quote for a transfer
    Fee {
        source: Chain,
        target: Chain,
        /// Amount in smallest units
        amount: u128,
    },
    /// Status of a bridge transfer
    Status { id: String },
}

#[derive(Subcommand)]
enum ChannelCommands {
    /// Channel record
    Get { id: String },
}

#[derive(Subcommand)]
enum RewardsCommands {
    /// Unclaimed rewards of an account
    Pending { address: String },
    /// Daily distribution schedule
    Schedule,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Effective configuration as TOML
    Show,
}

fn init_logging(verbose: bool, settings: &LoggingSettings) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
    };
    let json = settings.format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_writer(std::io::stderr)
        }))
        .init();
}

/// Print `value` as JSON, or `text` otherwise
fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

async fn connect(config: &CliConfig) -> anyhow::Result<Client> {
    tracing::debug!(endpoints = ?config.client.endpoints, "Connecting");
    Ok(Client::connect(config.client.clone()).await?)
}

fn etr(amount: u128) -> String {
    format_balance(amount, &BalanceFormat::new().compact())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = expand_path(&cli.config);
    let config = CliConfig::load(&config_path)?;
    init_logging(cli.verbose, &config.logging);
    let json = cli.json;

    match cli.command {
        Commands::Format { what } => match what {
            FormatCommands::Balance { amount, decimals, symbol, compact } => {
                let mut fmt = BalanceFormat::new().decimals(decimals).symbol(symbol);
                if compact {
                    fmt = fmt.compact();
                }
                println!("{}", format_balance(amount, &fmt));
            }
            FormatCommands::Compact { value } => println!("{}", format_compact(value)),
            FormatCommands::Duration { blocks, block_time } => {
                println!("{}", format_duration(blocks, block_time))
            }
            FormatCommands::Hash { hash, prefix, suffix } => {
                println!("{}", format_hash(&hash, prefix, suffix))
            }
        },

        Commands::Parse { what } => match what {
            ParseCommands::Balance { value, decimals } => {
                println!("{}", parse_balance(&value, decimals)?)
            }
            ParseCommands::Compact { value } => println!("{}", parse_compact(&value)?),
        },

        Commands::Calc { calc } => match calc {
            CalcCommands::Health { collateral, borrowed, threshold } => {
                let health = position_health(collateral, borrowed, threshold)?;
                println!("Health factor:   {:.2}", health.health_factor);
                println!("Status:          {}", health.status.name());
                println!("Borrow headroom: {:.2}", health.borrow_headroom);
            }
            CalcCommands::Liquidation { borrowed, amount, threshold } => {
                let price = collateral::liquidation_price(borrowed, amount, threshold)?;
                println!("Liquidation price: {:.4}", price);
            }
        },

        Commands::Username { username: UsernameCommands::Check { name } } => {
            match validate_username(&name) {
                Ok(()) => println!("'{}' is a valid username", name),
                Err(e) => anyhow::bail!("'{}' is not a valid username: {}", name, e),
            }
        }

        Commands::Bridge { bridge } => match bridge {
            BridgeCommands::Chains => {
                let chains: Vec<_> = Chain::ALL.iter().map(Chain::metadata).collect();
                emit(json, &chains, || {
                    chains
                        .iter()
                        .map(|c| {
                            format!(
                                "{:<6} {:<20} {:>3} confirmations  ~{}s",
                                c.symbol,
                                c.name,
                                c.required_confirmations,
                                c.finality_estimate().as_secs()
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                })?;
            }
            BridgeCommands::Fee { source, target, amount } => {
                let bridge = Bridge::new(connect(&config).await?);
                let fee = bridge.estimate_bridge_fee(source, target, amount).await?;
                emit(json, &fee, || {
                    format!(
                        "Base:      {}\nGas:       {}\nLiquidity: {}\nTotal:     {} ({})",
                        etr(fee.base_fee),
                        etr(fee.gas_fee),
                        etr(fee.liquidity_fee),
                        etr(fee.total_fee),
                        format_percentage(fee.fee_percentage, 2)
                    )
                })?;
            }
            BridgeCommands::Status { id } => {
                let bridge = Bridge::new(connect(&config).await?);
                let tx = bridge.get_bridge_status(&id).await?;
                emit(json, &tx, || {
                    format!(
                        "{} {} → {}: {} ({:?})",
                        tx.id,
                        tx.source_chain,
                        tx.target_chain,
                        etr(tx.amount),
                        tx.status
                    )
                })?;
            }
        },

        Commands::Channel { channel: ChannelCommands::Get { id } } => {
            let channels = LightningBloc::new(connect(&config).await?);
            let channel = channels.get_channel(&id).await?;
            emit(json, &channel, || {
                format!(
                    "Channel {} ({:?})\n  {}: {}\n  {}: {}\n  Capacity: {}\n  Expires at block {}",
                    channel.id,
                    channel.status,
                    channel.party_a,
                    etr(channel.balance_a),
                    channel.party_b,
                    etr(channel.balance_b),
                    etr(channel.capacity()),
                    channel.expires_at
                )
            })?;
        }

        Commands::Rewards { rewards } => {
            let distribution = DistributionPay::new(connect(&config).await?);
            match rewards {
                RewardsCommands::Pending { address } => {
                    let pending = distribution.get_pending_rewards(&address).await?;
                    emit(json, &pending, || {
                        let mut lines: Vec<String> = pending
                            .by_category
                            .iter()
                            .map(|(category, amount)| format!("{:<12} {}", category.name(), etr(*amount)))
                            .collect();
                        lines.push(format!("{:<12} {}", "total", etr(pending.total)));
                        lines.push(format!(
                            "Next distribution in {}",
                            format_duration(pending.seconds_until_next / BLOCK_TIME_SECS, BLOCK_TIME_SECS)
                        ));
                        lines.join("\n")
                    })?;
                }
                RewardsCommands::Schedule => {
                    let schedule = distribution.get_distribution_schedule().await?;
                    emit(json, &schedule, || {
                        let mut lines = vec![format!(
                            "Daily total {} at {}, next at block {}",
                            etr(schedule.total_daily),
                            schedule.distribution_time,
                            schedule.next_distribution
                        )];
                        lines.extend(schedule.categories.iter().map(|c| {
                            format!(
                                "{:<12} {:>6}  {}",
                                c.category.name(),
                                format_percentage(c.percentage as f64 / 100.0, 2),
                                etr(c.daily_amount)
                            )
                        }));
                        lines.join("\n")
                    })?;
                }
            }
        }

        Commands::Metrics { url } => {
            let url = url.unwrap_or_else(|| config.metrics.url.clone());
            let snapshot = metrics::fetch(&url, config.metrics.timeout()).await?;
            emit(json, &snapshot, || snapshot.summary().to_string())?;
        }

        Commands::Config { action: ConfigCommands::Show } => {
            println!("# {}", config_path.display());
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
