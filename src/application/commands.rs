//! CLI commands and handlers
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{info, warn};

use crate::application::services::TrackerService;
use crate::config::Config;
use crate::domain::transactions::{
    NewTransaction, ReplacementReason, TransactionAction, TransactionRecord, TransactionType,
};
use crate::math;
use crate::shared::errors::{AmountError, AppError};

#[derive(Parser)]
#[command(name = "swapdesk")]
#[command(about = "DEX trade orchestration and transaction tracking")]
pub struct Cli {
    /// Path to Config.toml
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override the JSON-RPC endpoint
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    /// Override the active network
    #[arg(long, global = true)]
    pub chain_id: Option<u64>,

    /// Override the directory holding persisted records
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List tracked transactions and orders
    Transactions {
        /// Only records that are not final yet
        #[arg(long)]
        pending: bool,

        /// Include records older than the retention window
        #[arg(long)]
        all: bool,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start tracking a submitted transaction hash or order uid
    Track {
        id: String,

        /// Record type (tx, order)
        #[arg(short = 't', long = "type", default_value = "tx")]
        kind: String,

        /// trade, wrap, unwrap, approve, claim, invest, withdraw
        #[arg(short, long, default_value = "trade")]
        action: String,

        #[arg(short, long)]
        summary: Option<String>,
    },

    /// Point a record at the transaction that replaced it
    Replace {
        old_id: String,
        new_id: String,

        /// Record type (tx, order)
        #[arg(short = 't', long = "type", default_value = "tx")]
        kind: String,

        /// speed-up or cancel
        #[arg(short, long, default_value = "speed-up")]
        reason: String,
    },

    /// Forget every record of the active network
    Clear,

    /// Print the slippage bounds for an amount
    Bounds {
        amount: String,

        /// Token decimals
        #[arg(short, long, default_value_t = 18)]
        decimals: u32,

        /// Slippage tolerance as a fraction, defaults to the configured one
        #[arg(short, long)]
        slippage: Option<String>,
    },

    /// Poll pending records until Ctrl-C
    Watch {
        /// Poll interval in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,

        /// Run a single sweep and exit
        #[arg(long)]
        once: bool,
    },
}

/// Slippage-adjusted limits of one amount, in base units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlippageBounds {
    pub amount: u128,
    pub max_in: u128,
    pub min_out: u128,
}

pub fn slippage_bounds(
    amount: &str,
    decimals: u32,
    slippage: Decimal,
) -> Result<SlippageBounds, AmountError> {
    let amount = math::to_base_units(math::parse_amount(amount)?, decimals)?;
    Ok(SlippageBounds {
        amount,
        max_in: math::max_in(amount, slippage)?,
        min_out: math::min_out(amount, slippage)?,
    })
}

pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute the selected command
    pub async fn execute(command: Commands, config: Config) -> Result<(), AppError> {
        match command {
            Commands::Transactions { pending, all, json } => {
                Self::execute_transactions_command(pending, all, json, config).await
            }
            Commands::Track { id, kind, action, summary } => {
                Self::execute_track_command(id, kind, action, summary, config).await
            }
            Commands::Replace { old_id, new_id, kind, reason } => {
                Self::execute_replace_command(old_id, new_id, kind, reason, config).await
            }
            Commands::Clear => Self::execute_clear_command(config).await,
            Commands::Bounds { amount, decimals, slippage } => {
                Self::execute_bounds_command(amount, decimals, slippage, config)
            }
            Commands::Watch { interval, once } => {
                Self::execute_watch_command(interval, once, config).await
            }
        }
    }

    async fn execute_transactions_command(
        pending: bool,
        all: bool,
        json: bool,
        config: Config,
    ) -> Result<(), AppError> {
        let service = TrackerService::from_config(&config)?;
        let tracker = service.tracker();

        let records: Vec<TransactionRecord> = if pending {
            tracker.pending_transactions().await
        } else if all {
            let mut records: Vec<_> = tracker.all_transactions().await.into_values().collect();
            records.sort_by(|a, b| b.added_time.cmp(&a.added_time));
            records
        } else {
            tracker.transactions().await
        };

        if json {
            let out = serde_json::to_string_pretty(&records)
                .map_err(|e| AppError::Unknown(e.to_string()))?;
            println!("{}", out);
            return Ok(());
        }

        info!("📋 {} record(s) on network {}", records.len(), config.network.chain_id);
        for record in &records {
            println!(
                "{:<10} {:<5} {:<8} {}  {}",
                record.display_status().as_str(),
                record.kind().as_str(),
                record.action.label(),
                record.summary,
                tracker.explorer_link(&record.id, record.kind()),
            );
        }
        Ok(())
    }

    async fn execute_track_command(
        id: String,
        kind: String,
        action: String,
        summary: Option<String>,
        config: Config,
    ) -> Result<(), AppError> {
        let kind: TransactionType = kind.parse().map_err(config_error)?;
        let action: TransactionAction = action.parse().map_err(config_error)?;
        let service = TrackerService::from_config(&config)?;

        let record = service
            .tracker()
            .add_transaction(NewTransaction {
                summary: summary.unwrap_or_else(|| action.label().to_string()),
                id,
                kind,
                action,
                details: None,
                receipt: None,
            })
            .await?;

        info!("✅ Tracking {}", service.tracker().explorer_link(&record.id, kind));
        Ok(())
    }

    async fn execute_replace_command(
        old_id: String,
        new_id: String,
        kind: String,
        reason: String,
        config: Config,
    ) -> Result<(), AppError> {
        let kind: TransactionType = kind.parse().map_err(config_error)?;
        let reason: ReplacementReason = reason.parse().map_err(config_error)?;
        let service = TrackerService::from_config(&config)?;

        match service
            .tracker()
            .replace_transaction(&old_id, kind, &new_id, reason)
            .await?
        {
            Some(record) => info!("🔁 {} now tracked as {}", old_id, record.id),
            None => warn!("⚠️ No {} record with id {}", kind.as_str(), old_id),
        }
        Ok(())
    }

    async fn execute_clear_command(config: Config) -> Result<(), AppError> {
        let service = TrackerService::from_config(&config)?;
        service.tracker().clear_all_transactions().await?;
        info!("🧹 Cleared records of network {}", config.network.chain_id);
        Ok(())
    }

    fn execute_bounds_command(
        amount: String,
        decimals: u32,
        slippage: Option<String>,
        config: Config,
    ) -> Result<(), AppError> {
        let slippage = match slippage {
            Some(s) => math::parse_amount(&s)?,
            None => config.trade.slippage_tolerance,
        };
        let bounds = slippage_bounds(&amount, decimals, slippage)?;

        info!("📐 Bounds at {}% slippage:", slippage * Decimal::ONE_HUNDRED);
        println!("amount   {} ({})", amount, bounds.amount);
        println!(
            "max in   {} ({})",
            math::to_decimal(bounds.max_in, decimals)?,
            bounds.max_in
        );
        println!(
            "min out  {} ({})",
            math::to_decimal(bounds.min_out, decimals)?,
            bounds.min_out
        );
        Ok(())
    }

    async fn execute_watch_command(
        interval: Option<u64>,
        once: bool,
        config: Config,
    ) -> Result<(), AppError> {
        let service = TrackerService::from_config(&config)?;

        if once {
            let report = service.sweep_once().await?;
            info!(
                "✅ Checked {}, confirmed {}, failed {}, skipped {}",
                report.checked, report.confirmed, report.failed, report.skipped
            );
            return Ok(());
        }

        let interval =
            Duration::from_millis(interval.unwrap_or(config.tracker.block_poll_interval_ms));
        service
            .watch(interval, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
            })
            .await
    }
}

fn config_error(err: anyhow::Error) -> AppError {
    AppError::ConfigError(err.to_string())
}
