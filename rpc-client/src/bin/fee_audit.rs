use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fee_auditor::history::check_time_slice_for_upgrades;
use fee_auditor::types::Balance;
use fee_auditor::{
    get_block_array, verify_block_fees, verify_latest_block_fees, AuditConfig, AuditReport,
    ChainClient, HeightWaiters,
};
use fee_rpc_client::{RpcChainClient, RpcConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "fee-audit",
    about = "Reconciles block fees against treasury, balances and issuance"
)]
struct Cli {
    #[arg(long, env = "FEE_AUDIT_ENDPOINT", default_value = "ws://127.0.0.1:9944")]
    endpoint: String,
    /// JSON audit configuration; defaults apply when omitted.
    #[arg(long, env = "FEE_AUDIT_CONFIG")]
    config: Option<PathBuf>,
    /// Overrides the configured fetch concurrency.
    #[arg(long)]
    concurrency: Option<usize>,
    #[arg(long, default_value_t = 60)]
    request_timeout_secs: u64,
    /// Amount each payer moved besides fees, e.g. a known transfer value.
    #[arg(long, default_value_t = 0)]
    expected_balance_diff: Balance,
    /// Print the full report as JSON.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify an inclusive block range.
    Range {
        #[arg(long)]
        from: u32,
        #[arg(long)]
        to: u32,
    },
    /// Verify the current best block.
    Latest,
    /// Verify each new block as it arrives.
    Follow {
        #[arg(long, default_value_t = 1)]
        blocks: u32,
    },
    /// Verify the blocks of the last `period_ms` before the finalized head.
    Window {
        #[arg(long)]
        period_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AuditConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => AuditConfig::default(),
    };
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    config.validate().context("invalid audit configuration")?;

    let mut rpc = RpcConfig::with_endpoint(&cli.endpoint);
    rpc.request_timeout = Duration::from_secs(cli.request_timeout_secs);
    let client = Arc::new(
        RpcChainClient::connect_with_config(rpc)
            .await
            .context("failed to connect to node")?,
    );

    let diff = cli.expected_balance_diff;
    match cli.command {
        Command::Range { from, to } => {
            let report = verify_block_fees(&*client, &config, from, to, diff)
                .await
                .context("range audit failed")?;
            print_report(&report, cli.json)?;
        }
        Command::Latest => {
            let report = verify_latest_block_fees(&*client, &config, diff)
                .await
                .context("latest block audit failed")?;
            print_report(&report, cli.json)?;
        }
        Command::Follow { blocks } => follow(client, &config, blocks, diff, cli.json).await?,
        Command::Window { period_ms } => {
            window(&*client, &config, period_ms, diff, cli.json).await?
        }
    }
    Ok(())
}

async fn follow(
    client: Arc<RpcChainClient>,
    config: &AuditConfig,
    blocks: u32,
    diff: Balance,
    json: bool,
) -> Result<()> {
    let best = client.best_block().await.context("failed to read best block")?;
    let waiters = Arc::new(HeightWaiters::new(best.number));
    let heads = tokio::spawn({
        let client = client.clone();
        let waiters = waiters.clone();
        async move { client.drive_height_waiters(&waiters).await }
    });

    let mut last_audited = best.number;
    let mut remaining = blocks;
    while remaining > 0 {
        let heights = waiters
            .wait_past(last_audited)
            .await
            .context("stopped receiving new heads")?;
        let from = *heights.start();
        let to = (*heights.end()).min(last_audited.saturating_add(remaining));
        if to > from {
            info!(from, to, "catching up on heads imported during the last audit");
        }
        let report = verify_block_fees(&*client, config, from, to, diff)
            .await
            .with_context(|| format!("audit of #{from}..=#{to} failed"))?;
        print_report(&report, json)?;
        remaining -= to - from + 1;
        last_audited = to;
    }
    heads.abort();
    Ok(())
}

async fn window(
    client: &RpcChainClient,
    config: &AuditConfig,
    period_ms: u64,
    diff: Balance,
    json: bool,
) -> Result<()> {
    let numbers = get_block_array(client, period_ms, config.historic_search())
        .await
        .context("failed to resolve block window")?;
    let (Some(&from), Some(&to)) = (numbers.first(), numbers.last()) else {
        info!(period_ms, "no blocks in window");
        return Ok(());
    };

    let head = client.finalized_head().await?;
    let current = client.spec_version(head).await?;
    let upgrade = check_time_slice_for_upgrades(client, &numbers, current).await?;
    if upgrade.crosses_upgrade {
        warn!(
            from,
            previous = upgrade.spec_version,
            current,
            "window crosses a runtime upgrade"
        );
    }

    let report = verify_block_fees(client, config, from, to, diff)
        .await
        .with_context(|| format!("audit of #{from}..=#{to} failed"))?;
    print_report(&report, json)
}

fn print_report(report: &AuditReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "#{}..=#{}: fees {} burnt {} issuance {} -> {}",
        report.from,
        report.to,
        report.sum_block_fees(),
        report.sum_block_burnt(),
        report.issuance_before,
        report.issuance_after,
    );
    for gap in &report.gaps {
        println!("  block #{} skipped {}", gap.block, gap.gap);
    }
    Ok(())
}
