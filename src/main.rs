//! The Harvester - Farm Position Watcher
//!
//! Run with: cargo run
//!
//! Loads a farm registry, then keeps the store fresh: deposited NFTs,
//! joined positions and pending rewards for the configured account,
//! plus each farmed pool's 24h fee snapshot.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use console::style;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use harvester::config::Config;
use harvester::driver::{RefreshDriver, WatchTarget};
use harvester::farms::FarmRegistry;
use harvester::fees::{bad_pool_cache, FeeFetcher};
use harvester::store::FarmStore;
use harvester::{Harvester, Multicall3Client};

#[derive(Parser)]
#[command(name = "harvester")]
#[command(about = "Watches an account's farm positions and pool fees")]
struct Cli {
    /// Configuration file path (TOML). Environment is used when absent.
    #[arg(short, long)]
    config: Option<String>,

    /// Account to watch (overrides config)
    #[arg(long)]
    account: Option<String>,

    /// Run a single refresh and exit
    #[arg(long)]
    once: bool,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🌾 THE HARVESTER - Farm Position Watcher").cyan().bold()
    );
    println!(
        "{}",
        style("    Multicall3 Batching | Ordered Publishes | 24h Pool Fees").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("harvester=info".parse()?),
        )
        .init();

    print_banner();

    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if cli.account.is_some() {
        config.account = cli.account.clone();
    }
    if cli.once {
        config.poll = false;
    }

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }

    config.print_summary();
    println!();

    // =============================================
    // PHASE 1: THE REGISTRY
    // =============================================
    println!();
    println!("{}", style("═══ PHASE 1: THE REGISTRY ═══").blue().bold());
    println!();

    println!("{}", style("Step 1.1: Loading farm registry...").blue());
    let start = Instant::now();

    let registry = FarmRegistry::from_file(&config.farms_file)?;
    registry.validate()?;
    if registry.chain_id != config.chain_id {
        return Err(eyre!(
            "Farm registry {} is for chain {}, config wants chain {}",
            config.farms_file,
            registry.chain_id,
            config.chain_id
        ));
    }

    println!(
        "{} Loaded {} farms ({} pools) in {:?}",
        style("✓").green(),
        registry.farms.len(),
        registry.total_pools(),
        start.elapsed()
    );
    for farm in &registry.farms {
        println!("   {} ({} pools)", farm.address, farm.pools.len());
    }

    // =============================================
    // PHASE 2: THE HARVESTER
    // =============================================
    println!();
    println!("{}", style("═══ PHASE 2: THE HARVESTER ═══").magenta().bold());
    println!();

    let chain = config.chain_info()?;
    let rpc_url = config.resolve_rpc_url(&chain);

    println!(
        "{} Chain: {} (id {})",
        style("✓").green(),
        chain.name,
        chain.chain_id
    );
    println!("{} RPC: {}", style("✓").green(), rpc_url);
    println!("{} Multicall3: {}", style("✓").green(), chain.multicall3);

    let executor = Multicall3Client::for_chain(rpc_url, &chain);
    let harvester = Harvester::new(executor, chain.clone());
    let fees = FeeFetcher::new(
        chain.clone(),
        config.fee_endpoints(&chain),
        bad_pool_cache(config.bad_pool_ttl()),
    );
    let store = Arc::new(FarmStore::new());

    let account = config.account_address()?;
    let target = WatchTarget {
        account,
        chain_id: config.chain_id,
    };
    match account {
        Some(account) => println!("{} Watching account {}", style("✓").green(), account),
        None => println!(
            "{}",
            style("○ No account configured - tracking pool fees only").yellow()
        ),
    }

    // =============================================
    // PHASE 3: THE WATCHER
    // =============================================
    println!();
    println!("{}", style("═══ PHASE 3: THE WATCHER ═══").green().bold());
    println!();

    if config.poll {
        let (_target_tx, target_rx) = tokio::sync::watch::channel(target);
        let driver = RefreshDriver::new(
            harvester,
            fees,
            Arc::clone(&store),
            registry,
            config.refresh_interval(),
            target_rx,
        );

        println!(
            "Refreshing every {}s. Ctrl-C to stop.",
            config.refresh_interval_secs
        );
        println!();

        tokio::select! {
            result = driver.run() => result?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!("Ctrl-C received, shutting down");
            }
        }
        return Ok(());
    }

    // Single pass
    if let Some(account) = account {
        println!("{}", style("Step 3.1: Harvesting farm positions...").green());
        let guard = store.begin_run(config.chain_id).await;
        match harvester.harvest(account, &registry.farms).await {
            Ok(report) => {
                println!(
                    "{} {} NFTs deposited, {} resolved, {} stakes queried",
                    style("✓").green(),
                    report.nft_count,
                    report.resolved_count,
                    report.pair_count
                );
                guard
                    .publish(registry.farms.clone(), report.user_info)
                    .await;
            }
            Err(e) => println!("{} Harvest failed: {}", style("✗").red(), e),
        }
    }

    println!("{}", style("Step 3.2: Fetching 24h pool fees...").green());
    match fees.fetch_pool_fees(&registry.pool_addresses()).await {
        Ok((block, fee_map)) if !fee_map.is_empty() => {
            println!(
                "{} Fees for {} pools at block {}",
                style("✓").green(),
                fee_map.len(),
                block
            );
            store.set_pool_fees(config.chain_id, fee_map).await;
        }
        Ok((block, _)) => println!("{} No fee data at block {}", style("○").yellow(), block),
        Err(e) => println!("{} Fee fetch failed: {}", style("✗").red(), e),
    }

    // =============================================
    // SUMMARY
    // =============================================
    let state = store.snapshot(config.chain_id).await;
    let deposited: usize = state
        .user_info
        .values()
        .map(|info| info.deposited_positions.len())
        .sum();
    let joined: usize = state.user_info.values().map(|info| info.joined_count()).sum();

    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!("{}", style(" ✅ REFRESH COMPLETE").green().bold());
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!();
    println!("Summary:");
    println!("  • Farms tracked: {}", registry.farms.len());
    println!("  • Deposited NFTs: {}", deposited);
    println!("  • Joined positions: {}", joined);
    println!("  • Pools with fee data: {}", state.pool_fee_last_24h.len());
    println!();

    for (farm_address, info) in &state.user_info {
        if !info.has_rewards() {
            continue;
        }
        let farm = match registry.farms.iter().find(|f| f.address == *farm_address) {
            Some(farm) => farm,
            None => continue,
        };

        println!("Pending rewards at {}:", style(farm_address).cyan());
        for (token, amount) in info.rewards_by_token(farm) {
            match alloy_primitives::utils::format_units(amount, token.decimals) {
                Ok(formatted) => println!("  • {} {}", formatted, token.symbol),
                Err(_) => println!("  • {} {} (raw)", amount, token.symbol),
            }
        }
    }

    Ok(())
}
