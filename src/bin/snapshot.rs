//! One-shot snapshot tool
//!
//! Run with: cargo run --bin snapshot -- <account>
//!
//! Harvests the account's farm positions once, fetches the 24h pool
//! fees, and prints the result as a human summary or raw JSON.

use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use harvester::config::Config;
use harvester::farms::FarmRegistry;
use harvester::fees::{bad_pool_cache, FeeFetcher};
use harvester::store::FarmStore;
use harvester::{HarvestReport, Harvester, Multicall3Client};

#[derive(Parser)]
#[command(name = "snapshot")]
#[command(about = "One-shot dump of an account's farm positions and rewards")]
struct Cli {
    /// Account to snapshot
    account: String,

    /// Farm registry file (overrides FARMS_FILE)
    #[arg(short, long)]
    farms: Option<String>,

    /// Print the raw state as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(farms) = &cli.farms {
        config.farms_file = farms.clone();
    }

    let account = cli
        .account
        .parse()
        .map_err(|_| eyre!("Invalid account address: {}", cli.account))?;

    let registry = FarmRegistry::from_file(&config.farms_file)?;
    registry.validate()?;

    let chain = config.chain_info()?;
    if registry.chain_id != chain.chain_id {
        return Err(eyre!(
            "Farm registry {} is for chain {}, config wants chain {}",
            config.farms_file,
            registry.chain_id,
            chain.chain_id
        ));
    }

    if !cli.json {
        println!("📸 FARM SNAPSHOT");
        println!("================\n");
        println!("  Chain:   {} (id {})", chain.name, chain.chain_id);
        println!("  Account: {}", account);
        println!(
            "  Farms:   {} ({} pools)\n",
            registry.farms.len(),
            registry.total_pools()
        );
    }

    let rpc_url = config.resolve_rpc_url(&chain);
    let executor = Multicall3Client::for_chain(rpc_url, &chain);
    let harvester = Harvester::new(executor, chain.clone());
    let fees = FeeFetcher::new(
        chain.clone(),
        config.fee_endpoints(&chain),
        bad_pool_cache(config.bad_pool_ttl()),
    );
    let store = FarmStore::new();

    // Spinner draws to stderr, so JSON piping stays clean
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));

    spinner.set_message("Harvesting farm positions...");
    let guard = store.begin_run(chain.chain_id).await;
    let HarvestReport {
        user_info,
        nft_count,
        resolved_count,
        pair_count,
    } = harvester.harvest(account, &registry.farms).await?;
    guard.publish(registry.farms.clone(), user_info).await;

    spinner.set_message("Fetching 24h pool fees...");
    match fees.fetch_pool_fees(&registry.pool_addresses()).await {
        Ok((_, fee_map)) if !fee_map.is_empty() => {
            store.set_pool_fees(chain.chain_id, fee_map).await;
        }
        Ok(_) => {}
        Err(e) => spinner.println(format!("✗ Fee fetch failed: {}", e)),
    }
    spinner.finish_and_clear();

    let state = store.snapshot(chain.chain_id).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    // ============================================
    // POSITIONS
    // ============================================
    println!("═══════════════════════════════════════════════════");
    println!("                    POSITIONS                      ");
    println!("═══════════════════════════════════════════════════\n");

    for farm in &registry.farms {
        let label = if farm.name.is_empty() {
            farm.address.to_string()
        } else {
            format!("{} ({})", farm.name, farm.address)
        };
        println!("🌾 {}", label);

        let info = match state.user_info.get(&farm.address) {
            Some(info) => info,
            None => {
                println!("   (no data)\n");
                continue;
            }
        };

        if info.deposited_positions.is_empty() {
            println!("   No deposited positions\n");
            continue;
        }

        for position in &info.deposited_positions {
            println!(
                "   NFT #{} | {} | {:.2}% | ticks [{}, {}] | liquidity {}",
                position.nft_id,
                position.pool,
                position.fee as f64 / 10_000.0,
                position.tick_lower,
                position.tick_upper,
                position.liquidity
            );
        }

        let mut pids: Vec<u64> = info.joined_positions.keys().copied().collect();
        pids.sort_unstable();
        for pid in pids {
            for joined in &info.joined_positions[&pid] {
                println!(
                    "   {} pid {} | NFT #{} | staked liquidity {}",
                    style("⛏").green(),
                    pid,
                    joined.nft_id,
                    joined.liquidity
                );
            }
        }

        let rewards = info.rewards_by_token(farm);
        if rewards.is_empty() {
            println!("   Pending rewards: none\n");
        } else {
            println!("   Pending rewards:");
            for (token, amount) in rewards {
                match alloy_primitives::utils::format_units(amount, token.decimals) {
                    Ok(formatted) => println!("     💰 {} {}", formatted, token.symbol),
                    Err(_) => println!("     💰 {} {} (raw)", amount, token.symbol),
                }
            }
            println!();
        }
    }

    // ============================================
    // 24H POOL FEES
    // ============================================
    println!("═══════════════════════════════════════════════════");
    println!("                   24H POOL FEES                   ");
    println!("═══════════════════════════════════════════════════\n");

    if state.pool_fee_last_24h.is_empty() {
        println!("   No fee data\n");
    } else {
        for farm in &registry.farms {
            for pool in &farm.pools {
                if let Some(fees_usd) = state.pool_fee_last_24h.get(&pool.pool) {
                    println!("   pid {:>3} {}  ${:.2}", pool.pid, pool.pool, fees_usd);
                }
            }
        }
        println!();
    }

    println!(
        "✅ Snapshot complete: {} NFTs deposited, {} resolved, {} stakes queried",
        nft_count, resolved_count, pair_count
    );
    if let Some(at) = state.refreshed_at {
        println!("   as of {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    Ok(())
}
