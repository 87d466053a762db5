//! Wallet side-panel snapshot: cached first paint, then balance and
//! recent activity through the TTL cache.
//!
//! Usage: cargo run --bin wallet_panel -- <WALLET> [--force]

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use solana_sdk::pubkey::Pubkey;

use market_wallet::config::settings::Settings;
use market_wallet::resolver::OwnershipResolver;
use market_wallet::wallet::{Direction, Outcome, TransactionSummary, WalletState};

#[derive(Parser)]
#[command(about = "Show a wallet's cached panel state, then refresh it")]
struct Args {
    /// Wallet address to inspect
    wallet: String,

    /// Settings file (defaults apply when it does not exist)
    #[arg(long, default_value = "config/settings.json")]
    settings: String,

    /// Bypass cache freshness and refetch everything
    #[arg(long)]
    force: bool,
}

fn print_row(row: &TransactionSummary) {
    let direction = match row.direction {
        Direction::Sent => "SENT",
        Direction::Received => "RECV",
        Direction::Other => "....",
    };
    let outcome = match row.outcome {
        Outcome::Success => "ok",
        Outcome::Failed => "FAILED",
    };
    let when = row
        .timestamp
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown time".to_string());
    println!(
        "  {} {} {:.6} SOL | {} | {}",
        direction,
        when,
        row.amount as f64 / LAMPORTS_PER_SOL as f64,
        outcome,
        row.signature
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let settings = Settings::load_or_default(&args.settings)?;
    let wallet = Pubkey::from_str(args.wallet.trim())?;

    let query = Arc::new(settings.chain_query());
    let resolver = OwnershipResolver::with_fetcher(query.clone(), settings.metadata_fetcher());
    let state = WalletState::with_resolver(query, settings.cache_store(), resolver)
        .with_activity_limit(settings.activity_limit);

    // First paint from whatever the cache still holds.
    let snapshot = state.hydrate(&wallet);
    println!("💾 Cached paint for {}:", wallet);
    match &snapshot.balance {
        Some(entry) => println!(
            "  balance {:.6} SOL ({:.0}s old)",
            entry.data as f64 / LAMPORTS_PER_SOL as f64,
            entry.age().as_secs_f64()
        ),
        None => println!("  no cached balance"),
    }
    match &snapshot.activity {
        Some(entry) => println!("  {} cached activity row(s)", entry.data.len()),
        None => println!("  no cached activity"),
    }
    match &snapshot.assets {
        Some(entry) => println!("  {} cached asset(s)", entry.data.len()),
        None => println!("  no cached assets"),
    }

    // Then the read-through path, forced or TTL-gated.
    let balance = state.balance(&wallet, args.force).await?;
    println!(
        "\n💰 Balance: {:.6} SOL ({} lamports)",
        balance as f64 / LAMPORTS_PER_SOL as f64,
        balance
    );

    let activity = state.activity(&wallet, args.force).await?;
    println!("\n📜 Recent activity ({} rows):", activity.len());
    for row in &activity {
        print_row(row);
    }

    let assets = state.assets(&wallet, args.force).await?;
    println!("\n🖼️ Owned NFTs ({}):", assets.len());
    for asset in &assets {
        let listed = if asset.listed { " [listed]" } else { "" };
        println!("  {}{}", asset.display_name(), listed);
    }

    Ok(())
}
