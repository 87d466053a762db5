//! Resolve a wallet's NFT holdings with listing status and metadata.
//!
//! Usage: cargo run --bin resolve_wallet -- <WALLET>

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use solana_sdk::pubkey::Pubkey;

use market_wallet::config::settings::Settings;
use market_wallet::market;
use market_wallet::resolver::{available_to_list, listed_assets, OwnershipResolver};

#[derive(Parser)]
#[command(about = "Resolve a wallet's NFT holdings with listing status")]
struct Args {
    /// Wallet address to resolve
    wallet: String,

    /// Settings file (defaults apply when it does not exist)
    #[arg(long, default_value = "config/settings.json")]
    settings: String,

    /// Also print every listing currently on the marketplace
    #[arg(long)]
    browse: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let settings = Settings::load_or_default(&args.settings)?;
    let wallet = Pubkey::from_str(args.wallet.trim())?;

    let query = Arc::new(settings.chain_query());
    let resolver = OwnershipResolver::with_fetcher(query.clone(), settings.metadata_fetcher());

    println!("🔎 Resolving holdings for {} via {}", wallet, settings.rpc_url);
    let assets = resolver.resolve(&wallet).await?;

    println!("\nFound {} NFT(s):", assets.len());
    for asset in &assets {
        let status = match (asset.listed, asset.price_lamports) {
            (true, Some(price)) => format!("LISTED at {:.4} SOL", price as f64 / LAMPORTS_PER_SOL as f64),
            (true, None) => "LISTED".to_string(),
            (false, _) => "not listed".to_string(),
        };
        println!("  {} | mint {} | {}", asset.display_name(), asset.mint, status);
        if let Some(meta) = &asset.metadata {
            if let Some(collection) = &meta.collection {
                println!("      collection: {}", collection);
            }
            for attr in &meta.attributes {
                println!("      {}: {}", attr.trait_type, attr.value);
            }
        }
    }

    println!(
        "\n✅ {} listed, {} available to list",
        listed_assets(&assets).len(),
        available_to_list(&assets).len()
    );

    if args.browse {
        println!("\n🛒 Marketplace listings:");
        let listings = market::fetch_all_listings(query.as_ref()).await?;
        for (address, listing) in &listings {
            println!(
                "  {} | mint {} | {:.4} SOL | seller {}",
                address,
                listing.mint,
                listing.price_sol(),
                listing.seller
            );
        }
        println!("  {} listing(s) total", listings.len());
    }

    Ok(())
}
