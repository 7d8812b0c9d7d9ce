#![forbid(unsafe_code)]
//! Demo driver: mines blocks carrying self-funded transfers, sweeps the mempool
//! in the background and prints the final mempool overview as JSON.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use utxo_ledger::config::load_config;
use utxo_ledger::crypto::{address_to_hex, KeyPair};
use utxo_ledger::miner::mine_block;
use utxo_ledger::{Ledger, LedgerContext, MempoolAdmission, Transaction};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply if it does not exist
    #[arg(long, default_value = "ledger.toml")]
    config: PathBuf,
    /// Number of blocks to mine after genesis
    #[arg(long, default_value_t = 5)]
    blocks: u64,
    /// Fee attached to each demo transfer, in base units
    #[arg(long, default_value_t = 1_000)]
    fee: u64,
    /// Seconds between mempool expiry sweeps
    #[arg(long, default_value_t = 5)]
    sweep_secs: u64,
    /// Maximum number of pending entries listed in the overview
    #[arg(long, default_value_t = 20)]
    overview_limit: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let context = LedgerContext::new(config).shared();
    let miner = KeyPair::generate()?;
    let ledger = Arc::new(Ledger::new(context.clone(), miner.address())?);
    info!(
        miner = %address_to_hex(&miner.address()),
        genesis = %hex::encode(ledger.tip_hash()),
        "ledger initialised"
    );

    let sweeper = {
        let ledger = ledger.clone();
        let period = Duration::from_secs(cli.sweep_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let report = ledger.mempool().remove_expired();
                if report.expired + report.orphans_expired > 0 {
                    info!(?report, "expired pending transactions");
                }
            }
        })
    };

    for _ in 0..cli.blocks {
        submit_demo_transfer(&ledger, &miner, cli.fee)?;

        let template = ledger.build_block_template(miner.address())?;
        let block = tokio::task::spawn_blocking(move || mine_block(template)).await??;
        let height = block.header.height;
        if let Err(err) = ledger.apply_block(block) {
            warn!(height, error = %err, "mined block was rejected");
        }
    }
    sweeper.abort();

    info!(
        height = ledger.height(),
        difficulty = ledger.difficulty(),
        issued = ledger.issued_supply(),
        balance = ledger.get_balance(&miner.address()),
        "mining finished"
    );
    let overview = ledger.get_mempool_overview(cli.overview_limit);
    println!("{}", serde_json::to_string_pretty(&overview)?);
    Ok(())
}

/// Sends a tenth of the miner's largest output to a throwaway address.
fn submit_demo_transfer(ledger: &Ledger, miner: &KeyPair, fee: u64) -> Result<(), Box<dyn std::error::Error>> {
    let sender = miner.address();
    let Some((outpoint, utxo)) = ledger
        .get_utxos_for_address(&sender)
        .into_iter()
        .max_by_key(|(_, utxo)| utxo.amount)
    else {
        return Ok(());
    };
    let amount = utxo.amount / 10;
    if amount == 0 || amount.saturating_add(fee) > utxo.amount {
        return Ok(());
    }

    let recipient = KeyPair::generate()?.address();
    let mut tx = Transaction::transfer(
        sender,
        recipient,
        amount,
        fee,
        ledger.get_next_nonce(&sender),
        ledger.context().clock.now_millis(),
        vec![outpoint],
    );
    tx.sign(miner)?;

    match ledger.submit_transaction(tx) {
        Ok(admission) => info!(?admission, amount, "demo transfer submitted"),
        Err(reason) => warn!(%reason, "demo transfer rejected"),
    }
    Ok(())
}
