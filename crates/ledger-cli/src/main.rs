// ============================================================================
// beehive-db — CLI inspection tool for the Beehive BCC ledger
// ============================================================================
// Usage:
//   beehive-db stats                         Show ledger statistics
//   beehive-db show --wallet 0x…             Balance breakdown for a wallet
//   beehive-db history --wallet 0x…          Unlock log for a wallet
//   beehive-db levels                        Print the membership level table
//   beehive-db export --format json          Export full ledger as JSON
//   beehive-db audit [--wallet 0x…]          Run reconciliation checks
// ============================================================================

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use ledger_core::{
    audit_all, audit_wallet, levels, BalanceBreakdown, LedgerDb, WalletAddress,
};
use tracing_subscriber::EnvFilter;

/// Beehive BCC ledger inspection tool
#[derive(Parser)]
#[command(name = "beehive-db", version, about = "Inspect and audit the Beehive BCC ledger")]
struct Cli {
    /// Path to the database file (default: ~/.beehive/ledger.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show ledger statistics (wallet count, pool totals, unlocks per level)
    Stats,

    /// Show a wallet's balance breakdown
    Show {
        /// Wallet address (0x…)
        #[arg(long)]
        wallet: String,
    },

    /// List a wallet's unlock log entries
    History {
        /// Wallet address (0x…)
        #[arg(long)]
        wallet: String,
    },

    /// Print the membership level config table
    Levels,

    /// Export full ledger contents as JSON
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Run reconciliation checks over the ledger
    Audit {
        /// Audit a single wallet instead of the whole ledger
        #[arg(long)]
        wallet: Option<String>,
    },
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db = LedgerDb::open(cli.db_path.as_deref())?;

    match cli.command {
        Commands::Stats => cmd_stats(&db),
        Commands::Show { wallet } => cmd_show(&db, &wallet),
        Commands::History { wallet } => cmd_history(&db, &wallet),
        Commands::Levels => cmd_levels(),
        Commands::Export { format } => cmd_export(&db, &format),
        Commands::Audit { wallet } => cmd_audit(&db, wallet.as_deref()),
    }
}

fn cmd_stats(db: &LedgerDb) -> Result<()> {
    let stats = db.stats()?;

    println!("=== Beehive BCC Ledger Stats ===");
    println!("Database: {}", db.path().display());
    println!();
    println!("Wallets:      {}", stats.total_wallets);
    println!("Transferable: {} BCC", stats.total_transferable);
    println!("Restricted:   {} BCC", stats.total_restricted);
    println!("Locked:       {} BCC", stats.total_locked);
    println!();
    println!("Unlocks:      {} total", stats.total_unlocks);

    let mut levels: Vec<_> = stats.unlocks_per_level.iter().collect();
    levels.sort();
    for (level, count) in levels {
        println!("  level {:<3} {}", level, count);
    }

    Ok(())
}

fn cmd_show(db: &LedgerDb, wallet: &str) -> Result<()> {
    let wallet = WalletAddress::parse(wallet)?;

    let record = match db.get_balance(wallet.as_str())? {
        Some(record) => record,
        None => {
            println!("No balance record for {}", wallet);
            return Ok(());
        }
    };
    let breakdown = BalanceBreakdown::from_record(&record);

    println!("=== {} ===", breakdown.wallet);
    println!("Transferable:  {} BCC", breakdown.transferable);
    println!("Restricted:    {} BCC", breakdown.restricted);
    println!("Locked:        {} BCC", breakdown.locked);
    println!("Total:         {} BCC", breakdown.total);
    println!();
    println!("Level:         {}", breakdown.current_level);
    println!(
        "Activation:    order {} (phase {:?})",
        breakdown.activation_order, breakdown.activation_phase
    );
    match (breakdown.next_unlock_level, breakdown.next_unlock_amount) {
        (Some(level), Some(amount)) => {
            println!("Next unlock:   level {} releases {} BCC", level, amount)
        }
        _ => println!("Next unlock:   none (max level reached)"),
    }
    println!("Last updated:  {}", format_timestamp(breakdown.last_updated));
    println!("Created:       {}", format_timestamp(breakdown.created_at));

    Ok(())
}

fn cmd_history(db: &LedgerDb, wallet: &str) -> Result<()> {
    let wallet = WalletAddress::parse(wallet)?;
    let entries = db.list_unlocks(wallet.as_str())?;

    if entries.is_empty() {
        println!("No unlock history for {}", wallet);
        return Ok(());
    }

    println!(
        "{:<6}  {:<8}  {:<22}  {}",
        "LEVEL", "AMOUNT", "UNLOCKED AT", "TX HASH"
    );
    println!("{}", "-".repeat(80));

    for entry in &entries {
        println!(
            "{:<6}  {:<8}  {:<22}  {}",
            entry.level,
            entry.amount,
            format_timestamp(entry.unlocked_at),
            entry.tx_hash.as_deref().unwrap_or("-")
        );
    }

    println!("\nTotal: {} unlocks", entries.len());
    Ok(())
}

fn cmd_levels() -> Result<()> {
    println!(
        "{:<6}  {:<20}  {:<20}  {:<10}  {}",
        "LEVEL", "SLUG", "TITLE", "PRICE", "UNLOCK"
    );
    println!("{}", "-".repeat(80));

    for config in &levels::LEVELS {
        println!(
            "{:<6}  {:<20}  {:<20}  ${:<9}  {} BCC",
            config.level,
            config.slug,
            config.title,
            config.price_usdt_cents / 100,
            config.base_unlock
        );
    }

    println!(
        "\nTotal base lockup: {} BCC, initial grant: {} BCC",
        levels::TOTAL_BASE_LOCKUP,
        levels::INITIAL_TRANSFERABLE_BCC
    );
    Ok(())
}

fn cmd_export(db: &LedgerDb, format: &str) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unsupported format '{}'. Only 'json' is supported.", format);
    }

    let stats = db.stats()?;
    let balances = db.list_balances()?;
    let unlocks = db.list_all_unlocks()?;

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "stats": stats,
        "balances": balances,
        "unlocks": unlocks,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}

fn cmd_audit(db: &LedgerDb, wallet: Option<&str>) -> Result<()> {
    let report = match wallet {
        Some(raw) => {
            let wallet = WalletAddress::parse(raw)?;
            audit_wallet(db, wallet.as_str())?
        }
        None => audit_all(db)?,
    };

    if report.is_clean() {
        println!(
            "Ledger is consistent ({} wallet(s) checked)",
            report.wallets_checked
        );
        return Ok(());
    }

    println!(
        "Found {} issue(s) across {} wallet(s):",
        report.findings.len(),
        report.wallets_checked
    );
    for finding in &report.findings {
        println!("  - {}", finding);
    }

    Ok(())
}
