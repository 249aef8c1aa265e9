#![forbid(unsafe_code)]
//! Inspect and append to the HomeLedger audit chain

use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Color as TableColor;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use homeledger::cli::{format_timestamp, init_logging, load_audit_log_from_config, parse_metadata, short_seal};
use homeledger::persistence::{JsonFileStore, Persistence};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ledger (genesis block) if it does not exist yet
    Init,
    /// Seal an action into the ledger and flush it
    Record {
        /// Action name, e.g. trigger_alarm
        action: String,
        /// Extra metadata as key=value (repeatable)
        #[arg(short, long = "meta")]
        meta: Vec<String>,
    },
    /// Verify the integrity of the whole chain
    Verify,
    /// Show the most recent blocks
    History {
        /// Number of blocks to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Write the chain to a JSON file in the documented format
    Export {
        /// Destination file
        path: PathBuf,
    },
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init => {
            let (_config, log) = load_audit_log_from_config(config_path)?;
            log.flush()?;
            println!(
                "{} {} ({} blocks, difficulty {})",
                "✅ Ledger ready at".bright_green(),
                log.location().bright_white(),
                log.len(),
                log.difficulty()
            );
        }
        Commands::Record { action, meta } => {
            let metadata = parse_metadata(&meta)?;
            let (_config, log) = load_audit_log_from_config(config_path)?;

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
            spinner.set_message(format!("Mining block for {} at difficulty {}...", action, log.difficulty()));
            spinner.enable_steady_tick(Duration::from_millis(100));

            let start_time = Instant::now();
            let recorded = log.record_action(&action, metadata);
            spinner.finish_and_clear();
            let block = recorded?;
            log.flush()?;

            println!("{}", "⛏️  Block sealed".bright_green().bold());
            println!("  Index:       #{}", block.index);
            println!("  Seal:        {}", block.seal);
            println!("  Mining Time: {:.3} seconds", start_time.elapsed().as_secs_f64());
        }
        Commands::Verify => {
            let (config, log) = load_audit_log_from_config(config_path)?;
            if log.is_intact() {
                println!(
                    "{} {} blocks verified at difficulty {}",
                    "✅ Chain intact:".bright_green().bold(),
                    log.len(),
                    config.ledger.difficulty
                );
            } else {
                println!(
                    "{}",
                    "❌ Chain failed verification - see the log for the first broken block."
                        .red()
                        .bold()
                );
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::History { limit } => {
            let (_config, log) = load_audit_log_from_config(config_path)?;
            let blocks = log.snapshot();

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    Cell::new("Block").fg(TableColor::Cyan).add_attribute(Attribute::Bold),
                    Cell::new("Action").fg(TableColor::Cyan).add_attribute(Attribute::Bold),
                    Cell::new("Details").fg(TableColor::Cyan).add_attribute(Attribute::Bold),
                    Cell::new("Seal").fg(TableColor::Cyan).add_attribute(Attribute::Bold),
                    Cell::new("Date").fg(TableColor::Cyan).add_attribute(Attribute::Bold),
                ]);

            for block in blocks.iter().rev().take(limit) {
                let action = block
                    .payload
                    .get("action")
                    .and_then(|v| v.as_str())
                    .unwrap_or(if block.is_genesis() { "genesis" } else { "-" });
                let color = match block.payload.get("status").and_then(|v| v.as_str()) {
                    Some("error") => TableColor::Red,
                    Some("ok") => TableColor::Green,
                    _ => TableColor::White,
                };
                let details: Vec<String> = block
                    .payload
                    .iter()
                    .filter(|(k, _)| k.as_str() != "action")
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();

                table.add_row(vec![
                    Cell::new(format!("#{}", block.index)).fg(TableColor::White),
                    Cell::new(action).fg(color),
                    Cell::new(details.join(", ")).fg(TableColor::White),
                    Cell::new(short_seal(&block.seal)).fg(TableColor::Grey),
                    Cell::new(format_timestamp(block.timestamp)).fg(TableColor::Grey),
                ]);
            }

            println!("{}", table);
            println!("{} {} blocks total", "📜".bright_cyan(), blocks.len());
        }
        Commands::Export { path } => {
            let (_config, log) = load_audit_log_from_config(config_path)?;
            let store = JsonFileStore::new(&path);
            store.save_chain(&log.snapshot())?;
            println!("{} {}", "📦 Exported chain to".bright_green(), path.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}
