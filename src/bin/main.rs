#![forbid(unsafe_code)]

use colored::*;

fn main() {
    println!("{}", "HomeLedger CLI".bright_cyan().bold());
    println!("{}", "--------------".bright_cyan());
    println!();
    println!(
        "{}",
        "Tamper-evident audit ledger for home-automation routines.".yellow()
    );
    println!(
        "{}",
        "Use 'cargo run --bin <binary_name>' to run a specific command.".yellow()
    );
    println!();
    println!("{}", "Available binaries:".bright_green().underline());
    println!("  - {}  {}", "ledger-cli".bright_white(), "init | record | verify | history | export".dimmed());
    println!("  - {}  {}", "ledger-daemon".bright_white(), "[config.toml] run scheduled routines".dimmed());
    println!();
    println!("{}", "Example:".bright_green().underline());
    println!("{}", "  cargo run --bin ledger-cli -- record play_music -m query=jazz".italic());
}
