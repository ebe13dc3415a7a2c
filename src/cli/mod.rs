pub mod scenarios;
pub mod shop;

use clap::{Parser, Subcommand};
use scenarios::Scenario;

#[derive(Parser)]
#[command(name = "memtx")]
#[command(about = "Transaction propagation scenarios over an in-memory database")]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Print reports as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one scenario
    Scenario {
        #[arg(value_enum)]
        name: Scenario,
    },
    /// Run every scenario in order
    All,
}
