mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::scenarios::{self, Scenario, ScenarioReport};
use cli::{Cli, Command};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let selected: Vec<Scenario> = match cli.command {
        Command::Scenario { name } => vec![name],
        Command::All => Scenario::all().to_vec(),
    };

    for scenario in selected {
        let report = scenarios::run(scenario)?;
        print_report(&report, cli.json)?;
    }

    Ok(())
}

fn print_report(report: &ScenarioReport, json: bool) -> Result<()> {
    if json {
        let rendered = serde_json::to_string_pretty(report).context("rendering report")?;
        println!("{}", rendered);
    } else {
        println!("{}\n", report);
    }
    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
