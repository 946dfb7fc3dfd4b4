// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Command Line
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! `scpn-transport`: run or validate a transport problem from JSON.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "scpn-transport")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Even-parity DG-SN neutron transport solver", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it.
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a problem and write a JSON summary
    Run(commands::run::RunArgs),
    /// Check a configuration without solving
    Validate(commands::validate::ValidateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .format_target(false)
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
