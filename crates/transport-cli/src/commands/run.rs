// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Run Command
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::info;
use serde::Serialize;
use transport_core::balance::BalanceTally;
use transport_core::TransportSolver;
use transport_types::config::ProblemConfig;

#[derive(Args)]
pub struct RunArgs {
    /// Problem configuration (JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Summary output file; printed to stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of cell partitions
    #[arg(long, default_value = "1")]
    pub ranks: usize,
}

/// What the run writes out.
#[derive(Serialize)]
struct RunSummary<'a> {
    name: &'a str,
    k_eff: Option<f64>,
    inner_iterations: usize,
    outer_iterations: usize,
    solve_time_ms: f64,
    balance: &'a BalanceTally,
    /// Cell-averaged flux `[group][cell]`, x fastest.
    cell_flux: Vec<Vec<f64>>,
}

pub fn execute(args: RunArgs) -> Result<()> {
    let path = args.config.display().to_string();
    let config = ProblemConfig::from_file(&path)
        .with_context(|| format!("failed to load configuration {path}"))?;
    info!("problem '{}' from {path}", config.name);

    let solver = TransportSolver::with_partitions(config, args.ranks)
        .context("failed to set up the transport problem")?;
    let outcome = solver.run().context("transport solve failed")?;

    if let Some(k) = outcome.k_eff {
        info!("k_eff = {k:.6}");
    }
    let summary = RunSummary {
        name: &solver.config().name,
        k_eff: outcome.k_eff,
        inner_iterations: outcome.inner_iterations,
        outer_iterations: outcome.outer_iterations,
        solve_time_ms: outcome.solve_time_ms,
        balance: &outcome.balance,
        cell_flux: solver.cell_averages(&outcome),
    };
    let json = serde_json::to_string_pretty(&summary)?;

    match &args.output {
        Some(out) => {
            std::fs::write(out, json)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!("summary written to {}", out.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
