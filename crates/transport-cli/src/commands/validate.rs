// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Validate Command
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::info;
use transport_core::discretization::Discretization;
use transport_types::config::ProblemConfig;

#[derive(Args)]
pub struct ValidateArgs {
    /// Problem configuration (JSON)
    #[arg(short, long)]
    pub config: PathBuf,
}

/// Parse the file and build the discretization, which runs every
/// structural and cross-section check short of solving.
pub fn execute(args: ValidateArgs) -> Result<()> {
    let path = args.config.display().to_string();
    let config = ProblemConfig::from_file(&path)
        .with_context(|| format!("failed to load configuration {path}"))?;
    let disc = Discretization::new(&config, 1)
        .with_context(|| format!("configuration {path} is invalid"))?;
    info!(
        "'{}' is valid: {} cells, {} components, {} dofs per component",
        config.name,
        disc.mesh.n_cells(),
        disc.n_components(),
        disc.n_dofs()
    );
    println!("{path}: OK");
    Ok(())
}
