//! # Validate Subcommand
//!
//! Loads a catalog file and reports every validation finding.
//!
//! ```bash
//! vtax validate fixtures/voip-catalog.yaml
//! vtax validate catalog.json --json
//! ```
//!
//! Exits 1 when the catalog has blocking errors.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use vtax_catalog::{load_catalog, LoadMode};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Catalog file (.yaml, .yml or .json).
    pub catalog: PathBuf,

    /// Print the validation report as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run_validate(args: &ValidateArgs, out: &mut impl Write) -> Result<u8> {
    // Lenient so the full report is available; the exit code carries the verdict.
    let loaded = load_catalog(&args.catalog, LoadMode::Lenient)
        .with_context(|| format!("failed to load catalog {}", args.catalog.display()))?;
    let catalog = &loaded.catalog;
    let report = &loaded.validation;

    if args.json {
        serde_json::to_writer_pretty(&mut *out, report)?;
        writeln!(out)?;
    } else {
        writeln!(out, "catalog:        {}", args.catalog.display())?;
        writeln!(out, "company:        {}", catalog.company_id)?;
        writeln!(
            out,
            "contents:       {} jurisdictions, {} categories, {} profiles, {} rates",
            catalog.jurisdictions.len(),
            catalog.categories.len(),
            catalog.profiles.len(),
            catalog.rates.len()
        )?;
        for issue in &report.errors {
            writeln!(out, "  error:   {issue}")?;
        }
        for issue in &report.warnings {
            writeln!(out, "  warning: {issue}")?;
        }
        writeln!(
            out,
            "result:         {} ({} errors, {} warnings)",
            if report.is_valid { "valid" } else { "INVALID" },
            report.errors.len(),
            report.warnings.len()
        )?;
    }

    Ok(if report.is_valid { 0 } else { 1 })
}
