//! # Resolve Subcommand
//!
//! Lists the jurisdictions a catalog assigns to an address.
//!
//! ```bash
//! vtax resolve --catalog fixtures/voip-catalog.yaml --city Austin --state TX --zip 78701
//! vtax resolve --catalog catalog.yaml --lat 30.2672 --lon -97.7431 --json
//! ```

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use vtax_catalog::{load_catalog, JurisdictionType, LoadMode};
use vtax_core::JurisdictionId;
use vtax_engine::{find_jurisdictions_for_address, MatchKind};

use crate::address::AddressArgs;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Catalog file (.yaml, .yml or .json).
    #[arg(long)]
    pub catalog: PathBuf,

    #[command(flatten)]
    pub address: AddressArgs,

    /// Print the matches as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct Match<'a> {
    id: JurisdictionId,
    code: &'a str,
    name: &'a str,
    jurisdiction_type: JurisdictionType,
    priority: u32,
    matched_by: MatchKind,
}

pub fn run_resolve(args: &ResolveArgs, out: &mut impl Write) -> Result<u8> {
    let loaded = load_catalog(&args.catalog, LoadMode::Strict)
        .with_context(|| format!("failed to load catalog {}", args.catalog.display()))?;
    let address = args.address.to_address();
    let resolution = find_jurisdictions_for_address(&loaded.catalog, &address);

    let matches: Vec<Match<'_>> = resolution
        .matches
        .iter()
        .map(|m| Match {
            id: m.jurisdiction.id,
            code: &m.jurisdiction.code,
            name: &m.jurisdiction.name,
            jurisdiction_type: m.jurisdiction.jurisdiction_type,
            priority: m.jurisdiction.priority,
            matched_by: m.matched_by,
        })
        .collect();

    if args.json {
        serde_json::to_writer_pretty(
            &mut *out,
            &serde_json::json!({
                "jurisdictions": matches,
                "ambiguous": resolution.is_ambiguous(),
            }),
        )?;
        writeln!(out)?;
        return Ok(0);
    }

    for m in &matches {
        writeln!(
            out,
            "{:<4} {:<14} {:<18} {:<32} {}",
            m.priority,
            m.code,
            m.jurisdiction_type.as_str(),
            m.name,
            m.matched_by
        )?;
    }
    if resolution.is_ambiguous() {
        writeln!(out, "warning: only federal jurisdictions matched this address")?;
    }
    Ok(0)
}
