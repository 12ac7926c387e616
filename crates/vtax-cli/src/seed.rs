//! # Seed Subcommand
//!
//! Emits the default catalog (federal jurisdiction, VoIP categories,
//! profiles and federal rates) for a company, ready to edit and load.
//!
//! ```bash
//! vtax seed --company 0b6f3c2e-0000-4000-8000-000000000001 --out catalog.yaml
//! vtax seed --company <uuid> --format json
//! ```

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use uuid::Uuid;
use vtax_catalog::loader::check;
use vtax_catalog::seed::default_catalog;
use vtax_catalog::LoadMode;
use vtax_core::{ActorId, CompanyId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SeedFormat {
    #[default]
    Yaml,
    Json,
}

#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Company the catalog belongs to.
    #[arg(long)]
    pub company: Uuid,

    /// When the federal rates take effect (RFC 3339). Defaults to now.
    #[arg(long)]
    pub effective_date: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = SeedFormat::Yaml)]
    pub format: SeedFormat,

    /// Write to this file instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run_seed(args: &SeedArgs, out: &mut impl Write) -> Result<u8> {
    let effective_date = match &args.effective_date {
        Some(d) => Timestamp::parse(d)?,
        None => Timestamp::now(),
    };
    let catalog = default_catalog(
        CompanyId::from_uuid(args.company),
        ActorId::from_uuid(Uuid::nil()),
        effective_date,
    )?;
    let loaded = check(catalog, LoadMode::Strict)?;

    let rendered = match args.format {
        SeedFormat::Yaml => serde_yaml::to_string(&loaded.catalog)?,
        SeedFormat::Json => {
            let mut s = serde_json::to_string_pretty(&loaded.catalog)?;
            s.push('\n');
            s
        }
    };

    match &args.out {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write catalog: {}", path.display()))?;
            writeln!(
                out,
                "wrote default catalog for {} to {} ({} rates)",
                loaded.catalog.company_id,
                path.display(),
                loaded.catalog.rates.len()
            )?;
        }
        None => out.write_all(rendered.as_bytes())?,
    }
    Ok(0)
}
