//! # vtax CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vtax_cli::calculate::{run_calculate, CalculateArgs};
use vtax_cli::resolve::{run_resolve, ResolveArgs};
use vtax_cli::seed::{run_seed, SeedArgs};
use vtax_cli::validate::{run_validate, ValidateArgs};

/// VoIP tax engine CLI.
///
/// Validates tax catalogs, resolves service addresses to taxing
/// jurisdictions and calculates VoIP taxes offline.
#[derive(Parser, Debug)]
#[command(name = "vtax", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a catalog file and report errors and warnings.
    Validate(ValidateArgs),

    /// List the jurisdictions that tax an address.
    Resolve(ResolveArgs),

    /// Calculate tax for one line item.
    Calculate(CalculateArgs),

    /// Emit the default catalog for a company.
    Seed(SeedArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut stdout = std::io::stdout().lock();
    let result = match cli.command {
        Commands::Validate(args) => run_validate(&args, &mut stdout),
        Commands::Resolve(args) => run_resolve(&args, &mut stdout),
        Commands::Calculate(args) => run_calculate(&args, &mut stdout),
        Commands::Seed(args) => run_seed(&args, &mut stdout),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn cli_parse_validate() {
        let cli = Cli::try_parse_from(["vtax", "validate", "catalog.yaml", "--json"]).unwrap();
        if let Commands::Validate(args) = cli.command {
            assert_eq!(args.catalog, PathBuf::from("catalog.yaml"));
            assert!(args.json);
        } else {
            panic!("expected validate");
        }
    }

    #[test]
    fn cli_parse_resolve_negative_longitude() {
        let cli = Cli::try_parse_from([
            "vtax", "resolve", "--catalog", "c.yaml", "--lat", "30.2672", "--lon", "-97.7431",
        ])
        .unwrap();
        if let Commands::Resolve(args) = cli.command {
            assert_eq!(args.address.longitude.unwrap().to_string(), "-97.7431");
        } else {
            panic!("expected resolve");
        }
    }

    #[test]
    fn cli_parse_calculate_requires_amount_without_item() {
        assert!(Cli::try_parse_from([
            "vtax", "calculate", "--catalog", "c.yaml", "--service-type", "voip_fixed",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "vtax", "calculate", "--catalog", "c.yaml", "--item", "item.json",
        ])
        .is_ok());
    }

    #[test]
    fn cli_parse_calculate_repeated_fields() {
        let cli = Cli::try_parse_from([
            "vtax", "calculate", "--catalog", "c.yaml", "--service-type", "voip_fixed",
            "--amount", "25", "--field", "line_count=2", "--field", "plan=pro",
        ])
        .unwrap();
        if let Commands::Calculate(args) = cli.command {
            assert_eq!(args.fields.len(), 2);
            assert_eq!(args.quantity.to_string(), "1");
        } else {
            panic!("expected calculate");
        }
    }

    #[test]
    fn cli_parse_seed_requires_company() {
        assert!(Cli::try_parse_from(["vtax", "seed"]).is_err());
    }

    #[test]
    fn cli_verbose_is_global() {
        let cli = Cli::try_parse_from(["vtax", "validate", "c.yaml", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
