//! # Calculate Subcommand
//!
//! Taxes one line item against a catalog file, offline.
//!
//! ```bash
//! vtax calculate --catalog fixtures/voip-catalog.yaml \
//!     --service-type voip_fixed --amount 100.00 --city Austin --state TX --zip 78701
//!
//! # Item from a file, result as JSON:
//! vtax calculate --catalog catalog.yaml --item item.json --json
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;
use vtax_catalog::{load_catalog, LoadMode};
use vtax_core::{ClientId, ServiceType, Timestamp};
use vtax_engine::{CalculationItem, CalculationResult, CalculatorOptions, TaxCalculator};

use crate::address::AddressArgs;

#[derive(Args, Debug)]
pub struct CalculateArgs {
    /// Catalog file (.yaml, .yml or .json).
    #[arg(long)]
    pub catalog: PathBuf,

    /// Line item file (.json, .yaml or .yml). Replaces the item flags below.
    #[arg(long, conflicts_with_all = ["service_type", "amount"])]
    pub item: Option<PathBuf>,

    /// Service type, e.g. voip_fixed.
    #[arg(long, required_unless_present = "item")]
    pub service_type: Option<String>,

    /// Unit price.
    #[arg(long, required_unless_present = "item")]
    pub amount: Option<Decimal>,

    /// Units.
    #[arg(long, default_value = "1")]
    pub quantity: Decimal,

    /// Date to tax for (RFC 3339). Defaults to now.
    #[arg(long)]
    pub date: Option<String>,

    #[command(flatten)]
    pub address: AddressArgs,

    /// Lines, for per-line rates.
    #[arg(long)]
    pub lines: Option<u32>,

    /// Minutes of usage, for per-minute rates.
    #[arg(long)]
    pub minutes: Option<Decimal>,

    /// Client being billed, for exemptions.
    #[arg(long)]
    pub client: Option<Uuid>,

    /// Profile input as key=value; the value is parsed as JSON when possible.
    #[arg(long = "field", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,

    /// Fail instead of using the default category for unknown service types.
    #[arg(long)]
    pub strict_category: bool,

    /// Print the full result as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run_calculate(args: &CalculateArgs, out: &mut impl Write) -> Result<u8> {
    let loaded = load_catalog(&args.catalog, LoadMode::Strict)
        .with_context(|| format!("failed to load catalog {}", args.catalog.display()))?;
    let item = match &args.item {
        Some(path) => read_item(path)?,
        None => item_from_flags(args)?,
    };

    let options = CalculatorOptions {
        allow_default_category: !args.strict_category,
        ..CalculatorOptions::default()
    };
    let result = TaxCalculator::new(&loaded.catalog)
        .with_options(options)
        .calculate(item)
        .context("calculation failed")?;

    if args.json {
        serde_json::to_writer_pretty(&mut *out, &result)?;
        writeln!(out)?;
    } else {
        print_summary(&result, out)?;
    }
    Ok(0)
}

fn read_item(path: &Path) -> Result<CalculationItem> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read item file {}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
    if is_yaml {
        serde_yaml::from_str(&content)
            .with_context(|| format!("invalid line item in {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("invalid line item in {}", path.display()))
    }
}

fn item_from_flags(args: &CalculateArgs) -> Result<CalculationItem> {
    let (Some(service_type), Some(amount)) = (&args.service_type, args.amount) else {
        bail!("--service-type and --amount are required without --item");
    };
    let service_type = ServiceType::new(service_type.as_str())?;
    let date = match &args.date {
        Some(d) => Timestamp::parse(d)?,
        None => Timestamp::now(),
    };

    let mut item = CalculationItem::new(service_type, amount, date)
        .with_address(args.address.to_address());
    item.quantity = args.quantity;
    item.line_count = args.lines;
    item.minutes = args.minutes;
    item.client_id = args.client.map(ClientId::from_uuid);
    item.fields = parse_fields(&args.fields)?;
    Ok(item)
}

fn parse_fields(raw: &[String]) -> Result<BTreeMap<String, Value>> {
    raw.iter()
        .map(|pair| {
            let Some((key, value)) = pair.split_once('=') else {
                bail!("field '{pair}' is not KEY=VALUE");
            };
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| Value::String(value.to_string()));
            Ok((key.trim().to_string(), value))
        })
        .collect()
}

fn print_summary(result: &CalculationResult, out: &mut impl Write) -> Result<()> {
    writeln!(
        out,
        "{} ({}) taxable {}",
        result.service_type, result.category.name, result.taxable_amount
    )?;
    for line in &result.lines {
        writeln!(
            out,
            "  {:<14} {:<36} {:>12}{}",
            line.jurisdiction_code,
            line.tax_name,
            line.amount,
            if line.is_inclusive { " (inclusive)" } else { "" }
        )?;
    }
    for failure in &result.errors {
        writeln!(out, "  skipped: {} ({})", failure.tax_name, failure.reason)?;
    }
    for warning in &result.warnings {
        writeln!(out, "  warning: {}", serde_json::to_string(warning)?)?;
    }
    writeln!(out, "total tax:      {}", result.total_tax)?;
    writeln!(out, "final amount:   {}", result.final_amount)?;
    writeln!(out, "effective rate: {}%", result.effective_tax_rate)?;
    writeln!(out, "digest:         {}", result.digest)?;
    Ok(())
}
