use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use labdesk_core::{MemoryStore, ResolverConfig};
use labdesk_identity::Resolver;
use labdesk_interpret::{classify, interpret_values, values_from_json, TestTemplate};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "labdesk",
    about = "Flag lab values against reference ranges and look up patient details."
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one value against a reference range.
    Classify {
        /// Entered value, e.g. "5.2".
        value: String,
        /// Reference range, e.g. "40 - 70", "<200" or ">40".
        range: String,
    },
    /// Interpret a result sheet from a test template and entered values.
    Sheet {
        /// Template JSON: a parameter array or a template object.
        #[arg(short, long)]
        template: PathBuf,
        /// Values JSON keyed by parameter name.
        #[arg(short, long)]
        values: PathBuf,
        /// Print the sheet as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Resolve a patient's name, age and gender from a table snapshot.
    Resolve {
        /// Snapshot JSON: `{ "table": [rows] }`.
        #[arg(long)]
        tables: PathBuf,
        /// Medical record number.
        #[arg(long, default_value = "")]
        mrno: String,
        /// Appointment identifier.
        #[arg(long)]
        appointment: Option<String>,
        /// Resolver config JSON; defaults apply to missing keys.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Compute ages as of this date (YYYY-MM-DD).
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "labdesk=info,labdesk_identity=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match args.command {
        Command::Classify { value, range } => run_classify(&value, &range),
        Command::Sheet {
            template,
            values,
            json,
        } => run_sheet(&template, &values, json),
        Command::Resolve {
            tables,
            mrno,
            appointment,
            config,
            as_of,
        } => run_resolve(&tables, &mrno, appointment.as_deref(), config.as_deref(), as_of).await,
    }
}

fn run_classify(value: &str, range: &str) -> anyhow::Result<()> {
    let result = classify(value, range);
    println!("Status: {}", result.status.as_str());
    if !result.flag().is_empty() {
        println!("Flag: {} {}", result.flag(), result.arrow());
    }
    if let Some(diagnostic) = result.diagnostic {
        println!("Note: {diagnostic:?}");
    }
    Ok(())
}

fn run_sheet(template: &Path, values: &Path, as_json: bool) -> anyhow::Result<()> {
    let template = TestTemplate::from_json_value(read_json(template)?)?;
    let values = values_from_json(read_json(values)?)?;
    let sheet = interpret_values(template, &values)?;
    let summary = sheet.interpretation();
    let missing = sheet.missing_required();

    if as_json {
        let output = json!({
            "sheet": sheet,
            "interpretation": summary,
            "missing_required": missing,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if let Some(name) = &sheet.test_name {
        println!("{name}");
    }
    for param in &sheet.parameters {
        let unit = param.unit.as_deref().unwrap_or("");
        let range = param.reference_range.as_deref().unwrap_or("-");
        let arrow = param.direction.map(|d| d.arrow()).unwrap_or("");
        println!(
            "  {:<24} {:>10} {:<12} [{}] {} {}",
            param.display_name, param.value, unit, range, param.flag, arrow
        );
    }
    println!(
        "Overall: {} (abnormal: {}, critical: {})",
        summary.overall_interpretation.as_str(),
        summary.abnormal,
        summary.critical
    );
    if !missing.is_empty() {
        println!("Missing required: {}", missing.join(", "));
    }
    Ok(())
}

async fn run_resolve(
    tables: &Path,
    mrno: &str,
    appointment: Option<&str>,
    config: Option<&Path>,
    as_of: Option<NaiveDate>,
) -> anyhow::Result<()> {
    if mrno.trim().is_empty() && appointment.map_or(true, |id| id.trim().is_empty()) {
        bail!("pass --mrno, --appointment or both");
    }

    let config = match config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read config {}", path.display()))?;
            ResolverConfig::from_json_str(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => ResolverConfig::default(),
    };

    let snapshot = std::fs::read_to_string(tables)
        .with_context(|| format!("Could not read tables {}", tables.display()))?;
    let store = MemoryStore::from_json_str(&snapshot)
        .with_context(|| format!("Invalid table snapshot {}", tables.display()))?;

    let mut resolver = Resolver::new(store, &config);
    if let Some(date) = as_of {
        resolver = resolver.as_of(date);
    }

    match resolver.resolve(mrno, appointment).await? {
        Some(identity) => {
            tracing::info!(
                mrno,
                source = identity.source.map(|s| s.label()),
                complete = identity.is_complete(),
                "patient resolved"
            );
            println!("{}", serde_json::to_string_pretty(&identity)?);
        }
        None => {
            tracing::info!(mrno, ?appointment, "patient not found");
            println!("Patient not found in any table.");
        }
    }
    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Invalid JSON in {}", path.display()))
}
