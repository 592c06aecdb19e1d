//! WOUDC API CLI - validate Extended CSV submissions and query the registry
//!
//! # Commands
//!
//! ```bash
//! woudc-api serve                          # Start HTTP server (port from env, default 5000)
//! woudc-api validate submission.csv        # Validate against the registry
//! woudc-api validate submission.csv --metadata-only
//! woudc-api parse submission.csv           # Parse only, print tables as JSON
//! woudc-api distinct --index instrument --fields name,model
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `woudc_api=info`).

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use woudc_api::query::distinct;
use woudc_api::{
    parse_extcsv_file, DistinctRequest, DistinctSpec, RegistryClient, Settings, ValidateOptions, Validator,
};

#[derive(Parser)]
#[command(name = "woudc-api")]
#[command(about = "Validate WOUDC Extended CSV submissions against the data registry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on (overrides WOUDC_API_BIND_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate an Extended CSV file against the registry
    Validate {
        /// Input Extended CSV file
        input: PathBuf,

        /// Skip the time-series check
        #[arg(long)]
        metadata_only: bool,

        /// Only check that the file parses
        #[arg(long)]
        skip_metadata: bool,
    },

    /// Parse an Extended CSV file and output its tables as JSON
    Parse {
        /// Input Extended CSV file
        input: PathBuf,
    },

    /// Distinct value groups of registry fields
    Distinct {
        /// Registry collection (e.g. instrument, station)
        #[arg(short, long)]
        index: String,

        /// Fields to group by, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        fields: Vec<String>,

        /// Extra fields to include from a representative document
        #[arg(short, long, value_delimiter = ',')]
        source: Option<Vec<String>>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("woudc_api=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { port } => cmd_serve(port).await,

        Commands::Validate {
            input,
            metadata_only,
            skip_metadata,
        } => cmd_validate(&input, metadata_only, skip_metadata).await,

        Commands::Parse { input } => cmd_parse(&input),

        Commands::Distinct { index, fields, source } => cmd_distinct(index, fields, source).await,
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn cmd_serve(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = Settings::from_env()?;
    if let Some(port) = port {
        settings.bind_port = port;
    }
    woudc_api::server::start_server(settings).await
}

async fn cmd_validate(
    input: &Path,
    metadata_only: bool,
    skip_metadata: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    let options = ValidateOptions {
        check_metadata: !skip_metadata,
        metadata_only,
    };

    let registry = RegistryClient::connect(&settings).await?;
    let validator = Validator::new(registry, settings.location.clone());
    let outcome = validator.validate_file(input, options).await?;

    let summary = outcome.summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !outcome.passed() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_parse(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let extcsv = parse_extcsv_file(input)?;

    let tables: Vec<Value> = extcsv
        .tables
        .iter()
        .map(|table| {
            let rows: Vec<Value> = table
                .rows
                .iter()
                .map(|row| json!(row.values.iter().map(|v| v.to_text()).collect::<Vec<_>>()))
                .collect();
            json!({
                "name": table.name,
                "line": table.line,
                "fields": table.fields,
                "rows": rows,
            })
        })
        .collect();

    let output = json!({ "encoding": extcsv.encoding, "tables": tables });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_distinct(
    index: String,
    fields: Vec<String>,
    source: Option<Vec<String>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    let registry = RegistryClient::connect(&settings).await?;

    let request = DistinctRequest {
        index,
        distinct: DistinctSpec::Fields(fields),
        source,
    };
    let response = distinct::execute(&registry, &request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
