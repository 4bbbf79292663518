use anyhow::Result;
use clap::{Parser, Subcommand};
use fetch_core::{MetadataRequest, QueryRequest};
use fetch_orchestrator::RequestState;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::*;
use config::Overrides;

#[derive(Parser)]
#[command(name = "pfetch")]
#[command(author, version, about = "Fetch partitioned Flight SQL results", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Coordinator location, e.g. grpc+tcp://localhost:32010
    #[arg(long, global = true)]
    coordinator: Option<String>,

    /// Endpoints fetched at the same time (1 = sequential)
    #[arg(short = 'j', long, global = true)]
    max_concurrency: Option<usize>,

    /// Ticket presented to secondary locations of redirected endpoints
    #[arg(long, global = true)]
    derived_ticket: Option<String>,

    /// Bearer token sent with every call
    #[arg(long, global = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List flights
    Flights {
        /// Filter expression passed to the server
        #[arg(long)]
        criteria: Option<String>,
    },

    /// Execute a SQL query
    Query {
        /// SQL query to execute
        #[arg(short, long)]
        sql: String,
    },

    /// List tables
    Tables {
        #[arg(long)]
        catalog: Option<String>,

        /// Schema name pattern
        #[arg(long)]
        schema_pattern: Option<String>,

        /// Table name pattern
        #[arg(long)]
        table_pattern: Option<String>,

        /// Table types to include (repeatable)
        #[arg(long = "table-type")]
        table_types: Vec<String>,

        /// Include each table's Arrow schema
        #[arg(long)]
        include_schema: bool,
    },

    /// List schemas
    Schemas {
        #[arg(long)]
        catalog: Option<String>,

        /// Schema name pattern
        #[arg(long)]
        schema_pattern: Option<String>,
    },

    /// List catalogs
    Catalogs,

    /// List a table's primary keys
    PrimaryKeys {
        #[arg(long)]
        catalog: Option<String>,

        #[arg(long)]
        schema: Option<String>,

        #[arg(short, long)]
        table: String,
    },

    /// List supported data types
    TypeInfo {
        /// Restrict to one XDBC data type code
        #[arg(long)]
        data_type: Option<i32>,
    },

    /// Show server SQL info
    SqlInfo {
        /// Info codes to request (repeatable); all when omitted
        #[arg(long)]
        info: Vec<u32>,
    },

    /// Write the effective configuration to a file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "pfetch.json")]
        output: PathBuf,
    },
}

impl Commands {
    /// The request this command submits, if any
    fn into_request(self) -> Option<QueryRequest> {
        let request = match self {
            Commands::Flights { criteria } => MetadataRequest::ListFlights { criteria }.into(),
            Commands::Query { sql } => QueryRequest::Sql(sql),
            Commands::Tables {
                catalog,
                schema_pattern,
                table_pattern,
                table_types,
                include_schema,
            } => MetadataRequest::ListTables {
                catalog,
                db_schema_filter_pattern: schema_pattern,
                table_name_filter_pattern: table_pattern,
                table_types,
                include_schema,
            }
            .into(),
            Commands::Schemas {
                catalog,
                schema_pattern,
            } => MetadataRequest::ListSchemas {
                catalog,
                db_schema_filter_pattern: schema_pattern,
            }
            .into(),
            Commands::Catalogs => MetadataRequest::ListCatalogs.into(),
            Commands::PrimaryKeys {
                catalog,
                schema,
                table,
            } => MetadataRequest::ListPrimaryKeys {
                catalog,
                db_schema: schema,
                table,
            }
            .into(),
            Commands::TypeInfo { data_type } => MetadataRequest::ListTypeInfo { data_type }.into(),
            Commands::SqlInfo { info } => MetadataRequest::ListSqlInfo { info }.into(),
            Commands::InitConfig { .. } => return None,
        };
        Some(request)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;

    let overrides = Overrides {
        coordinator: cli.coordinator,
        max_concurrency: cli.max_concurrency,
        derived_ticket: cli.derived_ticket,
        token: cli.token,
    };
    let config = config::load(cli.config.as_deref(), &overrides)?;

    if let Commands::InitConfig { output } = &cli.command {
        return write_config(&config, output);
    }

    let Some(request) = cli.command.into_request() else {
        return Ok(());
    };

    match run_request(&config, request).await? {
        RequestState::Failed => std::process::exit(1),
        RequestState::Cancelled => std::process::exit(130),
        _ => Ok(()),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        "fetch_cli=debug,fetch_core=debug,fetch_flight=debug,fetch_orchestrator=debug"
    } else {
        "fetch_cli=info,fetch_orchestrator=warn,fetch_flight=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
