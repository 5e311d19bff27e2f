use anyhow::Context;
use clap::Parser;
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::{error, info};

use cctns_query_gateway::services::database::create_adapter_with_setup;
use cctns_query_gateway::storage::sample_dataset;
use cctns_query_gateway::{ExecutionStats, GatewayConfig, QueryMode, QueryOrchestrator};

#[derive(Parser)]
#[clap(name = "cctns-query-gateway")]
#[clap(version)]
#[clap(about = "Translate and safely run queries against CCTNS records", long_about = None)]
struct Cli {
    /// How the query text is handled.
    #[clap(long, value_enum, default_value_t = QueryMode::Standard)]
    mode: QueryMode,

    /// Run a SQL statement directly, skipping translation.
    #[clap(long, value_parser, conflicts_with = "text")]
    sql: Option<String>,

    /// Natural-language query, e.g. `Show crimes in Guntur district`.
    #[clap(required_unless_present = "sql")]
    text: Vec<String>,
}

impl Cli {
    fn query_text(&self) -> String {
        self.text.join(" ")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = GatewayConfig::from_env().context("Failed to load configuration")?;

    // Initialize logging
    let ansi = match config.logging.style.as_str() {
        "always" => true,
        "never" => false,
        _ => std::io::stderr().is_terminal(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .init();

    let catalog = Arc::new(config.load_catalog().map_err(|e| {
        error!("Failed to load schema catalog: {}", e);
        e
    })?);

    let setup = config.database.is_in_memory_sqlite().then(sample_dataset);
    if setup.is_some() {
        info!("Seeding in-memory store with the CCTNS sample dataset");
    }
    let adapter = create_adapter_with_setup(&config.database, setup.as_deref())?;

    let orchestrator =
        QueryOrchestrator::from_config(&config, catalog, adapter, Arc::new(ExecutionStats::new()));
    orchestrator
        .test_connection()
        .await
        .context("Database connection check failed")?;

    let result = match &cli.sql {
        Some(sql) => orchestrator.run_sql(sql).await,
        None => orchestrator.run(&cli.query_text(), cli.mode).await,
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    info!("Stats: {:?}", orchestrator.stats());

    if !result.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_query() {
        let cli =
            Cli::try_parse_from(["gateway", "--mode", "complex", "top", "5", "crimes"]).unwrap();
        assert_eq!(cli.mode, QueryMode::Complex);
        assert_eq!(cli.query_text(), "top 5 crimes");
        assert!(cli.sql.is_none());
    }

    #[test]
    fn test_parse_sql_and_errors() {
        let cli = Cli::try_parse_from(["gateway", "--sql", "SELECT 1"]).unwrap();
        assert_eq!(cli.sql.as_deref(), Some("SELECT 1"));
        assert_eq!(cli.mode, QueryMode::Standard);

        assert!(Cli::try_parse_from(["gateway"]).is_err());
        assert!(Cli::try_parse_from(["gateway", "--mode", "batch", "x"]).is_err());
        assert!(Cli::try_parse_from(["gateway", "--sql", "SELECT 1", "crimes"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
