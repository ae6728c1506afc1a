//! Binary entry point for pgdoc.
//!
//! Runs collection operations against a PostgreSQL database from the shell.
//! Filters, updates, projections and pipelines are passed as JSON arguments;
//! results are written to stdout as JSON lines.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use pgdoc::config::PgdocConfig;
use pgdoc::observability::{self, LoggingConfig};
use pgdoc::{DocumentDb, PostgresRowStore, SortDirection};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::ExitCode;

/// pgdoc - document-store queries over PostgreSQL JSONB tables.
#[derive(Parser)]
#[command(name = "pgdoc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database URL (overrides config and environment).
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Insert one document.
    Insert {
        /// Collection name.
        collection: String,
        /// Document as JSON.
        document: String,
    },

    /// List matching documents.
    Find {
        /// Collection name.
        collection: String,
        /// Filter as JSON.
        #[arg(short, long, default_value = "{}")]
        filter: String,
        /// Projection as JSON.
        #[arg(short, long)]
        projection: Option<String>,
        /// Sort key as `path` or `path:direction` (`1`, `-1`, `asc`, `desc`).
        /// Repeat for multiple keys.
        #[arg(short, long)]
        sort: Vec<String>,
        /// Maximum number of documents (defaults to the configured limit).
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show the first matching document.
    FindOne {
        /// Collection name.
        collection: String,
        /// Filter as JSON.
        #[arg(short, long, default_value = "{}")]
        filter: String,
        /// Projection as JSON.
        #[arg(short, long)]
        projection: Option<String>,
    },

    /// Update matching documents.
    Update {
        /// Collection name.
        collection: String,
        /// Filter as JSON.
        filter: String,
        /// Update as JSON (`$set`, `$inc`, `$push`, `$pull`).
        update: String,
        /// Update every match instead of the first.
        #[arg(long, conflicts_with = "upsert")]
        many: bool,
        /// Insert a document when nothing matches.
        #[arg(long)]
        upsert: bool,
    },

    /// Delete the first matching document.
    Delete {
        /// Collection name.
        collection: String,
        /// Filter as JSON.
        filter: String,
    },

    /// Count matching documents.
    Count {
        /// Collection name.
        collection: String,
        /// Filter as JSON.
        #[arg(short, long, default_value = "{}")]
        filter: String,
    },

    /// Run an aggregation pipeline.
    Aggregate {
        /// Collection name.
        collection: String,
        /// Pipeline as a JSON array of stages.
        pipeline: String,
        /// Maximum number of results.
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },

    /// Create the table and indexes for a collection.
    Provision {
        /// Collection name.
        collection: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = match PgdocConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };
    if let Some(url) = cli.database_url.clone() {
        config.database_url = Some(url);
    }

    if let Err(e) = observability::init(LoggingConfig::from_settings(&config.log, cli.verbose)) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command against a fresh connection pool.
async fn run_command(command: Commands, config: &PgdocConfig) -> anyhow::Result<()> {
    let db = DocumentDb::postgres(config)?;
    db.connect().await.context("connecting to database")?;

    let result = dispatch(&db, command).await;
    db.close().await;
    result
}

async fn dispatch(db: &DocumentDb<PostgresRowStore>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Insert {
            collection,
            document,
        } => {
            let doc = parse_json("document", &document)?;
            db.collection(&collection)?.insert_one(doc).await?;
            emit(&json!({"inserted": 1}))
        },

        Commands::Find {
            collection,
            filter,
            projection,
            sort,
            limit,
        } => {
            let filter = parse_json("filter", &filter)?;
            let projection = projection
                .as_deref()
                .map(|p| parse_json("projection", p))
                .transpose()?;

            let mut cursor = db
                .collection(&collection)?
                .find(&filter, projection.as_ref())?;
            for key in &sort {
                let (path, direction) = parse_sort_key(key)?;
                cursor = cursor.sort(path, direction);
            }
            let docs = cursor
                .to_list(limit.unwrap_or_else(|| db.default_find_limit()))
                .await?;
            docs.iter().try_for_each(emit)
        },

        Commands::FindOne {
            collection,
            filter,
            projection,
        } => {
            let filter = parse_json("filter", &filter)?;
            let projection = projection
                .as_deref()
                .map(|p| parse_json("projection", p))
                .transpose()?;
            let found = db
                .collection(&collection)?
                .find_one(&filter, projection.as_ref())
                .await?;
            emit(&found)
        },

        Commands::Update {
            collection,
            filter,
            update,
            many,
            upsert,
        } => {
            let filter = parse_json("filter", &filter)?;
            let update = parse_json("update", &update)?;
            let collection = db.collection(&collection)?;
            let result = if many {
                collection.update_many(&filter, &update).await?
            } else {
                collection.update_one(&filter, &update, upsert).await?
            };
            emit(&result)
        },

        Commands::Delete { collection, filter } => {
            let filter = parse_json("filter", &filter)?;
            let deleted = db.collection(&collection)?.delete_one(&filter).await?;
            emit(&json!({"deleted": deleted}))
        },

        Commands::Count { collection, filter } => {
            let filter = parse_json("filter", &filter)?;
            let count = db.collection(&collection)?.count_documents(&filter).await?;
            emit(&json!({"count": count}))
        },

        Commands::Aggregate {
            collection,
            pipeline,
            limit,
        } => {
            let Value::Array(stages) = parse_json("pipeline", &pipeline)? else {
                bail!("pipeline must be a JSON array of stages");
            };
            let docs = db
                .collection(&collection)?
                .aggregate(&stages)?
                .to_list(limit)
                .await?;
            docs.iter().try_for_each(emit)
        },

        Commands::Provision { collection } => {
            let collection = db.collection(&collection)?;
            collection.provision().await?;
            emit(&json!({"provisioned": collection.name().as_str()}))
        },
    }
}

/// Parses a JSON command-line argument.
fn parse_json(what: &str, text: &str) -> anyhow::Result<Value> {
    serde_json::from_str(text).with_context(|| format!("{what} is not valid JSON"))
}

/// Parses `path`, `path:1`, `path:-1`, `path:asc` or `path:desc`.
fn parse_sort_key(key: &str) -> anyhow::Result<(String, SortDirection)> {
    match key.rsplit_once(':') {
        Some((path, direction)) if !path.is_empty() => {
            let direction = SortDirection::parse(direction)
                .with_context(|| format!("invalid sort direction in '{key}'"))?;
            Ok((path.to_string(), direction))
        },
        Some(_) => bail!("sort key '{key}' has no field path"),
        None => Ok((key.to_string(), SortDirection::Ascending)),
    }
}

/// Writes one JSON line to stdout.
fn emit(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sort_key() {
        assert_eq!(
            parse_sort_key("created_at:-1").unwrap(),
            ("created_at".to_string(), SortDirection::Descending)
        );
        assert_eq!(
            parse_sort_key("meta.rank:asc").unwrap(),
            ("meta.rank".to_string(), SortDirection::Ascending)
        );
        assert_eq!(
            parse_sort_key("name").unwrap(),
            ("name".to_string(), SortDirection::Ascending)
        );
        assert!(parse_sort_key("name:sideways").is_err());
        assert!(parse_sort_key(":1").is_err());
    }

    #[test]
    fn test_parse_json_reports_argument() {
        let err = parse_json("filter", "{not json").unwrap_err();
        assert!(err.to_string().contains("filter"));
    }

    #[test]
    fn test_cli_parses_update_flags() {
        let cli = Cli::try_parse_from([
            "pgdoc",
            "update",
            "agents",
            r#"{"id":"a"}"#,
            r#"{"$set":{"n":1}}"#,
            "--upsert",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Update { upsert: true, many: false, .. }));

        let conflict = Cli::try_parse_from([
            "pgdoc", "update", "agents", "{}", "{}", "--many", "--upsert",
        ]);
        assert!(conflict.is_err());
    }
}
