mod catalog;
mod commands;
mod config;
mod constants;
mod db;
mod error;
mod export;
mod graph;
mod logging;
mod merge;
mod orchestrator;
mod pgpass;
mod resolver;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::info;

use commands::connection::ConnectionArgs;
use commands::{ImportOpts, InspectOpts};
use error::PgmergeError;

#[derive(Parser)]
#[command(name = "pgmerge", author, version, about = "Merge CSV files into PostgreSQL tables as an idempotent upsert", long_about = None)]
struct Cli {
    /// Enable verbose output (info level)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress all non-essential output (error level only)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Enable debug output (debug level)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export each table (and configured subset) to a CSV file
    Export {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Directory to write CSV files into
        #[arg(default_value = "tmp")]
        directory: PathBuf,

        /// Tables to export; all tables in the schema if omitted
        tables: Vec<String>,
    },

    /// Import/merge each CSV file into its matching table
    #[command(alias = "upsert")]
    Import {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Proceed with import even though a dependency cycle was detected
        #[arg(long, short = 'f')]
        ignore_cycles: bool,

        /// Disable foreign key constraint checking during import (requires superuser)
        #[arg(long, short = 'F')]
        disable_foreign_keys: bool,

        /// Import only this single table, ignoring the `tables` argument
        #[arg(long)]
        single_table: Option<String>,

        /// Directory to read CSV files from
        #[arg(default_value = "tmp")]
        directory: PathBuf,

        /// Tables to import; every matching CSV in the directory if omitted
        tables: Vec<String>,
    },

    /// Read-only schema queries
    Inspect {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Output any issues detected in the database schema
        #[arg(long, short = 'w')]
        warnings: bool,

        /// List all tables found in the given schema
        #[arg(long = "list-tables", short = 't')]
        list_tables: bool,

        /// List all tables with column and foreign key information
        #[arg(long = "table-details")]
        table_details: bool,

        /// Find and list cycles in the foreign-key dependency graph
        #[arg(long, short = 'c')]
        cycles: bool,

        /// Output the insertion order of tables based on the dependency graph
        #[arg(long = "insert-order")]
        insert_order: bool,

        /// Partition and list sub-graphs of the dependency graph
        #[arg(long, short = 'p')]
        partition: bool,

        /// Output dot-format description of the dependency graph
        #[arg(long = "export-graph", short = 'x')]
        export_graph: bool,

        /// Output info related to how well tables support alternate-key transfers
        #[arg(long = "transferable")]
        transferable: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();
    let _guard = logging::init(&logging::Verbosity {
        verbose: cli.verbose,
        quiet: cli.quiet,
        debug: cli.debug,
    })
    .expect("failed to initialize logging");

    let result = tokio::select! {
        result = run(cli) => result,
        _ = wait_for_shutdown_signal() => {
            info!("received shutdown signal, rolling back any in-progress transaction");
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(pg_err) = err.downcast_ref::<PgmergeError>() {
                eprintln!("Error: {pg_err}");
                ExitCode::from(pg_err.exit_code() as u8)
            } else {
                eprintln!("Error: {err:?}");
                ExitCode::from(3)
            }
        }
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Export { connection, directory, tables } => {
            info!("Exporting tables to {}", directory.display());
            commands::cmd_export(&connection, &directory, &tables).await
        }
        Commands::Import {
            connection,
            ignore_cycles,
            disable_foreign_keys,
            single_table,
            directory,
            tables,
        } => {
            info!("Importing tables from {}", directory.display());
            let opts = ImportOpts {
                ignore_cycles,
                disable_foreign_keys,
                single_table,
            };
            commands::cmd_import(&connection, &directory, &tables, opts).await
        }
        Commands::Inspect {
            connection,
            warnings,
            list_tables,
            table_details,
            cycles,
            insert_order,
            partition,
            export_graph,
            transferable,
        } => {
            info!("Inspecting schema '{}'", connection.schema);
            let opts = InspectOpts {
                warnings,
                list_tables,
                table_details,
                cycles,
                insert_order,
                partition,
                export_graph,
                transferable,
            };
            commands::cmd_inspect(&connection, opts).await
        }
    }
}
