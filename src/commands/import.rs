//! `pgmerge import` (alias `upsert`): merge CSV files from a directory into matching
//! tables, in FK dependency order, inside one transaction (spec §6, §4.7).

use std::path::Path;

use anyhow::Result;
use console::style;

use crate::catalog::Catalog;
use crate::commands::connection::ConnectionArgs;
use crate::config;
use crate::db::connection::{connect_with_retry, initialize_session};
use crate::orchestrator::{resolve_files, run_import, self_referencing_tables, ImportOptions, ImportReport};

pub struct ImportOpts {
    pub ignore_cycles: bool,
    pub disable_foreign_keys: bool,
    pub single_table: Option<String>,
}

pub async fn cmd_import(
    args: &ConnectionArgs,
    directory: &Path,
    tables: &[String],
    opts: ImportOpts,
) -> Result<()> {
    let db_url = crate::commands::connection::resolve_database_url(args)?;
    let pool = connect_with_retry(&db_url).await?;
    initialize_session(&pool, &args.schema).await?;

    let catalog = Catalog::load(&pool, &args.schema).await?;
    let config_path = Path::new(&args.config);
    let table_config = config::load(config_path)?;
    config::validate(&catalog, &table_config)?;

    let requested: Vec<String> = if let Some(single) = &opts.single_table {
        vec![single.clone()]
    } else {
        tables.to_vec()
    };
    let requested_ref = if requested.is_empty() { None } else { Some(requested.as_slice()) };

    if requested.is_empty() && args.include_dependent_tables {
        println!("Option to specifically include dependent tables has been ignored as all tables will be imported.");
    }

    let (files, graph, warnings) = resolve_files(
        directory,
        requested_ref,
        &table_config,
        &catalog,
        args.include_dependent_tables && opts.single_table.is_none(),
    )?;
    for warning in &warnings {
        eprintln!("Warning: {warning}");
    }

    let self_refs = self_referencing_tables(&graph);
    if !self_refs.is_empty() && !opts.disable_foreign_keys && !opts.ignore_cycles {
        println!(
            "Self-referencing tables found that could prevent import:\n\n\t{}",
            self_refs.join(" ")
        );
        println!("\nSee --help regarding the --disable-foreign-keys option.");
    }

    let import_options = ImportOptions {
        ignore_cycles: opts.ignore_cycles,
        disable_foreign_keys: opts.disable_foreign_keys,
    };

    let report = run_import(&pool, &catalog, &table_config, files, &graph, import_options).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &ImportReport) {
    for (table, stats) in &report.stats {
        let line = format!(
            "{table}: skip={} insert={} update={}",
            stats.skip, stats.insert, stats.update
        );
        if stats.insert > 0 || stats.update > 0 {
            println!("{}", style(line).green());
        } else {
            println!("{line}");
        }
    }

    let totals = report.totals();
    println!(
        "\nTotal results:\n\t skip: {} \n\t insert: {} \n\t update: {} \n\t total: {}",
        totals.skip, totals.insert, totals.update, totals.total
    );

    if !report.failed.is_empty() {
        println!("\n{} tables skipped due to errors:", report.failed.len());
        for (table, error) in &report.failed {
            println!("\t{table}: {error}");
        }
    }

    println!(
        "\n{} tables imported successfully",
        report.stats.len()
    );
}
