//! Simple CLI for inspecting and editing affinity tables.
//!
//! Every cell holds a single big-endian `i64` record named `Value`.
//!
//! Usage:
//!   table_cli <table_path> add-row <tag>
//!   table_cli <table_path> add-column <tag>
//!   table_cli <table_path> delete-row <tag>
//!   table_cli <table_path> delete-column <tag>
//!   table_cli <table_path> set <row> <column> <value>
//!   table_cli <table_path> get <row> <column> [nearest]
//!   table_cli <table_path> row <row> [nearest]
//!   table_cli <table_path> link <row> <column> <parent_row> <parent_column>
//!   table_cli <table_path> unlink <row> <column>
//!   table_cli <table_path> dump
//!   table_cli <table_path> stats
//!
//! Set `RUST_LOG=debug` to see what the store is doing.

use affinity_table::{
    CellTags, LinkState, PlainRecord, Result, TableConfig, TableError, TableStore, Tag,
};
use std::env;
use std::process::exit;
use std::sync::Arc;

const RECORD_TYPE: &str = "Value";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: table_cli <table_path> <command> [args...]");
        eprintln!("Commands:");
        eprintln!("  add-row <tag>                          - Add a row and its ancestors");
        eprintln!("  add-column <tag>                       - Add a column and its ancestors");
        eprintln!("  delete-row <tag>                       - Delete a row");
        eprintln!("  delete-column <tag>                    - Delete a column");
        eprintln!("  set <row> <column> <value>             - Write a cell");
        eprintln!("  get <row> <column> [nearest]           - Read a cell");
        eprintln!("  row <row> [nearest]                    - Read a whole row");
        eprintln!("  link <row> <column> <prow> <pcolumn>   - Link a cell to a parent cell");
        eprintln!("  unlink <row> <column>                  - Mark a cell as unlinked");
        eprintln!("  dump                                   - Print the table layout as JSON");
        eprintln!("  stats                                  - Show table statistics");
        exit(1);
    }

    let table_path = &args[1];
    let command = args[2].as_str();

    let record = match PlainRecord::zeroed(RECORD_TYPE, 8) {
        Ok(record) => record,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            exit(1);
        }
    };

    let store = match TableStore::open(table_path, TableConfig::new(), vec![Arc::new(record)]) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("ERROR: Failed to open table: {}", e);
            exit(1);
        }
    };

    match run(&store, command, &args[3..]) {
        Ok(modified) => {
            if modified {
                if let Err(e) = store.flush() {
                    eprintln!("ERROR: Failed to save table: {}", e);
                    exit(1);
                }
            }
        }
        Err(e) if e.is_miss() => {
            println!("NOT_FOUND");
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            exit(1);
        }
    }
}

/// Run one command. Returns true if the table has to be saved.
fn run(store: &TableStore, command: &str, args: &[String]) -> Result<bool> {
    match command {
        "add-row" | "add-column" => {
            let tag = Tag::new(arg(args, 0, "<tag>")?)?;
            let mut table = store.write();
            let added = if command == "add-row" {
                table.add_row(&tag)?
            } else {
                table.add_column(&tag)?
            };
            println!("{}", if added { "ADDED" } else { "EXISTS" });
            Ok(added)
        }

        "delete-row" | "delete-column" => {
            let tag = Tag::new(arg(args, 0, "<tag>")?)?;
            let mut table = store.write();
            let deleted = if command == "delete-row" {
                table.delete_row(&tag)?
            } else {
                table.delete_column(&tag)?
            };
            println!("{}", if deleted { "DELETED" } else { "NOT_FOUND" });
            Ok(deleted)
        }

        "set" => {
            let cell = cell_arg(args, 0)?;
            let raw = arg(args, 2, "<value>")?;
            let value: i64 = raw
                .parse()
                .map_err(|_| TableError::invalid_operation(format!("invalid value '{}'", raw)))?;

            let mut table = store.write();
            table
                .query_mut(&cell, RECORD_TYPE)?
                .copy_from_slice(&value.to_be_bytes());
            println!("OK");
            Ok(true)
        }

        "get" => {
            let cell = cell_arg(args, 0)?;
            let exact = args.get(2).map(String::as_str) != Some("nearest");

            let table = store.read();
            let records = table.query(&cell, exact, &[RECORD_TYPE])?;
            for record in records {
                println!("{}", decode(record));
            }
            match table.link_state(RECORD_TYPE, &cell) {
                LinkState::Linked(parent) => println!("LINKED: {}", parent),
                LinkState::Unlinked => println!("UNLINKED"),
                LinkState::Unknown => {}
            }
            Ok(false)
        }

        "row" => {
            let row = Tag::new(arg(args, 0, "<row>")?)?;
            let exact = args.get(1).map(String::as_str) != Some("nearest");

            let table = store.read();
            let rows = table.query_for_row(&row, exact, &[RECORD_TYPE])?;
            for records in rows {
                let values: Vec<String> = records.into_iter().map(|r| decode(r).to_string()).collect();
                println!("{}", values.join(" "));
            }
            Ok(false)
        }

        "link" => {
            let child = cell_arg(args, 0)?;
            let parent = cell_arg(args, 2)?;
            store.write().set_inheritance_link(RECORD_TYPE, &child, parent);
            println!("OK");
            Ok(true)
        }

        "unlink" => {
            let child = cell_arg(args, 0)?;
            store.write().remove_inheritance_link(RECORD_TYPE, &child);
            println!("OK");
            Ok(true)
        }

        "dump" => {
            println!("{}", store.read().layout_json()?);
            Ok(false)
        }

        "stats" => {
            let stats = store.stats();
            println!("rows: {}", stats.rows);
            println!("columns: {}", stats.columns);
            println!("pages: {}", stats.pages);
            println!("datablocks: {}", stats.datablocks);
            println!("live_records: {}", stats.live_records);
            println!("has_loading_errors: {}", stats.has_loading_errors);
            Ok(false)
        }

        _ => Err(TableError::invalid_operation(format!(
            "unknown command: {}",
            command
        ))),
    }
}

fn arg<'a>(args: &'a [String], position: usize, name: &str) -> Result<&'a str> {
    args.get(position)
        .map(String::as_str)
        .ok_or_else(|| TableError::invalid_operation(format!("missing argument {}", name)))
}

fn cell_arg(args: &[String], position: usize) -> Result<CellTags> {
    CellTags::parse(
        arg(args, position, "<row>")?,
        arg(args, position + 1, "<column>")?,
    )
}

fn decode(record: &[u8]) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&record[..8]);
    i64::from_be_bytes(bytes)
}
