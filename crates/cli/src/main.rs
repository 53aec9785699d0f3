//! Command-line wrapper around [`database::Database`].
//!
//! Every invocation opens the database file, performs one operation, and
//! closes it again; there is no long-running server or REPL, since the
//! store is meant to be embedded into a single process.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use common::Config;
use database::Database;

#[derive(Parser, Debug)]
#[command(name = "mydb", about = "Embeddable paged key/value store")]
struct Args {
    /// Path to the database file
    #[arg(long)]
    db: PathBuf,

    /// Page size in bytes
    #[arg(long, default_value_t = 4096)]
    page_size: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up a key and print its value
    Get { key: String },
    /// Insert or overwrite a key's value
    Put { key: String, value: String },
    /// Remove a key
    Delete { key: String },
    /// Drain the cache and checkpoint the journal
    Flush,
    /// Flush and fsync every backing file
    Sync,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::builder().path(args.db.clone()).page_size(args.page_size).build();

    let mut db = Database::open(&config)?;

    match args.command {
        Command::Get { key } => match db.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => bail!("key not found"),
        },
        Command::Put { key, value } => {
            db.put(key.as_bytes(), value.as_bytes())?;
        }
        Command::Delete { key } => {
            if !db.delete(key.as_bytes())? {
                bail!("key not found");
            }
        }
        Command::Flush => db.flush()?,
        Command::Sync => db.sync()?,
    }

    db.close()?;
    Ok(())
}
