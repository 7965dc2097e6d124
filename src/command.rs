use std::env;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::store::Store;

/// kvlog cli
#[derive(Parser, Debug)]
#[clap(
    version = "0.1.0",
    about = "kvlog is a log-structured key-value store written in Rust."
)]
pub struct Cli {
    /// Sets logging to "debug" level, defaults to "info"
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Path to the append log file
    #[clap(long, global = true, default_value = "kvlog.db")]
    pub path: PathBuf,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store a value for a key
    Set {
        /// key to update
        key: String,

        /// value to persist
        value: String,
    },
    /// Retrieve the latest value for a key
    Get {
        /// key to look up
        key: String,
    },
    /// List every key with its latest value
    Items,
    /// Rewrite the log keeping only the latest record per key
    Compact,
}

impl Cli {
    pub fn exec(self) -> anyhow::Result<()> {
        if self.verbose {
            env::set_var("RUST_LOG", "debug")
        } else {
            env::set_var("RUST_LOG", "info")
        }
        env_logger::init();

        let store = Store::open(&self.path)?;

        match self.command {
            Command::Set { key, value } => {
                store.set(&key, value.as_bytes())?;
            }
            Command::Get { key } => match store.get(&key)? {
                Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                None => {
                    eprintln!("Key not found.");
                    std::process::exit(1);
                }
            },
            Command::Items => {
                for (key, value) in store.items()? {
                    println!("{}\t{}", key, String::from_utf8_lossy(&value));
                }
            }
            Command::Compact => {
                let reclaimed = store.compact()?;
                println!("{}", reclaimed);
            }
        }

        Ok(())
    }
}
