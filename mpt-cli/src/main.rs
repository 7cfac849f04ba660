//! # mpt CLI
//!
//! Command-line interface over a file-backed Merkle Patricia Trie. The
//! active root is kept in the store directory, so each invocation picks up
//! where the last one left off.
//!
//! Usage:
//!   mpt insert <key> <value>
//!   mpt remove <key>
//!   mpt get <key>
//!   mpt contains <key>
//!   mpt root
//!   mpt export
//!   mpt prove <key>
//!
//! Examples:
//!   mpt insert dog puppy
//!   mpt --hex insert 0123 ff
//!   mpt --dir /tmp/state -v export
//!
//! Exits with 1 on failure, or 2 when the store itself is damaged (missing
//! or corrupt nodes).

use clap::{Parser, Subcommand};
use mpt_host::{Error, HostConfig, Result, TrieHost};
use mpt_trie::Keccak256;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "mpt")]
#[command(author, version, about = "mpt - Merkle Patricia Trie over a directory store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store directory (overrides config file and MPT_STORE_DIR)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Treat keys and values as hex instead of UTF-8
    #[arg(short = 'x', long, global = true)]
    hex: bool,

    /// More log output (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print results
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert or update a key (an empty value removes it)
    Insert { key: String, value: String },
    /// Remove a key
    Remove { key: String },
    /// Print the value stored under a key
    Get { key: String },
    /// Print whether a key is present
    Contains { key: String },
    /// Print the active root digest
    Root,
    /// Print the whole tree as JSON
    Export,
    /// Print a verified proof for a key as JSON
    Prove { key: String },
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::ERROR,
        (false, 0) => LevelFilter::WARN,
        (false, 1) => LevelFilter::INFO,
        (false, 2) => LevelFilter::DEBUG,
        (false, _) => LevelFilter::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Decode a key or value argument
fn decode_arg(arg: &str, as_hex: bool) -> Result<Vec<u8>> {
    if !as_hex {
        return Ok(arg.as_bytes().to_vec());
    }
    let digits = arg.strip_prefix("0x").unwrap_or(arg);
    hex::decode(digits).map_err(|e| {
        mpt_host::error::invalid_argument(format!("'{}' is not valid hex: {}", arg, e))
    })
}

/// Render a value for printing
fn render_value(value: &[u8], as_hex: bool) -> String {
    if as_hex {
        return format!("0x{}", hex::encode(value));
    }
    match std::str::from_utf8(value) {
        Ok(text) => text.to_string(),
        Err(_) => format!("0x{}", hex::encode(value)),
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: failed to render JSON: {}", e),
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = HostConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.dir {
        config = config.with_store_dir(dir);
    }
    config.validate()?;

    let mut host = TrieHost::open_dir(&config)?;

    match cli.command {
        Commands::Insert { key, value } => {
            let key = decode_arg(&key, cli.hex)?;
            let value = decode_arg(&value, cli.hex)?;
            host.insert(&key, &value)?;
            host.persist_root()?;
            println!("0x{}", hex::encode(host.root()));
        }
        Commands::Remove { key } => {
            host.remove(&decode_arg(&key, cli.hex)?)?;
            host.persist_root()?;
            println!("0x{}", hex::encode(host.root()));
        }
        Commands::Get { key } => match host.get(&decode_arg(&key, cli.hex)?)? {
            Some(value) => println!("{}", render_value(&value, cli.hex)),
            None => {
                if !cli.quiet {
                    eprintln!("(not found)");
                }
                std::process::exit(1);
            }
        },
        Commands::Contains { key } => {
            println!("{}", host.contains(&decode_arg(&key, cli.hex)?)?);
        }
        Commands::Root => {
            println!("0x{}", hex::encode(host.root()));
        }
        Commands::Export => {
            print_json(&host.export_tree()?.to_json());
        }
        Commands::Prove { key } => {
            let proof = host.prove(&decode_arg(&key, cli.hex)?)?;
            proof.verify::<Keccak256>(&host.root())?;
            print_json(&proof.to_json());
        }
    }

    Ok(())
}

fn exit_code(err: &Error) -> i32 {
    if err.kind().is_structural() {
        2
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(&e));
    }
}
