mod cli;
mod db;
mod error;
mod fmt;
mod headers;
mod keys;
mod lookups;
mod models;
mod normalizer;
mod parser;
mod settings;
mod slug;
mod store;
mod tags;
mod writer;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::preview::Output;
use cli::{Cli, Commands};

fn init_logging() {
    let filter = EnvFilter::try_from_env("PENNY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init {
            data_dir,
            owner_id,
            owner_email,
        } => cli::init::run(data_dir, owner_id, owner_email),
        Commands::Preview {
            file,
            delimiter,
            json,
            csv,
            strict,
        } => {
            let output = match (json, csv) {
                (true, _) => Output::Json,
                (_, true) => Output::Csv,
                _ => Output::Text,
            };
            cli::preview::run(&file, delimiter, output, strict)
        }
        Commands::Tags {
            file,
            delimiter,
            index,
        } => cli::tags::run(&file, delimiter, index),
        Commands::Import {
            file,
            map,
            default_type,
            delimiter,
            strict,
            dry_run,
            owner_id,
            owner_email,
        } => cli::import::run(cli::import::ImportArgs {
            file,
            map,
            default_type,
            delimiter,
            strict,
            dry_run,
            owner_id,
            owner_email,
        }),
        Commands::AccountTypes => cli::account_types::run(),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
