use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use sortir_lib::{
    collector::{self, Collector, Fetcher},
    config::AppConfig,
    db::Store,
    ingest_client::IngestClient,
    locations::FrenchCities,
    populate::{EventSaver, Populator},
    server,
};

#[derive(Parser, Debug)]
#[command(name = "sortir", version, about = "Collects local events and serves them as map pins")]
struct CliArgs {
    /// Config file to read instead of the one in the data directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and the expiry sweep.
    Serve {
        #[arg(long)]
        listen: Option<String>,
    },
    /// Collect with one source and print the events as JSON.
    Collect {
        num_locations: usize,
        collector: String,
    },
    /// Collect with every source and save the results.
    Populate(PopulateArgs),
    /// Delete events that have already ended.
    Sweep,
    /// List the available sources.
    Collectors,
}

#[derive(Args, Debug)]
struct PopulateArgs {
    /// Number of locations that must be populated successfully.
    limit: usize,

    #[arg(long, conflicts_with = "direct")]
    ingest_url: Option<String>,

    /// Write to the local database instead of a running server.
    #[arg(long)]
    direct: bool,
}

fn main() -> ExitCode {
    sortir_lib::init_logging();
    let cli_args = CliArgs::parse();

    match run(cli_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli_args: CliArgs) -> Result<()> {
    let mut config = match &cli_args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };
    if let Some(database) = cli_args.database {
        config.database = Some(database);
    }

    match cli_args.command {
        Command::Serve { listen } => {
            if let Some(listen) = listen {
                config.listen = listen;
            }
            serve(&config)
        }
        Command::Collect {
            num_locations,
            collector,
        } => collect(&config, num_locations, &collector),
        Command::Populate(args) => populate(&config, args),
        Command::Sweep => sweep(&config),
        Command::Collectors => {
            let fetcher = Fetcher::from_config(&config)?;
            let listing = serde_json::to_string_pretty(&collector::list_collectors(&fetcher))?;
            println!("{listing}");
            Ok(())
        }
    }
}

fn open_store(config: &AppConfig) -> Result<Store> {
    let path = config.database_path();
    Store::open(&path).with_context(|| format!("unable to open database {}", path.display()))
}

fn serve(config: &AppConfig) -> Result<()> {
    let store = Arc::new(open_store(config)?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("unable to start async runtime")?;
    runtime.block_on(server::serve(
        &config.listen,
        store,
        config.sweep_interval(),
        config.max_body_bytes,
    ))
}

/// Failed locations still count toward `num_locations`.
fn collect(config: &AppConfig, num_locations: usize, collector_id: &str) -> Result<()> {
    let fetcher = Fetcher::from_config(config)?;
    let collector = collector::find_collector(collector_id, &fetcher)
        .ok_or_else(|| anyhow!("unknown collector: {collector_id}"))?;

    let mut events = Vec::new();
    for location in FrenchCities::new().take(num_locations) {
        match collector.collect(&location) {
            Ok(mut found) => {
                info!(city = %location.city, found = found.len(), "collected");
                events.append(&mut found);
            }
            Err(err) => error!(city = %location.city, "collection failed: {err:#}"),
        }
    }

    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}

/// Only successful locations count toward the limit.
fn populate(config: &AppConfig, args: PopulateArgs) -> Result<()> {
    let fetcher = Fetcher::from_config(config)?;
    let saver: Box<dyn EventSaver> = if args.direct {
        Box::new(open_store(config)?)
    } else {
        let url = args.ingest_url.as_deref().unwrap_or(&config.ingest_url);
        Box::new(IngestClient::from_config(config, url)?)
    };
    let populator = Populator::new(collector::default_composite(&fetcher), saver);

    let mut populated = 0;
    let mut saved = 0;
    for location in FrenchCities::new() {
        if populated >= args.limit {
            break;
        }
        match populator.populate(&location) {
            Ok(count) => {
                populated += 1;
                saved += count;
            }
            Err(err) => error!(city = %location.city, "populate failed: {err:#}"),
        }
    }

    info!(populated, saved, "populate finished");
    Ok(())
}

fn sweep(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    let deleted = store.delete_expired(Utc::now())?;
    info!(deleted, "expired events swept");
    Ok(())
}
