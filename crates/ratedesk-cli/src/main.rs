mod display;
mod session;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ratedesk_core::{Domain, RateUnit, TenantRateChange};
use ratedesk_store::{DraftStore, FileStore, SavedMirror};
use ratedesk_sync::{ClientConfig, HttpBackend, PublishCoordinator};
use tokio::io::BufReader;

use crate::session::SessionDomain;

#[derive(Parser)]
#[command(name = "ratedesk", version, about = "Stage, save and publish self-storage rate changes")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Config {
    /// Pricing backend base URL.
    #[arg(long, env = "RATEDESK_API_URL", default_value = "http://localhost:8000/api")]
    api_url: String,

    /// Directory holding the saved (publish-ready) changes.
    #[arg(long, env = "RATEDESK_DATA_DIR", default_value = ".ratedesk")]
    data_dir: PathBuf,

    #[arg(long, env = "RATEDESK_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive editing session.
    Session {
        #[arg(long, default_value = "street-rates")]
        domain: Domain,
    },
    /// Print the saved tier stored on disk.
    Saved {
        #[arg(long, default_value = "street-rates")]
        domain: Domain,
    },
    /// Delete the saved tier stored on disk.
    ClearSaved {
        #[arg(long, default_value = "street-rates")]
        domain: Domain,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    tracing::info!("ratedesk v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let store = FileStore::open(&cli.config.data_dir)
        .with_context(|| format!("opening data dir {}", cli.config.data_dir.display()))?;

    match cli.command {
        Command::Session { domain } => match domain {
            Domain::StreetRates => run_session::<RateUnit>(&cli.config, store).await,
            Domain::Ecri => run_session::<TenantRateChange>(&cli.config, store).await,
        },
        Command::Saved { domain } => match domain {
            Domain::StreetRates => print_saved::<RateUnit>(store),
            Domain::Ecri => print_saved::<TenantRateChange>(store),
        },
        Command::ClearSaved { domain } => match domain {
            Domain::StreetRates => clear_saved::<RateUnit>(store),
            Domain::Ecri => clear_saved::<TenantRateChange>(store),
        },
    }
}

async fn run_session<T: SessionDomain>(config: &Config, store: FileStore) -> anyhow::Result<()> {
    let backend = HttpBackend::new(ClientConfig {
        base_url: config.api_url.clone(),
        api_token: config.api_token.clone(),
        timeout: Duration::from_secs(config.timeout_secs),
    })
    .context("building HTTP client")?;
    let coordinator = PublishCoordinator::new(DraftStore::<T, _>::open(store), backend);

    println!("{}", session::help_text::<T>());
    let stdin = BufReader::new(tokio::io::stdin());
    session::run(&coordinator, stdin, &mut std::io::stdout()).await
}

fn print_saved<T: SessionDomain>(store: FileStore) -> anyhow::Result<()> {
    let saved = SavedMirror::<T, _>::new(store).load();
    display::print_saved(&mut std::io::stdout(), &saved)?;
    Ok(())
}

fn clear_saved<T: SessionDomain>(store: FileStore) -> anyhow::Result<()> {
    let key = T::storage_key();
    SavedMirror::<T, _>::new(store)
        .clear()
        .with_context(|| format!("clearing {key}"))?;
    println!("Cleared {key}.");
    Ok(())
}
