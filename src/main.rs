use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use dapp_console::{
    binding::ContractAddresses,
    client,
    deployment::{
        self,
        DeploymentRecord,
        DeploymentStore,
        Network,
    },
    units,
    wallets,
};
use ethers::types::Address;
use std::path::Path;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

const LOG_DIR: &str = "logs";

#[derive(Parser, Debug)]
#[command(
    name = "dapp-console",
    about = "Terminal client for the note and rock-paper-scissors contracts",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the terminal UI
    Play {
        #[arg(long, value_enum, default_value = "bsc-testnet")]
        network: Network,

        /// Override the RPC URL for the selected network
        #[arg(long)]
        rpc_url: Option<String>,

        /// Keystore file name to use (defaults to the first one found)
        #[arg(long)]
        wallet: Option<String>,

        /// Override the keystore directory (defaults to ~/.ethereum/keystore)
        #[arg(long)]
        wallet_dir: Option<String>,

        /// Ask for the wallet password before the UI starts
        #[arg(long)]
        unlock: bool,

        /// Override the native currency ticker
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Register deployed contract addresses for a network
    Record {
        #[arg(long, value_enum)]
        network: Network,

        #[arg(long)]
        note: Address,

        #[arg(long)]
        game: Address,

        #[arg(long)]
        rpc_url: Option<String>,

        #[arg(long)]
        symbol: Option<String>,
    },
    /// List keystores in the wallet directory
    Wallets {
        #[arg(long)]
        wallet_dir: Option<String>,
    },
}

fn init_tracing() -> WorkerGuard {
    let appender = rolling::daily(LOG_DIR, "dapp-console.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
    {
        eprintln!("Logging disabled: {err}");
    }
    guard
}

fn play_config(
    network: Network,
    rpc_url: Option<String>,
    wallet: Option<String>,
    wallet_dir: Option<String>,
    unlock: bool,
    symbol: Option<String>,
) -> Result<client::AppConfig> {
    let store = DeploymentStore::locate(Path::new(deployment::DEPLOYMENTS_ROOT), network);
    let record = store.latest()?;
    let addresses = deployment::resolve_addresses(&store, network)?;
    let symbol = symbol
        .or_else(|| record.and_then(|r| r.native_symbol))
        .unwrap_or_else(|| network.native_symbol().to_string());

    let dir = wallets::resolve_wallet_dir(wallet_dir.as_deref())?;
    let wallet = wallets::detect_wallet(&dir, wallet.as_deref())?;
    match &wallet {
        Some(w) => tracing::info!(wallet = %w.name, "using keystore"),
        None => tracing::warn!(dir = %dir.display(), "no keystore found"),
    }

    Ok(client::AppConfig {
        network,
        rpc_url: rpc_url.unwrap_or_else(|| network.default_rpc_url().to_string()),
        addresses,
        symbol,
        wallet,
        unlock,
        chain_poll: client::DEFAULT_CHAIN_POLL,
    })
}

fn record(
    network: Network,
    note: Address,
    game: Address,
    rpc_url: Option<String>,
    symbol: Option<String>,
) -> Result<()> {
    let store = DeploymentStore::new(network)?;
    let url = rpc_url.unwrap_or_else(|| network.default_rpc_url().to_string());
    let mut record = DeploymentRecord::new(ContractAddresses { note, game }, url);
    record.native_symbol = symbol;
    store
        .append(record)
        .wrap_err_with(|| format!("Failed to record deployment for {network}"))?;
    println!(
        "Recorded {network}: note {} game {} ({})",
        units::shorten_address(&note),
        units::shorten_address(&game),
        store.path().display()
    );
    Ok(())
}

fn list_wallets(wallet_dir: Option<String>) -> Result<()> {
    let dir = wallets::resolve_wallet_dir(wallet_dir.as_deref())?;
    let found = wallets::list_wallets(&dir)?;
    if found.is_empty() {
        println!("No keystores in {}", dir.display());
        return Ok(());
    }
    for wallet in found {
        match wallets::keystore_address(&wallet) {
            Some(address) => println!("{}  {address:?}", wallet.name),
            None => println!("{}", wallet.name),
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _guard = init_tracing();
    tracing::info!("starting dapp-console");
    match Cli::parse().command {
        Command::Play {
            network,
            rpc_url,
            wallet,
            wallet_dir,
            unlock,
            symbol,
        } => {
            let config = play_config(network, rpc_url, wallet, wallet_dir, unlock, symbol)?;
            client::run_app(config).await
        }
        Command::Record {
            network,
            note,
            game,
            rpc_url,
            symbol,
        } => record(network, note, game, rpc_url, symbol),
        Command::Wallets { wallet_dir } => list_wallets(wallet_dir),
    }
}
