use crate::binding::ContractAddresses;
use chrono::Utc;
use clap::ValueEnum;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::types::Address;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

pub const DEFAULT_BSC_TESTNET_RPC_URL: &str = "https://data-seed-prebsc-1-s1.binance.org:8545";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545";

const BSC_TESTNET_NOTE: &str = "0x636cb02da3e32b1a9d0a6b2744d288b65638c6fd";
const BSC_TESTNET_GAME: &str = "0xb5713fb3f4Ab6eE84730fEa506DeA5B43dE53D23";

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Network {
    BscTestnet,
    Local,
}

impl Network {
    pub fn dir_name(self) -> &'static str {
        match self {
            Network::BscTestnet => "bsc-testnet",
            Network::Local => "local",
        }
    }

    pub fn default_rpc_url(self) -> &'static str {
        match self {
            Network::BscTestnet => DEFAULT_BSC_TESTNET_RPC_URL,
            Network::Local => DEFAULT_LOCAL_RPC_URL,
        }
    }

    /// Used when the node cannot be asked.
    pub fn default_chain_id(self) -> u64 {
        match self {
            Network::BscTestnet => 97,
            Network::Local => 31337,
        }
    }

    pub fn native_symbol(self) -> &'static str {
        match self {
            Network::BscTestnet => "tBNB",
            Network::Local => "ETH",
        }
    }

    pub fn builtin_addresses(self) -> Option<ContractAddresses> {
        match self {
            Network::BscTestnet => Some(ContractAddresses {
                note: BSC_TESTNET_NOTE.parse().ok()?,
                game: BSC_TESTNET_GAME.parse().ok()?,
            }),
            Network::Local => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::BscTestnet => "BSC Testnet",
            Network::Local => "Local",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub recorded_at: String,
    pub note_address: Address,
    pub game_address: Address,
    pub network_url: String,
    #[serde(default)]
    pub native_symbol: Option<String>,
}

impl DeploymentRecord {
    pub fn new(addresses: ContractAddresses, network_url: impl Into<String>) -> Self {
        Self {
            recorded_at: Utc::now().to_rfc3339(),
            note_address: addresses.note,
            game_address: addresses.game,
            network_url: network_url.into(),
            native_symbol: None,
        }
    }

    pub fn addresses(&self) -> ContractAddresses {
        ContractAddresses {
            note: self.note_address,
            game: self.game_address,
        }
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(network: Network) -> Result<Self> {
        Self::open(Path::new(DEPLOYMENTS_ROOT), network)
    }

    pub fn open(root: &Path, network: Network) -> Result<Self> {
        let path = ensure_store(root, network)?;
        Ok(Self { path })
    }

    /// The store for `network` under `root`, left untouched on disk. Reads as
    /// empty until something is recorded.
    pub fn locate(root: &Path, network: Network) -> Self {
        Self {
            path: root.join(network.dir_name()).join(DEPLOYMENTS_FILE),
        }
    }

    pub fn load(&self) -> Result<Vec<DeploymentRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_records(&self.path)
    }

    pub fn latest(&self) -> Result<Option<DeploymentRecord>> {
        Ok(self.load()?.pop())
    }

    pub fn append(&self, record: DeploymentRecord) -> Result<()> {
        let mut records = self.load()?;
        records.push(record);
        write_records(&self.path, &records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Contract addresses for `network`: the latest recorded deployment wins over
/// the built-in ones.
pub fn resolve_addresses(store: &DeploymentStore, network: Network) -> Result<ContractAddresses> {
    match store.latest()? {
        Some(record) => Ok(record.addresses()),
        None => network.builtin_addresses().ok_or_else(|| {
            eyre!(
                "No contract addresses known for {network}; register them with `dapp-console record --network {}`",
                network.dir_name()
            )
        }),
    }
}

fn ensure_store(root: &Path, network: Network) -> Result<PathBuf> {
    let dir = root.join(network.dir_name());
    if !dir.exists() {
        fs::create_dir_all(&dir).wrap_err_with(|| {
            format!("Failed to create deployment directory {}", dir.display())
        })?;
    }

    let file_path = dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).wrap_err_with(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                network, file_path
            )
        })?;
        file.write_all(b"[]").wrap_err_with(|| {
            format!("Failed to initialize deployment record file for {}", network)
        })?;
    }

    Ok(file_path)
}

fn read_records(path: impl AsRef<Path>) -> Result<Vec<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).wrap_err("Failed to read deployment records")?;
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let records = serde_json::from_slice::<Vec<DeploymentRecord>>(&data)
        .wrap_err("Failed to parse deployment records JSON")?;
    Ok(records)
}

fn write_records(path: impl AsRef<Path>, records: &[DeploymentRecord]) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)
        .wrap_err("Failed to serialize deployment records")?;
    fs::write(path.as_ref(), json).wrap_err("Failed to write deployment records")?;
    Ok(())
}
