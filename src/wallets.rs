use crate::errors::WalletError;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use ethers::{
    signers::{
        LocalWallet,
        Signer,
    },
    types::Address,
};
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".ethereum").join("keystore"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

/// Every visible regular file in `dir` is treated as a keystore. Geth names
/// them `UTC--<timestamp>--<address>` without an extension.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let entry = entry.wrap_err("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?
            .to_owned();
        if name.starts_with('.') {
            continue;
        }
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

/// The wallet provider is present only when a keystore can be found. A named
/// wallet must exist; otherwise the first keystore wins.
pub fn detect_wallet(dir: &Path, name: Option<&str>) -> Result<Option<WalletDescriptor>> {
    match name {
        Some(name) => find_wallet(dir, name).map(Some),
        None => Ok(list_wallets(dir)?.into_iter().next()),
    }
}

/// Reads the plaintext `address` field geth-style keystores carry, without
/// decrypting anything. `None` when the file has no usable address.
pub fn keystore_address(descriptor: &WalletDescriptor) -> Option<Address> {
    let data = fs::read(&descriptor.path).ok()?;
    let json: serde_json::Value = serde_json::from_slice(&data).ok()?;
    let raw = json.get("address")?.as_str()?;
    let bytes = hex::decode(raw.trim_start_matches("0x")).ok()?;
    (bytes.len() == Address::len_bytes()).then(|| Address::from_slice(&bytes))
}

pub fn unlock_with_password(
    descriptor: &WalletDescriptor,
    password: &str,
    chain_id: u64,
) -> Result<LocalWallet, WalletError> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes()).map_err(|_| {
        WalletError::Keystore(format!("Invalid password for wallet '{}'", descriptor.name))
    })?;
    let signer = LocalWallet::from_bytes(&secret).map_err(|_| {
        WalletError::Keystore(format!(
            "Wallet '{}' contained unsupported key material",
            descriptor.name
        ))
    })?;
    Ok(signer.with_chain_id(chain_id))
}

/// Terminal prompt used by `--unlock`, before the UI owns the screen.
pub fn unlock_wallet(descriptor: &WalletDescriptor, chain_id: u64) -> Result<LocalWallet> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read wallet password")?;
    unlock_with_password(descriptor, &password, chain_id).map_err(|e| eyre!(e))
}
