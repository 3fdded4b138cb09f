use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use fuels::{
    crypto::SecretKey,
    prelude::derivation::DEFAULT_DERIVATION_PATH,
};
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

/// A forc-wallet keystore file. Its name doubles as the account name.
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
    Ok(PathBuf::from(home).join(".fuel").join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => Ok(PathBuf::from(shellexpand::tilde(raw).into_owned())),
        None => default_wallet_dir(),
    }
}

/// Keystore files in `dir`, sorted by name. A missing directory holds no
/// wallets.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let path = entry.wrap_err("Failed to read wallet entry")?.path();
        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("wallet")
        {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?
            .to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn prompt_wallet_password(descriptor: &WalletDescriptor) -> Result<String> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    prompt_password(prompt).wrap_err("Failed to read wallet password")
}

/// Decrypts the keystore and derives the signing key. Keystores may hold a
/// raw key or a mnemonic phrase.
pub fn unlock_secret(descriptor: &WalletDescriptor, password: &str) -> Result<SecretKey> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;

    if let Ok(secret_key) = SecretKey::try_from(secret.as_slice()) {
        return Ok(secret_key);
    }

    if let Ok(mnemonic) = std::str::from_utf8(&secret) {
        if mnemonic.split_whitespace().count() >= 12 {
            return SecretKey::new_from_mnemonic_phrase_with_path(
                mnemonic,
                DEFAULT_DERIVATION_PATH,
            )
            .map_err(|e| {
                eyre!("Failed to derive key for wallet '{}': {e}", descriptor.name)
            });
        }
    }

    Err(eyre!(
        "Wallet '{}' contained unsupported key material",
        descriptor.name
    ))
}
