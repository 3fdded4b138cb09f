use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    collections::BTreeMap,
    fmt,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const REGISTRY_FILE: &str = "registry.json";

pub const TESTNET_NETWORK_ID: u64 = 0;
pub const IGNITION_NETWORK_ID: u64 = 9889;

/// The only two networks the game client will talk to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum SupportedNetwork {
    Testnet,
    Ignition,
}

impl SupportedNetwork {
    pub const ALL: [SupportedNetwork; 2] =
        [SupportedNetwork::Testnet, SupportedNetwork::Ignition];

    pub fn network_id(self) -> u64 {
        match self {
            SupportedNetwork::Testnet => TESTNET_NETWORK_ID,
            SupportedNetwork::Ignition => IGNITION_NETWORK_ID,
        }
    }

    pub fn from_network_id(id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.network_id() == id)
    }

    pub fn default_rpc_url(self) -> &'static str {
        match self {
            SupportedNetwork::Testnet => "https://testnet.fuel.network",
            SupportedNetwork::Ignition => "https://mainnet.fuel.network",
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            SupportedNetwork::Testnet => "testnet",
            SupportedNetwork::Ignition => "ignition",
        }
    }
}

impl fmt::Display for SupportedNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupportedNetwork::Testnet => "Fuel Testnet",
            SupportedNetwork::Ignition => "Fuel Ignition",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub contract_id: String,
    pub network_url: String,
    #[serde(default)]
    pub abi_hash: Option<String>,
    #[serde(default)]
    pub deployment_block_height: Option<u32>,
}

impl DeploymentRecord {
    pub fn new(
        contract_id: impl Into<String>,
        network_url: impl Into<String>,
        abi_hash: Option<String>,
        deployment_block_height: Option<u32>,
    ) -> Self {
        Self {
            deployed_at: Utc::now().to_rfc3339(),
            contract_id: contract_id.into(),
            network_url: network_url.into(),
            abi_hash,
            deployment_block_height,
        }
    }

    /// Records written before ABI hashing was introduced are trusted.
    pub fn is_compatible_with_hash(&self, hash: &str) -> bool {
        self.abi_hash.as_deref().is_none_or(|recorded| recorded == hash)
    }
}

/// Static network id -> deployment lookup, persisted as a single JSON map.
#[derive(Debug, Default, Clone)]
pub struct DeploymentRegistry {
    path: Option<PathBuf>,
    records: BTreeMap<u64, DeploymentRecord>,
}

impl DeploymentRegistry {
    /// Opens the registry at the default location, creating it if needed.
    pub fn new() -> Result<Self> {
        let path = ensure_store()?;
        Self::open(path)
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = read_records(&path)?;
        Ok(Self {
            path: Some(path),
            records,
        })
    }

    pub fn from_records(
        records: impl IntoIterator<Item = (SupportedNetwork, DeploymentRecord)>,
    ) -> Self {
        Self {
            path: None,
            records: records
                .into_iter()
                .map(|(network, record)| (network.network_id(), record))
                .collect(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record_for(&self, network: SupportedNetwork) -> Option<&DeploymentRecord> {
        self.records.get(&network.network_id())
    }

    pub fn records(&self) -> impl Iterator<Item = (u64, &DeploymentRecord)> {
        self.records.iter().map(|(id, record)| (*id, record))
    }

    pub fn insert(&mut self, network: SupportedNetwork, record: DeploymentRecord) {
        self.records.insert(network.network_id(), record);
    }

    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| anyhow!("in-memory deployment registry cannot be saved"))?;
        write_records(path, &self.records)
    }
}

pub fn compute_abi_hash(abi: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(abi.as_ref());
    format!("{:x}", hasher.finalize())
}

pub fn ensure_structure() -> Result<()> {
    let _ = ensure_store()?;
    Ok(())
}

fn ensure_store() -> Result<PathBuf> {
    let root = Path::new(DEPLOYMENTS_ROOT);
    if !root.exists() {
        fs::create_dir_all(root).context("Failed to create .deployments directory")?;
    }

    let file_path = root.join(REGISTRY_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).with_context(|| {
            format!("Failed to create deployment registry at {:?}", file_path)
        })?;
        file.write_all(b"")
            .context("Failed to initialize deployment registry")?;
    }

    Ok(file_path)
}

fn read_records(path: impl AsRef<Path>) -> Result<BTreeMap<u64, DeploymentRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let data = fs::read(path).context("Failed to read deployment registry")?;
    if data.is_empty() || data.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }
    serde_json::from_slice(&data).map_err(|e| {
        anyhow!(
            "Failed to parse deployment registry {}: expected a map of network id to deployment ({e})",
            path.display()
        )
    })
}

fn write_records(
    path: impl AsRef<Path>,
    records: &BTreeMap<u64, DeploymentRecord>,
) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)
        .context("Failed to serialize deployment registry")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment registry")?;
    Ok(())
}

pub fn record_deployment(
    network: SupportedNetwork,
    contract_id: impl AsRef<str>,
    network_url: impl AsRef<str>,
    abi_hash: Option<impl AsRef<str>>,
    deployment_block_height: Option<u32>,
) -> Result<()> {
    let mut registry = DeploymentRegistry::new()?;
    let record = DeploymentRecord::new(
        contract_id.as_ref(),
        network_url.as_ref(),
        abi_hash.map(|hash| hash.as_ref().to_string()),
        deployment_block_height,
    );
    registry.insert(network, record);
    registry.save()
}
