use anyhow::{
    Context,
    Result,
    anyhow,
    bail,
};
use clap::{
    ArgGroup,
    Parser,
};
use deployments::{
    DeploymentRecord,
    DeploymentRegistry,
    SupportedNetwork,
    compute_abi_hash,
};
use fuel_core_client::client::{
    FuelClient,
    types::TransactionStatus,
};
use fuels::{
    accounts::{
        ViewOnlyAccount,
        wallet::Wallet,
    },
    prelude::{
        Contract,
        LoadConfiguration,
        Provider,
        TxPolicies,
        private_key::PrivateKeySigner,
    },
    tx::TxId,
    types::ContractId,
};
use generated_abi::{
    NFT_GAME_ABI_JSON,
    game_contract_instance,
};
use nft_arena::wallets::{
    list_wallets,
    prompt_wallet_password,
    resolve_wallet_dir,
    unlock_secret,
};
use rand::Rng;
use std::path::Path;

const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:4000/";
const DEFAULT_SAFE_SCRIPT_GAS_LIMIT: u64 = 29_000_000;
const GAME_BIN_CANDIDATES: [&str; 1] = ["./sway-projects/nft-game/out/release/nft-game.bin"];

#[derive(Parser, Debug)]
#[command(
    name = "nft-arena-deploy",
    about = "Deploy or register the NFT game contract and run owner utilities",
    version,
    group(
        ArgGroup::new("network")
            .args(["testnet", "ignition", "local"])
    )
)]
struct Args {
    /// Use Fuel Testnet
    #[arg(long)]
    testnet: bool,

    /// Use Fuel Ignition
    #[arg(long)]
    ignition: bool,

    /// Use a local Fuel node
    #[arg(long)]
    local: bool,

    /// Override RPC URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// forc-wallet profile name (required for deploy, balance and withdraw)
    #[arg(long)]
    wallet: Option<String>,

    /// Override forc-wallet directory (defaults to ~/.fuel/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Which action to perform
    #[arg(short, long, value_enum, default_value = "list")]
    action: Action,

    /// Contract id of an existing deployment (record only)
    #[arg(long)]
    contract_id: Option<String>,

    /// Block height the contract was deployed at (record only)
    #[arg(long)]
    deployment_block_height: Option<u32>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Action {
    Deploy,
    Record,
    List,
    Balance,
    Withdraw,
}

impl Args {
    fn rpc_url(&self) -> String {
        if let Some(url) = &self.rpc_url {
            return url.clone();
        }
        if self.ignition {
            SupportedNetwork::Ignition.default_rpc_url().to_string()
        } else if self.local {
            DEFAULT_LOCAL_RPC_URL.to_string()
        } else {
            SupportedNetwork::Testnet.default_rpc_url().to_string()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    deployments::ensure_structure().context("initializing deployment directories")?;
    let mut registry = DeploymentRegistry::new().context("opening deployment registry")?;

    if let Action::List = args.action {
        print_registry(&registry);
        return Ok(());
    }

    let rpc_url = args.rpc_url();
    let provider = Provider::connect(&rpc_url)
        .await
        .context("failed to connect to provider")?;
    let consensus_parameters = provider
        .consensus_parameters()
        .await
        .context("fetching consensus parameters")?;
    let chain_id = u64::from(consensus_parameters.chain_id());
    let network = SupportedNetwork::from_network_id(chain_id).ok_or_else(|| {
        anyhow!("chain id {chain_id} at {rpc_url} is not Fuel Testnet or Fuel Ignition")
    })?;
    let safe_script_gas_limit = consensus_parameters
        .tx_params()
        .max_gas_per_tx()
        .saturating_sub(1)
        .clamp(1, DEFAULT_SAFE_SCRIPT_GAS_LIMIT);
    let abi_hash = compute_abi_hash(NFT_GAME_ABI_JSON);

    match args.action {
        Action::List => print_registry(&registry),
        Action::Record => {
            let contract_id = args
                .contract_id
                .as_deref()
                .ok_or_else(|| anyhow!("--contract-id is required for record"))?;
            parse_contract_id(contract_id)?;
            registry.insert(
                network,
                DeploymentRecord::new(
                    contract_id,
                    &rpc_url,
                    Some(abi_hash),
                    args.deployment_block_height,
                ),
            );
            registry.save().context("recording deployment")?;
            println!("Recorded {contract_id} for {network}");
        }
        Action::Deploy => {
            let wallet = open_wallet(&args, &provider)?;
            let path = choose_binary(&GAME_BIN_CANDIDATES)
                .context("locating game contract binary")?;
            let salt = rand::rng().random::<[u8; 32]>();
            let response = Contract::load_from(path, LoadConfiguration::default().with_salt(salt))
                .with_context(|| format!("Failed to load contract binary from {path}"))?
                .deploy(&wallet, TxPolicies::default())
                .await
                .context("deploying game contract")?;
            let contract_id = response.contract_id;
            let tx_id = response.tx_id.context("deployment transaction missing")?;
            let client = FuelClient::new(rpc_url.clone())
                .map_err(|e| anyhow!("failed creating Fuel client: {e}"))?;
            let block_height = fetch_block_height(&client, &tx_id)
                .await
                .context("fetching deployment block height")?;
            println!(
                "Game contract deployed: {} (tx: {}) at block {}",
                contract_id, tx_id, block_height
            );

            registry.insert(
                network,
                DeploymentRecord::new(
                    contract_id.to_string(),
                    &rpc_url,
                    Some(abi_hash),
                    Some(block_height),
                ),
            );
            registry.save().context("recording deployment")?;
        }
        Action::Balance => {
            let wallet = open_wallet(&args, &provider)?;
            let base_asset_id = *consensus_parameters.base_asset_id();
            let balance = wallet
                .get_asset_balance(&base_asset_id)
                .await
                .context("fetching wallet balance")?;
            println!("Wallet {}: {balance}", wallet.address());
        }
        Action::Withdraw => {
            let wallet = open_wallet(&args, &provider)?;
            let record = registry
                .record_for(network)
                .ok_or_else(|| anyhow!("no deployment recorded for {network}"))?;
            if !record.is_compatible_with_hash(&abi_hash) {
                bail!("recorded deployment was built from a different ABI");
            }
            let contract_id = parse_contract_id(&record.contract_id)?;
            game_contract_instance(contract_id, wallet)
                .methods()
                .withdraw()
                .with_tx_policies(
                    TxPolicies::default().with_script_gas_limit(safe_script_gas_limit),
                )
                .call()
                .await
                .context("withdrawing contract balance")?;
            println!("Withdrew contract balance of {}", record.contract_id);
        }
    }

    if let Some(path) = registry.path() {
        println!("Deployment registry: {}", path.display());
    }
    Ok(())
}

fn open_wallet(args: &Args, provider: &Provider) -> Result<Wallet> {
    let name = args
        .wallet
        .as_deref()
        .ok_or_else(|| anyhow!("--wallet <name> is required for this action"))?;
    let dir = resolve_wallet_dir(args.wallet_dir.as_deref())
        .map_err(|e| anyhow!("{e:#}"))
        .context("resolving wallet directory")?;
    let descriptor = list_wallets(&dir)
        .map_err(|e| anyhow!("{e:#}"))?
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| anyhow!("Wallet '{name}' not found in {}", dir.display()))?;
    let password = prompt_wallet_password(&descriptor).map_err(|e| anyhow!("{e:#}"))?;
    let secret = unlock_secret(&descriptor, &password).map_err(|e| anyhow!("{e:#}"))?;
    Ok(Wallet::new(PrivateKeySigner::new(secret), provider.clone()))
}

fn print_registry(registry: &DeploymentRegistry) {
    let mut empty = true;
    for (network_id, record) in registry.records() {
        empty = false;
        let name = SupportedNetwork::from_network_id(network_id)
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("network {network_id}"));
        println!(
            "{name}: {} (deployed {}, block {}, via {})",
            record.contract_id,
            record.deployed_at,
            record
                .deployment_block_height
                .map(|h| h.to_string())
                .unwrap_or_else(|| "?".to_string()),
            record.network_url
        );
    }
    if empty {
        println!("No deployments recorded");
    }
}

fn parse_contract_id(raw: &str) -> Result<ContractId> {
    Ok(nft_arena::fuel::parse_contract_id(raw)?)
}

fn choose_binary<'a>(paths: &'a [&str]) -> Result<&'a str> {
    paths
        .iter()
        .find(|p| Path::new(p).exists())
        .copied()
        .ok_or_else(|| anyhow!("Contract binary not found. Tried {:?}", paths))
}

async fn fetch_block_height(client: &FuelClient, tx_id: &TxId) -> Result<u32> {
    let status = client
        .transaction_status(tx_id)
        .await
        .context("querying transaction status")?;
    match status {
        TransactionStatus::Success { block_height, .. } => Ok(block_height.into()),
        other => bail!("transaction {tx_id} not successful: {:?}", other),
    }
}
