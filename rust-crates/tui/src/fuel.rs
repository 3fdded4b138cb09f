use crate::{
    character::Character,
    contract::{
        AccountId,
        CharacterScope,
        GameContract,
        TxReceipt,
        WriteCall,
    },
    error::{
        GameError,
        Result,
    },
    events::{
        ContractEvent,
        EventKind,
        EventStream,
    },
    nft_game_types as abi,
    session::{
        BlockStream,
        ChainProvider,
        WalletHost,
    },
    wallets::{
        self,
        WalletDescriptor,
    },
};
use fuels::programs::calls::ContractDependency;
use fuels::{
    accounts::{
        ViewOnlyAccount,
        wallet::Wallet,
    },
    crypto::SecretKey,
    prelude::{
        AssetId,
        CallParameters,
        ContractId,
        Execution,
        Provider,
        TxPolicies,
        private_key::PrivateKeySigner,
    },
    types::{
        Address,
        Identity,
    },
};
use futures::{
    StreamExt,
    stream,
};
use generated_abi::game_contract_instance;
use fuels::tx::Receipt;
use std::{
    collections::{
        BTreeMap,
        HashMap,
        VecDeque,
    },
    path::PathBuf,
    str::FromStr,
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
    time::Duration,
};
use tokio::{
    sync::Mutex as AsyncMutex,
    time,
};
use tracing::{
    debug,
    info,
};

const DEFAULT_SAFE_SCRIPT_GAS_LIMIT: u64 = 29_000_000;
const RECENT_BLOCKS_KEPT: usize = 64;

/// The last few blocks' worth of fetched data, keyed by height. Feeds that
/// walk the chain in step share one fetch per block.
#[derive(Debug)]
struct RecentBlocks<T> {
    capacity: usize,
    blocks: BTreeMap<u32, Arc<T>>,
}

impl<T> RecentBlocks<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            blocks: BTreeMap::new(),
        }
    }

    fn get(&self, height: u32) -> Option<Arc<T>> {
        self.blocks.get(&height).cloned()
    }

    fn insert(&mut self, height: u32, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.blocks.insert(height, value.clone());
        while self.blocks.len() > self.capacity {
            self.blocks.pop_first();
        }
        value
    }
}

/// forc-wallet keystore plus a Fuel node endpoint. Unlocked keys stay in
/// memory for the lifetime of the process.
pub struct FuelHost {
    rpc_url: String,
    wallet_dir: PathBuf,
    poll_interval: Duration,
    unlocked: Mutex<HashMap<String, SecretKey>>,
}

impl FuelHost {
    pub fn new(rpc_url: impl Into<String>, wallet_dir: PathBuf, poll_interval: Duration) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            wallet_dir,
            poll_interval,
            unlocked: Mutex::new(HashMap::new()),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    fn secret_for(&self, name: &str) -> Option<SecretKey> {
        self.unlocked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl WalletHost for FuelHost {
    type Provider = FuelProvider;

    fn discover_accounts(&self) -> Result<Vec<WalletDescriptor>> {
        wallets::list_wallets(&self.wallet_dir).map_err(GameError::connection)
    }

    fn is_unlocked(&self, account: &WalletDescriptor) -> bool {
        self.secret_for(&account.name).is_some()
    }

    fn unlock(&self, account: &WalletDescriptor, password: &str) -> Result<()> {
        let secret =
            wallets::unlock_secret(account, password).map_err(GameError::connection)?;
        self.unlocked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account.name.clone(), secret);
        info!(account = %account.name, "wallet unlocked");
        Ok(())
    }

    async fn network_id(&self) -> Result<u64> {
        let provider = Provider::connect(&self.rpc_url).await.map_err(|e| {
            GameError::connection(format!("failed to reach {}: {e}", self.rpc_url))
        })?;
        let consensus_parameters = provider
            .consensus_parameters()
            .await
            .map_err(GameError::connection)?;
        Ok(u64::from(consensus_parameters.chain_id()))
    }

    async fn connect(&self, account: &WalletDescriptor) -> Result<FuelProvider> {
        let secret = self.secret_for(&account.name).ok_or_else(|| {
            GameError::connection(format!("wallet '{}' is locked", account.name))
        })?;
        let provider = Provider::connect(&self.rpc_url).await.map_err(|e| {
            GameError::connection(format!("failed to reach {}: {e}", self.rpc_url))
        })?;
        let consensus_parameters = provider
            .consensus_parameters()
            .await
            .map_err(GameError::connection)?;
        let base_asset_id = *consensus_parameters.base_asset_id();
        let safe_script_gas_limit = consensus_parameters
            .tx_params()
            .max_gas_per_tx()
            .saturating_sub(1)
            .clamp(1, DEFAULT_SAFE_SCRIPT_GAS_LIMIT);
        debug!(safe_script_gas_limit, "connected to {}", self.rpc_url);

        let wallet = Wallet::new(PrivateKeySigner::new(secret), provider.clone());
        Ok(FuelProvider {
            provider,
            wallet,
            base_asset_id,
            safe_script_gas_limit,
            poll_interval: self.poll_interval,
        })
    }
}

/// Registry ids are 0x-prefixed hex. Anything else, bech32 `fuel1…`
/// included, is rejected up front.
pub fn parse_contract_id(contract_id: &str) -> Result<ContractId> {
    if !contract_id.starts_with("0x") {
        return Err(GameError::Registry(format!(
            "invalid contract id {contract_id:?}: expected 0x-prefixed hex"
        )));
    }
    ContractId::from_str(contract_id).map_err(|e| {
        GameError::Registry(format!("invalid contract id {contract_id:?}: {e}"))
    })
}

#[derive(Clone)]
pub struct FuelProvider {
    provider: Provider,
    wallet: Wallet,
    base_asset_id: AssetId,
    safe_script_gas_limit: u64,
    poll_interval: Duration,
}

impl ChainProvider for FuelProvider {
    type Contract = FuelGameContract;

    async fn network_id(&self) -> Result<u64> {
        let consensus_parameters = self
            .provider
            .consensus_parameters()
            .await
            .map_err(GameError::connection)?;
        Ok(u64::from(consensus_parameters.chain_id()))
    }

    fn account(&self) -> AccountId {
        let address: Address = (*self.wallet.address()).into();
        AccountId(address.into())
    }

    fn contract_at(&self, contract_id: &str) -> Result<FuelGameContract> {
        let id = parse_contract_id(contract_id)?;
        Ok(FuelGameContract {
            instance: game_contract_instance(id, self.wallet.clone()),
            provider: self.provider.clone(),
            base_asset_id: self.base_asset_id,
            safe_script_gas_limit: self.safe_script_gas_limit,
            poll_interval: self.poll_interval,
            receipts: Arc::new(AsyncMutex::new(RecentBlocks::with_capacity(
                RECENT_BLOCKS_KEPT,
            ))),
        })
    }

    fn new_blocks(&self, poll_interval: Duration) -> BlockStream {
        let provider = self.provider.clone();
        stream::unfold(
            (provider, None::<u32>),
            move |(provider, mut last_seen)| async move {
                loop {
                    time::sleep(poll_interval).await;
                    match provider.latest_block_height().await {
                        Ok(height) if last_seen.is_some_and(|last| height > last) => {
                            last_seen = Some(height);
                            return Some((Ok(height), (provider, last_seen)));
                        }
                        Ok(height) => last_seen = Some(height),
                        Err(e) => {
                            let err = GameError::connection(e);
                            return Some((Err(err), (provider, last_seen)));
                        }
                    }
                }
            },
        )
        .boxed()
    }
}

#[derive(Clone)]
pub struct FuelGameContract {
    instance: abi::NftGame<Wallet>,
    provider: Provider,
    base_asset_id: AssetId,
    safe_script_gas_limit: u64,
    poll_interval: Duration,
    receipts: Arc<AsyncMutex<RecentBlocks<Vec<Receipt>>>>,
}

impl FuelGameContract {
    fn script_policies(&self) -> TxPolicies {
        TxPolicies::default().with_script_gas_limit(self.safe_script_gas_limit)
    }

    /// Receipts of every transaction in block `height`, or `None` when the
    /// block does not exist yet. The lock is held across the fetch so
    /// concurrent feeds wait for one fetch instead of repeating it.
    async fn block_receipts(
        &self,
        height: u32,
    ) -> fuels::types::errors::Result<Option<Arc<Vec<Receipt>>>> {
        let mut recent = self.receipts.lock().await;
        if let Some(receipts) = recent.get(height) {
            return Ok(Some(receipts));
        }
        let Some(block) = self.provider.block_by_height(height.into()).await? else {
            return Ok(None);
        };
        let mut receipts = Vec::new();
        for tx_id in &block.transactions {
            receipts.extend(self.provider.tx_status(tx_id).await?.take_receipts());
        }
        Ok(Some(recent.insert(height, receipts)))
    }

    /// Decoded `kind` events of one block, or `None` when the block does not
    /// exist yet.
    async fn events_in_block(
        &self,
        kind: EventKind,
        height: u32,
    ) -> Result<Option<Vec<ContractEvent>>> {
        let fail = |e: fuels::types::errors::Error| GameError::subscription(kind, e);
        let Some(receipts) = self.block_receipts(height).await.map_err(fail)? else {
            return Ok(None);
        };

        let decoder = self.instance.log_decoder();
        let events: Vec<ContractEvent> = match kind {
            EventKind::CharacterCreated => decoder
                .decode_logs_with_type::<abi::CharacterCreated>(&receipts)
                .map_err(fail)?
                .into_iter()
                .map(ContractEvent::from)
                .collect(),
            EventKind::Healed => decoder
                .decode_logs_with_type::<abi::Healed>(&receipts)
                .map_err(fail)?
                .into_iter()
                .map(ContractEvent::from)
                .collect(),
            EventKind::Fighted => decoder
                .decode_logs_with_type::<abi::Fighted>(&receipts)
                .map_err(fail)?
                .into_iter()
                .map(ContractEvent::from)
                .collect(),
        };
        Ok(Some(events))
    }
}

impl GameContract for FuelGameContract {
    async fn characters(&self, scope: CharacterScope) -> Result<Vec<Character>> {
        let methods = self.instance.methods();
        let fail = |e: fuels::types::errors::Error| GameError::call(scope.method_name(), e);
        let raw = match scope {
            CharacterScope::Mine => methods
                .get_my_characters()
                .with_tx_policies(self.script_policies())
                .simulate(Execution::realistic())
                .await
                .map_err(fail)?
                .value,
            CharacterScope::Others => methods
                .get_others_characters()
                .with_tx_policies(self.script_policies())
                .simulate(Execution::realistic())
                .await
                .map_err(fail)?
                .value,
        };
        Ok(raw.into_iter().map(Character::from).collect())
    }

    async fn owner(&self) -> Result<AccountId> {
        let owner = self
            .instance
            .methods()
            .owner()
            .with_tx_policies(self.script_policies())
            .simulate(Execution::realistic())
            .await
            .map_err(|e| GameError::call("owner", e))?
            .value;
        let bytes: [u8; 32] = match owner {
            Identity::Address(address) => address.into(),
            Identity::ContractId(id) => id.into(),
        };
        Ok(AccountId(bytes))
    }

    async fn write(&self, call: WriteCall, fee: u64) -> Result<TxReceipt> {
        let method = call.method_name();
        let fail = |e: fuels::types::errors::Error| GameError::transaction(method, e);
        let methods = self.instance.methods();
        let params =
            CallParameters::new(fee, self.base_asset_id, self.safe_script_gas_limit);
        let tx_id = match call {
            WriteCall::CreateCharacter(kind) => methods
                .create_character(kind.into())
                .call_params(params)
                .map_err(fail)?
                .with_tx_policies(self.script_policies())
                .call()
                .await
                .map_err(fail)?
                .tx_id,
            WriteCall::Heal(token_id) => methods
                .heal(token_id)
                .call_params(params)
                .map_err(fail)?
                .with_tx_policies(self.script_policies())
                .call()
                .await
                .map_err(fail)?
                .tx_id,
            WriteCall::Fight {
                my_token_id,
                rival_token_id,
            } => methods
                .fight(my_token_id, rival_token_id)
                .call_params(params)
                .map_err(fail)?
                .with_tx_policies(self.script_policies())
                .call()
                .await
                .map_err(fail)?
                .tx_id,
            WriteCall::Spell {
                my_token_id,
                rival_token_id,
            } => methods
                .spell(my_token_id, rival_token_id)
                .call_params(params)
                .map_err(fail)?
                .with_tx_policies(self.script_policies())
                .call()
                .await
                .map_err(fail)?
                .tx_id,
            WriteCall::Withdraw => methods
                .withdraw()
                .with_tx_policies(self.script_policies())
                .call()
                .await
                .map_err(fail)?
                .tx_id,
        };
        let block_height = self.provider.latest_block_height().await.ok();
        Ok(TxReceipt {
            tx_id: tx_id.map(|id| id.to_string()),
            block_height,
        })
    }

    fn subscribe(&self, kind: EventKind, from_block: u32) -> EventStream {
        let contract = self.clone();
        stream::unfold(
            (contract, from_block, VecDeque::new()),
            move |(contract, mut next_block, mut buffered)| async move {
                loop {
                    if let Some(event) = buffered.pop_front() {
                        return Some((Ok(event), (contract, next_block, buffered)));
                    }
                    match contract.events_in_block(kind, next_block).await {
                        Ok(Some(events)) => {
                            buffered.extend(events);
                            next_block += 1;
                        }
                        Ok(None) => time::sleep(contract.poll_interval).await,
                        Err(e) => {
                            time::sleep(contract.poll_interval).await;
                            return Some((Err(e), (contract, next_block, buffered)));
                        }
                    }
                }
            },
        )
        .boxed()
    }
}
