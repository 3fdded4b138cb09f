//! In-memory stand-ins for the wallet host, provider and game contract.

use crate::{
    NFT_GAME_ABI_JSON,
    character::{
        Character,
        CharacterType,
    },
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
    session::{
        BlockStream,
        ChainProvider,
        WalletHost,
    },
    wallets::WalletDescriptor,
};
use deployments::{
    DeploymentRecord,
    DeploymentRegistry,
    SupportedNetwork,
    compute_abi_hash,
};
use futures::{
    StreamExt,
    stream,
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    path::PathBuf,
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicBool,
            AtomicU64,
            AtomicUsize,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::sync::mpsc;

pub const FAKE_PASSWORD: &str = "secret";
pub const FAKE_CONTRACT_ID: &str =
    "0x1111111111111111111111111111111111111111111111111111111111111111";

pub fn arb_character(id: u64, hp: u64, mana: u64) -> Character {
    Character {
        id,
        character_type: CharacterType::from_raw(id % 3),
        hp,
        mana,
        xp: 0,
        attack: 10,
        armor: 5,
        magic_attack: 8,
        magic_resistance: 4,
    }
}

pub fn fake_abi_hash() -> String {
    compute_abi_hash(NFT_GAME_ABI_JSON)
}

pub fn registry_for(network: SupportedNetwork) -> DeploymentRegistry {
    DeploymentRegistry::from_records([(
        network,
        DeploymentRecord::new(
            FAKE_CONTRACT_ID,
            "http://fake-node",
            Some(fake_abi_hash()),
            Some(0),
        ),
    )])
}

pub fn account_for(name: &str) -> AccountId {
    let mut bytes = [0u8; 32];
    for (slot, byte) in bytes.iter_mut().zip(name.bytes()) {
        *slot = byte;
    }
    AccountId(bytes)
}

#[derive(Default)]
struct LedgerInner {
    characters: Mutex<(Vec<Character>, Vec<Character>)>,
    mine_reads: AtomicUsize,
    other_reads: AtomicUsize,
    owner_reads: AtomicUsize,
    contract_lookups: AtomicUsize,
    writes: Mutex<Vec<(WriteCall, u64)>>,
    fail_reads: Mutex<Option<String>>,
    fail_writes: Mutex<Option<String>>,
    hold_writes: AtomicBool,
    owner: Mutex<AccountId>,
    event_feeds: Mutex<HashMap<EventKind, mpsc::UnboundedSender<Result<ContractEvent>>>>,
    block_feed: Mutex<Option<mpsc::UnboundedSender<Result<u32>>>>,
}

/// Contract-side state shared by every fake handle.
#[derive(Clone, Default)]
pub struct FakeLedger(Arc<LedgerInner>);

impl FakeLedger {
    pub fn contract(&self) -> FakeContract {
        FakeContract {
            ledger: self.clone(),
        }
    }

    pub fn set_characters(&self, mine: Vec<Character>, others: Vec<Character>) {
        *self.0.characters.lock().unwrap() = (mine, others);
    }

    pub fn fail_reads_with(&self, reason: &str) {
        *self.0.fail_reads.lock().unwrap() = Some(reason.to_string());
    }

    pub fn fail_writes_with(&self, reason: &str) {
        *self.0.fail_writes.lock().unwrap() = Some(reason.to_string());
    }

    /// Makes every write hang until its task is aborted.
    pub fn hold_writes(&self) {
        self.0.hold_writes.store(true, Ordering::SeqCst);
    }

    pub fn make_owner(&self, account: AccountId) {
        *self.0.owner.lock().unwrap() = account;
    }

    pub fn writes(&self) -> Vec<(WriteCall, u64)> {
        self.0.writes.lock().unwrap().clone()
    }

    /// Number of refreshes observed, counted by reads of the own collection.
    pub fn refresh_count(&self) -> usize {
        self.0.mine_reads.load(Ordering::SeqCst)
    }

    pub fn total_reads(&self) -> usize {
        self.0.mine_reads.load(Ordering::SeqCst)
            + self.0.other_reads.load(Ordering::SeqCst)
            + self.0.owner_reads.load(Ordering::SeqCst)
    }

    pub fn contract_lookups(&self) -> usize {
        self.0.contract_lookups.load(Ordering::SeqCst)
    }

    pub fn subscribed_kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<_> = self.0.event_feeds.lock().unwrap().keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn emit(&self, event: ContractEvent) {
        self.send_event(event.kind(), Ok(event));
    }

    pub fn emit_error(&self, kind: EventKind, reason: &str) {
        self.send_event(kind, Err(GameError::subscription(kind, reason)));
    }

    fn send_event(&self, kind: EventKind, item: Result<ContractEvent>) {
        let feeds = self.0.event_feeds.lock().unwrap();
        let feed = feeds.get(&kind).expect("no subscription for event kind");
        feed.send(item).expect("subscription receiver alive");
    }

    pub fn produce_block(&self, height: u32) {
        if let Some(feed) = self.0.block_feed.lock().unwrap().as_ref() {
            let _ = feed.send(Ok(height));
        }
    }
}

fn channel_stream<T: Send + 'static>(
    rx: mpsc::UnboundedReceiver<T>,
) -> futures::stream::BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
        .boxed()
}

#[derive(Clone)]
pub struct FakeContract {
    ledger: FakeLedger,
}

impl GameContract for FakeContract {
    async fn characters(&self, scope: CharacterScope) -> Result<Vec<Character>> {
        let inner = &self.ledger.0;
        match scope {
            CharacterScope::Mine => inner.mine_reads.fetch_add(1, Ordering::SeqCst),
            CharacterScope::Others => inner.other_reads.fetch_add(1, Ordering::SeqCst),
        };
        if let Some(reason) = inner.fail_reads.lock().unwrap().clone() {
            return Err(GameError::call(scope.method_name(), reason));
        }
        let characters = inner.characters.lock().unwrap();
        Ok(match scope {
            CharacterScope::Mine => characters.0.clone(),
            CharacterScope::Others => characters.1.clone(),
        })
    }

    async fn owner(&self) -> Result<AccountId> {
        self.ledger.0.owner_reads.fetch_add(1, Ordering::SeqCst);
        Ok(*self.ledger.0.owner.lock().unwrap())
    }

    async fn write(&self, call: WriteCall, fee: u64) -> Result<TxReceipt> {
        let inner = &self.ledger.0;
        if inner.hold_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(reason) = inner.fail_writes.lock().unwrap().clone() {
            return Err(GameError::transaction(call.method_name(), reason));
        }
        let mut writes = inner.writes.lock().unwrap();
        writes.push((call, fee));
        Ok(TxReceipt {
            tx_id: Some(format!("0x{:064x}", writes.len())),
            block_height: Some(writes.len() as u32),
        })
    }

    fn subscribe(&self, kind: EventKind, _from_block: u32) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.ledger.0.event_feeds.lock().unwrap().insert(kind, tx);
        channel_stream(rx)
    }
}

#[derive(Clone)]
pub struct FakeProvider {
    ledger: FakeLedger,
    network_id: Arc<AtomicU64>,
    account: AccountId,
}

impl ChainProvider for FakeProvider {
    type Contract = FakeContract;

    async fn network_id(&self) -> Result<u64> {
        Ok(self.network_id.load(Ordering::SeqCst))
    }

    fn account(&self) -> AccountId {
        self.account
    }

    fn contract_at(&self, contract_id: &str) -> Result<FakeContract> {
        self.ledger.0.contract_lookups.fetch_add(1, Ordering::SeqCst);
        if contract_id != FAKE_CONTRACT_ID {
            return Err(GameError::Registry(format!("unknown contract {contract_id}")));
        }
        Ok(self.ledger.contract())
    }

    fn new_blocks(&self, _poll_interval: Duration) -> BlockStream {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.ledger.0.block_feed.lock().unwrap() = Some(tx);
        channel_stream(rx)
    }
}

pub struct FakeHost {
    ledger: FakeLedger,
    network_id: Arc<AtomicU64>,
    accounts: Mutex<Vec<WalletDescriptor>>,
    locked: Mutex<HashSet<String>>,
    connects: AtomicUsize,
}

impl FakeHost {
    pub fn on_network(network_id: u64) -> Self {
        let host = Self {
            ledger: FakeLedger::default(),
            network_id: Arc::new(AtomicU64::new(network_id)),
            accounts: Mutex::new(Vec::new()),
            locked: Mutex::new(HashSet::new()),
            connects: AtomicUsize::new(0),
        };
        host.set_accounts(&["alice"]);
        host
    }

    pub fn ledger(&self) -> &FakeLedger {
        &self.ledger
    }

    pub fn abi_hash(&self) -> String {
        fake_abi_hash()
    }

    /// Address of the first account, the default active one.
    pub fn account(&self) -> AccountId {
        let accounts = self.accounts.lock().unwrap();
        accounts
            .first()
            .map(|a| account_for(&a.name))
            .unwrap_or_default()
    }

    pub fn set_accounts(&self, names: &[&str]) {
        *self.accounts.lock().unwrap() = names
            .iter()
            .map(|name| {
                WalletDescriptor::new(*name, PathBuf::from(format!("/fake/{name}.wallet")))
            })
            .collect();
    }

    pub fn set_network(&self, network_id: u64) {
        self.network_id.store(network_id, Ordering::SeqCst);
    }

    pub fn lock(&self, name: &str) {
        self.locked.lock().unwrap().insert(name.to_string());
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl WalletHost for FakeHost {
    type Provider = FakeProvider;

    fn discover_accounts(&self) -> Result<Vec<WalletDescriptor>> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    fn is_unlocked(&self, account: &WalletDescriptor) -> bool {
        !self.locked.lock().unwrap().contains(&account.name)
    }

    fn unlock(&self, account: &WalletDescriptor, password: &str) -> Result<()> {
        if password != FAKE_PASSWORD {
            return Err(GameError::connection(format!(
                "Invalid password for wallet '{}'",
                account.name
            )));
        }
        self.locked.lock().unwrap().remove(&account.name);
        Ok(())
    }

    async fn network_id(&self) -> Result<u64> {
        Ok(self.network_id.load(Ordering::SeqCst))
    }

    async fn connect(&self, account: &WalletDescriptor) -> Result<FakeProvider> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(FakeProvider {
            ledger: self.ledger.clone(),
            network_id: self.network_id.clone(),
            account: account_for(&account.name),
        })
    }
}
