use crate::{
    contract::{
        AccountId,
        GameContract,
    },
    controller::Inbound,
    error::{
        GameError,
        Result,
    },
    state::SessionInfo,
    wallets::WalletDescriptor,
};
use deployments::{
    DeploymentRegistry,
    SupportedNetwork,
};
use futures::stream::BoxStream;
use std::{
    fmt,
    future::Future,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    info,
    warn,
};

pub type BlockStream = BoxStream<'static, Result<u32>>;

/// The environment that supplies accounts and network connections.
pub trait WalletHost: Send + Sync + 'static {
    type Provider: ChainProvider;

    /// Known accounts in a stable order.
    fn discover_accounts(&self) -> Result<Vec<WalletDescriptor>>;

    fn is_unlocked(&self, account: &WalletDescriptor) -> bool;

    fn unlock(&self, account: &WalletDescriptor, password: &str) -> Result<()>;

    /// Chain id of the node the host points at, independent of any account.
    fn network_id(&self) -> impl Future<Output = Result<u64>> + Send;

    fn connect(
        &self,
        account: &WalletDescriptor,
    ) -> impl Future<Output = Result<Self::Provider>> + Send;
}

/// A network handle acting on behalf of one account.
pub trait ChainProvider: Clone + Send + Sync + 'static {
    type Contract: GameContract;

    fn network_id(&self) -> impl Future<Output = Result<u64>> + Send;

    fn account(&self) -> AccountId;

    fn contract_at(&self, contract_id: &str) -> Result<Self::Contract>;

    /// Heights of blocks produced after the stream was created.
    fn new_blocks(&self, poll_interval: Duration) -> BlockStream;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostChange {
    Network { from: Option<u64>, to: u64 },
    Accounts,
}

impl fmt::Display for HostChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostChange::Network { from: Some(from), to } => {
                write!(f, "network changed from {from} to {to}")
            }
            HostChange::Network { from: None, to } => {
                write!(f, "node became reachable on network {to}")
            }
            HostChange::Accounts => f.write_str("accounts changed"),
        }
    }
}

/// Provider, account and contract bound together for one connection
/// lifetime.
pub struct Session<P: ChainProvider> {
    pub epoch: u64,
    pub provider: P,
    pub accounts: Vec<WalletDescriptor>,
    pub active: WalletDescriptor,
    pub network: SupportedNetwork,
    pub network_id: u64,
    pub contract_id: String,
    pub contract: P::Contract,
    pub is_owner: bool,
    pub from_block: u32,
}

impl<P: ChainProvider> Session<P> {
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            account_name: self.active.name.clone(),
            account: self.provider.account(),
            accounts: self.accounts.iter().map(|a| a.name.clone()).collect(),
            network: self.network,
            network_id: self.network_id,
            contract_id: self.contract_id.clone(),
            is_owner: self.is_owner,
        }
    }
}

pub fn check_network(network_id: u64) -> Result<SupportedNetwork> {
    SupportedNetwork::from_network_id(network_id).ok_or_else(|| {
        GameError::UnsupportedNetwork {
            network_id,
            reason: "only Fuel Testnet and Fuel Ignition are allowed".to_string(),
        }
    })
}

/// Picks the active account and opens a provider for it.
pub async fn connect<H: WalletHost>(
    host: &H,
    preferred: Option<&str>,
) -> Result<(H::Provider, Vec<WalletDescriptor>, WalletDescriptor)> {
    let accounts = host.discover_accounts()?;
    let active = match preferred {
        Some(name) => accounts
            .iter()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| GameError::connection(format!("wallet '{name}' not found")))?,
        None => accounts
            .first()
            .cloned()
            .ok_or_else(|| GameError::connection("no wallet found"))?,
    };
    if !host.is_unlocked(&active) {
        return Err(GameError::connection(format!(
            "wallet '{}' is locked, press `a` to unlock it",
            active.name
        )));
    }
    let provider = host.connect(&active).await?;
    Ok((provider, accounts, active))
}

/// Binds the game contract for the provider's network. The network is
/// checked before the contract is touched.
pub async fn bind<P: ChainProvider>(
    provider: P,
    accounts: Vec<WalletDescriptor>,
    active: WalletDescriptor,
    registry: &DeploymentRegistry,
    abi_hash: &str,
    epoch: u64,
) -> Result<Session<P>> {
    let network_id = provider.network_id().await?;
    let network = check_network(network_id)?;
    let record =
        registry
            .record_for(network)
            .ok_or_else(|| GameError::UnsupportedNetwork {
                network_id,
                reason: format!("no deployment recorded for {network}"),
            })?;
    if !record.is_compatible_with_hash(abi_hash) {
        return Err(GameError::UnsupportedNetwork {
            network_id,
            reason: format!(
                "deployment {} was built from a different contract ABI",
                record.contract_id
            ),
        });
    }

    if record.deployment_block_height.is_none() {
        warn!(
            %network,
            contract_id = %record.contract_id,
            "deployment has no recorded block height, event feeds replay from block 0"
        );
    }
    let contract = provider.contract_at(&record.contract_id)?;
    let owner = contract.owner().await?;
    let is_owner = owner == provider.account();
    info!(
        %network,
        contract_id = %record.contract_id,
        account = %active.name,
        is_owner,
        "contract bound"
    );

    Ok(Session {
        epoch,
        provider,
        accounts,
        active,
        network,
        network_id,
        contract_id: record.contract_id.clone(),
        contract,
        is_owner,
        from_block: record.deployment_block_height.unwrap_or(0),
    })
}

pub async fn open<H: WalletHost>(
    host: &H,
    registry: &DeploymentRegistry,
    abi_hash: &str,
    preferred: Option<&str>,
    epoch: u64,
) -> Result<Session<H::Provider>> {
    let (provider, accounts, active) = connect(host, preferred).await?;
    bind(provider, accounts, active, registry, abi_hash, epoch).await
}

/// What the host looked like when a session started opening. Host changes
/// are measured against it whether or not the session came up.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HostSnapshot {
    pub network_id: Option<u64>,
    pub accounts: Vec<String>,
}

impl HostSnapshot {
    pub async fn capture<H: WalletHost>(host: &H) -> Self {
        let network_id = match host.network_id().await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to read network id");
                None
            }
        };
        let accounts = match host.discover_accounts() {
            Ok(accounts) => accounts.into_iter().map(|a| a.name).collect(),
            Err(e) => {
                warn!(error = %e, "failed to list accounts");
                Vec::new()
            }
        };
        Self {
            network_id,
            accounts,
        }
    }

    /// The first difference between this snapshot and the host right now.
    /// Polling failures are not changes.
    pub async fn change_on<H: WalletHost>(&self, host: &H) -> Option<HostChange> {
        match host.network_id().await {
            Ok(id) if Some(id) != self.network_id => {
                return Some(HostChange::Network {
                    from: self.network_id,
                    to: id,
                });
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to poll network id"),
        }
        match host.discover_accounts() {
            Ok(accounts) if !accounts.iter().map(|a| &a.name).eq(self.accounts.iter()) => {
                Some(HostChange::Accounts)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "failed to list accounts");
                None
            }
        }
    }
}

/// Polls the host for network and account-set changes against `baseline`
/// and reports the first one it sees. Runs for failed sessions too, so
/// fixing the network or adding a wallet brings the app back up.
pub fn spawn_host_watcher<H: WalletHost>(
    host: Arc<H>,
    baseline: HostSnapshot,
    epoch: u64,
    poll_interval: Duration,
    tx: mpsc::UnboundedSender<Inbound<H::Provider>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Some(change) = baseline.change_on(&*host).await {
                let _ = tx.send(Inbound::HostChanged { epoch, change });
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::fakes::{
        FakeHost,
        registry_for,
    };
    use deployments::{
        DeploymentRecord,
        IGNITION_NETWORK_ID,
        TESTNET_NETWORK_ID,
    };

    #[tokio::test]
    async fn bind__supported_networks__succeed() {
        for network in SupportedNetwork::ALL {
            // given
            let host = FakeHost::on_network(network.network_id());
            let registry = registry_for(network);
            let (provider, accounts, active) = connect(&host, None).await.unwrap();

            // when
            let session = bind(provider, accounts, active, &registry, &host.abi_hash(), 1)
                .await
                .unwrap();

            // then
            assert_eq!(session.network, network);
            assert_eq!(session.epoch, 1);
        }
    }

    #[tokio::test]
    async fn bind__unknown_network__fails_before_any_contract_call() {
        for network_id in [1, 42, 1337, 9890] {
            // given
            let host = FakeHost::on_network(network_id);
            let registry = DeploymentRegistry::from_records(
                SupportedNetwork::ALL
                    .into_iter()
                    .map(|n| (n, DeploymentRecord::new("0x01", "http://node", None, None))),
            );
            let (provider, accounts, active) = connect(&host, None).await.unwrap();

            // when
            let result = bind(provider, accounts, active, &registry, "", 1).await;

            // then
            assert!(matches!(
                result,
                Err(GameError::UnsupportedNetwork { network_id: id, .. }) if id == network_id
            ));
            assert_eq!(host.ledger().contract_lookups(), 0);
            assert_eq!(host.ledger().total_reads(), 0);
            assert!(host.ledger().writes().is_empty());
        }
    }

    #[tokio::test]
    async fn bind__missing_record__is_unsupported() {
        // given
        let host = FakeHost::on_network(IGNITION_NETWORK_ID);
        let registry = registry_for(SupportedNetwork::Testnet);
        let (provider, accounts, active) = connect(&host, None).await.unwrap();

        // when
        let result = bind(provider, accounts, active, &registry, &host.abi_hash(), 1).await;

        // then
        assert!(matches!(result, Err(GameError::UnsupportedNetwork { .. })));
        assert_eq!(host.ledger().contract_lookups(), 0);
    }

    #[tokio::test]
    async fn bind__abi_mismatch__is_unsupported() {
        // given
        let host = FakeHost::on_network(TESTNET_NETWORK_ID);
        let registry = registry_for(SupportedNetwork::Testnet);
        let (provider, accounts, active) = connect(&host, None).await.unwrap();

        // when
        let result = bind(provider, accounts, active, &registry, "not-the-hash", 1).await;

        // then
        let Err(GameError::UnsupportedNetwork { reason, .. }) = result else {
            panic!("expected an unsupported network error");
        };
        assert!(reason.contains("different contract ABI"));
    }

    #[tokio::test]
    async fn bind__owner_account__is_flagged() {
        // given
        let host = FakeHost::on_network(TESTNET_NETWORK_ID);
        host.ledger().make_owner(host.account());
        let registry = registry_for(SupportedNetwork::Testnet);

        // when
        let session = open(&host, &registry, &host.abi_hash(), None, 3)
            .await
            .unwrap();

        // then
        assert!(session.is_owner);
        assert!(session.info().is_owner);
    }

    #[tokio::test]
    async fn connect__no_wallets__is_a_connection_error() {
        let host = FakeHost::on_network(TESTNET_NETWORK_ID);
        host.set_accounts(&[]);

        let result = connect(&host, None).await;

        assert!(matches!(result, Err(GameError::Connection(_))));
    }

    #[tokio::test]
    async fn connect__preferred_wallet__becomes_active() {
        // given
        let host = FakeHost::on_network(TESTNET_NETWORK_ID);
        host.set_accounts(&["alice", "bob"]);

        // when
        let (_, accounts, active) = connect(&host, Some("bob")).await.unwrap();

        // then
        assert_eq!(accounts.len(), 2);
        assert_eq!(active.name, "bob");
    }

    #[tokio::test]
    async fn connect__locked_wallet__is_refused() {
        // given
        let host = FakeHost::on_network(TESTNET_NETWORK_ID);
        host.set_accounts(&["alice", "bob"]);
        host.lock("bob");

        // when
        let result = connect(&host, Some("bob")).await;

        // then
        assert!(matches!(result, Err(GameError::Connection(reason)) if reason.contains("locked")));
    }

    #[tokio::test]
    async fn host_snapshot__unchanged_host__reports_nothing() {
        let host = FakeHost::on_network(1337);
        let baseline = HostSnapshot::capture(&host).await;

        assert_eq!(baseline.change_on(&host).await, None);
    }

    #[tokio::test]
    async fn host_snapshot__network_switch__is_reported_with_both_ids() {
        // given
        let host = FakeHost::on_network(1337);
        let baseline = HostSnapshot::capture(&host).await;

        // when
        host.set_network(IGNITION_NETWORK_ID);

        // then
        assert_eq!(
            baseline.change_on(&host).await,
            Some(HostChange::Network {
                from: Some(1337),
                to: IGNITION_NETWORK_ID,
            })
        );
    }

    #[tokio::test]
    async fn host_snapshot__wallet_added__is_an_account_change() {
        // given
        let host = FakeHost::on_network(TESTNET_NETWORK_ID);
        host.set_accounts(&[]);
        let baseline = HostSnapshot::capture(&host).await;

        // when
        host.set_accounts(&["alice"]);

        // then
        assert_eq!(baseline.change_on(&host).await, Some(HostChange::Accounts));
    }
}
