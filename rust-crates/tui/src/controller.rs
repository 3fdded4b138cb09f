use crate::{
    actions::{
        self,
        Action,
        ActionFees,
        PendingActionFlag,
    },
    character::CharacterId,
    contract::TxReceipt,
    error::{
        GameError,
        Result,
    },
    events::{
        self,
        ContractEvent,
        Subscription,
    },
    notification::Notification,
    session::{
        self,
        ChainProvider,
        HostChange,
        HostSnapshot,
        Session,
        WalletHost,
    },
    state::{
        AppState,
        CharacterCollections,
        Connectivity,
    },
    sync::{
        self,
        RefreshCoalescer,
    },
};
use deployments::DeploymentRegistry;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{
    debug,
    error,
    info,
    warn,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);
pub const DEFAULT_HOST_POLL_INTERVAL: Duration = Duration::from_millis(2_000);

/// Everything background work reports back to the controller. Each message
/// carries the epoch of the session that produced it.
pub enum Inbound<P: ChainProvider> {
    SessionOpened {
        epoch: u64,
        baseline: HostSnapshot,
        result: Result<Session<P>>,
    },
    Refreshed {
        epoch: u64,
        result: Result<CharacterCollections>,
    },
    Event {
        epoch: u64,
        result: Result<ContractEvent>,
    },
    NewBlock {
        epoch: u64,
        result: Result<u32>,
    },
    ActionFinished {
        epoch: u64,
        action: Action,
        result: Result<TxReceipt>,
    },
    HostChanged {
        epoch: u64,
        change: HostChange,
    },
}

impl<P: ChainProvider> Inbound<P> {
    pub fn epoch(&self) -> u64 {
        match self {
            Inbound::SessionOpened { epoch, .. }
            | Inbound::Refreshed { epoch, .. }
            | Inbound::Event { epoch, .. }
            | Inbound::NewBlock { epoch, .. }
            | Inbound::ActionFinished { epoch, .. }
            | Inbound::HostChanged { epoch, .. } => *epoch,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub fees: ActionFees,
    pub poll_interval: Duration,
    pub host_poll_interval: Duration,
    pub preferred_account: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            fees: ActionFees::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            host_poll_interval: DEFAULT_HOST_POLL_INTERVAL,
            preferred_account: None,
        }
    }
}

struct LiveSession<P: ChainProvider> {
    session: Session<P>,
    _subscriptions: Vec<Subscription>,
    tasks: Vec<JoinHandle<()>>,
}

impl<P: ChainProvider> LiveSession<P> {
    fn track(&mut self, handle: JoinHandle<()>) {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(handle);
    }
}

impl<P: ChainProvider> Drop for LiveSession<P> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Owns the application state and the live session. All mutation happens
/// on the task that calls into the controller.
pub struct AppController<H: WalletHost> {
    host: Arc<H>,
    registry: Arc<DeploymentRegistry>,
    abi_hash: Arc<str>,
    config: ControllerConfig,
    state: AppState,
    pending: PendingActionFlag,
    refresh: RefreshCoalescer,
    epoch: u64,
    opening: Option<JoinHandle<()>>,
    host_watcher: Option<JoinHandle<()>>,
    live: Option<LiveSession<H::Provider>>,
    tx: mpsc::UnboundedSender<Inbound<H::Provider>>,
}

impl<H: WalletHost> AppController<H> {
    pub fn new(
        host: Arc<H>,
        registry: DeploymentRegistry,
        abi_hash: impl Into<Arc<str>>,
        config: ControllerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Inbound<H::Provider>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            host,
            registry: Arc::new(registry),
            abi_hash: abi_hash.into(),
            config,
            state: AppState::default(),
            pending: PendingActionFlag::default(),
            refresh: RefreshCoalescer::default(),
            epoch: 0,
            opening: None,
            host_watcher: None,
            live: None,
            tx,
        };
        (controller, rx)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_in_flight()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_set()
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.state.status = msg.into();
    }

    /// Tears the current session down and opens a fresh one. Calling this
    /// while a previous open is still running supersedes it.
    pub fn rebuild_session(&mut self) {
        self.teardown();
        self.epoch += 1;
        let epoch = self.epoch;
        info!(epoch, "opening session");
        self.set_status("Connecting...");

        let host = self.host.clone();
        let registry = self.registry.clone();
        let abi_hash = self.abi_hash.clone();
        let preferred = self.config.preferred_account.clone();
        let tx = self.tx.clone();
        self.opening = Some(tokio::spawn(async move {
            let baseline = HostSnapshot::capture(&*host).await;
            let result =
                session::open(&*host, &registry, &abi_hash, preferred.as_deref(), epoch)
                    .await;
            let _ = tx.send(Inbound::SessionOpened {
                epoch,
                baseline,
                result,
            });
        }));
    }

    fn teardown(&mut self) {
        if let Some(opening) = self.opening.take() {
            opening.abort();
        }
        if let Some(watcher) = self.host_watcher.take() {
            watcher.abort();
        }
        if let Some(live) = self.live.take() {
            debug!(epoch = live.session.epoch, "tearing session down");
        }
        self.refresh.reset();
        self.state.begin_connecting();
    }

    pub fn handle(&mut self, msg: Inbound<H::Provider>) {
        if msg.epoch() != self.epoch {
            debug!(
                stale_epoch = msg.epoch(),
                epoch = self.epoch,
                "dropping message from a previous session"
            );
            return;
        }
        match msg {
            Inbound::SessionOpened {
                baseline, result, ..
            } => self.on_session_opened(baseline, result),
            Inbound::Refreshed { result, .. } => self.on_refreshed(result),
            Inbound::Event { result, .. } => self.on_event(result),
            Inbound::NewBlock { result, .. } => match result {
                Ok(height) => {
                    debug!(height, "new block");
                    self.request_refresh();
                }
                Err(e) => warn!(error = %e, "block watcher error"),
            },
            Inbound::ActionFinished { action, result, .. } => {
                self.on_action_finished(action, result)
            }
            Inbound::HostChanged { change, .. } => {
                info!(%change, "host changed, rebuilding session");
                self.rebuild_session();
            }
        }
        self.state.pending = self.pending.is_set();
    }

    fn on_session_opened(
        &mut self,
        baseline: HostSnapshot,
        result: Result<Session<H::Provider>>,
    ) {
        self.opening = None;
        self.host_watcher = Some(session::spawn_host_watcher(
            self.host.clone(),
            baseline,
            self.epoch,
            self.config.host_poll_interval,
            self.tx.clone(),
        ));
        let session = match result {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "failed to open session");
                self.push_session_error(&e);
                return;
            }
        };

        let epoch = session.epoch;
        let subscriptions = events::subscribe_all::<H::Provider>(
            &session.contract,
            session.from_block,
            epoch,
            &self.tx,
        );
        let block_watcher = sync::spawn_block_watcher(
            &session.provider,
            self.config.poll_interval,
            epoch,
            self.tx.clone(),
        );

        self.state.connectivity = Connectivity::Connected(session.info());
        self.set_status(format!(
            "Connected to {} as {}",
            session.network, session.active.name
        ));
        self.live = Some(LiveSession {
            session,
            _subscriptions: subscriptions,
            tasks: vec![block_watcher],
        });
        self.request_refresh();
    }

    fn push_session_error(&mut self, e: &GameError) {
        self.state.connectivity = Connectivity::Failed(e.to_string());
        let notification = match e {
            GameError::UnsupportedNetwork { reason, .. } => {
                Notification::wrong_network(reason)
            }
            other => Notification::error(format!(
                "Failed to load provider, accounts, or contract: {other}"
            )),
        };
        self.state.notify(notification);
        self.set_status("Disconnected, waiting for a network or wallet change (r to retry now)");
    }

    pub fn request_refresh(&mut self) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if self.refresh.request() {
            let handle = sync::spawn_refresh::<H::Provider>(
                live.session.contract.clone(),
                live.session.epoch,
                self.tx.clone(),
            );
            live.track(handle);
        }
    }

    fn on_refreshed(&mut self, result: Result<CharacterCollections>) {
        match result {
            Ok(collections) => self.state.replace_characters(collections),
            Err(e) => warn!(error = %e, "refresh failed, keeping previous characters"),
        }
        if !self.refresh.complete() {
            return;
        }
        if let Some(live) = self.live.as_mut() {
            let handle = sync::spawn_refresh::<H::Provider>(
                live.session.contract.clone(),
                live.session.epoch,
                self.tx.clone(),
            );
            live.track(handle);
        }
    }

    fn on_event(&mut self, result: Result<ContractEvent>) {
        match result {
            Ok(event) => {
                info!(?event, "contract event");
                if event.requires_refresh() {
                    self.request_refresh();
                }
                self.state.notify(event.notification());
            }
            Err(e) => {
                error!(error = %e, "event subscription error");
                self.state.notify(Notification::error(e.to_string()));
            }
        }
    }

    fn on_action_finished(&mut self, action: Action, result: Result<TxReceipt>) {
        match result {
            Ok(receipt) => {
                self.set_status(format!(
                    "{} confirmed{}",
                    action.label(),
                    receipt
                        .tx_id
                        .map(|id| format!(" ({id})"))
                        .unwrap_or_default()
                ));
                if action.refreshes_on_success() {
                    self.request_refresh();
                }
            }
            Err(e) => {
                self.set_status(format!("{} failed", action.label()));
                self.state
                    .notify(Notification::error(format!("{} failed: {e}", action.label())));
            }
        }
    }

    /// Submits `action` unless it is refused by the current state. Returns
    /// whether the write was started.
    pub fn dispatch(&mut self, action: Action) -> bool {
        self.state.pending = self.pending.is_set();
        if let Some(reason) = self.state.refusal(&action) {
            self.set_status(reason);
            return false;
        }
        let Some(live) = self.live.as_mut() else {
            return false;
        };
        let Some(guard) = self.pending.try_enter() else {
            self.set_status("Another action is still pending");
            return false;
        };

        let contract = live.session.contract.clone();
        let epoch = live.session.epoch;
        let fees = self.config.fees;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let result = actions::execute(&contract, action, &fees, guard).await;
            let _ = tx.send(Inbound::ActionFinished {
                epoch,
                action,
                result,
            });
        });
        live.track(handle);

        self.state.pending = true;
        self.state.status = format!("{action} pending...");
        true
    }

    pub fn select_own(&mut self, id: CharacterId) {
        if self.state.select_own(id) {
            self.set_status(format!("Character #{id} selected for combat"));
        } else {
            self.set_status("You have no such character to select");
        }
    }

    pub fn cycle_creation_type(&mut self) {
        self.state.creation_type = self.state.creation_type.next();
    }

    pub fn dismiss_notification(&mut self) {
        self.state.notification.dismiss();
    }

    /// Account names known to the host, with whether each is unlocked.
    pub fn account_choices(&self) -> Vec<(String, bool)> {
        match self.host.discover_accounts() {
            Ok(accounts) => accounts
                .iter()
                .map(|a| (a.name.clone(), self.host.is_unlocked(a)))
                .collect(),
            Err(e) => {
                warn!(error = %e, "failed to list accounts");
                Vec::new()
            }
        }
    }

    pub fn active_account(&self) -> Option<&str> {
        self.config.preferred_account.as_deref().or_else(|| {
            self.live
                .as_ref()
                .map(|live| live.session.active.name.as_str())
        })
    }

    pub fn switch_account(&mut self, name: impl Into<String>) {
        let name = name.into();
        info!(account = %name, "switching account");
        self.config.preferred_account = Some(name);
        self.rebuild_session();
    }

    pub fn unlock_and_switch(&mut self, name: &str, password: &str) -> Result<()> {
        let accounts = self.host.discover_accounts()?;
        let account = accounts
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| GameError::connection(format!("wallet '{name}' not found")))?;
        self.host.unlock(account, password)?;
        self.switch_account(name);
        Ok(())
    }
}

impl<H: WalletHost> Drop for AppController<H> {
    fn drop(&mut self) {
        if let Some(opening) = self.opening.take() {
            opening.abort();
        }
        if let Some(watcher) = self.host_watcher.take() {
            watcher.abort();
        }
    }
}

#[cfg(test)]
mod tests;
