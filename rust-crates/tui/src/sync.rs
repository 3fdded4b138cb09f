use crate::{
    contract::{
        CharacterScope,
        GameContract,
    },
    controller::Inbound,
    error::Result,
    session::ChainProvider,
    state::CharacterCollections,
};
use futures::StreamExt;
use std::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tracing::debug;

/// Reads both collections for the active account. Either both succeed or
/// the refresh fails as a whole.
pub async fn refresh<C: GameContract>(contract: &C) -> Result<CharacterCollections> {
    let (mine, others) = futures::try_join!(
        contract.characters(CharacterScope::Mine),
        contract.characters(CharacterScope::Others),
    )?;
    Ok(CharacterCollections { mine, others })
}

/// Keeps at most one refresh in flight and remembers whether another was
/// requested meanwhile.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RefreshCoalescer {
    in_flight: bool,
    dirty: bool,
}

impl RefreshCoalescer {
    /// Returns true when the caller should start a refresh now.
    pub fn request(&mut self) -> bool {
        if self.in_flight {
            self.dirty = true;
            false
        } else {
            self.in_flight = true;
            true
        }
    }

    /// Marks the running refresh done. Returns true when a follow-up refresh
    /// should start immediately.
    pub fn complete(&mut self) -> bool {
        if self.dirty {
            self.dirty = false;
            true
        } else {
            self.in_flight = false;
            false
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

pub fn spawn_refresh<P: ChainProvider>(
    contract: P::Contract,
    epoch: u64,
    tx: mpsc::UnboundedSender<Inbound<P>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = refresh(&contract).await;
        let _ = tx.send(Inbound::Refreshed { epoch, result });
    })
}

/// Forwards new block heights so the controller can refresh on each block.
pub fn spawn_block_watcher<P: ChainProvider>(
    provider: &P,
    poll_interval: Duration,
    epoch: u64,
    tx: mpsc::UnboundedSender<Inbound<P>>,
) -> JoinHandle<()> {
    let mut blocks = provider.new_blocks(poll_interval);
    tokio::spawn(async move {
        while let Some(result) = blocks.next().await {
            if tx.send(Inbound::NewBlock { epoch, result }).is_err() {
                break;
            }
        }
        debug!(epoch, "block watcher stopped");
    })
}
