use crate::{
    character::CharacterId,
    contract::GameContract,
    controller::Inbound,
    error::Result,
    nft_game_types as abi,
    notification::Notification,
    session::ChainProvider,
};
use futures::{
    StreamExt,
    stream::BoxStream,
};
use std::fmt;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{
    debug,
    warn,
};

pub type EventStream = BoxStream<'static, Result<ContractEvent>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    CharacterCreated,
    Healed,
    Fighted,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::CharacterCreated,
        EventKind::Healed,
        EventKind::Fighted,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::CharacterCreated => "CharacterCreated",
            EventKind::Healed => "Healed",
            EventKind::Fighted => "Fighted",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ContractEvent {
    CharacterCreated {
        id: CharacterId,
    },
    Healed {
        token_id: CharacterId,
    },
    Fighted {
        my_token_id: CharacterId,
        rival_token_id: CharacterId,
        damage_to_rival: u64,
        damage_to_me: u64,
    },
}

impl ContractEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ContractEvent::CharacterCreated { .. } => EventKind::CharacterCreated,
            ContractEvent::Healed { .. } => EventKind::Healed,
            ContractEvent::Fighted { .. } => EventKind::Fighted,
        }
    }

    /// Heals and fights change character stats, so the collections must be
    /// re-read before the player sees the message.
    pub fn requires_refresh(&self) -> bool {
        !matches!(self, ContractEvent::CharacterCreated { .. })
    }

    pub fn notification(&self) -> Notification {
        match *self {
            ContractEvent::CharacterCreated { id } => Notification::character_created(id),
            ContractEvent::Healed { token_id } => Notification::healed(token_id),
            ContractEvent::Fighted {
                my_token_id,
                rival_token_id,
                damage_to_rival,
                damage_to_me,
            } => Notification::fight(
                my_token_id,
                rival_token_id,
                damage_to_rival,
                damage_to_me,
            ),
        }
    }
}

impl From<abi::CharacterCreated> for ContractEvent {
    fn from(value: abi::CharacterCreated) -> Self {
        ContractEvent::CharacterCreated { id: value.id }
    }
}

impl From<abi::Healed> for ContractEvent {
    fn from(value: abi::Healed) -> Self {
        ContractEvent::Healed {
            token_id: value.token_id,
        }
    }
}

impl From<abi::Fighted> for ContractEvent {
    fn from(value: abi::Fighted) -> Self {
        ContractEvent::Fighted {
            my_token_id: value.my_token_id,
            rival_token_id: value.rival_token_id,
            damage_to_rival: value.substrate_life_to_rival,
            damage_to_me: value.substrate_life_to_me,
        }
    }
}

/// A running event feed. Dropping it stops delivery.
#[derive(Debug)]
pub struct Subscription {
    kind: EventKind,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Forwards every item of the `kind` feed into the controller's inbox,
/// tagged with the session epoch.
pub fn subscribe<P: ChainProvider>(
    contract: &P::Contract,
    kind: EventKind,
    from_block: u32,
    epoch: u64,
    tx: mpsc::UnboundedSender<Inbound<P>>,
) -> Subscription {
    let mut feed = contract.subscribe(kind, from_block);
    let handle = tokio::spawn(async move {
        debug!(%kind, from_block, epoch, "subscription started");
        while let Some(result) = feed.next().await {
            if let Err(e) = &result {
                warn!(%kind, error = %e, "event delivery failed");
            }
            if tx.send(Inbound::Event { epoch, result }).is_err() {
                break;
            }
        }
        debug!(%kind, epoch, "subscription ended");
    });
    Subscription { kind, handle }
}

pub fn subscribe_all<P: ChainProvider>(
    contract: &P::Contract,
    from_block: u32,
    epoch: u64,
    tx: &mpsc::UnboundedSender<Inbound<P>>,
) -> Vec<Subscription> {
    EventKind::ALL
        .into_iter()
        .map(|kind| subscribe::<P>(contract, kind, from_block, epoch, tx.clone()))
        .collect()
}
