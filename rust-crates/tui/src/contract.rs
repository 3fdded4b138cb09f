use crate::{
    character::{
        Character,
        CharacterId,
        CharacterType,
    },
    error::Result,
    events::{
        EventKind,
        EventStream,
    },
};
use std::{
    fmt,
    future::Future,
};

/// 32-byte account or contract identity as seen by the game.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn short(&self) -> String {
        let hex = hex::encode(self.0);
        format!("0x{}…{}", &hex[..6], &hex[hex.len() - 4..])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CharacterScope {
    Mine,
    Others,
}

impl CharacterScope {
    pub fn method_name(self) -> &'static str {
        match self {
            CharacterScope::Mine => "get_my_characters",
            CharacterScope::Others => "get_others_characters",
        }
    }
}

/// State-changing contract methods.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteCall {
    CreateCharacter(CharacterType),
    Heal(CharacterId),
    Fight {
        my_token_id: CharacterId,
        rival_token_id: CharacterId,
    },
    Spell {
        my_token_id: CharacterId,
        rival_token_id: CharacterId,
    },
    Withdraw,
}

impl WriteCall {
    pub fn method_name(self) -> &'static str {
        match self {
            WriteCall::CreateCharacter(_) => "create_character",
            WriteCall::Heal(_) => "heal",
            WriteCall::Fight { .. } => "fight",
            WriteCall::Spell { .. } => "spell",
            WriteCall::Withdraw => "withdraw",
        }
    }

    pub fn is_payable(self) -> bool {
        !matches!(self, WriteCall::Withdraw)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TxReceipt {
    pub tx_id: Option<String>,
    pub block_height: Option<u32>,
}

/// Typed handle on the deployed game contract, bound to the active account.
pub trait GameContract: Clone + Send + Sync + 'static {
    fn characters(
        &self,
        scope: CharacterScope,
    ) -> impl Future<Output = Result<Vec<Character>>> + Send;

    fn owner(&self) -> impl Future<Output = Result<AccountId>> + Send;

    /// Submits `call` attaching `fee` units of the base asset. Non-payable
    /// calls ignore the fee.
    fn write(
        &self,
        call: WriteCall,
        fee: u64,
    ) -> impl Future<Output = Result<TxReceipt>> + Send;

    /// Standing feed of `kind` events from `from_block` on. Delivery errors
    /// are yielded as items and the feed keeps going.
    fn subscribe(&self, kind: EventKind, from_block: u32) -> EventStream;
}
