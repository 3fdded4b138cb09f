use crate::{
    character::{
        CharacterId,
        CharacterType,
    },
    contract::{
        GameContract,
        TxReceipt,
        WriteCall,
    },
    error::Result,
};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
};
use tracing::{
    info,
    warn,
};

pub const DEFAULT_CREATION_FEE: u64 = 1_000_000;
pub const DEFAULT_COMBAT_FEE: u64 = 10_000;

/// A player intent that results in a fee-bearing write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    Create(CharacterType),
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

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::Create(_) => "Create character",
            Action::Heal(_) => "Heal",
            Action::Fight { .. } => "Fight",
            Action::Spell { .. } => "Spell",
            Action::Withdraw => "Withdraw",
        }
    }

    pub fn write_call(self) -> WriteCall {
        match self {
            Action::Create(kind) => WriteCall::CreateCharacter(kind),
            Action::Heal(id) => WriteCall::Heal(id),
            Action::Fight {
                my_token_id,
                rival_token_id,
            } => WriteCall::Fight {
                my_token_id,
                rival_token_id,
            },
            Action::Spell {
                my_token_id,
                rival_token_id,
            } => WriteCall::Spell {
                my_token_id,
                rival_token_id,
            },
            Action::Withdraw => WriteCall::Withdraw,
        }
    }

    /// Whether a successful write should be followed by a character refresh.
    pub fn refreshes_on_success(&self) -> bool {
        matches!(
            self,
            Action::Heal(_) | Action::Fight { .. } | Action::Spell { .. }
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create(kind) => write!(f, "create {kind}"),
            Action::Heal(id) => write!(f, "heal #{id}"),
            Action::Fight {
                my_token_id,
                rival_token_id,
            } => write!(f, "fight #{my_token_id} vs #{rival_token_id}"),
            Action::Spell {
                my_token_id,
                rival_token_id,
            } => write!(f, "spell #{my_token_id} on #{rival_token_id}"),
            Action::Withdraw => f.write_str("withdraw"),
        }
    }
}

/// Amounts attached to each write, in the base asset's smallest unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ActionFees {
    pub creation: u64,
    pub combat: u64,
    pub heal: u64,
}

impl Default for ActionFees {
    fn default() -> Self {
        Self {
            creation: DEFAULT_CREATION_FEE,
            combat: DEFAULT_COMBAT_FEE,
            heal: DEFAULT_COMBAT_FEE,
        }
    }
}

impl ActionFees {
    pub fn fee_for(&self, action: &Action) -> u64 {
        match action {
            Action::Create(_) => self.creation,
            Action::Heal(_) => self.heal,
            Action::Fight { .. } | Action::Spell { .. } => self.combat,
            Action::Withdraw => 0,
        }
    }
}

/// Process-wide "a write is in flight" flag.
#[derive(Clone, Debug, Default)]
pub struct PendingActionFlag(Arc<AtomicBool>);

impl PendingActionFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Claims the flag, or returns `None` when another action holds it.
    pub fn try_enter(&self) -> Option<PendingGuard> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| PendingGuard(self.0.clone()))
    }
}

/// Clears the pending flag when dropped, whichever way the action ends.
#[derive(Debug)]
pub struct PendingGuard(Arc<AtomicBool>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs one action against the contract while holding the pending guard.
pub async fn execute<C: GameContract>(
    contract: &C,
    action: Action,
    fees: &ActionFees,
    guard: PendingGuard,
) -> Result<TxReceipt> {
    let _guard = guard;
    let fee = fees.fee_for(&action);
    info!(%action, fee, "submitting action");
    let result = contract.write(action.write_call(), fee).await;
    match &result {
        Ok(receipt) => info!(
            %action,
            tx_id = receipt.tx_id.as_deref().unwrap_or("-"),
            "action confirmed"
        ),
        Err(e) => warn!(%action, error = %e, "action failed"),
    }
    result
}
