use crate::events::EventKind;

pub type Result<T, E = GameError> = std::result::Result<T, E>;

/// Failures surfaced by the game session. Every variant carries a rendered
/// reason so errors can cross task boundaries and be shown to the player.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("failed to connect: {0}")]
    Connection(String),
    #[error("network {network_id} is not supported: {reason}")]
    UnsupportedNetwork { network_id: u64, reason: String },
    #[error("call to `{method}` failed: {reason}")]
    Call { method: &'static str, reason: String },
    #[error("transaction `{method}` failed: {reason}")]
    Transaction { method: &'static str, reason: String },
    #[error("{kind} subscription failed: {reason}")]
    Subscription { kind: EventKind, reason: String },
    #[error("deployment registry error: {0}")]
    Registry(String),
}

impl GameError {
    pub fn connection(reason: impl ToString) -> Self {
        Self::Connection(reason.to_string())
    }

    pub fn call(method: &'static str, reason: impl ToString) -> Self {
        Self::Call {
            method,
            reason: reason.to_string(),
        }
    }

    pub fn transaction(method: &'static str, reason: impl ToString) -> Self {
        Self::Transaction {
            method,
            reason: reason.to_string(),
        }
    }

    pub fn subscription(kind: EventKind, reason: impl ToString) -> Self {
        Self::Subscription {
            kind,
            reason: reason.to_string(),
        }
    }

    /// Errors that leave the client without a usable session.
    pub fn blocks_session(&self) -> bool {
        matches!(
            self,
            GameError::Connection(_)
                | GameError::UnsupportedNetwork { .. }
                | GameError::Registry(_)
        )
    }
}
