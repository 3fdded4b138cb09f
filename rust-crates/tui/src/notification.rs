use crate::character::CharacterId;
use chrono::{
    DateTime,
    Local,
};

/// Points restored by a single heal.
pub const HEAL_AMOUNT: u64 = 50;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub raised_at: DateTime<Local>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            raised_at: Local::now(),
        }
    }

    pub fn character_created(id: CharacterId) -> Self {
        Self::new(
            "Character Created",
            format!("You have a new character #{id}"),
        )
    }

    pub fn healed(token_id: CharacterId) -> Self {
        Self::new(
            "Your Character Is Healed",
            format!("Your character #{token_id} was healed of {HEAL_AMOUNT} points"),
        )
    }

    pub fn fight(
        my_token_id: CharacterId,
        rival_token_id: CharacterId,
        damage_to_rival: u64,
        damage_to_me: u64,
    ) -> Self {
        Self::new(
            "The Fight Took Place",
            format!(
                "Your character #{my_token_id} fought with #{rival_token_id}. \
                 You inflicted {damage_to_rival} hp and you suffered {damage_to_me} hp."
            ),
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    pub fn wrong_network(detail: impl std::fmt::Display) -> Self {
        Self::new(
            "Wrong Network",
            format!("Please switch to Fuel Testnet or Fuel Ignition ({detail})"),
        )
    }
}

/// Single-slot notification modal. A new message replaces the current one.
#[derive(Clone, Debug, Default)]
pub struct NotificationState {
    current: Option<Notification>,
    visible: bool,
    raised: usize,
}

impl NotificationState {
    pub fn show(&mut self, notification: Notification) {
        self.current = Some(notification);
        self.visible = true;
        self.raised += 1;
    }

    /// How many notifications have been shown so far.
    pub fn raised_count(&self) -> usize {
        self.raised
    }

    pub fn dismiss(&mut self) {
        self.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn current(&self) -> Option<&Notification> {
        self.current.as_ref()
    }

    /// The notification to render, if the modal is open.
    pub fn visible(&self) -> Option<&Notification> {
        self.current.as_ref().filter(|_| self.visible)
    }
}
