use crate::{
    actions::Action,
    character::{
        Character,
        CharacterId,
        CharacterType,
    },
    contract::AccountId,
    notification::{
        Notification,
        NotificationState,
    },
};
use deployments::SupportedNetwork;

/// Both character lists as of the same refresh.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CharacterCollections {
    pub mine: Vec<Character>,
    pub others: Vec<Character>,
}

impl CharacterCollections {
    pub fn own(&self, id: CharacterId) -> Option<&Character> {
        self.mine.iter().find(|c| c.id == id)
    }
}

/// The own character chosen to attack with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SelectedOpponentContext {
    pub id: CharacterId,
    pub mana: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub account_name: String,
    pub account: AccountId,
    pub accounts: Vec<String>,
    pub network: SupportedNetwork,
    pub network_id: u64,
    pub contract_id: String,
    pub is_owner: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Connectivity {
    #[default]
    Connecting,
    Connected(SessionInfo),
    Failed(String),
}

/// Everything the screen needs, owned by the controller.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    pub connectivity: Connectivity,
    pub characters: CharacterCollections,
    pub selection: Option<SelectedOpponentContext>,
    pub creation_type: CharacterType,
    pub notification: NotificationState,
    pub pending: bool,
    pub status: String,
}

impl AppState {
    pub fn session(&self) -> Option<&SessionInfo> {
        match &self.connectivity {
            Connectivity::Connected(info) => Some(info),
            _ => None,
        }
    }

    pub fn is_owner(&self) -> bool {
        self.session().is_some_and(|s| s.is_owner)
    }

    /// Drops everything scoped to the previous session.
    pub fn begin_connecting(&mut self) {
        self.connectivity = Connectivity::Connecting;
        self.characters = CharacterCollections::default();
        self.selection = None;
        self.pending = false;
    }

    pub fn replace_characters(&mut self, collections: CharacterCollections) {
        self.selection = self.selection.and_then(|selected| {
            collections.own(selected.id).map(|c| SelectedOpponentContext {
                id: c.id,
                mana: c.mana,
            })
        });
        self.characters = collections;
    }

    pub fn notify(&mut self, notification: Notification) {
        self.notification.show(notification);
    }

    /// Picks an own character to fight with. Refused when the player owns
    /// nothing or the id is not theirs.
    pub fn select_own(&mut self, id: CharacterId) -> bool {
        let Some(character) = self.characters.own(id) else {
            return false;
        };
        self.selection = Some(SelectedOpponentContext {
            id: character.id,
            mana: character.mana,
        });
        true
    }

    pub fn combat_actions_against(&self, opponent: &Character) -> Vec<Action> {
        combat_actions(&self.characters, self.selection, opponent)
    }

    pub fn heal_available(&self, character: &Character) -> bool {
        self.characters.own(character.id).is_some() && character.can_be_healed()
    }

    pub fn withdraw_available(&self) -> bool {
        self.is_owner()
    }

    /// Why `action` may not run right now, if it may not.
    pub fn refusal(&self, action: &Action) -> Option<String> {
        if self.session().is_none() {
            return Some("Not connected".to_string());
        }
        if self.pending {
            return Some("Another action is still pending".to_string());
        }
        match *action {
            Action::Create(_) => None,
            Action::Heal(id) => match self.characters.own(id) {
                Some(c) if self.heal_available(c) => None,
                Some(_) => Some(format!("Character #{id} is already at full health")),
                None => Some(format!("Character #{id} is not yours")),
            },
            Action::Fight {
                my_token_id,
                rival_token_id,
            }
            | Action::Spell {
                my_token_id,
                rival_token_id,
            } => {
                let Some(rival) = self.characters.others.iter().find(|c| c.id == rival_token_id)
                else {
                    return Some(format!("Character #{rival_token_id} is not an opponent"));
                };
                if self.combat_actions_against(rival).contains(action) {
                    None
                } else if self.selection.map(|s| s.id) != Some(my_token_id) {
                    Some("Select one of your characters first".to_string())
                } else {
                    Some("Not enough mana to cast a spell".to_string())
                }
            }
            Action::Withdraw if self.withdraw_available() => None,
            Action::Withdraw => Some("Only the contract owner can withdraw".to_string()),
        }
    }
}

/// Actions offered against `opponent` given the current selection.
pub fn combat_actions(
    collections: &CharacterCollections,
    selection: Option<SelectedOpponentContext>,
    opponent: &Character,
) -> Vec<Action> {
    if collections.mine.is_empty() {
        return Vec::new();
    }
    let Some(selected) = selection else {
        return Vec::new();
    };
    let mut actions = vec![Action::Fight {
        my_token_id: selected.id,
        rival_token_id: opponent.id,
    }];
    if selected.mana >= crate::character::SPELL_MANA_THRESHOLD {
        actions.push(Action::Spell {
            my_token_id: selected.id,
            rival_token_id: opponent.id,
        });
    }
    actions
}
