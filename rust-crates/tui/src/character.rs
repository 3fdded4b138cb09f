use crate::nft_game_types as abi;
use std::fmt;

pub type CharacterId = u64;

/// Mana a character needs before it may cast a spell.
pub const SPELL_MANA_THRESHOLD: u64 = 10;
pub const FULL_HP: u64 = 100;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum CharacterType {
    #[default]
    Berserker,
    Spiritual,
    Elementary,
}

impl CharacterType {
    pub const ALL: [CharacterType; 3] = [
        CharacterType::Berserker,
        CharacterType::Spiritual,
        CharacterType::Elementary,
    ];

    /// Decodes the contract's numeric type; anything past 1 is elementary.
    pub fn from_raw(raw: u64) -> Self {
        match raw {
            0 => CharacterType::Berserker,
            1 => CharacterType::Spiritual,
            _ => CharacterType::Elementary,
        }
    }

    pub fn raw(self) -> u64 {
        match self {
            CharacterType::Berserker => 0,
            CharacterType::Spiritual => 1,
            CharacterType::Elementary => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CharacterType::Berserker => "BERSERKER",
            CharacterType::Spiritual => "SPIRITUAL",
            CharacterType::Elementary => "ELEMENTARY",
        }
    }

    pub fn next(self) -> Self {
        Self::from_raw((self.raw() + 1) % Self::ALL.len() as u64)
    }
}

impl fmt::Display for CharacterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<abi::CharacterType> for CharacterType {
    fn from(value: abi::CharacterType) -> Self {
        match value {
            abi::CharacterType::Berserker => CharacterType::Berserker,
            abi::CharacterType::Spiritual => CharacterType::Spiritual,
            abi::CharacterType::Elementary => CharacterType::Elementary,
        }
    }
}

impl From<CharacterType> for abi::CharacterType {
    fn from(value: CharacterType) -> Self {
        match value {
            CharacterType::Berserker => abi::CharacterType::Berserker,
            CharacterType::Spiritual => abi::CharacterType::Spiritual,
            CharacterType::Elementary => abi::CharacterType::Elementary,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Character {
    pub id: CharacterId,
    pub character_type: CharacterType,
    pub hp: u64,
    pub mana: u64,
    pub xp: u64,
    pub attack: u64,
    pub armor: u64,
    pub magic_attack: u64,
    pub magic_resistance: u64,
}

impl Character {
    pub fn can_be_healed(&self) -> bool {
        self.hp < FULL_HP
    }

    pub fn can_cast_spell(&self) -> bool {
        self.mana >= SPELL_MANA_THRESHOLD
    }
}

impl From<abi::Character> for Character {
    fn from(value: abi::Character) -> Self {
        Self {
            id: value.id,
            character_type: value.character_type.into(),
            hp: value.hp,
            mana: value.mana,
            xp: value.xp,
            attack: value.attack,
            armor: value.armor,
            magic_attack: value.magic_attack,
            magic_resistance: value.magic_resistance,
        }
    }
}
