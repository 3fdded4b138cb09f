pub use generated_abi::{
    NFT_GAME_ABI_JSON,
    nft_game_types,
};

pub mod actions;
pub mod character;
pub mod contract;
pub mod controller;
pub mod error;
pub mod events;
pub mod fuel;
pub mod notification;
pub mod session;
pub mod state;
pub mod sync;
pub mod wallets;

#[cfg(test)]
pub(crate) mod fakes;
