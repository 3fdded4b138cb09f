use fuels::{
    accounts::wallet::Wallet,
    types::ContractId,
};

pub mod nft_game_types {
    use fuels::macros::abigen;

    abigen!(Contract(
        name = "NftGame",
        abi = "rust-crates/generated_abi/abi/nft-game-abi.json"
    ));
}

/// Raw ABI the bindings above are generated from. Deployment records carry a
/// hash of this document so a client never talks to an incompatible contract.
pub const NFT_GAME_ABI_JSON: &str = include_str!("../abi/nft-game-abi.json");

pub fn game_contract_instance(
    id: ContractId,
    wallet: Wallet,
) -> nft_game_types::NftGame<Wallet> {
    nft_game_types::NftGame::new(id, wallet)
}
