pub mod binding;
pub mod client;
pub mod deployment;
pub mod errors;
pub mod game;
pub mod note;
pub mod provider;
pub mod session;
pub mod ui;
pub mod units;
pub mod view;
pub mod wallets;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub mod note_types {
    use ethers::contract::abigen;

    abigen!(NoteStore, "./abi/NoteStore.json");
}

pub mod game_types {
    use ethers::contract::abigen;

    abigen!(RpsGame, "./abi/RpsGame.json");
}
