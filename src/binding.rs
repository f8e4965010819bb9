use crate::{
    errors::{
        ChainError,
        WalletError,
    },
    game::{
        GambaInfo,
        Move,
    },
    game_types::RpsGame,
    note_types::NoteStore,
    provider::WalletProvider,
};
use ethers::{
    providers::{
        Middleware,
        PendingTransaction,
    },
    types::{
        Address,
        TransactionReceipt,
        TxHash,
        U256,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub note: Address,
    pub game: Address,
}

pub trait NoteApi {
    fn read_note(&self) -> impl Future<Output = Result<String, ChainError>>;

    fn submit_note(&self, note: String) -> impl Future<Output = Result<TxHash, ChainError>>;

    /// `Ok(None)` when the transaction was dropped from the mempool.
    fn await_receipt(
        &self,
        tx: TxHash,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>, ChainError>>;
}

pub trait GameApi {
    fn contract_address(&self) -> Address;

    fn fetch_min_bet(&self) -> impl Future<Output = Result<U256, ChainError>>;

    fn fetch_max_bet(&self) -> impl Future<Output = Result<U256, ChainError>>;

    fn fetch_house_info(&self) -> impl Future<Output = Result<GambaInfo, ChainError>>;

    fn submit_move(
        &self,
        choice: Move,
        wager: U256,
    ) -> impl Future<Output = Result<TxHash, ChainError>>;

    fn await_receipt(
        &self,
        tx: TxHash,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>, ChainError>>;
}

/// Both contract handles, attached to one signer client.
pub trait ContractSet: Sized {
    type Client;
    type Note: NoteApi + Clone + 'static;
    type Game: GameApi + Clone + 'static;

    fn attach(addresses: &ContractAddresses, client: Arc<Self::Client>) -> Self;

    fn note(&self) -> &Self::Note;

    fn game(&self) -> &Self::Game;
}

/// Contract handles built for one account. Rebuilt whenever the session
/// account changes, never mutated.
#[derive(Debug)]
pub struct ContractBinding<C> {
    account: Address,
    contracts: C,
}

impl<C: ContractSet> ContractBinding<C> {
    pub fn build<P>(
        provider: &P,
        addresses: &ContractAddresses,
        account: Address,
    ) -> Result<Self, WalletError>
    where
        P: WalletProvider<Client = C::Client>,
    {
        let client = provider.signer(account)?;
        Ok(Self {
            account,
            contracts: C::attach(addresses, client),
        })
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn contracts(&self) -> &C {
        &self.contracts
    }

    pub fn is_valid_for(&self, session_account: Option<Address>) -> bool {
        session_account == Some(self.account)
    }
}

pub struct DappContracts<M> {
    note: NoteStore<M>,
    game: RpsGame<M>,
}

impl<M> Clone for DappContracts<M> {
    fn clone(&self) -> Self {
        Self {
            note: self.note.clone(),
            game: self.game.clone(),
        }
    }
}

impl<M: Middleware + 'static> ContractSet for DappContracts<M> {
    type Client = M;
    type Note = NoteStore<M>;
    type Game = RpsGame<M>;

    fn attach(addresses: &ContractAddresses, client: Arc<M>) -> Self {
        Self {
            note: NoteStore::new(addresses.note, client.clone()),
            game: RpsGame::new(addresses.game, client),
        }
    }

    fn note(&self) -> &NoteStore<M> {
        &self.note
    }

    fn game(&self) -> &RpsGame<M> {
        &self.game
    }
}

async fn confirm<M: Middleware>(
    client: Arc<M>,
    tx: TxHash,
) -> Result<Option<TransactionReceipt>, ChainError> {
    PendingTransaction::new(tx, client.provider())
        .await
        .map_err(|e| ChainError::from_provider(&e))
}

impl<M: Middleware + 'static> NoteApi for NoteStore<M> {
    async fn read_note(&self) -> Result<String, ChainError> {
        self.get_note()
            .call()
            .await
            .map_err(|e| ChainError::from_contract(&e))
    }

    async fn submit_note(&self, note: String) -> Result<TxHash, ChainError> {
        let call = self.set_note(note);
        let pending = call
            .send()
            .await
            .map_err(|e| ChainError::from_contract(&e))?;
        Ok(pending.tx_hash())
    }

    async fn await_receipt(
        &self,
        tx: TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        confirm(self.client(), tx).await
    }
}

impl<M: Middleware + 'static> GameApi for RpsGame<M> {
    fn contract_address(&self) -> Address {
        self.address()
    }

    async fn fetch_min_bet(&self) -> Result<U256, ChainError> {
        self.min_bet()
            .call()
            .await
            .map_err(|e| ChainError::from_contract(&e))
    }

    async fn fetch_max_bet(&self) -> Result<U256, ChainError> {
        self.max_bet()
            .call()
            .await
            .map_err(|e| ChainError::from_contract(&e))
    }

    async fn fetch_house_info(&self) -> Result<GambaInfo, ChainError> {
        let (balance, min_bet, max_bet) = self
            .get_gamba_info()
            .call()
            .await
            .map_err(|e| ChainError::from_contract(&e))?;
        Ok(GambaInfo {
            balance,
            min_bet,
            max_bet,
        })
    }

    async fn submit_move(&self, choice: Move, wager: U256) -> Result<TxHash, ChainError> {
        let call = self.rock_paper_scissors(u8::from(choice)).value(wager);
        let pending = call
            .send()
            .await
            .map_err(|e| ChainError::from_contract(&e))?;
        Ok(pending.tx_hash())
    }

    async fn await_receipt(
        &self,
        tx: TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        confirm(self.client(), tx).await
    }
}
