use crate::{
    binding::{
        ContractAddresses,
        ContractSet,
        GameApi,
        NoteApi,
    },
    client::{
        AppController,
        Tagged,
        Task,
    },
    errors::{
        ChainError,
        ChainErrorKind,
        WalletError,
    },
    game::{
        GambaInfo,
        Move,
    },
    game_types::RockPaperScissorsResultFilter,
    provider::{
        AccountsRequest,
        Approval,
        ProviderEvent,
        WalletProvider,
    },
};
use ethers::{
    abi::{
        Token,
        encode,
    },
    contract::EthEvent,
    types::{
        Address,
        Bytes,
        H256,
        I256,
        Log,
        TransactionReceipt,
        TxHash,
        U64,
        U256,
    },
};
use futures::{
    FutureExt,
    StreamExt,
    stream::FuturesUnordered,
};
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::{
    Notify,
    mpsc,
};

pub type SharedChain = Arc<Mutex<FakeChain>>;

pub const FAKE_PASSWORD: &str = "pw";

/// ABI-encoded `RockPaperScissorsResult` log, as the game contract emits it.
pub fn outcome_log(
    game: Address,
    player: Address,
    bet: U256,
    player_move: u8,
    computer_move: u8,
    result: i8,
    payout: U256,
) -> Log {
    let data = encode(&[
        Token::Uint(bet),
        Token::Uint(player_move.into()),
        Token::Uint(computer_move.into()),
        Token::Int(I256::from(i64::from(result)).into_raw()),
        Token::Uint(payout),
    ]);
    Log {
        address: game,
        topics: vec![RockPaperScissorsResultFilter::signature(), H256::from(player)],
        data: Bytes::from(data),
        ..Default::default()
    }
}

pub fn ether_milli(milli: u64) -> U256 {
    U256::from(milli) * U256::exp10(15)
}

/// Drives `tasks` and every task they trigger until nothing is left in flight.
pub async fn run_until_idle<P, C>(
    controller: &mut AppController<P, C>,
    actions: &mut mpsc::UnboundedReceiver<Tagged>,
    tasks: Vec<Task>,
) where
    P: WalletProvider,
    C: ContractSet<Client = P::Client>,
{
    let mut pending: FuturesUnordered<Task> = tasks.into_iter().collect();
    loop {
        while pending.next().await.is_some() {}
        let mut progressed = false;
        while let Ok(tagged) = actions.try_recv() {
            pending.extend(controller.apply_action(tagged));
            progressed = true;
        }
        if !progressed {
            break;
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ScriptedOutcome {
    computer_move: u8,
    result: i8,
    payout: U256,
}

/// In-memory chain state shared by every fake handle.
#[derive(Debug)]
pub struct FakeChain {
    note: String,
    note_writes: Vec<String>,
    moves: Vec<(Move, U256)>,
    min_bet: Option<U256>,
    max_bet: Option<U256>,
    house_balance: U256,
    scripted: VecDeque<ScriptedOutcome>,
    failing_submission: Option<ChainError>,
    failing_read: Option<ChainError>,
    revert_receipt: bool,
    omit_event: bool,
    receipts: HashMap<TxHash, TransactionReceipt>,
    receipt_gate: Option<Arc<Notify>>,
    next_tx: u64,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            note: String::new(),
            note_writes: Vec::new(),
            moves: Vec::new(),
            min_bet: Some(ether_milli(10)),
            max_bet: Some(ether_milli(1000)),
            house_balance: ether_milli(5000),
            scripted: VecDeque::new(),
            failing_submission: None,
            failing_read: None,
            revert_receipt: false,
            omit_event: false,
            receipts: HashMap::new(),
            receipt_gate: None,
            next_tx: 1,
        }
    }
}

impl FakeChain {
    pub fn shared() -> SharedChain {
        Arc::new(Mutex::new(FakeChain::default()))
    }

    /// `None` makes the corresponding call fail.
    pub fn set_bounds(&mut self, min: Option<U256>, max: Option<U256>) {
        self.min_bet = min;
        self.max_bet = max;
    }

    pub fn set_note(&mut self, note: impl Into<String>) {
        self.note = note.into();
    }

    pub fn script_outcome(&mut self, computer_move: u8, result: i8, payout: U256) {
        self.scripted.push_back(ScriptedOutcome {
            computer_move,
            result,
            payout,
        });
    }

    pub fn omit_next_event(&mut self) {
        self.omit_event = true;
    }

    pub fn fail_next_submission(&mut self, err: ChainError) {
        self.failing_submission = Some(err);
    }

    pub fn fail_next_read(&mut self, err: ChainError) {
        self.failing_read = Some(err);
    }

    pub fn revert_next_receipt(&mut self) {
        self.revert_receipt = true;
    }

    /// Receipts stay pending until the returned handle is notified once per
    /// receipt.
    pub fn hold_receipts(&mut self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.receipt_gate = Some(gate.clone());
        gate
    }

    pub fn moves_submitted(&self) -> &[(Move, U256)] {
        &self.moves
    }

    pub fn note_writes(&self) -> &[String] {
        &self.note_writes
    }

    fn take_submission_failure(&mut self) -> Result<(), ChainError> {
        match self.failing_submission.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn include(&mut self, logs: Vec<Log>) -> TxHash {
        let tx = TxHash::from_low_u64_be(self.next_tx);
        self.next_tx += 1;
        let status = if std::mem::take(&mut self.revert_receipt) {
            U64::zero()
        } else {
            U64::one()
        };
        let receipt = TransactionReceipt {
            transaction_hash: tx,
            status: Some(status),
            logs,
            ..Default::default()
        };
        self.receipts.insert(tx, receipt);
        tx
    }
}

async fn wait_for_receipt(
    chain: &SharedChain,
    tx: TxHash,
) -> Result<Option<TransactionReceipt>, ChainError> {
    let gate = chain.lock().unwrap().receipt_gate.clone();
    if let Some(gate) = gate {
        gate.notified().await;
    }
    Ok(chain.lock().unwrap().receipts.remove(&tx))
}

#[derive(Clone, Debug)]
pub struct FakeClient {
    chain: SharedChain,
    account: Address,
}

#[derive(Clone, Debug)]
pub struct FakeNote {
    chain: SharedChain,
}

impl FakeNote {
    pub fn new(chain: SharedChain) -> Self {
        Self { chain }
    }
}

impl NoteApi for FakeNote {
    async fn read_note(&self) -> Result<String, ChainError> {
        let mut chain = self.chain.lock().unwrap();
        match chain.failing_read.take() {
            Some(err) => Err(err),
            None => Ok(chain.note.clone()),
        }
    }

    async fn submit_note(&self, note: String) -> Result<TxHash, ChainError> {
        let mut chain = self.chain.lock().unwrap();
        chain.take_submission_failure()?;
        chain.note_writes.push(note.clone());
        chain.note = note;
        Ok(chain.include(Vec::new()))
    }

    async fn await_receipt(
        &self,
        tx: TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        wait_for_receipt(&self.chain, tx).await
    }
}

#[derive(Clone, Debug)]
pub struct FakeGame {
    chain: SharedChain,
    address: Address,
    player: Address,
}

impl FakeGame {
    pub fn new(chain: SharedChain) -> Self {
        Self {
            chain,
            address: Address::repeat_byte(0xab),
            player: Address::repeat_byte(0x11),
        }
    }
}

impl GameApi for FakeGame {
    fn contract_address(&self) -> Address {
        self.address
    }

    async fn fetch_min_bet(&self) -> Result<U256, ChainError> {
        self.chain
            .lock()
            .unwrap()
            .min_bet
            .ok_or_else(|| ChainError::new(ChainErrorKind::Other, "minBet failed"))
    }

    async fn fetch_max_bet(&self) -> Result<U256, ChainError> {
        self.chain
            .lock()
            .unwrap()
            .max_bet
            .ok_or_else(|| ChainError::new(ChainErrorKind::Other, "maxBet failed"))
    }

    async fn fetch_house_info(&self) -> Result<GambaInfo, ChainError> {
        let chain = self.chain.lock().unwrap();
        Ok(GambaInfo {
            balance: chain.house_balance,
            min_bet: chain.min_bet.unwrap_or_default(),
            max_bet: chain.max_bet.unwrap_or_default(),
        })
    }

    async fn submit_move(&self, choice: Move, wager: U256) -> Result<TxHash, ChainError> {
        let mut chain = self.chain.lock().unwrap();
        chain.take_submission_failure()?;
        chain.moves.push((choice, wager));
        let scripted = chain.scripted.pop_front().unwrap_or(ScriptedOutcome {
            computer_move: u8::from(choice),
            result: 0,
            payout: wager,
        });
        let logs = if std::mem::take(&mut chain.omit_event) {
            Vec::new()
        } else {
            vec![outcome_log(
                self.address,
                self.player,
                wager,
                u8::from(choice),
                scripted.computer_move,
                scripted.result,
                scripted.payout,
            )]
        };
        Ok(chain.include(logs))
    }

    async fn await_receipt(
        &self,
        tx: TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        wait_for_receipt(&self.chain, tx).await
    }
}

#[derive(Clone, Debug)]
pub struct FakeContracts {
    note: FakeNote,
    game: FakeGame,
}

impl ContractSet for FakeContracts {
    type Client = FakeClient;
    type Note = FakeNote;
    type Game = FakeGame;

    fn attach(addresses: &ContractAddresses, client: Arc<FakeClient>) -> Self {
        Self {
            note: FakeNote::new(client.chain.clone()),
            game: FakeGame {
                chain: client.chain.clone(),
                address: addresses.game,
                player: client.account,
            },
        }
    }

    fn note(&self) -> &FakeNote {
        &self.note
    }

    fn game(&self) -> &FakeGame {
        &self.game
    }
}

/// Scripted wallet provider. The correct password is [`FAKE_PASSWORD`].
#[derive(Debug)]
pub struct FakeWallet {
    chain: SharedChain,
    authorized: Arc<Mutex<Vec<Address>>>,
    unlockable: Option<Address>,
    events: mpsc::UnboundedSender<ProviderEvent>,
}

impl FakeWallet {
    pub fn authorized(
        chain: SharedChain,
        accounts: Vec<Address>,
    ) -> (Self, mpsc::UnboundedReceiver<ProviderEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let wallet = Self {
            chain,
            unlockable: accounts.first().copied(),
            authorized: Arc::new(Mutex::new(accounts)),
            events,
        };
        (wallet, rx)
    }

    pub fn locked(
        chain: SharedChain,
        account: Address,
    ) -> (Self, mpsc::UnboundedReceiver<ProviderEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let wallet = Self {
            chain,
            authorized: Arc::default(),
            unlockable: Some(account),
            events,
        };
        (wallet, rx)
    }
}

impl WalletProvider for FakeWallet {
    type Client = FakeClient;

    async fn authorized_accounts(&mut self) -> Result<Vec<Address>, WalletError> {
        Ok(self.authorized.lock().unwrap().clone())
    }

    fn request_accounts(&self, approval: Approval) -> AccountsRequest {
        let authorized = self.authorized.clone();
        let unlockable = self.unlockable;
        async move {
            match approval {
                Approval::Declined => Err(WalletError::UserRejected),
                Approval::Granted(password) if password == FAKE_PASSWORD => {
                    let account = unlockable.ok_or(WalletError::ProviderAbsent)?;
                    let mut authorized = authorized.lock().unwrap();
                    if !authorized.contains(&account) {
                        authorized.insert(0, account);
                    }
                    Ok(authorized.clone())
                }
                Approval::Granted(_) => Err(WalletError::Keystore(
                    "Invalid password for wallet 'fake'".into(),
                )),
            }
        }
        .boxed_local()
    }

    fn signer(&self, account: Address) -> Result<Arc<FakeClient>, WalletError> {
        if !self.authorized.lock().unwrap().contains(&account) {
            return Err(WalletError::Unauthorized(account));
        }
        Ok(Arc::new(FakeClient {
            chain: self.chain.clone(),
            account,
        }))
    }

    fn disconnect(&mut self) {
        self.authorized.lock().unwrap().clear();
        let _ = self.events.send(ProviderEvent::AccountsChanged(Vec::new()));
    }

    fn chain_changed(&mut self, _chain_id: u64) {}
}
