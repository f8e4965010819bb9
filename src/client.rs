use crate::{
    binding::{
        ContractAddresses,
        ContractSet,
        DappContracts,
    },
    deployment::Network,
    errors::{
        ActionError,
        ChainError,
        WalletError,
    },
    game::{
        self,
        BetBounds,
        GambaInfo,
        Move,
        MoveDesk,
        MoveSettlement,
    },
    note::{
        NoteDesk,
        NoteSettlement,
    },
    provider::{
        self,
        Approval,
        KeystoreProvider,
        ProviderEvent,
        SignerClient,
        WalletProvider,
    },
    session::{
        Session,
        SessionChange,
        SessionState,
    },
    ui,
    units,
    view::{
        CONNECT_TO_PLAY,
        Edit,
        Field,
        NOTE_NEEDS_CONNECTION,
        StatusLine,
        Tone,
        ViewState,
    },
    wallets::{
        self,
        WalletDescriptor,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use ethers::{
    providers::{
        Http,
        Middleware,
        Provider,
    },
    types::{
        Address,
        TxHash,
    },
};
use futures::{
    FutureExt,
    StreamExt,
    future::LocalBoxFuture,
    stream::FuturesUnordered,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{
    debug,
    error,
    info,
    warn,
};

pub const DEFAULT_CHAIN_POLL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: Network,
    pub rpc_url: String,
    pub addresses: ContractAddresses,
    pub symbol: String,
    /// `None` means no wallet provider is available.
    pub wallet: Option<WalletDescriptor>,
    /// Prompt for the wallet password before the UI starts.
    pub unlock: bool,
    pub chain_poll: Duration,
}

/// Progress reported by in-flight contract calls.
#[derive(Clone, Debug)]
pub enum ActionEvent {
    Authorized(Result<Vec<Address>, WalletError>),
    NoteLoaded(Result<String, ChainError>),
    NoteSubmitted(TxHash),
    NoteSettled(NoteSettlement),
    BoundsLoaded(BetBounds),
    HouseLoaded(Option<GambaInfo>),
    MoveSubmitted(TxHash),
    MoveSettled(MoveSettlement),
}

/// An action event stamped with the epoch it was started in. The epoch moves
/// on every chain reset and every binding change; older events are dropped.
#[derive(Clone, Debug)]
pub struct Tagged {
    pub epoch: u64,
    pub event: ActionEvent,
}

pub type Task = LocalBoxFuture<'static, ()>;

#[derive(Clone)]
struct Emitter {
    epoch: u64,
    tx: mpsc::UnboundedSender<Tagged>,
}

impl Emitter {
    fn emit(&self, event: ActionEvent) {
        let tagged = Tagged {
            epoch: self.epoch,
            event,
        };
        if self.tx.send(tagged).is_err() {
            debug!("action receiver dropped");
        }
    }
}

pub struct AppController<P, C> {
    session: Session<P, C>,
    notes: NoteDesk,
    moves: MoveDesk,
    view: ViewState,
    network: String,
    symbol: String,
    epoch: u64,
    actions: mpsc::UnboundedSender<Tagged>,
}

impl<P, C> AppController<P, C>
where
    P: WalletProvider,
    C: ContractSet<Client = P::Client>,
{
    pub fn new(
        session: Session<P, C>,
        network: impl Into<String>,
        symbol: impl Into<String>,
        actions: mpsc::UnboundedSender<Tagged>,
    ) -> Self {
        let network = network.into();
        let symbol = symbol.into();
        Self {
            session,
            notes: NoteDesk::new(symbol.clone()),
            moves: MoveDesk::new(symbol.clone()),
            view: ViewState::new(network.clone()),
            network,
            symbol,
            epoch: 0,
            actions,
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn session(&self) -> &Session<P, C> {
        &self.session
    }

    pub fn is_move_pending(&self) -> bool {
        self.moves.is_busy()
    }

    /// Restores whatever authorization the provider already holds.
    pub async fn start(&mut self) -> Vec<Task> {
        let change = self.session.initialize().await;
        self.apply_session_change(change)
    }

    /// Shows the connecting state and hands back the authorization as a task.
    /// Its result arrives as [`ActionEvent::Authorized`].
    pub fn connect(&mut self, approval: Approval) -> Vec<Task> {
        let request = match self.session.authorize(approval) {
            Ok(request) => request,
            Err(change) => return self.apply_session_change(change),
        };
        self.view.apply_session(self.session.state());
        let emitter = self.emitter();
        vec![
            async move {
                let result = request.await;
                emitter.emit(ActionEvent::Authorized(result));
            }
            .boxed_local(),
        ]
    }

    pub fn disconnect(&mut self) {
        info!("disconnect requested");
        self.session.disconnect();
    }

    pub async fn handle_provider_event(&mut self, event: ProviderEvent) -> Vec<Task> {
        match self.session.handle_event(event) {
            Some(SessionChange::Reset { chain_id }) => {
                info!(chain_id, "chain changed, resetting session");
                self.reset();
                self.view.log(
                    format!("Network changed (chain id {chain_id}). Session reset."),
                    Tone::Info,
                );
                let change = self.session.initialize().await;
                self.apply_session_change(change)
            }
            Some(change) => self.apply_session_change(change),
            None => Vec::new(),
        }
    }

    pub fn switch_tab(&mut self) {
        self.view.tab = self.view.tab.other();
    }

    pub fn edit(&mut self, field: Field, edit: Edit) {
        self.view.edit(field, edit);
    }

    /// Leaving the bet field pulls the amount back inside the bet bounds.
    pub fn commit_field(&mut self, field: Field) {
        if field != Field::Bet {
            return;
        }
        let bounds = self.moves.bounds();
        if let Some(clamped) =
            units::clamp_amount_input(&self.view.game.bet_input, bounds.min, bounds.max)
        {
            debug!(from = %self.view.game.bet_input, to = %clamped, "bet clamped");
            self.view.game.bet_input = clamped;
        }
    }

    pub fn read_note(&mut self) -> Option<Task> {
        let Some(binding) = self.session.binding() else {
            self.view.notes.display = NOTE_NEEDS_CONNECTION.into();
            return None;
        };
        let notes = binding.contracts().note().clone();
        self.view.notes.display = "Loading...".into();
        let emitter = self.emitter();
        Some(
            async move {
                let result = NoteDesk::read(&notes).await;
                emitter.emit(ActionEvent::NoteLoaded(result));
            }
            .boxed_local(),
        )
    }

    pub fn write_note(&mut self) -> Option<Task> {
        let connected = self.session.binding().is_some();
        let prepared = self
            .provider_gate()
            .and_then(|()| self.notes.prepare_write(connected, &self.view.notes.input));
        let ticket = match prepared {
            Ok(ticket) => ticket,
            Err(err) => {
                self.sync_note_status(err.to_string(), rejection_tone(&err));
                return None;
            }
        };
        let notes = self.session.binding()?.contracts().note().clone();
        self.sync_note_status("Setting note...", Tone::Progress);
        let emitter = self.emitter();
        Some(
            async move {
                let settlement = NoteDesk::execute_write(&notes, ticket, |tx| {
                    emitter.emit(ActionEvent::NoteSubmitted(tx))
                })
                .await;
                emitter.emit(ActionEvent::NoteSettled(settlement));
            }
            .boxed_local(),
        )
    }

    pub fn play(&mut self, choice: Move) -> Option<Task> {
        let account = self.session.binding().map(|binding| binding.account());
        let prepared = self
            .provider_gate()
            .and_then(|()| self.moves.prepare(account, choice, &self.view.game.bet_input));
        let ticket = match prepared {
            Ok(ticket) => ticket,
            Err(err) => {
                self.sync_game_status(err.to_string(), rejection_tone(&err));
                return None;
            }
        };
        let game = self.session.binding()?.contracts().game().clone();
        self.view.game.moves_enabled = false;
        self.view.game.narrative = None;
        self.sync_game_status("Processing...", Tone::Progress);
        let emitter = self.emitter();
        Some(
            async move {
                let settlement = MoveDesk::execute(&game, ticket, |tx| {
                    emitter.emit(ActionEvent::MoveSubmitted(tx))
                })
                .await;
                emitter.emit(ActionEvent::MoveSettled(settlement));
            }
            .boxed_local(),
        )
    }

    pub fn apply_action(&mut self, tagged: Tagged) -> Vec<Task> {
        if tagged.epoch != self.epoch {
            debug!(
                stale = tagged.epoch,
                current = self.epoch,
                "dropping action event from before reset"
            );
            return Vec::new();
        }
        match tagged.event {
            ActionEvent::Authorized(result) => {
                let change = self.session.finish_connect(result);
                self.apply_session_change(change)
            }
            ActionEvent::NoteLoaded(result) => {
                if let Err(err) = &result {
                    error!(error = %err, "reading note failed");
                    self.view.log(format!("Reading note failed: {err}"), Tone::Error);
                }
                self.view.notes.display = NoteDesk::render_read(&result);
                Vec::new()
            }
            ActionEvent::NoteSubmitted(tx) => {
                self.view.log(format!("Note transaction sent: {tx:?}"), Tone::Info);
                self.sync_note_status(
                    "Transaction sent! Waiting for confirmation...",
                    Tone::Progress,
                );
                Vec::new()
            }
            ActionEvent::NoteSettled(settlement) => {
                if let NoteSettlement::Failed(err) = &settlement {
                    error!(error = %err, "note write failed");
                }
                let report = self.notes.settle_write(&settlement);
                if report.tone == Tone::Error {
                    self.view.log(report.status.clone(), Tone::Error);
                }
                self.sync_note_status(report.status, report.tone);
                if report.clear_input {
                    self.view.notes.input.clear();
                }
                if report.refresh {
                    return self.read_note().into_iter().collect();
                }
                Vec::new()
            }
            ActionEvent::BoundsLoaded(bounds) => {
                self.moves.set_bounds(bounds);
                self.view.game.bounds = self.moves.bounds_summary();
                if let Some(min) = bounds.min {
                    self.view.game.bet_input = units::format_amount(min);
                }
                Vec::new()
            }
            ActionEvent::HouseLoaded(house) => {
                self.view.game.house = house.map(|info| {
                    format!(
                        "House balance: {} {}",
                        units::format_amount(info.balance),
                        self.symbol
                    )
                });
                Vec::new()
            }
            ActionEvent::MoveSubmitted(tx) => {
                self.view.log(format!("Move transaction sent: {tx:?}"), Tone::Info);
                self.sync_game_status("Confirming...", Tone::Progress);
                Vec::new()
            }
            ActionEvent::MoveSettled(settlement) => {
                match &settlement {
                    MoveSettlement::Failed(ActionError::EventMissing(tx)) => {
                        self.view
                            .log(format!("Move {tx:?} confirmed without outcome event"), Tone::Info);
                    }
                    MoveSettlement::Failed(err) => {
                        error!(error = %err, "move failed");
                        self.view.log(format!("Move failed: {err}"), Tone::Error);
                    }
                    MoveSettlement::Resolved(result) => {
                        self.view.log(result.narrative(), Tone::Success);
                    }
                }
                let report = self.moves.settle(&settlement);
                self.sync_game_status(report.message, report.tone);
                self.view.game.narrative = report.narrative;
                self.view.game.score = self.moves.score();
                self.view.game.moves_enabled = self.session.account().is_some();
                self.load_house().into_iter().collect()
            }
        }
    }

    fn apply_session_change(&mut self, change: SessionChange) -> Vec<Task> {
        if !matches!(
            change,
            SessionChange::ProviderMissing | SessionChange::Reset { .. }
        ) {
            self.retire_binding();
        }
        self.view.apply_session(self.session.state());
        match change {
            SessionChange::ProviderMissing => {
                warn!("no wallet provider, contract actions disabled");
                Vec::new()
            }
            SessionChange::Connected(account) => {
                self.view.log(
                    format!("Connected {}", units::shorten_address(&account)),
                    Tone::Success,
                );
                self.view.game.message = None;
                self.read_note()
                    .into_iter()
                    .chain(self.load_bounds())
                    .chain(self.load_house())
                    .collect()
            }
            SessionChange::Disconnected => {
                self.view.log("Wallet disconnected", Tone::Info);
                Vec::new()
            }
            SessionChange::Rejected => {
                self.sync_game_status(CONNECT_TO_PLAY, Tone::Info);
                self.view.log("Wallet connection rejected", Tone::Info);
                Vec::new()
            }
            SessionChange::Failed(message) => {
                error!(error = %message, "wallet connection failed");
                self.view.log(message.clone(), Tone::Error);
                self.sync_game_status(message, Tone::Error);
                Vec::new()
            }
            SessionChange::Reset { .. } => Vec::new(),
        }
    }

    fn load_bounds(&self) -> Option<Task> {
        let game = self.session.binding()?.contracts().game().clone();
        let emitter = self.emitter();
        Some(
            async move {
                let bounds = game::fetch_bounds(&game).await;
                emitter.emit(ActionEvent::BoundsLoaded(bounds));
            }
            .boxed_local(),
        )
    }

    fn load_house(&self) -> Option<Task> {
        let game = self.session.binding()?.contracts().game().clone();
        let emitter = self.emitter();
        Some(
            async move {
                let house = game::fetch_house(&game).await;
                emitter.emit(ActionEvent::HouseLoaded(house));
            }
            .boxed_local(),
        )
    }

    /// The binding was replaced or dropped. Nothing started under it may report
    /// back, and pending actions would otherwise stay busy forever.
    fn retire_binding(&mut self) {
        self.epoch += 1;
        if self.notes.abandon() {
            self.sync_note_status("Note write abandoned: wallet changed.", Tone::Info);
            self.view.log("Pending note write abandoned", Tone::Info);
        }
        if self.moves.abandon() {
            self.sync_game_status("Move abandoned: wallet changed.", Tone::Info);
            self.view.log("Pending move abandoned", Tone::Info);
        }
    }

    fn provider_gate(&self) -> Result<(), ActionError> {
        match self.session.state() {
            SessionState::ProviderMissing => Err(ActionError::ProviderAbsent),
            _ => Ok(()),
        }
    }

    /// Reload semantics: a fresh view and fresh handlers, same tab.
    fn reset(&mut self) {
        self.epoch += 1;
        self.notes = NoteDesk::new(self.symbol.clone());
        self.moves = MoveDesk::new(self.symbol.clone());
        let tab = self.view.tab;
        let activity = std::mem::take(&mut self.view.activity);
        self.view = ViewState::new(self.network.clone());
        self.view.tab = tab;
        self.view.activity = activity;
    }

    fn emitter(&self) -> Emitter {
        Emitter {
            epoch: self.epoch,
            tx: self.actions.clone(),
        }
    }

    fn sync_note_status(&mut self, text: impl Into<String>, tone: Tone) {
        self.view.notes.tx_status = Some(StatusLine::new(text, tone));
    }

    fn sync_game_status(&mut self, text: impl Into<String>, tone: Tone) {
        self.view.game.message = Some(StatusLine::new(text, tone));
    }
}

fn rejection_tone(err: &ActionError) -> Tone {
    match err {
        ActionError::Busy => Tone::Info,
        _ => Tone::Error,
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let (provider_tx, provider_rx) = mpsc::unbounded_channel();
    let (action_tx, action_rx) = mpsc::unbounded_channel();

    let rpc = Provider::<Http>::try_from(config.rpc_url.as_str())
        .wrap_err_with(|| format!("Invalid RPC url {}", config.rpc_url))?;
    let chain_id = match rpc.get_chainid().await {
        Ok(id) => id.low_u64(),
        Err(err) => {
            let fallback = config.network.default_chain_id();
            warn!(error = %err, fallback, "chain id lookup failed, using network default");
            fallback
        }
    };

    let provider = match config.wallet {
        Some(wallet) => {
            let unlocked = if config.unlock {
                Some(wallets::unlock_wallet(&wallet, chain_id)?)
            } else {
                None
            };
            info!(wallet = %wallet.name, "keystore provider ready");
            let keystore = KeystoreProvider::new(rpc.clone(), chain_id, wallet, provider_tx.clone());
            Some(match unlocked {
                Some(signer) => keystore.with_unlocked(signer),
                None => keystore,
            })
        }
        None => None,
    };

    let watcher = tokio::spawn(provider::watch_chain(
        rpc,
        chain_id,
        config.chain_poll,
        provider_tx,
    ));

    let session: Session<KeystoreProvider, DappContracts<SignerClient>> =
        Session::new(provider, config.addresses);
    let mut controller =
        AppController::new(session, config.network.to_string(), config.symbol, action_tx);
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!(network = %config.network, chain_id, "Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(
        &mut controller,
        &mut ui_state,
        &mut input_events,
        provider_rx,
        action_rx,
    )
    .await;
    watcher.abort();
    ui::terminal_exit()?;
    res
}

pub async fn run_loop<P, C>(
    controller: &mut AppController<P, C>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEvents,
    mut provider_events: mpsc::UnboundedReceiver<ProviderEvent>,
    mut action_events: mpsc::UnboundedReceiver<Tagged>,
) -> Result<()>
where
    P: WalletProvider,
    C: ContractSet<Client = P::Client>,
{
    info!("Running app loop");
    let mut tasks: FuturesUnordered<Task> = FuturesUnordered::new();
    tasks.extend(controller.start().await);
    ui::draw(ui_state, controller.view()).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            Some(()) = tasks.next(), if !tasks.is_empty() => {
                continue;
            }
            Some(tagged) = action_events.recv() => {
                tasks.extend(controller.apply_action(tagged));
            }
            Some(event) = provider_events.recv() => {
                tasks.extend(controller.handle_provider_event(event).await);
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let Some(event) = raw_ev? else {
                    info!("input stream closed");
                    break;
                };
                let Some(ev) = ui::interpret_event(ui_state, controller.view(), event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::SwitchTab => controller.switch_tab(),
                    ui::UserEvent::Connect(approval) => tasks.extend(controller.connect(approval)),
                    ui::UserEvent::Disconnect => controller.disconnect(),
                    ui::UserEvent::ReadNote => tasks.extend(controller.read_note()),
                    ui::UserEvent::WriteNote => tasks.extend(controller.write_note()),
                    ui::UserEvent::Play(choice) => tasks.extend(controller.play(choice)),
                    ui::UserEvent::Edit { field, edit } => controller.edit(field, edit),
                    ui::UserEvent::CommitField(field) => controller.commit_field(field),
                }
            }
        }
        ui::draw(ui_state, controller.view()).wrap_err("draw failed")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        errors::ChainErrorKind,
        session::SessionState,
        test_helpers::{
            FAKE_PASSWORD,
            FakeChain,
            FakeContracts,
            FakeWallet,
            SharedChain,
            ether_milli,
            run_until_idle,
        },
    };
    use crossterm::event::{
        Event,
        KeyCode,
        KeyEvent,
    };
    use ethers::types::Address;

    type TestController = AppController<FakeWallet, FakeContracts>;

    fn addresses() -> ContractAddresses {
        ContractAddresses {
            note: Address::repeat_byte(0xaa),
            game: Address::repeat_byte(0xab),
        }
    }

    fn alice() -> Address {
        Address::repeat_byte(0x11)
    }

    fn controller(
        wallet: Option<FakeWallet>,
    ) -> (TestController, mpsc::UnboundedReceiver<Tagged>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(wallet, addresses());
        (AppController::new(session, "BSC Testnet", "tBNB", tx), rx)
    }

    async fn connected(
        chain: &SharedChain,
    ) -> (
        TestController,
        mpsc::UnboundedReceiver<Tagged>,
        mpsc::UnboundedReceiver<ProviderEvent>,
    ) {
        let (wallet, provider_rx) = FakeWallet::authorized(chain.clone(), vec![alice()]);
        let (mut controller, mut rx) = controller(Some(wallet));
        let tasks = controller.start().await;
        run_until_idle(&mut controller, &mut rx, tasks).await;
        (controller, rx, provider_rx)
    }

    #[tokio::test]
    async fn start__restores_session_and_loads_game_table() {
        // given
        let chain = FakeChain::shared();
        chain.lock().unwrap().set_note("gm");

        // when
        let (controller, _rx, _provider_rx) = connected(&chain).await;

        // then
        let view = controller.view();
        assert_eq!(view.connection.wallet_status, "Connected: 0x1111...1111");
        assert_eq!(view.notes.display, "gm");
        assert_eq!(view.game.bet_input, "0.01");
        assert_eq!(
            view.game.bounds.as_deref(),
            Some("Min: 0.01 tBNB | Max: 1 tBNB")
        );
        assert_eq!(view.game.house.as_deref(), Some("House balance: 5 tBNB"));
    }

    #[tokio::test]
    async fn start__without_provider_disables_everything() {
        let (mut controller, _rx) = controller(None);
        let tasks = controller.start().await;
        assert!(tasks.is_empty());
        assert_eq!(controller.session().state(), SessionState::ProviderMissing);
        assert!(!controller.view().inputs_enabled());
    }

    #[tokio::test]
    async fn connect__rejection_asks_to_connect() {
        // given
        let chain = FakeChain::shared();
        let (wallet, _provider_rx) = FakeWallet::locked(chain, alice());
        let (mut controller, mut rx) = controller(Some(wallet));
        controller.start().await;

        // when
        let tasks = controller.connect(Approval::Declined);
        let connecting = controller.view().connection.connect_label.clone();
        run_until_idle(&mut controller, &mut rx, tasks).await;

        // then
        assert_eq!(connecting, "Connecting...");
        assert_eq!(controller.session().state(), SessionState::Disconnected);
        assert_eq!(
            controller.view().game.message,
            Some(StatusLine::new(CONNECT_TO_PLAY, Tone::Info))
        );
    }

    #[tokio::test]
    async fn connect__wrong_password_surfaces_raw_error() {
        let chain = FakeChain::shared();
        let (wallet, _provider_rx) = FakeWallet::locked(chain, alice());
        let (mut controller, mut rx) = controller(Some(wallet));
        controller.start().await;
        let tasks = controller.connect(Approval::Granted("nope".into()));
        run_until_idle(&mut controller, &mut rx, tasks).await;
        assert_eq!(
            controller.view().game.message,
            Some(StatusLine::new(
                "Invalid password for wallet 'fake'",
                Tone::Error
            ))
        );
        assert_eq!(controller.session().state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn connect__correct_password_binds_contracts() {
        // given
        let chain = FakeChain::shared();
        let (wallet, _provider_rx) = FakeWallet::locked(chain, alice());
        let (mut controller, mut rx) = controller(Some(wallet));
        controller.start().await;

        // when
        let tasks = controller.connect(Approval::Granted(FAKE_PASSWORD.into()));
        run_until_idle(&mut controller, &mut rx, tasks).await;

        // then
        assert_eq!(controller.session().state(), SessionState::Connected(alice()));
        assert_eq!(controller.view().notes.display, "No note set yet");
    }

    #[tokio::test]
    async fn write_note__confirmed_write_clears_input_and_refreshes() {
        // given
        let chain = FakeChain::shared();
        let (mut controller, mut rx, _provider_rx) = connected(&chain).await;
        controller.view.notes.input = "hello chain".into();

        // when
        let tasks: Vec<Task> = controller.write_note().into_iter().collect();
        let in_flight = controller.view().notes.tx_status.clone();
        run_until_idle(&mut controller, &mut rx, tasks).await;

        // then
        assert_eq!(
            in_flight,
            Some(StatusLine::new("Setting note...", Tone::Progress))
        );
        let view = controller.view();
        assert_eq!(
            view.notes.tx_status,
            Some(StatusLine::new("Note set successfully!", Tone::Success))
        );
        assert!(view.notes.input.is_empty());
        assert_eq!(view.notes.display, "hello chain");
        assert_eq!(chain.lock().unwrap().note_writes(), ["hello chain"]);
    }

    #[tokio::test]
    async fn write_note__insufficient_gas_keeps_input_and_hints_symbol() {
        let chain = FakeChain::shared();
        let (mut controller, mut rx, _provider_rx) = connected(&chain).await;
        chain.lock().unwrap().fail_next_submission(ChainError::new(
            ChainErrorKind::InsufficientFunds,
            "insufficient funds for gas * price + value",
        ));
        controller.view.notes.input = "hello".into();
        let tasks: Vec<Task> = controller.write_note().into_iter().collect();
        run_until_idle(&mut controller, &mut rx, tasks).await;
        let view = controller.view();
        assert_eq!(
            view.notes.tx_status,
            Some(StatusLine::new(
                "Error: insufficient funds for gas * price + value - Make sure you have tBNB for gas fees!",
                Tone::Error
            ))
        );
        assert_eq!(view.notes.input, "hello");
    }

    #[tokio::test]
    async fn play__winning_move_updates_score_and_house() {
        // given
        let chain = FakeChain::shared();
        let (mut controller, mut rx, _provider_rx) = connected(&chain).await;
        chain
            .lock()
            .unwrap()
            .script_outcome(2, 1, ether_milli(20));
        controller.view.game.bet_input = "0.01".into();

        // when
        let tasks: Vec<Task> = controller.play(Move::Rock).into_iter().collect();
        let moves_while_pending = controller.view().game.moves_enabled;
        run_until_idle(&mut controller, &mut rx, tasks).await;

        // then
        let game = &controller.view().game;
        assert!(!moves_while_pending);
        assert!(game.moves_enabled);
        assert_eq!(
            game.message,
            Some(StatusLine::new("You won! Reward: 0.02 tBNB", Tone::Success))
        );
        assert_eq!(
            game.narrative.as_deref(),
            Some("Rock (user) beats Scissors (comp). You win, yay!")
        );
        assert_eq!(game.score.user, 1);
        assert_eq!(game.score.computer, 0);
        assert!(!controller.is_move_pending());
    }

    #[tokio::test]
    async fn play__rejected_bet_submits_nothing() {
        let chain = FakeChain::shared();
        let (mut controller, _rx, _provider_rx) = connected(&chain).await;
        controller.view.game.bet_input = "5".into();
        assert!(controller.play(Move::Paper).is_none());
        assert_eq!(
            controller.view().game.message,
            Some(StatusLine::new("Bet too high! Max: 1 tBNB", Tone::Error))
        );
        assert!(chain.lock().unwrap().moves_submitted().is_empty());
        assert!(!controller.is_move_pending());
    }

    #[tokio::test]
    async fn commit_field__clamps_bet_into_bounds() {
        // given
        let chain = FakeChain::shared();
        let (mut controller, _rx, _provider_rx) = connected(&chain).await;
        controller.view.game.bet_input = "3".into();

        // when
        controller.commit_field(Field::Bet);

        // then
        assert_eq!(controller.view().game.bet_input, "1");
    }

    #[tokio::test]
    async fn handle_provider_event__chain_change_resets_and_drops_stale_events() {
        // given
        let chain = FakeChain::shared();
        let (mut controller, mut rx, _provider_rx) = connected(&chain).await;
        chain.lock().unwrap().script_outcome(0, 1, ether_milli(20));
        controller.view.game.bet_input = "0.01".into();
        let stale: Vec<Task> = controller.play(Move::Paper).into_iter().collect();
        controller.switch_tab();

        // when
        let fresh = controller
            .handle_provider_event(ProviderEvent::ChainChanged(56))
            .await;
        for task in stale {
            task.await;
        }
        run_until_idle(&mut controller, &mut rx, fresh).await;

        // then
        assert_eq!(controller.view().game.score.user, 0);
        assert!(!controller.is_move_pending());
        assert_eq!(controller.view().tab, crate::view::Tab::Game);
        assert_eq!(controller.session().state(), SessionState::Connected(alice()));
    }

    #[tokio::test]
    async fn apply_action__reads_started_before_disconnect_are_dropped() {
        // given
        let chain = FakeChain::shared();
        chain.lock().unwrap().set_note("secret");
        let (wallet, mut provider_rx) = FakeWallet::authorized(chain, vec![alice()]);
        let (mut controller, mut rx) = controller(Some(wallet));
        let started = controller.start().await;

        // when
        controller.disconnect();
        let event = provider_rx.recv().await.unwrap();
        let fresh = controller.handle_provider_event(event).await;
        let tasks = started.into_iter().chain(fresh).collect();
        run_until_idle(&mut controller, &mut rx, tasks).await;

        // then
        let view = controller.view();
        assert_eq!(controller.session().state(), SessionState::Disconnected);
        assert_eq!(view.notes.display, NOTE_NEEDS_CONNECTION);
        assert_eq!(view.game.bounds, None);
        assert_eq!(view.game.house, None);
        assert!(view.game.bet_input.is_empty());
    }

    #[tokio::test]
    async fn handle_provider_event__disconnect_abandons_pending_move() {
        // given
        let chain = FakeChain::shared();
        let (mut controller, mut rx, mut provider_rx) = connected(&chain).await;
        chain.lock().unwrap().script_outcome(2, 1, ether_milli(20));
        controller.view.game.bet_input = "0.01".into();
        let pending: Vec<Task> = controller.play(Move::Rock).into_iter().collect();

        // when
        controller.disconnect();
        let event = provider_rx.recv().await.unwrap();
        controller.handle_provider_event(event).await;
        run_until_idle(&mut controller, &mut rx, pending).await;

        // then
        assert!(!controller.is_move_pending());
        assert_eq!(controller.view().game.score.user, 0);
        assert_eq!(
            controller.view().game.message,
            Some(StatusLine::new("Move abandoned: wallet changed.", Tone::Info))
        );
    }

    #[tokio::test]
    async fn play__without_provider_reports_it_absent() {
        let (mut controller, _rx) = controller(None);
        controller.start().await;
        controller.view.game.bet_input = "0.1".into();
        assert!(controller.play(Move::Rock).is_none());
        assert_eq!(
            controller.view().game.message,
            Some(StatusLine::new(
                ActionError::ProviderAbsent.to_string(),
                Tone::Error
            ))
        );
    }

    #[tokio::test]
    async fn run_loop__quits_after_confirmation() {
        // given
        let chain = FakeChain::shared();
        let (wallet, provider_rx) = FakeWallet::authorized(chain, vec![alice()]);
        let (mut controller, rx) = controller(Some(wallet));
        let mut ui_state = ui::UiState::default();
        let keys = [KeyCode::Char('q'), KeyCode::Char('y')]
            .into_iter()
            .map(|code| Ok::<_, std::io::Error>(Event::Key(KeyEvent::from(code))));
        let mut input: ui::InputEvents = futures::stream::iter(keys)
            .chain(futures::stream::pending())
            .boxed_local();

        // when
        let result = run_loop(&mut controller, &mut ui_state, &mut input, provider_rx, rx).await;

        // then
        assert!(result.is_ok());
        assert_eq!(controller.session().state(), SessionState::Connected(alice()));
    }
}
