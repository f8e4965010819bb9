use crate::{
    binding::GameApi,
    errors::{
        ActionError,
        ChainError,
        ChainErrorKind,
    },
    game_types::RockPaperScissorsResultFilter,
    units::{
        self,
        AmountError,
    },
    view::Tone,
};
use ethers::{
    contract::parse_log,
    types::{
        Address,
        TransactionReceipt,
        TxHash,
        U256,
        U64,
    },
};
use std::fmt;
use tracing::{
    info,
    warn,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Move {
    Rock,
    Paper,
    Scissors,
}

impl Move {
    pub fn label(self) -> &'static str {
        match self {
            Move::Rock => "Rock",
            Move::Paper => "Paper",
            Move::Scissors => "Scissors",
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<Move> for u8 {
    fn from(value: Move) -> Self {
        match value {
            Move::Rock => 0,
            Move::Paper => 1,
            Move::Scissors => 2,
        }
    }
}

impl TryFrom<u8> for Move {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Move::Rock),
            1 => Ok(Move::Paper),
            2 => Ok(Move::Scissors),
            other => Err(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Win,
    Lose,
    Draw,
}

impl TryFrom<i8> for Outcome {
    type Error = i8;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Outcome::Win),
            -1 => Ok(Outcome::Lose),
            0 => Ok(Outcome::Draw),
            other => Err(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Score {
    pub user: u32,
    pub computer: u32,
}

impl Score {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.user = self.user.saturating_add(1),
            Outcome::Lose => self.computer = self.computer.saturating_add(1),
            Outcome::Draw => {}
        }
    }
}

/// Bounds fetched once per connection. A bound that failed to load is `None`
/// and is not enforced.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BetBounds {
    pub min: Option<U256>,
    pub max: Option<U256>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GambaInfo {
    pub balance: U256,
    pub min_bet: U256,
    pub max_bet: U256,
}

pub async fn fetch_bounds<G: GameApi>(game: &G) -> BetBounds {
    let (min, max) = futures::join!(game.fetch_min_bet(), game.fetch_max_bet());
    BetBounds {
        min: min
            .inspect_err(|e| warn!(error = %e, "failed to load minimum bet"))
            .ok(),
        max: max
            .inspect_err(|e| warn!(error = %e, "failed to load maximum bet"))
            .ok(),
    }
}

/// House figures for display only; a failed read leaves them unknown.
pub async fn fetch_house<G: GameApi>(game: &G) -> Option<GambaInfo> {
    game.fetch_house_info()
        .await
        .inspect_err(|e| warn!(error = %e, "failed to load house info"))
        .ok()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MoveResult {
    pub tx: TxHash,
    pub player: Address,
    pub player_move: Move,
    pub computer_move: Move,
    pub outcome: Outcome,
    pub bet: U256,
    pub payout: U256,
}

impl MoveResult {
    pub fn narrative(&self) -> String {
        let user = self.player_move.label();
        let comp = self.computer_move.label();
        match self.outcome {
            Outcome::Win => format!("{user} (user) beats {comp} (comp). You win, yay!"),
            Outcome::Lose => {
                format!("{user} (user) loses to {comp} (comp). You lost, womp womp.")
            }
            Outcome::Draw => format!("{user} (user) equals {comp} (comp). It's a draw, ggs ig"),
        }
    }
}

/// Finds the first `RockPaperScissorsResult` log emitted by `game` in the
/// receipt. A log that decodes but carries unknown move or result codes is
/// treated as absent.
pub fn decode_outcome(receipt: &TransactionReceipt, game: Address) -> Option<MoveResult> {
    let event = receipt
        .logs
        .iter()
        .filter(|log| log.address == game)
        .find_map(|log| parse_log::<RockPaperScissorsResultFilter>(log.clone()).ok())?;
    let decoded = (
        Move::try_from(event.player_move),
        Move::try_from(event.computer_move),
        Outcome::try_from(event.result),
    );
    match decoded {
        (Ok(player_move), Ok(computer_move), Ok(outcome)) => Some(MoveResult {
            tx: receipt.transaction_hash,
            player: event.player,
            player_move,
            computer_move,
            outcome,
            bet: event.bet_amount,
            payout: event.payout,
        }),
        _ => {
            warn!(
                tx = ?receipt.transaction_hash,
                player_move = event.player_move,
                computer_move = event.computer_move,
                result = event.result,
                "outcome event carried unknown codes"
            );
            None
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MoveTicket {
    pub account: Address,
    pub choice: Move,
    pub wager: U256,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MoveSettlement {
    Resolved(MoveResult),
    /// No outcome to score. `ActionError::EventMissing` marks a move that was
    /// included on-chain without a readable outcome event.
    Failed(ActionError),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MoveReport {
    pub message: String,
    pub tone: Tone,
    pub narrative: Option<String>,
}

/// Rock-paper-scissors action handler. Owns the score and the single busy flag
/// shared by all three moves.
#[derive(Clone, Debug)]
pub struct MoveDesk {
    score: Score,
    busy: bool,
    bounds: BetBounds,
    symbol: String,
}

impl MoveDesk {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            score: Score::default(),
            busy: false,
            bounds: BetBounds::default(),
            symbol: symbol.into(),
        }
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Forgets the pending move of a binding that is gone. Its settlement is
    /// never applied. Returns whether one was pending.
    pub fn abandon(&mut self) -> bool {
        std::mem::take(&mut self.busy)
    }

    pub fn bounds(&self) -> BetBounds {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: BetBounds) {
        self.bounds = bounds;
    }

    pub fn bounds_summary(&self) -> Option<String> {
        let (min, max) = (self.bounds.min?, self.bounds.max?);
        Some(format!(
            "Min: {} {sym} | Max: {} {sym}",
            units::format_amount(min),
            units::format_amount(max),
            sym = self.symbol
        ))
    }

    /// Validates a move request and marks the desk busy. Nothing is marked when
    /// the request is rejected.
    pub fn prepare(
        &mut self,
        account: Option<Address>,
        choice: Move,
        bet_input: &str,
    ) -> Result<MoveTicket, ActionError> {
        let account = account.ok_or(ActionError::NotConnected)?;
        if self.busy {
            return Err(ActionError::Busy);
        }
        let wager = units::parse_amount(bet_input).map_err(|err| match err {
            AmountError::Empty | AmountError::Malformed(_) | AmountError::NotPositive => {
                ActionError::ValidationFailed("Please enter a valid bet amount!".into())
            }
        })?;
        if let Some(min) = self.bounds.min
            && wager < min
        {
            return Err(ActionError::ValidationFailed(format!(
                "Bet too low! Min: {} {}",
                units::format_amount(min),
                self.symbol
            )));
        }
        if let Some(max) = self.bounds.max
            && wager > max
        {
            return Err(ActionError::ValidationFailed(format!(
                "Bet too high! Max: {} {}",
                units::format_amount(max),
                self.symbol
            )));
        }
        self.busy = true;
        Ok(MoveTicket {
            account,
            choice,
            wager,
        })
    }

    /// Submits the move and waits for inclusion. `on_submitted` fires once the
    /// transaction hash is known.
    pub async fn execute<G: GameApi>(
        game: &G,
        ticket: MoveTicket,
        on_submitted: impl FnOnce(TxHash),
    ) -> MoveSettlement {
        let tx = match game.submit_move(ticket.choice, ticket.wager).await {
            Ok(tx) => tx,
            Err(err) => return MoveSettlement::Failed(err.into()),
        };
        info!(?tx, choice = %ticket.choice, wager = %ticket.wager, "move submitted");
        on_submitted(tx);
        let receipt = match game.await_receipt(tx).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                return MoveSettlement::Failed(ActionError::TransactionFailed(
                    ChainError::new(ChainErrorKind::Other, "transaction was dropped"),
                ));
            }
            Err(err) => return MoveSettlement::Failed(err.into()),
        };
        if receipt.status == Some(U64::zero()) {
            return MoveSettlement::Failed(ActionError::TransactionFailed(ChainError::new(
                ChainErrorKind::Reverted,
                "transaction reverted",
            )));
        }
        match decode_outcome(&receipt, game.contract_address()) {
            Some(result) => MoveSettlement::Resolved(result),
            None => {
                warn!(?tx, "confirmed move has no outcome event");
                MoveSettlement::Failed(ActionError::EventMissing(tx))
            }
        }
    }

    /// Applies a settlement. Always clears the busy flag.
    pub fn settle(&mut self, settlement: &MoveSettlement) -> MoveReport {
        self.busy = false;
        match settlement {
            MoveSettlement::Resolved(result) => {
                self.score.record(result.outcome);
                let message = match result.outcome {
                    Outcome::Win => format!(
                        "You won! Reward: {} {}",
                        units::format_amount(result.payout),
                        self.symbol
                    ),
                    Outcome::Lose => format!(
                        "You lost. Bet: {} {}",
                        units::format_amount(result.bet),
                        self.symbol
                    ),
                    Outcome::Draw => "Draw! Bet returned.".to_string(),
                };
                MoveReport {
                    message,
                    tone: Tone::Success,
                    narrative: Some(result.narrative()),
                }
            }
            MoveSettlement::Failed(ActionError::EventMissing(_)) => MoveReport {
                message: "Transaction completed.".into(),
                tone: Tone::Info,
                narrative: None,
            },
            MoveSettlement::Failed(ActionError::InsufficientFunds(_)) => MoveReport {
                message: "Not enough funds.".into(),
                tone: Tone::Error,
                narrative: None,
            },
            MoveSettlement::Failed(_) => MoveReport {
                message: "Transaction failed.".into(),
                tone: Tone::Error,
                narrative: None,
            },
        }
    }
}
