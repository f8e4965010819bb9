use crate::{
    binding::NoteApi,
    errors::{
        ActionError,
        ChainError,
        ChainErrorKind,
    },
    view::Tone,
};
use ethers::types::{
    TxHash,
    U64,
};
use tracing::info;

pub const EMPTY_NOTE_PLACEHOLDER: &str = "No note set yet";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NoteTicket {
    pub note: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NoteSettlement {
    Confirmed(TxHash),
    Failed(ActionError),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NoteReport {
    pub status: String,
    pub tone: Tone,
    /// The input is cleared only after a confirmed write.
    pub clear_input: bool,
    pub refresh: bool,
}

/// Note read/write handler. Writes are serialized by a busy flag.
#[derive(Clone, Debug)]
pub struct NoteDesk {
    busy: bool,
    symbol: String,
}

impl NoteDesk {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            busy: false,
            symbol: symbol.into(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Forgets the pending write of a binding that is gone. Its settlement is
    /// never applied. Returns whether one was pending.
    pub fn abandon(&mut self) -> bool {
        std::mem::take(&mut self.busy)
    }

    pub fn prepare_write(&mut self, connected: bool, input: &str) -> Result<NoteTicket, ActionError> {
        if !connected {
            return Err(ActionError::NotConnected);
        }
        if self.busy {
            return Err(ActionError::Busy);
        }
        if input.is_empty() {
            return Err(ActionError::ValidationFailed("Please enter a note!".into()));
        }
        self.busy = true;
        Ok(NoteTicket {
            note: input.to_string(),
        })
    }

    pub async fn execute_write<N: NoteApi>(
        notes: &N,
        ticket: NoteTicket,
        on_submitted: impl FnOnce(TxHash),
    ) -> NoteSettlement {
        let tx = match notes.submit_note(ticket.note).await {
            Ok(tx) => tx,
            Err(err) => return NoteSettlement::Failed(err.into()),
        };
        info!(?tx, "note write submitted");
        on_submitted(tx);
        match notes.await_receipt(tx).await {
            Ok(Some(receipt)) if receipt.status == Some(U64::zero()) => {
                NoteSettlement::Failed(ActionError::TransactionFailed(ChainError::new(
                    ChainErrorKind::Reverted,
                    "transaction reverted",
                )))
            }
            Ok(Some(_)) => NoteSettlement::Confirmed(tx),
            Ok(None) => NoteSettlement::Failed(ActionError::TransactionFailed(
                ChainError::new(ChainErrorKind::Other, "transaction was dropped"),
            )),
            Err(err) => NoteSettlement::Failed(err.into()),
        }
    }

    /// Clears the busy flag whatever the outcome.
    pub fn settle_write(&mut self, settlement: &NoteSettlement) -> NoteReport {
        self.busy = false;
        match settlement {
            NoteSettlement::Confirmed(_) => NoteReport {
                status: "Note set successfully!".into(),
                tone: Tone::Success,
                clear_input: true,
                refresh: true,
            },
            NoteSettlement::Failed(err) => {
                let mut status = format!("Error: {err}");
                if err.chain_error().is_some_and(ChainError::is_gas_related) {
                    status.push_str(&format!(
                        " - Make sure you have {} for gas fees!",
                        self.symbol
                    ));
                }
                NoteReport {
                    status,
                    tone: Tone::Error,
                    clear_input: false,
                    refresh: false,
                }
            }
        }
    }

    pub async fn read<N: NoteApi>(notes: &N) -> Result<String, ChainError> {
        notes.read_note().await
    }

    pub fn render_read(result: &Result<String, ChainError>) -> String {
        match result {
            Ok(note) if note.is_empty() => EMPTY_NOTE_PLACEHOLDER.to_string(),
            Ok(note) => note.clone(),
            Err(err) => format!("Error: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::{
        FakeChain,
        FakeNote,
    };

    #[test]
    fn prepare_write__requires_connection() {
        let mut desk = NoteDesk::new("tBNB");
        let result = desk.prepare_write(false, "hello");
        assert_eq!(result, Err(ActionError::NotConnected));
        assert_eq!(
            ActionError::NotConnected.to_string(),
            "Please connect your wallet first!"
        );
    }

    #[test]
    fn prepare_write__rejects_empty_input() {
        let mut desk = NoteDesk::new("tBNB");
        let result = desk.prepare_write(true, "");
        assert_eq!(
            result,
            Err(ActionError::ValidationFailed("Please enter a note!".into()))
        );
        assert!(!desk.is_busy());
    }

    #[test]
    fn prepare_write__second_write_while_pending_is_rejected() {
        // given
        let mut desk = NoteDesk::new("tBNB");
        desk.prepare_write(true, "first").unwrap();

        // when
        let second = desk.prepare_write(true, "second");

        // then
        assert_eq!(second, Err(ActionError::Busy));
    }

    #[test]
    fn abandon__frees_the_desk_for_the_next_write() {
        // given
        let mut desk = NoteDesk::new("tBNB");
        desk.prepare_write(true, "first").unwrap();

        // when
        let was_pending = desk.abandon();

        // then
        assert!(was_pending);
        assert!(desk.prepare_write(true, "second").is_ok());
    }

    #[test]
    fn render_read__shows_placeholder_for_empty_note() {
        assert_eq!(NoteDesk::render_read(&Ok(String::new())), "No note set yet");
        assert_eq!(NoteDesk::render_read(&Ok("gm".into())), "gm");
        let err = ChainError::new(ChainErrorKind::Other, "connection refused");
        assert_eq!(NoteDesk::render_read(&Err(err)), "Error: connection refused");
    }

    #[test]
    fn settle_write__gas_failure_appends_hint() {
        // given
        let mut desk = NoteDesk::new("tBNB");
        desk.prepare_write(true, "gm").unwrap();
        let settlement = NoteSettlement::Failed(ActionError::TransactionFailed(
            ChainError::new(ChainErrorKind::Gas, "replacement transaction underpriced"),
        ));

        // when
        let report = desk.settle_write(&settlement);

        // then
        assert_eq!(
            report.status,
            "Error: replacement transaction underpriced - Make sure you have tBNB for gas fees!"
        );
        assert!(!report.clear_input);
        assert!(!desk.is_busy());
    }

    #[test]
    fn settle_write__other_failure_has_no_hint() {
        let mut desk = NoteDesk::new("tBNB");
        let settlement = NoteSettlement::Failed(ActionError::UserRejected);
        let report = desk.settle_write(&settlement);
        assert_eq!(report.status, "Error: User rejected the request.");
    }

    #[tokio::test]
    async fn execute_write__confirmed_write_reports_success_and_refresh() {
        // given
        let chain = FakeChain::shared();
        let notes = FakeNote::new(chain.clone());
        let mut desk = NoteDesk::new("tBNB");
        let ticket = desk.prepare_write(true, "gm frens").unwrap();
        let mut submitted = None;

        // when
        let settlement = NoteDesk::execute_write(&notes, ticket, |tx| submitted = Some(tx)).await;
        let report = desk.settle_write(&settlement);

        // then
        assert!(matches!(settlement, NoteSettlement::Confirmed(tx) if Some(tx) == submitted));
        assert_eq!(report.status, "Note set successfully!");
        assert!(report.clear_input);
        assert!(report.refresh);
        assert_eq!(NoteDesk::read(&notes).await, Ok("gm frens".to_string()));
    }

    #[tokio::test]
    async fn execute_write__reverted_receipt_is_an_error() {
        let chain = FakeChain::shared();
        chain.lock().unwrap().revert_next_receipt();
        let notes = FakeNote::new(chain);
        let mut desk = NoteDesk::new("tBNB");
        let ticket = desk.prepare_write(true, "gm").unwrap();
        let settlement = NoteDesk::execute_write(&notes, ticket, |_| {}).await;
        let report = desk.settle_write(&settlement);
        assert_eq!(report.status, "Error: transaction reverted");
        assert_eq!(report.tone, Tone::Error);
    }
}
