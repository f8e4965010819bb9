use ethers::{
    contract::ContractError,
    providers::{
        Middleware,
        MiddlewareError,
        ProviderError,
        RpcError,
    },
    types::{
        Address,
        TxHash,
    },
};
use thiserror::Error;

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChainErrorKind {
    UserRejected,
    InsufficientFunds,
    Gas,
    Reverted,
    Other,
}

impl ChainErrorKind {
    /// Node implementations share no error code for balance or gas failures, so
    /// those two fall back to the node's message text. Nothing past this
    /// boundary looks at message text again.
    pub fn classify(code: Option<i64>, message: &str) -> Self {
        if code == Some(USER_REJECTED_CODE) {
            return ChainErrorKind::UserRejected;
        }
        let lower = message.to_ascii_lowercase();
        if lower.contains("insufficient funds") {
            ChainErrorKind::InsufficientFunds
        } else if lower.contains("gas") || lower.contains("underpriced") {
            ChainErrorKind::Gas
        } else if lower.contains("revert") {
            ChainErrorKind::Reverted
        } else {
            ChainErrorKind::Other
        }
    }
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct ChainError {
    pub kind: ChainErrorKind,
    pub message: String,
}

impl ChainError {
    pub fn new(kind: ChainErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_contract<M: Middleware>(err: &ContractError<M>) -> Self {
        let message = err.to_string();
        let code = err
            .as_middleware_error()
            .and_then(MiddlewareError::as_error_response)
            .map(|resp| resp.code)
            .or_else(|| {
                err.as_provider_error()
                    .and_then(RpcError::as_error_response)
                    .map(|resp| resp.code)
            });
        let kind = match ChainErrorKind::classify(code, &message) {
            ChainErrorKind::Other if err.is_revert() => ChainErrorKind::Reverted,
            kind => kind,
        };
        Self::new(kind, message)
    }

    pub fn from_provider(err: &ProviderError) -> Self {
        let message = err.to_string();
        let code = RpcError::as_error_response(err).map(|resp| resp.code);
        Self::new(ChainErrorKind::classify(code, &message), message)
    }

    /// Anything the user can fix by topping up the native balance.
    pub fn is_gas_related(&self) -> bool {
        matches!(
            self.kind,
            ChainErrorKind::Gas | ChainErrorKind::InsufficientFunds
        )
    }
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum WalletError {
    #[error("No wallet provider available")]
    ProviderAbsent,
    #[error("User rejected the request.")]
    UserRejected,
    #[error("Account {0:?} is not authorized")]
    Unauthorized(Address),
    #[error("{0}")]
    Keystore(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl WalletError {
    pub fn code(&self) -> Option<i64> {
        match self {
            WalletError::UserRejected => Some(USER_REJECTED_CODE),
            WalletError::Chain(err) if err.kind == ChainErrorKind::UserRejected => {
                Some(USER_REJECTED_CODE)
            }
            _ => None,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code() == Some(USER_REJECTED_CODE)
    }
}

/// Failure of a user-triggered action. `Display` renders the advisory shown for
/// rejections raised before anything is submitted.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ActionError {
    #[error("Please connect your wallet first!")]
    NotConnected,
    #[error("Please wait...")]
    Busy,
    #[error("Wallet provider is not available")]
    ProviderAbsent,
    #[error("User rejected the request.")]
    UserRejected,
    #[error("{0}")]
    ValidationFailed(String),
    #[error("{0}")]
    TransactionFailed(ChainError),
    #[error("{0}")]
    InsufficientFunds(ChainError),
    #[error("Outcome event missing from transaction {0:?}")]
    EventMissing(TxHash),
}

impl ActionError {
    pub fn chain_error(&self) -> Option<&ChainError> {
        match self {
            ActionError::TransactionFailed(err) | ActionError::InsufficientFunds(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ChainError> for ActionError {
    fn from(err: ChainError) -> Self {
        match err.kind {
            ChainErrorKind::UserRejected => ActionError::UserRejected,
            ChainErrorKind::InsufficientFunds => ActionError::InsufficientFunds(err),
            _ => ActionError::TransactionFailed(err),
        }
    }
}
