use crate::{
    binding::{
        ContractAddresses,
        ContractBinding,
        ContractSet,
    },
    errors::WalletError,
    provider::{
        AccountsRequest,
        Approval,
        ProviderEvent,
        WalletProvider,
    },
};
use ethers::types::Address;
use tracing::{
    info,
    warn,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SessionState {
    #[default]
    Uninitialized,
    ProviderMissing,
    Disconnected,
    Connecting,
    Connected(Address),
}

/// What a session transition means for the rest of the app.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionChange {
    ProviderMissing,
    Connected(Address),
    Disconnected,
    Rejected,
    Failed(String),
    /// The chain moved under us. Everything derived from the old chain is stale.
    Reset { chain_id: u64 },
}

pub struct Session<P, C> {
    provider: Option<P>,
    addresses: ContractAddresses,
    state: SessionState,
    binding: Option<ContractBinding<C>>,
}

impl<P, C> Session<P, C>
where
    P: WalletProvider,
    C: ContractSet<Client = P::Client>,
{
    pub fn new(provider: Option<P>, addresses: ContractAddresses) -> Self {
        Self {
            provider,
            addresses,
            state: SessionState::Uninitialized,
            binding: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn account(&self) -> Option<Address> {
        match self.state {
            SessionState::Connected(account) => Some(account),
            _ => None,
        }
    }

    /// The binding, if it still belongs to the live account.
    pub fn binding(&self) -> Option<&ContractBinding<C>> {
        self.binding
            .as_ref()
            .filter(|binding| binding.is_valid_for(self.account()))
    }

    /// Silent restoration: picks up an existing authorization without prompting.
    pub async fn initialize(&mut self) -> SessionChange {
        let Some(provider) = self.provider.as_mut() else {
            info!("no wallet provider detected");
            self.state = SessionState::ProviderMissing;
            return SessionChange::ProviderMissing;
        };
        self.state = SessionState::Connecting;
        match provider.authorized_accounts().await {
            Ok(accounts) => match accounts.first() {
                Some(&account) => self.bind(account),
                None => self.drop_binding(),
            },
            Err(err) => {
                warn!(error = %err, "restoring wallet session failed");
                self.drop_binding();
                SessionChange::Failed(err.to_string())
            }
        }
    }

    /// Starts an interactive authorization and marks the session connecting.
    /// The request borrows nothing from the session; its result goes to
    /// [`Session::finish_connect`].
    pub fn authorize(&mut self, approval: Approval) -> Result<AccountsRequest, SessionChange> {
        let Some(provider) = self.provider.as_ref() else {
            self.state = SessionState::ProviderMissing;
            return Err(SessionChange::ProviderMissing);
        };
        let request = provider.request_accounts(approval);
        self.state = SessionState::Connecting;
        Ok(request)
    }

    pub fn finish_connect(
        &mut self,
        result: Result<Vec<Address>, WalletError>,
    ) -> SessionChange {
        match result {
            Ok(accounts) => match accounts.first() {
                Some(&account) => self.bind(account),
                None => self.drop_binding(),
            },
            Err(err) if err.is_user_rejection() => {
                info!("wallet authorization declined");
                self.drop_binding();
                SessionChange::Rejected
            }
            Err(err) => {
                warn!(error = %err, "wallet connection failed");
                self.drop_binding();
                SessionChange::Failed(err.to_string())
            }
        }
    }

    pub fn handle_event(&mut self, event: ProviderEvent) -> Option<SessionChange> {
        if self.state == SessionState::ProviderMissing {
            return None;
        }
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                Some(&account) => Some(self.bind(account)),
                None => {
                    info!("wallet reported no accounts");
                    Some(self.drop_binding())
                }
            },
            ProviderEvent::ChainChanged(chain_id) => {
                self.binding = None;
                self.state = SessionState::Uninitialized;
                if let Some(provider) = self.provider.as_mut() {
                    provider.chain_changed(chain_id);
                }
                Some(SessionChange::Reset { chain_id })
            }
        }
    }

    /// Revokes the authorization. State follows from the provider's
    /// `AccountsChanged([])` notification.
    pub fn disconnect(&mut self) {
        if let Some(provider) = self.provider.as_mut() {
            provider.disconnect();
        }
    }

    fn bind(&mut self, account: Address) -> SessionChange {
        let Some(provider) = self.provider.as_ref() else {
            self.state = SessionState::ProviderMissing;
            return SessionChange::ProviderMissing;
        };
        match ContractBinding::build(provider, &self.addresses, account) {
            Ok(binding) => {
                info!(?account, "contracts bound");
                self.binding = Some(binding);
                self.state = SessionState::Connected(account);
                SessionChange::Connected(account)
            }
            Err(err) => {
                warn!(error = %err, ?account, "building contract binding failed");
                self.drop_binding();
                SessionChange::Failed(err.to_string())
            }
        }
    }

    fn drop_binding(&mut self) -> SessionChange {
        self.binding = None;
        self.state = SessionState::Disconnected;
        SessionChange::Disconnected
    }
}
