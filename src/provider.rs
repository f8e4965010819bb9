use crate::{
    errors::WalletError,
    wallets::{
        self,
        WalletDescriptor,
    },
};
use ethers::{
    middleware::SignerMiddleware,
    providers::{
        Http,
        Middleware,
        Provider,
    },
    signers::{
        LocalWallet,
        Signer,
    },
    types::Address,
};
use futures::{
    FutureExt,
    future::LocalBoxFuture,
};
use std::{
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time,
};
use tracing::{
    info,
    warn,
};

pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// An interactive authorization in flight. Owns everything it touches.
pub type AccountsRequest = LocalBoxFuture<'static, Result<Vec<Address>, WalletError>>;

/// Notifications pushed by the wallet provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

/// The user's answer to an authorization prompt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Approval {
    Granted(String),
    Declined,
}

pub trait WalletProvider {
    type Client;

    /// Accounts already authorized, without prompting.
    fn authorized_accounts(
        &mut self,
    ) -> impl Future<Output = Result<Vec<Address>, WalletError>>;

    /// Interactive authorization. A declined prompt is `WalletError::UserRejected`.
    /// The request outlives the borrow so callers can keep serving events
    /// while it runs.
    fn request_accounts(&self, approval: Approval) -> AccountsRequest;

    fn signer(&self, account: Address) -> Result<Arc<Self::Client>, WalletError>;

    /// Revokes the authorization and announces an empty account list.
    fn disconnect(&mut self);

    fn chain_changed(&mut self, chain_id: u64);
}

/// Wallet provider backed by a Web3 Secret Storage keystore on disk.
pub struct KeystoreProvider {
    rpc: Provider<Http>,
    chain_id: u64,
    wallet: WalletDescriptor,
    unlocked: Arc<Mutex<Option<LocalWallet>>>,
    events: mpsc::UnboundedSender<ProviderEvent>,
}

impl KeystoreProvider {
    pub fn new(
        rpc: Provider<Http>,
        chain_id: u64,
        wallet: WalletDescriptor,
        events: mpsc::UnboundedSender<ProviderEvent>,
    ) -> Self {
        Self {
            rpc,
            chain_id,
            wallet,
            unlocked: Arc::default(),
            events,
        }
    }

    /// Starts with an authorization obtained before the UI came up.
    pub fn with_unlocked(self, signer: LocalWallet) -> Self {
        *unlocked_slot(&self.unlocked) = Some(signer);
        self
    }
}

impl WalletProvider for KeystoreProvider {
    type Client = SignerClient;

    async fn authorized_accounts(&mut self) -> Result<Vec<Address>, WalletError> {
        Ok(unlocked_slot(&self.unlocked)
            .iter()
            .map(Signer::address)
            .collect())
    }

    fn request_accounts(&self, approval: Approval) -> AccountsRequest {
        let descriptor = self.wallet.clone();
        let chain_id = self.chain_id;
        let slot = self.unlocked.clone();
        async move {
            let Approval::Granted(password) = approval else {
                return Err(WalletError::UserRejected);
            };
            let name = descriptor.name.clone();
            // scrypt is slow enough to stall the UI loop
            let signer = tokio::task::spawn_blocking(move || {
                wallets::unlock_with_password(&descriptor, &password, chain_id)
            })
            .await
            .map_err(|e| WalletError::Keystore(e.to_string()))??;
            let account = signer.address();
            info!(wallet = %name, ?account, "wallet unlocked");
            *unlocked_slot(&slot) = Some(signer);
            Ok(vec![account])
        }
        .boxed_local()
    }

    fn signer(&self, account: Address) -> Result<Arc<SignerClient>, WalletError> {
        match unlocked_slot(&self.unlocked).as_ref() {
            Some(signer) if signer.address() == account => Ok(Arc::new(
                SignerMiddleware::new(
                    self.rpc.clone(),
                    signer.clone().with_chain_id(self.chain_id),
                ),
            )),
            _ => Err(WalletError::Unauthorized(account)),
        }
    }

    fn disconnect(&mut self) {
        *unlocked_slot(&self.unlocked) = None;
        if self
            .events
            .send(ProviderEvent::AccountsChanged(Vec::new()))
            .is_err()
        {
            warn!("provider event receiver dropped");
        }
    }

    fn chain_changed(&mut self, chain_id: u64) {
        self.chain_id = chain_id;
    }
}

/// A poisoned slot still holds a usable key.
fn unlocked_slot(slot: &Mutex<Option<LocalWallet>>) -> MutexGuard<'_, Option<LocalWallet>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Polls the node's chain id and reports every divergence from `known`. Ends
/// once the receiver is gone.
pub async fn watch_chain<M: Middleware>(
    client: M,
    mut known: u64,
    every: Duration,
    events: mpsc::UnboundedSender<ProviderEvent>,
) {
    let mut ticker = time::interval(every);
    while !events.is_closed() {
        ticker.tick().await;
        match client.get_chainid().await {
            Ok(id) => {
                let id = id.low_u64();
                if id == known {
                    continue;
                }
                info!(from = known, to = id, "chain changed");
                known = id;
                if events.send(ProviderEvent::ChainChanged(id)).is_err() {
                    break;
                }
            }
            Err(err) => warn!(error = %err, "chain id poll failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use ethers::types::U256;

    fn descriptor() -> WalletDescriptor {
        WalletDescriptor::new("alice", "/nonexistent/alice".into())
    }

    fn provider() -> (KeystoreProvider, mpsc::UnboundedReceiver<ProviderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let rpc = Provider::<Http>::try_from("http://localhost:8545").unwrap();
        (KeystoreProvider::new(rpc, 97, descriptor(), tx), rx)
    }

    #[tokio::test]
    async fn authorized_accounts__empty_until_unlocked() {
        let (mut provider, _rx) = provider();
        assert_eq!(provider.authorized_accounts().await, Ok(vec![]));
    }

    #[tokio::test]
    async fn authorized_accounts__reports_pre_unlocked_signer() {
        // given
        let signer = LocalWallet::from_bytes(&[7u8; 32]).unwrap();
        let expected = signer.address();
        let (provider, _rx) = provider();
        let mut provider = provider.with_unlocked(signer);

        // when
        let accounts = provider.authorized_accounts().await;

        // then
        assert_eq!(accounts, Ok(vec![expected]));
        assert!(provider.signer(expected).is_ok());
    }

    #[tokio::test]
    async fn request_accounts__declined_prompt_is_a_user_rejection() {
        // given
        let (provider, _rx) = provider();

        // when
        let result = provider.request_accounts(Approval::Declined).await;

        // then
        let err = result.unwrap_err();
        assert!(err.is_user_rejection());
        assert_eq!(err.code(), Some(crate::errors::USER_REJECTED_CODE));
    }

    #[tokio::test]
    async fn request_accounts__unreadable_keystore_is_not_a_rejection() {
        let (provider, _rx) = provider();
        let result = provider
            .request_accounts(Approval::Granted("hunter2".into()))
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, WalletError::Keystore(_)));
        assert!(!err.is_user_rejection());
    }

    #[test]
    fn signer__refuses_accounts_it_has_not_unlocked() {
        let (provider, _rx) = provider();
        let stranger = Address::repeat_byte(0x44);
        assert_eq!(
            provider.signer(stranger).err(),
            Some(WalletError::Unauthorized(stranger))
        );
    }

    #[test]
    fn disconnect__revokes_and_announces_empty_accounts() {
        // given
        let signer = LocalWallet::from_bytes(&[7u8; 32]).unwrap();
        let account = signer.address();
        let (provider, mut rx) = provider();
        let mut provider = provider.with_unlocked(signer);

        // when
        provider.disconnect();

        // then
        assert_eq!(rx.try_recv(), Ok(ProviderEvent::AccountsChanged(vec![])));
        assert!(provider.signer(account).is_err());
    }

    #[test]
    fn chain_changed__rebinds_signer_to_new_chain() {
        let signer = LocalWallet::from_bytes(&[7u8; 32]).unwrap();
        let account = signer.address();
        let (provider, _rx) = provider();
        let mut provider = provider.with_unlocked(signer);
        provider.chain_changed(56);
        let client = provider.signer(account).unwrap();
        assert_eq!(client.signer().chain_id(), 56);
    }

    #[tokio::test]
    async fn watch_chain__reports_divergent_chain_id() {
        // given
        let (client, mock) = Provider::mocked();
        mock.push(U256::from(56u64)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // when
        let watcher = tokio::spawn(watch_chain(client, 97, Duration::from_millis(5), tx));
        let event = time::timeout(Duration::from_secs(2), rx.recv()).await;

        // then
        assert_eq!(event.unwrap(), Some(ProviderEvent::ChainChanged(56)));
        drop(rx);
        watcher.abort();
    }
}
