use std::sync::Arc;

use super::config::BrokerSettings;
use super::traits::{ApprovalPage, AuthProvider, ClientRegistry, CodeExchanger, IdentityLookup};
use crate::state_token::StateCodec;
use crate::store::CredentialStore;

/// External collaborators consumed by the exchange endpoints.
pub struct Collaborators<R, P, X, L, A> {
    pub registry: R,
    pub provider: P,
    pub exchanger: X,
    pub identity: L,
    pub approval: A,
}

/// Shared state for exchange route handlers.
pub(super) struct BrokerState<R, P, X, L, A> {
    pub(super) registry: Arc<R>,
    pub(super) provider: Arc<P>,
    pub(super) exchanger: Arc<X>,
    pub(super) identity: Arc<L>,
    pub(super) approval: Arc<A>,
    pub(super) codec: Arc<StateCodec>,
    pub(super) store: Arc<CredentialStore>,
    pub(super) settings: BrokerSettings,
}

// Manual Clone: avoid derive adding collaborator Clone bounds.
impl<R, P, X, L, A> Clone for BrokerState<R, P, X, L, A> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            provider: self.provider.clone(),
            exchanger: self.exchanger.clone(),
            identity: self.identity.clone(),
            approval: self.approval.clone(),
            codec: self.codec.clone(),
            store: self.store.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<R, P, X, L, A> BrokerState<R, P, X, L, A>
where
    R: ClientRegistry,
    P: AuthProvider,
    X: CodeExchanger,
    L: IdentityLookup,
    A: ApprovalPage,
{
    pub(super) fn new(
        collaborators: Collaborators<R, P, X, L, A>,
        codec: StateCodec,
        store: Arc<CredentialStore>,
        settings: BrokerSettings,
    ) -> Self {
        Self {
            registry: Arc::new(collaborators.registry),
            provider: Arc::new(collaborators.provider),
            exchanger: Arc::new(collaborators.exchanger),
            identity: Arc::new(collaborators.identity),
            approval: Arc::new(collaborators.approval),
            codec: Arc::new(codec),
            store,
            settings,
        }
    }
}
