#![doc = include_str!("../README.md")]

pub mod broker;
pub mod error;
pub mod session;
pub mod state_token;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use broker::{BrokerConfig, Collaborators, ExchangeError, auth_routes};
pub use error::{BoxError, Error};
pub use session::{Capability, SessionActor, TokenManager, TokenManagerFactory};
pub use state_token::{StateCodec, generate_nonce};
pub use store::{BlobStore, CredentialStore, MemoryBlobStore};
pub use types::{
    CanonicalId, ClientId, CredentialRecord, Identity, PendingAuthorization, SessionProps,
};
