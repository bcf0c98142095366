//! Authorization exchange controller.
//!
//! Orchestrates the three-step handshake that lets a tool-calling client
//! authorize this gateway against the brokerage:
//!
//! 1. `GET  <auth_path>/initiate` — resolve the requesting client; returning
//!    clients with a still-valid approval are redirected straight to the
//!    provider, everyone else gets the approval surface.
//! 2. `POST <auth_path>/approve` — accept the submitted approval and redirect
//!    to the provider. Request state crosses the redirect inside a signed,
//!    expiring token (see [`crate::state_token`]), not in cookies.
//! 3. `GET  <auth_path>/callback` — exchange the one-time code, discover the
//!    canonical user id, persist the credential under both keys, and hand
//!    off to the provider's completion redirect.
//!
//! Errors never escape an endpoint: each handler folds its per-step results
//! into one [`ExchangeError`], which renders as a structured JSON body with
//! an HTTP status.
//!
//! ```rust,ignore
//! use tradegate::broker::{BrokerConfig, Collaborators, auth_routes};
//!
//! let config = BrokerConfig::from_env()?;
//! let app = axum::Router::new().merge(auth_routes(config, collaborators, store));
//! ```

mod config;
mod error;
mod routes;
mod state;
mod traits;

pub use config::BrokerConfig;
pub use error::ExchangeError;
pub use routes::auth_routes;
pub use state::Collaborators;
pub use traits::{ApprovalPage, AuthProvider, ClientRegistry, CodeExchanger, IdentityLookup};
