use std::sync::Arc;

use axum::extract::{Query, State};
use axum::{Form, Router};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tracing::{error, info, warn};
use url::Url;

use super::config::BrokerConfig;
use super::error::ExchangeError;
use super::state::{BrokerState, Collaborators};
use super::traits::{ApprovalPage, AuthProvider, ClientRegistry, CodeExchanger, IdentityLookup};
use crate::state_token::generate_nonce;
use crate::store::CredentialStore;
use crate::types::{CanonicalId, ClientId, CredentialRecord, Identity, PendingAuthorization};

/// Create the authorization exchange router.
pub fn auth_routes<R, P, X, L, A>(
    config: BrokerConfig,
    collaborators: Collaborators<R, P, X, L, A>,
    store: Arc<CredentialStore>,
) -> Router
where
    R: ClientRegistry,
    P: AuthProvider,
    X: CodeExchanger,
    L: IdentityLookup,
    A: ApprovalPage,
{
    let auth_path = config.settings.auth_path.clone();
    let state = BrokerState::new(collaborators, config.codec, store, config.settings);

    Router::new()
        .route(
            &format!("{auth_path}/initiate"),
            get(initiate::<R, P, X, L, A>),
        )
        .route(
            &format!("{auth_path}/approve"),
            post(approve::<R, P, X, L, A>),
        )
        .route(
            &format!("{auth_path}/callback"),
            get(callback::<R, P, X, L, A>),
        )
        .with_state(state)
}

// ── Initiate ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct InitiateParams {
    client_id: Option<String>,
    scope: Option<String>,
    redirect_uri: Option<Url>,
}

enum InitiateOutcome {
    ProviderRedirect(Url),
    ApprovalSurface(String),
}

async fn initiate<R: ClientRegistry, P: AuthProvider, X: CodeExchanger, L: IdentityLookup, A: ApprovalPage>(
    State(state): State<BrokerState<R, P, X, L, A>>,
    Query(params): Query<InitiateParams>,
) -> Response {
    match run_initiate(&state, params).await {
        Ok(InitiateOutcome::ProviderRedirect(url)) => Redirect::to(url.as_str()).into_response(),
        Ok(InitiateOutcome::ApprovalSurface(html)) => Html(html).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn run_initiate<R: ClientRegistry, P: AuthProvider, X, L, A: ApprovalPage>(
    state: &BrokerState<R, P, X, L, A>,
    params: InitiateParams,
) -> Result<InitiateOutcome, ExchangeError> {
    let client_id = params
        .client_id
        .filter(|s| !s.is_empty())
        .map(ClientId)
        .ok_or(ExchangeError::MissingClientId)?;

    let pending = PendingAuthorization {
        client_id: client_id.clone(),
        scope: params.scope.or_else(|| state.settings.default_scope.clone()),
        redirect_uri: params.redirect_uri,
        nonce: generate_nonce(),
        issued_at: None,
    };
    let state_token = state.codec.encode(&pending)?;

    // A registry outage must not block the handshake; it only costs the
    // client an extra approval round.
    let approved = state
        .registry
        .has_valid_approval(&client_id)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, client = %client_id, "approval lookup failed");
            false
        });

    if approved {
        let url = provider_redirect(state, &state_token, &pending)?;
        Ok(InitiateOutcome::ProviderRedirect(url))
    } else {
        Ok(InitiateOutcome::ApprovalSurface(
            state.approval.render(&state_token, &pending),
        ))
    }
}

// ── Approve ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApproveForm {
    state: Option<String>,
}

async fn approve<R: ClientRegistry, P: AuthProvider, X: CodeExchanger, L: IdentityLookup, A: ApprovalPage>(
    State(state): State<BrokerState<R, P, X, L, A>>,
    Form(form): Form<ApproveForm>,
) -> Response {
    match run_approve(&state, form).await {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn run_approve<R, P: AuthProvider, X, L, A>(
    state: &BrokerState<R, P, X, L, A>,
    form: ApproveForm,
) -> Result<Url, ExchangeError> {
    let state_token = form
        .state
        .filter(|s| !s.is_empty())
        .ok_or(ExchangeError::InvalidState("state"))?;
    let pending = state
        .codec
        .decode(&state_token)
        .map_err(|_| ExchangeError::InvalidState("state"))?;

    // The same token travels on to the provider; it is still within its TTL.
    provider_redirect(state, &state_token, &pending)
}

/// Validate provider-required fields, then build the authorize redirect.
fn provider_redirect<R, P: AuthProvider, X, L, A>(
    state: &BrokerState<R, P, X, L, A>,
    state_token: &str,
    pending: &PendingAuthorization,
) -> Result<Url, ExchangeError> {
    if let Some(field) = pending.missing_field() {
        return Err(ExchangeError::InvalidState(field));
    }
    state
        .provider
        .authorize_url(state_token, pending)
        .map_err(|e| {
            warn!(error = %e, client = %pending.client_id, "authorize URL construction failed");
            ExchangeError::Provider(e.to_string())
        })
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallbackParams {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback<R: ClientRegistry, P: AuthProvider, X: CodeExchanger, L: IdentityLookup, A: ApprovalPage>(
    State(state): State<BrokerState<R, P, X, L, A>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match run_callback(&state, params).await {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn run_callback<R, P: AuthProvider, X: CodeExchanger, L: IdentityLookup, A>(
    state: &BrokerState<R, P, X, L, A>,
    params: CallbackParams,
) -> Result<Url, ExchangeError> {
    if let Some(provider_error) = params.error {
        let desc = params.error_description.as_deref().unwrap_or("unknown");
        warn!(error = %provider_error, description = %desc, "provider reported an authorization error");
        return Err(ExchangeError::Provider(provider_error));
    }

    let (raw_state, code) = match (params.state, params.code) {
        (Some(s), Some(c)) if !s.is_empty() && !c.is_empty() => (s, c),
        _ => return Err(ExchangeError::MissingParameters),
    };

    let pending = state
        .codec
        .decode(&raw_state)
        .map_err(|_| ExchangeError::InvalidOrExpiredState)?;

    let record = state
        .exchanger
        .exchange(&code, &raw_state)
        .await
        .map_err(|e| {
            error!(error = %e, client = %pending.client_id, "code exchange failed");
            ExchangeError::TokenExchangeFailed
        })?;

    // "Can't determine who this is" is one failure, whether the lookup
    // errored or came back empty.
    let canonical_id = match state.identity.canonical_id(&record).await {
        Ok(Some(id)) => id,
        Ok(None) => return Err(ExchangeError::NoUserId),
        Err(e) => {
            error!(error = %e, client = %pending.client_id, "identity lookup failed");
            return Err(ExchangeError::NoUserId);
        }
    };

    persist_dual_key(&state.store, &canonical_id, &pending.client_id, &record).await;

    let target = state
        .provider
        .complete(&canonical_id, &pending.client_id, pending.scope.as_deref())
        .await
        .map_err(|e| {
            error!(error = %e, user = %canonical_id, "authorization completion failed");
            ExchangeError::Api(e.to_string())
        })?;

    info!(user = %canonical_id, client = %pending.client_id, "authorization exchange complete");
    Ok(target)
}

/// Write the credential under both keys so either identifier alone resolves
/// it later.
///
/// Best-effort: the authorization already succeeded from the requester's
/// point of view, so a failed write is logged, never fatal. Canonical first —
/// it is the authoritative key if a crash splits the pair.
async fn persist_dual_key(
    store: &CredentialStore,
    canonical_id: &CanonicalId,
    client_id: &ClientId,
    record: &CredentialRecord,
) {
    let canonical = Identity::canonical(canonical_id.clone());
    if let Err(error) = store.save(&canonical, record).await {
        warn!(%error, user = %canonical_id, "credential save under canonical key failed");
    }
    let fallback = Identity::fallback(client_id.clone());
    if let Err(error) = store.save(&fallback, record).await {
        warn!(%error, client = %client_id, "credential save under fallback key failed");
    }
}
