use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{Instrument, error, info, info_span, warn};

use super::capabilities::{Capability, CapabilityRegistry};
use super::client::ApiClient;
use super::config::ConfigResolver;
use super::manager::{CredentialAccessors, TokenManager, TokenManagerFactory};
use crate::error::Error;
use crate::store::CredentialStore;
use crate::types::{Identity, SessionProps};

/// Default bound on waiting for the readiness signal at stream entry.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle phase of a session actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    Uninitialized,
    Initializing,
    Ready,
    Recovering,
}

/// Outcome of one recovery tier. Ephemeral, never persisted.
#[derive(Debug)]
enum RecoveryAttempt {
    Succeeded { tier: &'static str },
    Exhausted { tier: &'static str, reason: String },
}

/// Long-lived per-session unit owning one user's token manager and API
/// client.
///
/// State transitions of a single actor never interleave: the mutable core
/// sits behind one async mutex held across an entire initialization or
/// recovery sequence. Many actors run concurrently, sharing only the
/// credential store.
pub struct SessionActor {
    store: Arc<CredentialStore>,
    config: Arc<dyn ConfigResolver>,
    factory: Arc<dyn TokenManagerFactory>,
    capabilities: Arc<CapabilityRegistry>,
    full_capabilities: Vec<Capability>,
    ready_timeout: Duration,
    ready_tx: watch::Sender<bool>,
    inner: Mutex<ActorCore>,
}

struct ActorCore {
    props: SessionProps,
    state: ActorState,
    manager: Option<Arc<dyn TokenManager>>,
    client: Option<ApiClient>,
}

impl SessionActor {
    #[must_use]
    pub fn new(
        props: SessionProps,
        store: Arc<CredentialStore>,
        config: Arc<dyn ConfigResolver>,
        factory: Arc<dyn TokenManagerFactory>,
        full_capabilities: Vec<Capability>,
    ) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            store,
            config,
            factory,
            capabilities: Arc::new(CapabilityRegistry::new()),
            full_capabilities,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            ready_tx,
            inner: Mutex::new(ActorCore {
                props,
                state: ActorState::Uninitialized,
                manager: None,
                client: None,
            }),
        }
    }

    /// Override the bounded readiness wait at stream entry.
    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Registry the connection layer queries for this session.
    #[must_use]
    pub fn capabilities(&self) -> Arc<CapabilityRegistry> {
        self.capabilities.clone()
    }

    /// Snapshot of the session's durable identity.
    pub async fn props(&self) -> SessionProps {
        self.inner.lock().await.props.clone()
    }

    pub async fn state(&self) -> ActorState {
        self.inner.lock().await.state
    }

    /// The API client built by the last successful initialization, if any.
    pub async fn client(&self) -> Option<ApiClient> {
        self.inner.lock().await.client.clone()
    }

    fn base_capability() -> Capability {
        Capability::new("session.describe", "Describe this session and its status")
    }

    /// Run the initialization sequence.
    ///
    /// Re-entrant safe: repeated calls reuse an existing token manager and
    /// re-register capabilities idempotently.
    ///
    /// # Errors
    ///
    /// Any failure after the base registration is logged with full detail
    /// and rethrown; the attempt is fatal and the hosting boundary decides
    /// whether to retry.
    pub async fn initialize(&self) -> Result<(), Error> {
        // The base capability goes in before any await: the actor stays
        // minimally discoverable even if the rest of the sequence stalls.
        self.capabilities.register(Self::base_capability());

        let mut core = self.inner.lock().await;
        let span = self.session_span(&core);
        self.run_init(&mut core).instrument(span).await
    }

    /// Tiered recovery after a reconnect. Returns whether the session is
    /// usable again; never propagates an error, so the connection layer can
    /// decide how to respond to `false`.
    pub async fn reconnect(&self) -> bool {
        self.capabilities.register(Self::base_capability());

        let mut core = self.inner.lock().await;
        let span = self.session_span(&core);
        async {
            core.state = ActorState::Recovering;
            match self.run_recovery(&mut core).await {
                RecoveryAttempt::Succeeded { tier } => {
                    info!(tier, "session recovered");
                    true
                }
                RecoveryAttempt::Exhausted { tier, reason } => {
                    let error = Error::RecoveryExhausted(reason);
                    warn!(%error, tier, "session recovery failed");
                    core.state = ActorState::Uninitialized;
                    self.ready_tx.send_replace(false);
                    false
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Connection entry point: every reconnect passes through recovery
    /// before any request is served. Exposes the capability list only once
    /// the readiness signal fires, within one bounded timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecoveryExhausted`] when recovery reports failure,
    /// or [`Error::ReadyTimeout`] if readiness does not arrive in time.
    pub async fn open_stream(&self) -> Result<Vec<Capability>, Error> {
        if !self.reconnect().await {
            return Err(Error::RecoveryExhausted(
                "all recovery tiers failed".into(),
            ));
        }
        self.await_ready().await?;
        Ok(self.capabilities.list())
    }

    // ── Initialization ─────────────────────────────────────────────

    async fn run_init(&self, core: &mut ActorCore) -> Result<(), Error> {
        core.state = ActorState::Initializing;
        self.ready_tx.send_replace(false);

        match self.init_steps(core).await {
            Ok(()) => {
                core.state = ActorState::Ready;
                self.ready_tx.send_replace(true);
                info!("session initialized");
                Ok(())
            }
            Err(e) => {
                core.state = ActorState::Uninitialized;
                error!(error = %e, "session initialization failed");
                Err(e)
            }
        }
    }

    /// The strict-order setup sequence; each step depends on the previous
    /// ones having completed.
    async fn init_steps(&self, core: &mut ActorCore) -> Result<(), Error> {
        // Resolve configuration first; everything downstream needs it.
        let cfg = self.config.resolve().await.map_err(Error::Init)?;

        // One-time backfill of the fallback id.
        if core.props.fallback_id.is_none() {
            core.props.fallback_id = cfg.client_id.clone();
        }

        // Identity-bound accessors against the shared store.
        let accessors = CredentialAccessors::new(self.store.clone(), core.props.identity());

        // Construct the token manager, reusing an existing instance.
        let manager = match &core.manager {
            Some(existing) => existing.clone(),
            None => {
                let built = self.factory.build(accessors);
                core.manager = Some(built.clone());
                built
            }
        };

        // The manager must have loaded the persisted credential before any
        // client is bound to it.
        manager.initialize().await.map_err(Error::Init)?;

        // Make canonical-key lookups work even if an earlier write only
        // reached the fallback key.
        if let (Some(canonical), Some(fallback)) =
            (&core.props.canonical_id, &core.props.fallback_id)
        {
            self.store
                .migrate_if_needed(
                    &Identity::fallback(fallback.clone()),
                    &Identity::canonical(canonical.clone()),
                )
                .await;
        }

        // Client rebuilt wholesale against the now-initialized manager.
        core.client = Some(ApiClient::new(cfg.api_base, manager));

        // Only now is the full capability set advertised.
        self.capabilities
            .register_all(self.full_capabilities.clone());
        Ok(())
    }

    // ── Recovery ───────────────────────────────────────────────────

    /// Tiers run in order; a failure demotes to the next tier instead of
    /// aborting.
    async fn run_recovery(&self, core: &mut ActorCore) -> RecoveryAttempt {
        // Tier 0: nothing built yet, so only a full initialization can help.
        if core.manager.is_none() {
            match self.run_init(core).await {
                Ok(()) => return RecoveryAttempt::Succeeded { tier: "initialize" },
                Err(e) => {
                    warn!(error = %e, tier = "initialize", "recovery tier failed");
                }
            }
        }

        if let Some(manager) = core.manager.clone() {
            // Tier 1: liveness probe; a live token means nothing else needs
            // touching.
            match manager.get_access_token().await {
                Ok(_) => {
                    core.state = ActorState::Ready;
                    self.ready_tx.send_replace(true);
                    return RecoveryAttempt::Succeeded { tier: "probe" };
                }
                Err(e) => {
                    warn!(error = %e, tier = "probe", "recovery tier failed");
                }
            }

            // Tier 2: soft reload of the persisted credential.
            match manager.initialize().await {
                Ok(()) => {
                    core.state = ActorState::Ready;
                    self.ready_tx.send_replace(true);
                    return RecoveryAttempt::Succeeded { tier: "reload" };
                }
                Err(e) => {
                    warn!(error = %e, tier = "reload", "recovery tier failed");
                }
            }
        }

        // Tier 3: hard reset, rebuilding manager and client from scratch.
        core.manager = None;
        core.client = None;
        match self.run_init(core).await {
            Ok(()) => RecoveryAttempt::Succeeded { tier: "reset" },
            Err(e) => RecoveryAttempt::Exhausted {
                tier: "reset",
                reason: e.to_string(),
            },
        }
    }

    // ── Readiness ──────────────────────────────────────────────────

    /// Wait for the readiness signal with one bounded timeout. No polling:
    /// the watch channel fires the moment a sequence completes.
    async fn await_ready(&self) -> Result<(), Error> {
        let mut ready = self.ready_tx.subscribe();
        let result = tokio::time::timeout(self.ready_timeout, ready.wait_for(|r| *r)).await;
        match result {
            Ok(Ok(_)) => Ok(()),
            // Channel closure cannot outlive `self`; treat it as a timeout.
            Ok(Err(_)) | Err(_) => Err(Error::ReadyTimeout(self.ready_timeout)),
        }
    }

    fn session_span(&self, core: &ActorCore) -> tracing::Span {
        info_span!(
            "session",
            user = core
                .props
                .canonical_id
                .as_ref()
                .map_or("-", |id| id.as_str()),
            client = core
                .props
                .fallback_id
                .as_ref()
                .map_or("-", |id| id.as_str()),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::BoxError;
    use crate::session::config::SessionConfig;
    use crate::store::MemoryBlobStore;
    use crate::types::{CanonicalId, ClientId, CredentialRecord};

    struct StubResolver {
        client_id: Option<&'static str>,
        fail: bool,
    }

    #[async_trait]
    impl ConfigResolver for StubResolver {
        async fn resolve(&self) -> Result<SessionConfig, BoxError> {
            if self.fail {
                return Err("config service unavailable".into());
            }
            Ok(SessionConfig {
                client_id: self.client_id.map(|s| ClientId(s.into())),
                api_base: "https://api.brokerage.example/v1/".parse().unwrap(),
            })
        }
    }

    struct ProgrammableManager {
        init_ok: AtomicBool,
        probe_ok: AtomicBool,
        init_calls: AtomicUsize,
        probe_calls: AtomicUsize,
    }

    impl ProgrammableManager {
        fn new(init_ok: bool, probe_ok: bool) -> Arc<Self> {
            Arc::new(Self {
                init_ok: AtomicBool::new(init_ok),
                probe_ok: AtomicBool::new(probe_ok),
                init_calls: AtomicUsize::new(0),
                probe_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TokenManager for ProgrammableManager {
        async fn initialize(&self) -> Result<(), BoxError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            if self.init_ok.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err("credential load failed".into())
            }
        }

        async fn get_access_token(&self) -> Result<String, BoxError> {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            if self.probe_ok.load(Ordering::SeqCst) {
                Ok("live-token".into())
            } else {
                Err("token expired".into())
            }
        }

        async fn exchange_code(
            &self,
            _code: &str,
            _state: &str,
        ) -> Result<CredentialRecord, BoxError> {
            Ok(CredentialRecord::new("exchanged"))
        }
    }

    struct StubFactory {
        managers: std::sync::Mutex<Vec<Arc<ProgrammableManager>>>,
        builds: AtomicUsize,
    }

    impl StubFactory {
        fn new(managers: Vec<Arc<ProgrammableManager>>) -> Arc<Self> {
            Arc::new(Self {
                managers: std::sync::Mutex::new(managers),
                builds: AtomicUsize::new(0),
            })
        }
    }

    impl TokenManagerFactory for StubFactory {
        fn build(&self, _accessors: CredentialAccessors) -> Arc<dyn TokenManager> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            let mut managers = self.managers.lock().unwrap();
            if managers.len() > 1 {
                managers.remove(0)
            } else {
                managers[0].clone()
            }
        }
    }

    fn props(canonical: Option<&str>, fallback: Option<&str>) -> SessionProps {
        SessionProps {
            canonical_id: canonical.map(|s| CanonicalId(s.into())),
            fallback_id: fallback.map(|s| ClientId(s.into())),
        }
    }

    fn actor_with(
        props_: SessionProps,
        resolver: StubResolver,
        factory: Arc<StubFactory>,
        store: Arc<CredentialStore>,
    ) -> SessionActor {
        SessionActor::new(
            props_,
            store,
            Arc::new(resolver),
            factory,
            vec![
                Capability::new("accounts.list", "List brokerage accounts"),
                Capability::new("orders.place", "Place an order"),
            ],
        )
    }

    fn memory_store() -> Arc<CredentialStore> {
        Arc::new(CredentialStore::new(Arc::new(MemoryBlobStore::new())))
    }

    // ── Initialization ─────────────────────────────────────────────

    #[tokio::test]
    async fn initialize_reaches_ready() {
        let manager = ProgrammableManager::new(true, true);
        let factory = StubFactory::new(vec![manager.clone()]);
        let actor = actor_with(
            props(Some("u1"), Some("c1")),
            StubResolver { client_id: None, fail: false },
            factory.clone(),
            memory_store(),
        );

        actor.initialize().await.unwrap();

        assert_eq!(actor.state().await, ActorState::Ready);
        assert_eq!(manager.init_calls.load(Ordering::SeqCst), 1);
        assert!(actor.client().await.is_some());
        assert!(actor.capabilities().contains("accounts.list"));
    }

    #[tokio::test]
    async fn initialize_registers_base_capability_before_failing() {
        let factory = StubFactory::new(vec![ProgrammableManager::new(true, true)]);
        let actor = actor_with(
            props(Some("u1"), Some("c1")),
            StubResolver { client_id: None, fail: true },
            factory,
            memory_store(),
        );

        let result = actor.initialize().await;

        assert!(matches!(result, Err(Error::Init(_))));
        assert_eq!(actor.state().await, ActorState::Uninitialized);
        // Minimal discoverability survives the failed attempt.
        assert!(actor.capabilities().contains("session.describe"));
        assert!(!actor.capabilities().contains("accounts.list"));
    }

    #[tokio::test]
    async fn initialize_is_reentrant() {
        let factory = StubFactory::new(vec![ProgrammableManager::new(true, true)]);
        let actor = actor_with(
            props(Some("u1"), Some("c1")),
            StubResolver { client_id: None, fail: false },
            factory.clone(),
            memory_store(),
        );

        actor.initialize().await.unwrap();
        actor.initialize().await.unwrap();

        // Second pass reused the existing manager.
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn initialize_backfills_fallback_id_once() {
        let factory = StubFactory::new(vec![ProgrammableManager::new(true, true)]);
        let actor = actor_with(
            props(Some("u1"), None),
            StubResolver { client_id: Some("cfg-client"), fail: false },
            factory,
            memory_store(),
        );

        actor.initialize().await.unwrap();
        assert_eq!(
            actor.props().await.fallback_id,
            Some(ClientId("cfg-client".into()))
        );
    }

    #[tokio::test]
    async fn initialize_keeps_existing_fallback_id() {
        let factory = StubFactory::new(vec![ProgrammableManager::new(true, true)]);
        let actor = actor_with(
            props(Some("u1"), Some("c1")),
            StubResolver { client_id: Some("cfg-client"), fail: false },
            factory,
            memory_store(),
        );

        actor.initialize().await.unwrap();
        assert_eq!(actor.props().await.fallback_id, Some(ClientId("c1".into())));
    }

    #[tokio::test]
    async fn initialize_migrates_fallback_keyed_credential() {
        let store = memory_store();
        let record = CredentialRecord::new("at");
        store
            .save(&Identity::fallback("c1".to_string()), &record)
            .await
            .unwrap();

        let factory = StubFactory::new(vec![ProgrammableManager::new(true, true)]);
        let actor = actor_with(
            props(Some("u1"), Some("c1")),
            StubResolver { client_id: None, fail: false },
            factory,
            store.clone(),
        );
        actor.initialize().await.unwrap();

        assert_eq!(
            store.load(&Identity::canonical("u1".to_string())).await.unwrap(),
            Some(record)
        );
    }

    // ── Recovery ───────────────────────────────────────────────────

    #[tokio::test]
    async fn reconnect_runs_full_init_when_nothing_built() {
        let factory = StubFactory::new(vec![ProgrammableManager::new(true, true)]);
        let actor = actor_with(
            props(Some("u1"), Some("c1")),
            StubResolver { client_id: None, fail: false },
            factory.clone(),
            memory_store(),
        );

        assert!(actor.reconnect().await);
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
        assert_eq!(actor.state().await, ActorState::Ready);
    }

    #[tokio::test]
    async fn reconnect_probe_success_touches_nothing_else() {
        let manager = ProgrammableManager::new(true, true);
        let factory = StubFactory::new(vec![manager.clone()]);
        let actor = actor_with(
            props(Some("u1"), Some("c1")),
            StubResolver { client_id: None, fail: false },
            factory.clone(),
            memory_store(),
        );
        actor.initialize().await.unwrap();

        assert!(actor.reconnect().await);

        assert_eq!(manager.probe_calls.load(Ordering::SeqCst), 1);
        // No soft reload, no rebuild.
        assert_eq!(manager.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reconnect_soft_reload_after_failed_probe() {
        let manager = ProgrammableManager::new(true, false);
        let factory = StubFactory::new(vec![manager.clone()]);
        let actor = actor_with(
            props(Some("u1"), Some("c1")),
            StubResolver { client_id: None, fail: false },
            factory.clone(),
            memory_store(),
        );
        actor.initialize().await.unwrap();

        assert!(actor.reconnect().await);

        assert_eq!(manager.probe_calls.load(Ordering::SeqCst), 1);
        // Initialization at setup plus the soft reload.
        assert_eq!(manager.init_calls.load(Ordering::SeqCst), 2);
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reconnect_hard_reset_rebuilds_manager() {
        let broken = ProgrammableManager::new(true, false);
        let replacement = ProgrammableManager::new(true, true);
        let factory = StubFactory::new(vec![broken.clone(), replacement.clone()]);
        let actor = actor_with(
            props(Some("u1"), Some("c1")),
            StubResolver { client_id: None, fail: false },
            factory.clone(),
            memory_store(),
        );
        actor.initialize().await.unwrap();
        // Probe fails, then the soft reload also starts failing.
        broken.init_ok.store(false, Ordering::SeqCst);

        assert!(actor.reconnect().await);

        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
        assert_eq!(actor.state().await, ActorState::Ready);
    }

    #[tokio::test]
    async fn reconnect_reports_false_when_all_tiers_fail() {
        let manager = ProgrammableManager::new(false, false);
        let factory = StubFactory::new(vec![manager]);
        let actor = actor_with(
            props(Some("u1"), Some("c1")),
            StubResolver { client_id: None, fail: false },
            factory.clone(),
            memory_store(),
        );

        // Tier 0 fails (manager init fails), probe fails, reload fails,
        // reset fails: recovery reports false and raises nothing.
        assert!(!actor.reconnect().await);
        assert_eq!(actor.state().await, ActorState::Uninitialized);
    }

    // ── Stream entry ───────────────────────────────────────────────

    #[tokio::test]
    async fn open_stream_recovers_then_lists_full_capabilities() {
        let factory = StubFactory::new(vec![ProgrammableManager::new(true, true)]);
        let actor = actor_with(
            props(Some("u1"), Some("c1")),
            StubResolver { client_id: None, fail: false },
            factory,
            memory_store(),
        );

        let capabilities = actor.open_stream().await.unwrap();
        let names: Vec<_> = capabilities.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"session.describe"));
        assert!(names.contains(&"accounts.list"));
        assert!(names.contains(&"orders.place"));
    }

    #[tokio::test]
    async fn open_stream_surfaces_recovery_failure() {
        let factory = StubFactory::new(vec![ProgrammableManager::new(false, false)]);
        let actor = actor_with(
            props(Some("u1"), Some("c1")),
            StubResolver { client_id: None, fail: false },
            factory,
            memory_store(),
        );

        assert!(matches!(
            actor.open_stream().await,
            Err(Error::RecoveryExhausted(_))
        ));
    }

    #[tokio::test]
    async fn capability_listing_is_gated_until_initialized() {
        let factory = StubFactory::new(vec![ProgrammableManager::new(true, true)]);
        let actor = actor_with(
            props(Some("u1"), Some("c1")),
            StubResolver { client_id: None, fail: false },
            factory,
            memory_store(),
        );

        assert!(actor.capabilities().list().is_empty());
        actor.initialize().await.unwrap();
        assert!(actor.capabilities().contains("orders.place"));
    }
}
