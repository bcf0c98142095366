use std::sync::RwLock;

/// One advertised operation of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
    pub description: String,
}

impl Capability {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Capability set the connection layer queries for a session.
///
/// The actor registers a minimal entry synchronously before any async setup
/// and the full set only once initialization completes, so a caller that
/// races startup sees a discoverable-but-minimal session rather than an
/// empty or half-built one.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: RwLock<Vec<Capability>>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one capability. Idempotent: an entry with the same name is
    /// replaced, not duplicated.
    pub fn register(&self, capability: Capability) {
        let mut entries = self.entries.write().expect("capability registry poisoned");
        match entries.iter_mut().find(|c| c.name == capability.name) {
            Some(existing) => *existing = capability,
            None => entries.push(capability),
        }
    }

    /// Register a batch of capabilities, each idempotently.
    pub fn register_all(&self, capabilities: impl IntoIterator<Item = Capability>) {
        for capability in capabilities {
            self.register(capability);
        }
    }

    #[must_use]
    pub fn list(&self) -> Vec<Capability> {
        self.entries
            .read()
            .expect("capability registry poisoned")
            .clone()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .expect("capability registry poisoned")
            .iter()
            .any(|c| c.name == name)
    }
}
