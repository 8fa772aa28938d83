// crates/kernel-transport/src/registry.rs
// ============================================================================
// Module: Backend Registry
// Description: Multi-backend transport port with allowlist/denylist access
//              control and session-to-backend ownership tracking.
// Purpose: Let the engine address backends by identifier through one
//          TransportPort without knowing which concrete implementation
//          backs any given session.
// Dependencies: kernel-core, std::collections, std::sync
// ============================================================================

//! ## Overview
//! [`BackendRegistry`] dispatches `open_session`, `work`, and `close` to
//! whichever registered backend owns the session, the way a capability-gated
//! provider registry routes evidence queries to whichever provider owns a
//! check id. [`BackendAccessPolicy`] applies the same allowlist-wins-unless-
//! denylisted rule before a backend is even offered a session.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;

use kernel_core::core::identifiers::BackendId;
use kernel_core::core::identifiers::SessionId;
use kernel_core::core::identifiers::StepId;
use kernel_core::interfaces::SessionError;
use kernel_core::interfaces::TransportPort;

// ============================================================================
// SECTION: Access Policy
// ============================================================================

/// Allowlist/denylist policy gating which backends may be opened.
///
/// # Invariants
/// - The denylist always wins over the allowlist.
/// - A `None` allowlist means every non-denylisted backend is allowed.
#[derive(Debug, Clone, Default)]
pub struct BackendAccessPolicy {
    allowlist: Option<BTreeSet<String>>,
    denylist: BTreeSet<String>,
}

impl BackendAccessPolicy {
    /// A policy that allows every backend not explicitly denied.
    #[must_use]
    pub fn allow_all() -> Self {
        Self { allowlist: None, denylist: BTreeSet::new() }
    }

    /// A policy that allows only the listed backends.
    #[must_use]
    pub fn allowlist(backend_ids: impl IntoIterator<Item = String>) -> Self {
        Self { allowlist: Some(backend_ids.into_iter().collect()), denylist: BTreeSet::new() }
    }

    /// Denies the listed backends regardless of the allowlist.
    #[must_use]
    pub fn with_denylist(mut self, backend_ids: impl IntoIterator<Item = String>) -> Self {
        self.denylist.extend(backend_ids);
        self
    }

    /// Returns `true` when `backend_id` may be opened under this policy.
    #[must_use]
    pub fn is_allowed(&self, backend_id: &str) -> bool {
        if self.denylist.contains(backend_id) {
            return false;
        }
        self.allowlist.as_ref().is_none_or(|allowed| allowed.contains(backend_id))
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// A `TransportPort` that fans out to one backend per session.
///
/// # Invariants
/// - A session id returned by `open_session` is only ever routed back to the
///   backend that opened it.
pub struct BackendRegistry {
    backends: BTreeMap<String, Box<dyn TransportPort + Send + Sync>>,
    policy: BackendAccessPolicy,
    owners: Mutex<BTreeMap<String, String>>,
}

impl BackendRegistry {
    /// Creates an empty registry under the given access policy.
    #[must_use]
    pub fn new(policy: BackendAccessPolicy) -> Self {
        Self { backends: BTreeMap::new(), policy, owners: Mutex::new(BTreeMap::new()) }
    }

    /// Registers a backend implementation under `backend_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Backend`] if `backend_id` is already registered.
    pub fn register_backend(
        &mut self,
        backend_id: &BackendId,
        backend: Box<dyn TransportPort + Send + Sync>,
    ) -> Result<(), SessionError> {
        if self.backends.contains_key(backend_id.as_str()) {
            return Err(SessionError::Backend(format!("backend already registered: {backend_id}")));
        }
        self.backends.insert(backend_id.as_str().to_string(), backend);
        Ok(())
    }

    /// Returns the access policy this registry enforces.
    #[must_use]
    pub fn policy(&self) -> &BackendAccessPolicy {
        &self.policy
    }

    fn backend(&self, backend_id: &str) -> Result<&(dyn TransportPort + Send + Sync), SessionError> {
        self.backends
            .get(backend_id)
            .map(AsRef::as_ref)
            .ok_or_else(|| SessionError::UnknownBackend(BackendId::new(backend_id)))
    }
}

impl TransportPort for BackendRegistry {
    fn open_session(&self, backend_id: &BackendId, step_id: &StepId) -> Result<SessionId, SessionError> {
        if !self.policy.is_allowed(backend_id.as_str()) {
            return Err(SessionError::Backend(format!("backend denied by policy: {backend_id}")));
        }
        let backend = self.backend(backend_id.as_str())?;
        let session_id = backend.open_session(backend_id, step_id)?;
        let mut owners = self.owners.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        owners.insert(session_id.as_str().to_string(), backend_id.as_str().to_string());
        Ok(session_id)
    }

    fn work(&self, session_id: &SessionId, prompt: &serde_json::Value) -> Result<serde_json::Value, SessionError> {
        self.owning_backend(session_id)?.work(session_id, prompt)
    }

    fn finalize(&self, session_id: &SessionId, schema: &serde_json::Value) -> Result<serde_json::Value, SessionError> {
        self.owning_backend(session_id)?.finalize(session_id, schema)
    }

    fn route(&self, session_id: &SessionId, schema: &serde_json::Value) -> Result<Option<serde_json::Value>, SessionError> {
        self.owning_backend(session_id)?.route(session_id, schema)
    }

    fn close(&self, session_id: &SessionId) -> Result<(), SessionError> {
        let backend_id = {
            let mut owners = self.owners.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            owners.remove(session_id.as_str()).ok_or_else(|| SessionError::Closed(session_id.clone()))?
        };
        self.backend(&backend_id)?.close(session_id)
    }
}

impl BackendRegistry {
    fn owning_backend(&self, session_id: &SessionId) -> Result<&(dyn TransportPort + Send + Sync), SessionError> {
        let backend_id = {
            let owners = self.owners.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            owners
                .get(session_id.as_str())
                .cloned()
                .ok_or_else(|| SessionError::Closed(session_id.clone()))?
        };
        self.backend(&backend_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering;

    use super::*;

    struct StubBackend {
        counter: AtomicU64,
    }

    impl TransportPort for StubBackend {
        fn open_session(&self, _backend_id: &BackendId, step_id: &StepId) -> Result<SessionId, SessionError> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(SessionId::new(format!("{step_id}-{n}")))
        }

        fn work(&self, _session_id: &SessionId, _prompt: &serde_json::Value) -> Result<serde_json::Value, SessionError> {
            Ok(serde_json::json!({"ok": true}))
        }

        fn finalize(&self, _session_id: &SessionId, _schema: &serde_json::Value) -> Result<serde_json::Value, SessionError> {
            Ok(serde_json::json!({"ok": true}))
        }

        fn route(&self, _session_id: &SessionId, _schema: &serde_json::Value) -> Result<Option<serde_json::Value>, SessionError> {
            Ok(None)
        }

        fn close(&self, _session_id: &SessionId) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn stub_backend() -> Box<dyn TransportPort + Send + Sync> {
        Box::new(StubBackend { counter: AtomicU64::new(0) })
    }

    #[test]
    fn a_policy_denied_backend_cannot_open_a_session() {
        let mut registry = BackendRegistry::new(BackendAccessPolicy::allowlist(["alpha".to_string()]));
        registry.register_backend(&BackendId::new("beta"), stub_backend()).expect("register");
        let err = registry
            .open_session(&BackendId::new("beta"), &StepId::new("step-1"))
            .expect_err("denied");
        assert!(matches!(err, SessionError::Backend(_)));
    }

    #[test]
    fn work_routes_to_the_backend_that_opened_the_session() {
        let mut registry = BackendRegistry::new(BackendAccessPolicy::allow_all());
        registry.register_backend(&BackendId::new("alpha"), stub_backend()).expect("register");
        let session_id = registry
            .open_session(&BackendId::new("alpha"), &StepId::new("step-1"))
            .expect("opened");
        let result = registry.work(&session_id, &serde_json::json!({})).expect("work");
        assert_eq!(result, serde_json::json!({"ok": true}));
        registry.close(&session_id).expect("closed");
    }

    #[test]
    fn work_after_close_fails() {
        let mut registry = BackendRegistry::new(BackendAccessPolicy::allow_all());
        registry.register_backend(&BackendId::new("alpha"), stub_backend()).expect("register");
        let session_id = registry
            .open_session(&BackendId::new("alpha"), &StepId::new("step-1"))
            .expect("opened");
        registry.close(&session_id).expect("closed");
        let err = registry.work(&session_id, &serde_json::json!({})).expect_err("closed");
        assert!(matches!(err, SessionError::Closed(_)));
    }

    #[test]
    fn registering_a_duplicate_backend_id_fails() {
        let mut registry = BackendRegistry::new(BackendAccessPolicy::allow_all());
        registry.register_backend(&BackendId::new("alpha"), stub_backend()).expect("register");
        let err = registry
            .register_backend(&BackendId::new("alpha"), stub_backend())
            .expect_err("duplicate");
        assert!(matches!(err, SessionError::Backend(_)));
    }
}
