//! Best-effort security audit trail.
//!
//! Audit writes must never fail the operation they describe, so every
//! recorder method swallows store errors after logging them. Retention
//! and export of the trail are handled outside this service.

use tracing::warn;
use uuid::Uuid;

use crate::auth::store::{AuditEvent, CredentialStore, LoginAttempt};

/// Context captured from the incoming request, attached to audit rows.
#[derive(Clone, Debug, Default)]
pub struct RequestMeta {
    pub origin: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct AuditRecorder<S> {
    store: S,
}

impl<S: CredentialStore> AuditRecorder<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Append a structured event. `method` names the verification method
    /// for two-factor events ("totp", "recovery_code", "email_otp").
    pub async fn event(
        &self,
        identity_id: Uuid,
        action: &str,
        method: Option<&str>,
        success: bool,
        meta: &RequestMeta,
        metadata: serde_json::Value,
    ) {
        let event = AuditEvent {
            identity_id,
            action: action.to_string(),
            method: method.map(str::to_string),
            success,
            origin: meta.origin.clone(),
            user_agent: meta.user_agent.clone(),
            metadata,
        };
        if let Err(err) = self.store.append_audit_event(&event).await {
            warn!(action, "failed to append audit event: {err}");
        }
    }

    /// Append a login attempt with the identifier as submitted, whether or
    /// not it matched an identity.
    pub async fn login_attempt(&self, identifier: &str, meta: &RequestMeta, success: bool) {
        let attempt = LoginAttempt {
            identifier: identifier.to_string(),
            origin: meta.origin.clone(),
            success,
        };
        if let Err(err) = self.store.append_login_attempt(&attempt).await {
            warn!(identifier, "failed to append login attempt: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemStore;

    #[tokio::test]
    async fn event_is_persisted() {
        let store = MemStore::new();
        let recorder = AuditRecorder::new(store.clone());
        let id = Uuid::new_v4();
        let meta = RequestMeta {
            origin: Some("1.2.3.4".to_string()),
            user_agent: Some("curl/8".to_string()),
        };
        recorder
            .event(id, "2fa_verify", Some("totp"), true, &meta, serde_json::json!({}))
            .await;
        let events = store.audit_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identity_id, id);
        assert_eq!(events[0].action, "2fa_verify");
        assert_eq!(events[0].method.as_deref(), Some("totp"));
        assert!(events[0].success);
        assert_eq!(events[0].origin.as_deref(), Some("1.2.3.4"));
    }

    #[tokio::test]
    async fn login_attempt_records_identifier_as_submitted() {
        let store = MemStore::new();
        let recorder = AuditRecorder::new(store.clone());
        recorder
            .login_attempt("No-Such-User", &RequestMeta::default(), false)
            .await;
        let attempts = store.login_attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].identifier, "No-Such-User");
        assert!(!attempts[0].success);
    }
}
