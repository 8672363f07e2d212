//! In-memory adapter fakes for unit tests.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::store::{
    AuditEvent, CounterCache, Credential, CredentialStore, FactorKind, Identity, LoginAttempt,
    NewIdentity, Notifier, OtpChallenge, Role, SecondFactor, SessionRecord, TokenPurpose,
};

#[derive(Default)]
struct StoreInner {
    identities: Vec<Identity>,
    credentials: HashMap<Uuid, Credential>,
    sessions: HashMap<Vec<u8>, SessionRecord>,
    factors: HashMap<(Uuid, &'static str), SecondFactor>,
    recovery: HashMap<Uuid, Vec<String>>,
    challenges: HashMap<Uuid, OtpChallenge>,
    action_tokens: Vec<(Uuid, &'static str, Vec<u8>, DateTime<Utc>, bool)>,
    pub login_attempts: Vec<LoginAttempt>,
    pub audit_events: Vec<AuditEvent>,
}

/// In-memory [`CredentialStore`] with a virtual clock for row-expiry tests.
#[derive(Clone, Default)]
pub(crate) struct MemStore {
    inner: Arc<Mutex<StoreInner>>,
    skew_seconds: Arc<Mutex<i64>>,
}

impl MemStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Advance the virtual clock so expiry filters can be tested without
    /// sleeping.
    pub(crate) fn advance(&self, seconds: i64) {
        *self.skew_seconds.lock().expect("store lock") += seconds;
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(*self.skew_seconds.lock().expect("store lock"))
    }

    pub(crate) fn login_attempts(&self) -> Vec<LoginAttempt> {
        self.inner.lock().expect("store lock").login_attempts.clone()
    }

    pub(crate) fn audit_events(&self) -> Vec<AuditEvent> {
        self.inner.lock().expect("store lock").audit_events.clone()
    }

    pub(crate) fn session_count(&self, identity_id: Uuid) -> usize {
        self.inner
            .lock()
            .expect("store lock")
            .sessions
            .values()
            .filter(|session| session.identity_id == identity_id)
            .count()
    }

    pub(crate) fn recovery_hash_count(&self, identity_id: Uuid) -> usize {
        self.inner
            .lock()
            .expect("store lock")
            .recovery
            .get(&identity_id)
            .map_or(0, Vec::len)
    }
}

impl CredentialStore for MemStore {
    async fn find_identity_by_login(
        &self,
        identifier: &str,
    ) -> Result<Option<Identity>, AuthError> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .identities
            .iter()
            .find(|identity| identity.email == identifier || identity.username == identifier)
            .cloned())
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .identities
            .iter()
            .find(|identity| identity.email == email)
            .cloned())
    }

    async fn find_identity_by_id(&self, identity_id: Uuid) -> Result<Option<Identity>, AuthError> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .identities
            .iter()
            .find(|identity| identity.id == identity_id)
            .cloned())
    }

    async fn create_identity(&self, new: &NewIdentity) -> Result<Identity, AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        if inner.identities.iter().any(|i| i.email == new.email) {
            return Err(AuthError::Conflict("email"));
        }
        if inner.identities.iter().any(|i| i.username == new.username) {
            return Err(AuthError::Conflict("username"));
        }
        let identity = Identity {
            id: Uuid::new_v4(),
            email: new.email.clone(),
            username: new.username.clone(),
            role: Role::User,
            email_verified_at: None,
        };
        inner.identities.push(identity.clone());
        inner.credentials.insert(
            identity.id,
            Credential {
                identity_id: identity.id,
                password_hash: new.password_hash.clone(),
                last_login_at: None,
            },
        );
        Ok(identity)
    }

    async fn get_credential(&self, identity_id: Uuid) -> Result<Option<Credential>, AuthError> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.credentials.get(&identity_id).cloned())
    }

    async fn update_password_hash(&self, identity_id: Uuid, hash: &str) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        if let Some(credential) = inner.credentials.get_mut(&identity_id) {
            credential.password_hash = hash.to_string();
        }
        Ok(())
    }

    async fn touch_last_login(&self, identity_id: Uuid) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        if let Some(credential) = inner.credentials.get_mut(&identity_id) {
            credential.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_email_verified(&self, identity_id: Uuid) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        if let Some(identity) = inner
            .identities
            .iter_mut()
            .find(|identity| identity.id == identity_id)
        {
            identity.email_verified_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn create_session(
        &self,
        identity_id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.sessions.insert(
            token_hash.to_vec(),
            SessionRecord {
                id: Uuid::new_v4(),
                identity_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn find_session_by_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<SessionRecord>, AuthError> {
        let now = self.now();
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .sessions
            .get(token_hash)
            .filter(|session| session.expires_at > now)
            .cloned())
    }

    async fn delete_session_by_hash(&self, token_hash: &[u8]) -> Result<bool, AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        Ok(inner.sessions.remove(token_hash).is_some())
    }

    async fn delete_sessions_for(&self, identity_id: Uuid) -> Result<u64, AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        let before = inner.sessions.len();
        inner
            .sessions
            .retain(|_, session| session.identity_id != identity_id);
        Ok((before - inner.sessions.len()) as u64)
    }

    async fn upsert_second_factor(
        &self,
        identity_id: Uuid,
        kind: FactorKind,
        secret: &[u8],
        enabled: bool,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.factors.insert(
            (identity_id, kind.as_str()),
            SecondFactor {
                identity_id,
                kind,
                secret: secret.to_vec(),
                enabled,
            },
        );
        Ok(())
    }

    async fn find_second_factor(
        &self,
        identity_id: Uuid,
        kind: FactorKind,
    ) -> Result<Option<SecondFactor>, AuthError> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.factors.get(&(identity_id, kind.as_str())).cloned())
    }

    async fn enabled_second_factors(
        &self,
        identity_id: Uuid,
    ) -> Result<Vec<SecondFactor>, AuthError> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .factors
            .values()
            .filter(|factor| factor.identity_id == identity_id && factor.enabled)
            .cloned()
            .collect())
    }

    async fn set_second_factor_enabled(
        &self,
        identity_id: Uuid,
        kind: FactorKind,
        enabled: bool,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        if let Some(factor) = inner.factors.get_mut(&(identity_id, kind.as_str())) {
            factor.enabled = enabled;
        }
        Ok(())
    }

    async fn replace_recovery_hashes(
        &self,
        identity_id: Uuid,
        hashes: &[String],
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.recovery.insert(identity_id, hashes.to_vec());
        Ok(())
    }

    async fn list_recovery_hashes(&self, identity_id: Uuid) -> Result<Vec<String>, AuthError> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.recovery.get(&identity_id).cloned().unwrap_or_default())
    }

    async fn remove_recovery_hash(
        &self,
        identity_id: Uuid,
        hash: &str,
    ) -> Result<bool, AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        let Some(hashes) = inner.recovery.get_mut(&identity_id) else {
            return Ok(false);
        };
        let before = hashes.len();
        hashes.retain(|stored| stored != hash);
        Ok(hashes.len() < before)
    }

    async fn delete_otp_challenges(&self, identity_id: Uuid) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.challenges.remove(&identity_id);
        Ok(())
    }

    async fn create_otp_challenge(
        &self,
        identity_id: Uuid,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.challenges.insert(
            identity_id,
            OtpChallenge {
                identity_id,
                code_hash: code_hash.to_string(),
                attempts: 0,
                expires_at,
            },
        );
        Ok(())
    }

    async fn find_live_otp_challenge(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<OtpChallenge>, AuthError> {
        let now = self.now();
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .challenges
            .get(&identity_id)
            .filter(|challenge| challenge.expires_at > now)
            .cloned())
    }

    async fn bump_otp_challenge_attempts(&self, identity_id: Uuid) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        if let Some(challenge) = inner.challenges.get_mut(&identity_id) {
            challenge.attempts += 1;
        }
        Ok(())
    }

    async fn append_login_attempt(&self, attempt: &LoginAttempt) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.login_attempts.push(attempt.clone());
        Ok(())
    }

    async fn append_audit_event(&self, event: &AuditEvent) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.audit_events.push(event.clone());
        Ok(())
    }

    async fn create_action_token(
        &self,
        identity_id: Uuid,
        purpose: TokenPurpose,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.action_tokens.push((
            identity_id,
            purpose.as_str(),
            token_hash.to_vec(),
            expires_at,
            false,
        ));
        Ok(())
    }

    async fn consume_action_token(
        &self,
        purpose: TokenPurpose,
        token_hash: &[u8],
    ) -> Result<Option<Uuid>, AuthError> {
        let now = self.now();
        let mut inner = self.inner.lock().expect("store lock");
        for entry in &mut inner.action_tokens {
            if entry.1 == purpose.as_str() && entry.2 == token_hash && entry.3 > now && !entry.4 {
                entry.4 = true;
                return Ok(Some(entry.0));
            }
        }
        Ok(None)
    }
}

/// In-memory [`CounterCache`] with a virtual clock for TTL tests.
#[derive(Clone, Default)]
pub(crate) struct MemCache {
    entries: Arc<Mutex<HashMap<String, (String, Option<Instant>)>>>,
    offset: Arc<Mutex<Duration>>,
}

impl MemCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Advance the virtual clock so TTL expiry can be tested without sleeping.
    pub(crate) fn advance(&self, seconds: u64) {
        let mut offset = self.offset.lock().expect("cache lock");
        *offset += Duration::from_secs(seconds);
    }

    fn now(&self) -> Instant {
        Instant::now() + *self.offset.lock().expect("cache lock")
    }
}

impl CounterCache for MemCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let now = self.now();
        let entries = self.entries.lock().expect("cache lock");
        Ok(entries.get(key).and_then(|(value, deadline)| {
            match deadline {
                Some(deadline) if *deadline <= now => None,
                _ => Some(value.clone()),
            }
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), AuthError> {
        let deadline = self.now() + Duration::from_secs(ttl_seconds);
        let mut entries = self.entries.lock().expect("cache lock");
        entries.insert(key.to_string(), (value.to_string(), Some(deadline)));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), AuthError> {
        let mut entries = self.entries.lock().expect("cache lock");
        entries.remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>, AuthError> {
        let now = self.now();
        let entries = self.entries.lock().expect("cache lock");
        Ok(entries.get(key).and_then(|(_, deadline)| {
            deadline.and_then(|deadline| {
                if deadline <= now {
                    None
                } else {
                    Some((deadline - now).as_secs() as i64)
                }
            })
        }))
    }
}

#[derive(Clone, Debug)]
pub(crate) struct SentMessage {
    pub to: String,
    pub template: String,
    pub context: serde_json::Value,
}

/// Recording [`Notifier`] that can be told to fail specific templates.
#[derive(Clone, Default)]
pub(crate) struct MemNotifier {
    pub sent: Arc<Mutex<Vec<SentMessage>>>,
    fail_templates: Arc<Mutex<Vec<String>>>,
}

impl MemNotifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_template(&self, template: &str) {
        self.fail_templates
            .lock()
            .expect("notifier lock")
            .push(template.to_string());
    }

    pub(crate) fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("notifier lock").clone()
    }
}

impl Notifier for MemNotifier {
    async fn send(
        &self,
        to: &str,
        template: &str,
        context: &serde_json::Value,
    ) -> Result<(), AuthError> {
        if self
            .fail_templates
            .lock()
            .expect("notifier lock")
            .iter()
            .any(|failing| failing == template)
        {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "simulated delivery failure"
            )));
        }
        self.sent.lock().expect("notifier lock").push(SentMessage {
            to: to.to_string(),
            template: template.to_string(),
            context: context.clone(),
        });
        Ok(())
    }
}
