//! Account, session, and two-factor endpoints.

pub(crate) mod admin;
pub(crate) mod login;
pub(crate) mod password;
mod principal;
pub(crate) mod register;
pub(crate) mod token;
pub(crate) mod twofactor;
pub(crate) mod types;
mod utils;

use crate::auth::AuthService;
use crate::cache::RedisCounterCache;
use crate::mailer::PgOutboxNotifier;
use crate::storage::PgCredentialStore;

/// The concrete orchestrator behind the HTTP handlers.
pub type Backend = AuthService<PgCredentialStore, RedisCounterCache, PgOutboxNotifier>;
