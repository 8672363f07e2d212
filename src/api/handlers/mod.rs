pub(crate) mod auth;
pub(crate) mod health;

pub use auth::Backend;
