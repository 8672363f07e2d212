//! Time-based one-time-password engine: secret codec, enrollment,
//! verification, and recovery codes.

pub mod crypto;
pub mod engine;
pub mod recovery;

pub use engine::{Provisioned, TotpEngine};
