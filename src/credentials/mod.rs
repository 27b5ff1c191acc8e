//! Provider credentials.
//!
//! This module handles:
//! - The backing credential list (file or memory)
//! - Out-of-band generation of new credentials
//! - The pool that selects the active credential and fails over

pub mod generator;
pub mod pool;
pub mod store;

pub use generator::{CredentialGenerator, ProcessCredentialGenerator};
pub use pool::{is_quota_error, CredentialPool, PoolStatus, Switch};
pub use store::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore};
