//! Collaborators the scanner reports to.
//!
//! This module handles:
//! - Alert delivery ([`Notifier`])
//! - Record keeping ([`OpportunityStore`])

pub mod notifier;
pub mod store;

pub use notifier::{LogNotifier, Notification, Notifier, NullNotifier, RecordingNotifier};
pub use store::{
    ErrorLevel, LogStore, NullStore, OpportunityStore, RawOddsBatch, RawQuote, RecordingStore,
};
