//! Trustline Ledger
//!
//! The bookkeeping half of the content trust pipeline:
//! - `ModerationEvent`: immutable audit record, one per evaluation
//! - `TrustStore`: atomic strike accounting and trust profile state
//! - `EventJournal`: durable JSON-lines event log with rotation and query
//! - `NotificationQueue`: idempotent guardian notification lifecycle
//! - `TrustEngine`: the strike ledger and Active/Suspended state machine
//!
//! Strike counts are always derived from the event log over a trailing
//! window, never from a standalone mutable counter.

pub mod event;
pub mod journal;
pub mod notify;
pub mod store;
pub mod trust;

pub use event::{EventQuery, ModerationEvent};
pub use journal::{ExportFormat, JournalConfig, JournalReader, JournalWriter};
pub use notify::{
    drain, NotificationDispatcher, NotificationPayload, NotificationQueue, NotificationStatus,
    NotificationType, TutorNotification,
};
pub use store::{MemoryTrustStore, TrustProfile, TrustStore};
pub use trust::{Escalation, TrustEngine, UserRef};
