//! Trustline Pipeline
//!
//! The decision core of the content trust platform: one `Evaluate` call
//! runs suspension gate → normalizer → pattern filter → semantic
//! classifier → behavioral detector, records a moderation event, and
//! drives the strike ledger. The async coordinator decouples chat writes
//! from verification so moderation never sits on the send path.

pub mod coordinator;
pub mod detector;
pub mod pipeline;

pub use coordinator::{
    AsyncCoordinator, ChatMessage, ChatMessageStore, MemoryMessageStore, MessageStatus,
    NewChatMessage, SendReceipt,
};
pub use detector::PatternDetector;
pub use pipeline::{EvaluateRequest, ImageEvaluateRequest, TrustPipeline};
