//! Trustline Classifiers
//!
//! The classification layers of the content trust pipeline:
//! - Normalizer: canonicalizes raw text to defeat simple evasion
//! - Pattern filter (Layer 1): deterministic, zero-latency category matching
//! - Semantic classifier (Layer 2): external text-classification adapter
//! - Image classifier: external vision-classification adapter with OCR output
//!
//! Layer 1 is synchronous and side-effect-free; it exists so obviously bad
//! content never pays external-service latency or cost. The external
//! adapters carry a hard timeout and report failures as errors — the
//! pipeline, not the adapter, decides to fail open.

pub mod filter;
pub mod image;
pub mod normalize;
pub mod semantic;

pub use filter::PatternFilter;
pub use image::{HttpImageClassifier, ImageClassifier, ImageRef, ImageVerdict};
pub use normalize::normalize;
pub use semantic::{ClassifierVerdict, HttpTextClassifier, TextClassifier, TextClassifyRequest};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::filter::PatternFilter;
    pub use crate::image::{HttpImageClassifier, ImageClassifier, ImageRef, ImageVerdict};
    pub use crate::normalize::normalize;
    pub use crate::semantic::{
        ClassifierVerdict, HttpTextClassifier, TextClassifier, TextClassifyRequest,
    };
}
