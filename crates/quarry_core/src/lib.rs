//! QUARRY Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! All types are serializable with stable, cross-platform encoding.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod record;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::WorkerId;
pub use record::{Answer, AnswerCandidate, Bound, Fingerprint, ResultRecord};
