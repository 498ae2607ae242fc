pub mod prompt;
pub mod client;
pub mod parser;
pub mod adapter;

pub use prompt::*;
pub use client::*;
pub use parser::*;
pub use adapter::*;

use thiserror::Error;

use crate::pipeline::extraction::PrescriptionRecord;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Vision model rate-limited: {0}")]
    RateLimited(String),

    #[error("Vision model rejected the credential (status {0})")]
    Auth(u16),

    #[error("Vision model returned error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Vision request timed out after {0}s")]
    Timeout(u64),

    #[error("Vision request failed: {0}")]
    Network(String),

    #[error("Unexpected vision response: {0}")]
    Response(String),

    #[error("Image encoding failed: {0}")]
    Encoding(String),
}

impl VisionError {
    /// Only rate limiting is worth retrying.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// What a vision model call produced, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum VisionOutcome {
    /// Records parsed from the response. May be empty.
    Parsed(Vec<PrescriptionRecord>),
    /// The model answered but nothing usable could be read. Holds the raw text.
    Malformed(String),
    /// Still rate-limited after the retry.
    TransientFailure(String),
    /// Any other failure: auth, server error, network, bad body.
    HardFailure(String),
}

impl VisionOutcome {
    /// True when at least one record carries a medicine name.
    pub fn has_named_record(&self) -> bool {
        match self {
            Self::Parsed(records) => records.iter().any(|r| r.medicine_name.is_some()),
            _ => false,
        }
    }
}
