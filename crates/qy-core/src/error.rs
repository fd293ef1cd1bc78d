//! # Failure signals
//!
//! Everything a suggestion call can surface to its caller. Stream permission
//! decisions are absorbed by the scope resolver and only appear here when the
//! operator opted into rejecting unreadable streams.

/// The index could not answer a field-value query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    #[error("index shard '{shard}' unavailable: {reason}")]
    Unavailable { shard: String, reason: String },

    #[error("index query timed out after {0} ms")]
    Timeout(u64),
}

/// Errors returned by a suggestion call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuggestError {
    /// Caller input failed validation; nothing was queried.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The whole call failed at the index. No partial ranking is returned.
    #[error("retrieval failure: {0}")]
    RetrievalFailure(#[from] RetrievalError),

    #[error("access denied to one or more requested streams")]
    AccessDenied,
}

impl SuggestError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedRequest(detail.into())
    }

    /// Retrieval failures are transient; the caller may resend the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetrievalFailure(_))
    }
}
