//! Error taxonomy shared by every layer.

/// Coarse classification of a failure, used to pick a response for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A product, order or checkout session does not exist.
    NotFound,
    /// The request conflicts with current state (stock, status, idempotency).
    Conflict,
    /// The caller's role or ownership does not permit the operation.
    Forbidden,
    /// The payment provider was unreachable, timed out or returned an error.
    UpstreamFailure,
    /// The request itself is malformed.
    Validation,
    /// Storage or other internal failure.
    Internal,
}

impl ErrorKind {
    /// Returns true if retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::UpstreamFailure | ErrorKind::Internal)
    }
}
