use common::ErrorKind;
use thiserror::Error;

/// Errors returned by a checkout provider.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The provider could not be reached or returned an unreadable reply.
    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with an error status.
    #[error("Payment provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A session came back without the data needed to reconcile it.
    #[error("Malformed checkout session: {0}")]
    MalformedSession(String),

    #[error("Payment provider timed out")]
    Timeout,
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::UpstreamFailure
    }

    /// Returns true if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::Unavailable(_) | CheckoutError::Timeout => true,
            CheckoutError::Rejected { status, .. } => *status == 429 || *status >= 500,
            CheckoutError::MalformedSession(_) => false,
        }
    }
}

impl From<reqwest::Error> for CheckoutError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CheckoutError::Timeout
        } else {
            CheckoutError::Unavailable(e.to_string())
        }
    }
}

/// Result type for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;
