//! Exchange error taxonomy.

use std::io;
use thiserror::Error;

/// Errors raised by exchange operations.
///
/// Usage violations (`LengthExceeded`, `HeadersNotSent`) and short writes
/// (`ShortWrite`) abort the exchange; the underlying connection is not reused afterwards.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// `send_response_headers` was already called, or headers were mutated after it.
    #[error("response headers already sent")]
    HeadersAlreadySent,

    /// The response body was requested before the response headers were sent.
    #[error("response headers have not been sent")]
    HeadersNotSent,

    /// More bytes were written than the fixed length announced.
    #[error("response body exceeds declared length: declared {declared}, attempted {attempted}")]
    LengthExceeded { declared: u64, attempted: u64 },

    /// Fewer bytes were written than the fixed length announced.
    #[error("response body shorter than declared length: declared {declared}, written {written}")]
    ShortWrite { declared: u64, written: u64 },

    /// The response was started with no body but a write was attempted.
    #[error("response body not permitted for this response")]
    BodyNotPermitted,

    /// The request body channel is closed.
    #[error("request body closed")]
    RequestClosed,

    /// The response body channel is closed.
    #[error("response body closed")]
    ResponseClosed,

    /// The exchange was aborted by an earlier failure.
    #[error("exchange aborted")]
    Aborted,

    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The transport failed while sending the response.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl ExchangeError {
    /// Returns true if this error left the exchange aborted.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            ExchangeError::LengthExceeded { .. }
                | ExchangeError::HeadersNotSent
                | ExchangeError::ShortWrite { .. }
                | ExchangeError::Aborted
                | ExchangeError::Transport(_)
        )
    }
}

impl From<ExchangeError> for io::Error {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Transport(e) => e,
            other => io::Error::other(other),
        }
    }
}
