//! Request body source and response body sink.
//!
//! Both handles are cheap clones over the exchange's shared state, so
//! repeated accessor calls address the same channel. They are `Send + Sync`;
//! the request side and the response side may be driven from different
//! threads, but each side expects a single reader or writer.

use std::io;
use std::sync::{Arc, Mutex};

use bytes::{Buf, Bytes};

use super::{lock, ExchangeError, ExchangeState, Inner, ResponseLength};

/// Readable request body.
#[derive(Clone)]
pub struct RequestBody {
    shared: Arc<Mutex<Inner>>,
}

impl RequestBody {
    pub(crate) fn new(shared: Arc<Mutex<Inner>>) -> Self {
        Self { shared }
    }

    /// Take every unread byte.
    pub fn read_bytes(&self) -> Result<Bytes, ExchangeError> {
        let mut inner = lock(&self.shared);
        if inner.request.closed {
            return Err(ExchangeError::RequestClosed);
        }
        let len = inner.request.remaining.len();
        Ok(inner.request.remaining.split_to(len))
    }

    /// Number of bytes not yet read.
    pub fn remaining(&self) -> usize {
        lock(&self.shared).request.remaining.len()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.shared).request.closed
    }

    /// Close the request body, discarding unread data. Cannot be reopened.
    pub fn close(&self) {
        lock(&self.shared).close_request();
    }
}

impl io::Read for RequestBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = lock(&self.shared);
        if inner.request.closed {
            return Err(ExchangeError::RequestClosed.into());
        }
        let n = buf.len().min(inner.request.remaining.len());
        inner.request.remaining.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBody")
            .field("remaining", &self.remaining())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Writable response body.
#[derive(Clone)]
pub struct ResponseBody {
    shared: Arc<Mutex<Inner>>,
}

impl ResponseBody {
    pub(crate) fn new(shared: Arc<Mutex<Inner>>) -> Self {
        Self { shared }
    }

    /// Write `data` according to the announced length mode.
    ///
    /// Writing past a fixed length aborts the exchange.
    pub fn write_bytes(&self, data: &[u8]) -> Result<usize, ExchangeError> {
        let mut inner = lock(&self.shared);
        if inner.response.closed {
            return Err(ExchangeError::ResponseClosed);
        }
        if inner.aborted {
            return Err(ExchangeError::Aborted);
        }
        let Some(length) = inner.response.length else {
            return Err(ExchangeError::HeadersNotSent);
        };
        if data.is_empty() {
            return Ok(0);
        }

        match length {
            ResponseLength::Empty => return Err(ExchangeError::BodyNotPermitted),
            ResponseLength::Fixed(declared) => {
                let attempted = inner.response.written + data.len() as u64;
                if attempted > declared {
                    inner.abort("length exceeded");
                    return Err(ExchangeError::LengthExceeded { declared, attempted });
                }
            }
            ResponseLength::Chunked => {}
        }

        if let Err(e) = inner.transport.send_data(Bytes::copy_from_slice(data)) {
            inner.abort("transport failure");
            return Err(ExchangeError::Transport(e));
        }
        inner.response.written += data.len() as u64;
        inner.state = ExchangeState::ResponseBodyWritten;
        Ok(data.len())
    }

    /// Total bytes written so far.
    pub fn written(&self) -> u64 {
        lock(&self.shared).response.written
    }

    /// Terminate the response body. Also closes the request body.
    ///
    /// Fails with `ShortWrite` if a fixed length was announced and not met.
    /// Closing an already closed body is a no-op.
    pub fn close(&self) -> Result<(), ExchangeError> {
        lock(&self.shared).close_response()
    }
}

impl io::Write for ResponseBody {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("written", &self.written())
            .finish()
    }
}
