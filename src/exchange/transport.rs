//! Response transport seam.
//!
//! The exchange state machine decides *what* may be sent and when; a
//! [`ResponseTransport`] decides how the bytes reach the peer. The HTTP
//! server streams them into a hyper body, tests record them in memory.

use std::fmt::Write as _;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use axum::http::{HeaderMap, StatusCode, Version};
use bytes::{BufMut, Bytes, BytesMut};

use super::ResponseLength;

/// Status line and headers of a response, plus its effective body mode.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub length: ResponseLength,
}

/// Destination of a response.
///
/// Calls arrive in order: `send_head` once, `send_data` zero or more times,
/// then exactly one of `finish` or `abort`. `abort` may also arrive before
/// `send_head`.
pub trait ResponseTransport: Send {
    fn send_head(&mut self, head: ResponseHead) -> io::Result<()>;

    fn send_data(&mut self, data: Bytes) -> io::Result<()>;

    /// Terminate the body normally.
    fn finish(&mut self) -> io::Result<()>;

    /// Terminate abruptly; the connection must not be reused.
    fn abort(&mut self, reason: &str);
}

/// Everything a [`RecordingTransport`] has observed.
#[derive(Debug, Clone, Default)]
pub struct Transmission {
    pub head: Option<ResponseHead>,
    pub chunks: Vec<Bytes>,
    pub finished: bool,
    pub aborted: Option<String>,
}

impl Transmission {
    /// Concatenated body payload.
    pub fn body(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for chunk in &self.chunks {
            buf.put_slice(chunk);
        }
        buf.freeze()
    }

    pub fn is_chunked(&self) -> bool {
        matches!(
            self.head.as_ref().map(|h| h.length),
            Some(ResponseLength::Chunked)
        )
    }

    /// Render as HTTP/1.x wire bytes, with chunk framing in chunked mode.
    ///
    /// The terminating zero-length chunk is only emitted once the body
    /// was finished.
    pub fn to_http1(&self, version: Version) -> Bytes {
        let mut out = BytesMut::new();
        let Some(head) = &self.head else {
            return out.freeze();
        };

        let version = if version == Version::HTTP_10 { "HTTP/1.0" } else { "HTTP/1.1" };
        let _ = write!(
            out,
            "{} {} {}\r\n",
            version,
            head.status.as_u16(),
            head.status.canonical_reason().unwrap_or("")
        );
        for (name, value) in &head.headers {
            out.put_slice(name.as_str().as_bytes());
            out.put_slice(b": ");
            out.put_slice(value.as_bytes());
            out.put_slice(b"\r\n");
        }
        out.put_slice(b"\r\n");

        if self.is_chunked() {
            for chunk in &self.chunks {
                let _ = write!(out, "{:x}\r\n", chunk.len());
                out.put_slice(chunk);
                out.put_slice(b"\r\n");
            }
            if self.finished {
                out.put_slice(b"0\r\n\r\n");
            }
        } else {
            for chunk in &self.chunks {
                out.put_slice(chunk);
            }
        }
        out.freeze()
    }
}

/// In-memory transport that records the response.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    shared: Arc<Mutex<Transmission>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of what has been transmitted so far.
    pub fn transmission(&self) -> Transmission {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Transmission) -> R) -> R {
        let mut guard = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl ResponseTransport for RecordingTransport {
    fn send_head(&mut self, head: ResponseHead) -> io::Result<()> {
        self.with(|t| t.head = Some(head));
        Ok(())
    }

    fn send_data(&mut self, data: Bytes) -> io::Result<()> {
        self.with(|t| t.chunks.push(data));
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.with(|t| t.finished = true);
        Ok(())
    }

    fn abort(&mut self, reason: &str) {
        self.with(|t| t.aborted = Some(reason.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn head(length: ResponseLength) -> ResponseHead {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
        ResponseHead {
            status: StatusCode::OK,
            headers,
            length,
        }
    }

    #[test]
    fn renders_fixed_length_body() {
        let mut t = RecordingTransport::new();
        t.send_head(head(ResponseLength::Fixed(5))).unwrap();
        t.send_data(Bytes::from_static(b"hello")).unwrap();
        t.finish().unwrap();

        let wire = t.transmission().to_http1(Version::HTTP_11);
        assert_eq!(
            &wire[..],
            b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\n\r\nhello"
        );
    }

    #[test]
    fn renders_chunk_framing() {
        let mut t = RecordingTransport::new();
        t.send_head(head(ResponseLength::Chunked)).unwrap();
        t.send_data(Bytes::from_static(b"hello ")).unwrap();
        t.send_data(Bytes::from_static(b"chunked world")).unwrap();
        t.finish().unwrap();

        let rec = t.transmission();
        assert!(rec.is_chunked());
        assert_eq!(&rec.body()[..], b"hello chunked world");
        let wire = rec.to_http1(Version::HTTP_11);
        assert!(wire.ends_with(b"\r\n\r\n6\r\nhello \r\nd\r\nchunked world\r\n0\r\n\r\n"));
    }

    #[test]
    fn abort_is_recorded() {
        let mut t = RecordingTransport::new();
        t.abort("boom");
        let rec = t.transmission();
        assert_eq!(rec.aborted.as_deref(), Some("boom"));
        assert!(rec.to_http1(Version::HTTP_11).is_empty());
    }
}
