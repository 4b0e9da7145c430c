//! Streaming bridge from an exchange to an axum response.
//!
//! # Responsibilities
//! - Carry the response head from the blocking exchange to the async handler
//! - Stream body data as it is written
//! - Surface an aborted exchange to hyper
//!
//! # Design Decisions
//! - Head over a oneshot, data over an unbounded channel; writers never block
//! - Abort before the head becomes a 500; abort after it becomes a body
//!   stream error, so hyper drops the connection instead of ending the
//!   message cleanly
//! - Hop-by-hop framing headers are left to hyper

use std::io;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;
use tokio::sync::{mpsc, oneshot};

use crate::exchange::{ResponseHead, ResponseLength, ResponseTransport};

type Chunk = Result<Bytes, io::Error>;

/// Exchange-side half of the bridge.
pub struct ChannelTransport {
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: Option<mpsc::UnboundedSender<Chunk>>,
}

/// Handler-side half of the bridge.
pub struct PendingResponse {
    head_rx: oneshot::Receiver<ResponseHead>,
    body_rx: mpsc::UnboundedReceiver<Chunk>,
}

/// Create a connected transport / pending response pair.
pub fn channel() -> (ChannelTransport, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::unbounded_channel();
    (
        ChannelTransport {
            head_tx: Some(head_tx),
            body_tx: Some(body_tx),
        },
        PendingResponse { head_rx, body_rx },
    )
}

fn client_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client went away")
}

impl ResponseTransport for ChannelTransport {
    fn send_head(&mut self, head: ResponseHead) -> io::Result<()> {
        let tx = self
            .head_tx
            .take()
            .ok_or_else(|| io::Error::other("response head already sent"))?;
        tx.send(head).map_err(|_| client_gone())
    }

    fn send_data(&mut self, data: Bytes) -> io::Result<()> {
        let tx = self
            .body_tx
            .as_ref()
            .ok_or_else(|| io::Error::other("response body already finished"))?;
        tx.send(Ok(data)).map_err(|_| client_gone())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.body_tx.take();
        Ok(())
    }

    fn abort(&mut self, reason: &str) {
        // Dropping the head sender before use makes the handler answer 500.
        self.head_tx.take();
        if let Some(tx) = self.body_tx.take() {
            let _ = tx.send(Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                reason.to_string(),
            )));
        }
    }
}

impl PendingResponse {
    /// Wait for the head and turn it into a streaming response.
    pub async fn into_response(self) -> Response {
        let head = match self.head_rx.await {
            Ok(head) => head,
            Err(_) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "exchange ended without a response",
                )
                    .into_response()
            }
        };

        let body = match head.length {
            ResponseLength::Empty => Body::empty(),
            ResponseLength::Fixed(_) | ResponseLength::Chunked => {
                let chunks = stream::unfold(self.body_rx, |mut rx| async move {
                    rx.recv().await.map(|chunk| (chunk, rx))
                });
                Body::from_stream(chunks)
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = head.status;
        *response.headers_mut() = head.headers;
        if head.length == ResponseLength::Chunked {
            response.headers_mut().remove(header::TRANSFER_ENCODING);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Exchange;
    use axum::http::Method;

    async fn collect(response: Response) -> Result<Bytes, axum::Error> {
        axum::body::to_bytes(response.into_body(), usize::MAX).await
    }

    #[tokio::test]
    async fn streams_fixed_length_body() {
        let (transport, pending) = channel();
        let exchange = Exchange::builder(Method::GET, "/".parse().unwrap()).build(transport);

        let writer = tokio::task::spawn_blocking(move || {
            exchange.send_response_headers(200, 5)?;
            exchange.response_body()?.write_bytes(b"hello")?;
            exchange.close()
        });

        let response = pending.into_response().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5");
        assert_eq!(&collect(response).await.unwrap()[..], b"hello");
        writer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn chunked_body_drops_framing_header() {
        let (transport, pending) = channel();
        let exchange = Exchange::builder(Method::GET, "/".parse().unwrap()).build(transport);

        let writer = tokio::task::spawn_blocking(move || {
            exchange.send_response_headers(200, 0)?;
            let body = exchange.response_body()?;
            body.write_bytes(b"a")?;
            body.write_bytes(b"b")?;
            exchange.close()
        });

        let response = pending.into_response().await;
        assert!(response.headers().get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(&collect(response).await.unwrap()[..], b"ab");
        writer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn abort_before_head_is_500() {
        let (transport, pending) = channel();
        let exchange = Exchange::builder(Method::GET, "/".parse().unwrap()).build(transport);
        tokio::task::spawn_blocking(move || exchange.close())
            .await
            .unwrap()
            .unwrap();

        let response = pending.into_response().await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn short_write_fails_the_body_stream() {
        let (transport, pending) = channel();
        let exchange = Exchange::builder(Method::GET, "/".parse().unwrap()).build(transport);

        let writer = tokio::task::spawn_blocking(move || {
            exchange.send_response_headers(200, 10)?;
            exchange.response_body()?.write_bytes(b"half")?;
            exchange.close()
        });

        let response = pending.into_response().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(collect(response).await.is_err());
        assert!(writer.await.unwrap().is_err());
    }
}
