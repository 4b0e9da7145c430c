//! End-to-end tests: HTTP client → server → exchange → handler chain → operation.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::StatusCode;
use wsgate::endpoint::{Echo, Operation};
use wsgate::handler::context::PATH_INFO;
use wsgate::handler::{Handler, HandlerError, MessageContext};

mod common;

const CONFIG: &str = r###"
    [exchange]
    chunk_threshold_bytes = 64

    [[endpoints]]
    path = "/quotes"
    service = "{urn:stock}QuoteService"
    port = "{urn:stock}QuotePort"

    [[endpoints]]
    path = "/events"
    service = "{urn:stock}EventService"
    port = "{urn:stock}EventPort"
    one_way = true

    [[endpoints]]
    path = "/guarded"
    service = "{urn:bank}LedgerService"
    port = "{urn:bank}LedgerPort"
    binding = "##SOAP12_HTTP"

    [[handler_chains]]
    name = "bank"
    service_name_pattern = "{urn:bank}*"
    handlers = ["logging", "payload-limit:8", "tag:a", "tag:b"]
"###;

/// Appends `[name]` to the payload on the way out.
struct Tag(String);

impl Handler for Tag {
    fn name(&self) -> &str {
        &self.0
    }

    fn handle_message(&self, ctx: &mut MessageContext) -> Result<bool, HandlerError> {
        if ctx.is_outbound() {
            let mut payload = ctx.payload().to_vec();
            payload.extend_from_slice(format!("[{}]", self.0).as_bytes());
            ctx.set_payload(payload);
        }
        Ok(true)
    }
}

async fn start(operation: Arc<dyn Operation>) -> common::TestServer {
    common::start_server(CONFIG, operation, |registry| {
        registry.register("tag", |arg| {
            Ok(Arc::new(Tag(arg.unwrap_or("tag").to_string())) as Arc<dyn Handler>)
        });
    })
    .await
}

#[tokio::test]
async fn test_echo_endpoint() {
    let server = start(Arc::new(Echo)).await;
    let res = common::client()
        .post(server.url("/quotes"))
        .header("content-type", "text/xml")
        .body("<getQuote symbol=\"IBM\"/>")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/xml");
    assert_eq!(res.headers()["content-length"], "24");
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "<getQuote symbol=\"IBM\"/>");
    server.stop().await;
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let server = start(Arc::new(Echo)).await;
    let res = common::client()
        .post(server.url("/quotes"))
        .header("x-request-id", "trace-42")
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "trace-42");
    server.stop().await;
}

#[tokio::test]
async fn test_health_lists_endpoints() {
    let server = start(Arc::new(Echo)).await;
    let res = common::client()
        .get(server.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["endpoints"].as_array().unwrap().len(), 3);
    server.stop().await;
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let server = start(Arc::new(Echo)).await;
    let res = common::client()
        .post(server.url("/nowhere"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    server.stop().await;
}

#[tokio::test]
async fn test_one_way_endpoint_accepts_without_body() {
    let server = start(Arc::new(Echo)).await;
    let res = common::client()
        .post(server.url("/events"))
        .body("tick")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert!(res.bytes().await.unwrap().is_empty());
    server.stop().await;
}

#[tokio::test]
async fn test_large_response_is_streamed_chunked() {
    let server = start(Arc::new(Echo)).await;
    let payload = "0123456789".repeat(20);
    let res = common::client()
        .post(server.url("/quotes"))
        .body(payload.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get("content-length").is_none());
    assert_eq!(res.headers()["transfer-encoding"], "chunked");
    assert_eq!(res.text().await.unwrap(), payload);
    server.stop().await;
}

#[tokio::test]
async fn test_chain_runs_outbound_in_reverse_order() {
    let server = start(Arc::new(Echo)).await;
    let res = common::client()
        .post(server.url("/guarded"))
        .body("ping")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "ping[b][a]");
    server.stop().await;
}

#[tokio::test]
async fn test_handler_fault_becomes_error_response() {
    let server = start(Arc::new(Echo)).await;
    let res = common::client()
        .post(server.url("/guarded"))
        .body("far too long for the limit")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        res.headers()["content-type"],
        "text/plain; charset=utf-8"
    );
    let text = res.text().await.unwrap();
    assert!(text.starts_with("Client: payload too large"), "{text}");
    server.stop().await;
}

#[tokio::test]
async fn test_operation_sees_path_info() {
    let operation = |ctx: &mut MessageContext| -> Result<(), HandlerError> {
        let path = ctx
            .property(PATH_INFO)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        ctx.set_payload(Bytes::from(path));
        Ok(())
    };
    let server = start(Arc::new(operation)).await;
    let res = common::client()
        .get(server.url("/quotes/ibm/price?currency=usd"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "/ibm/price");
    server.stop().await;
}

#[tokio::test]
async fn test_operation_error_becomes_server_fault() {
    let operation = |_: &mut MessageContext| -> Result<(), HandlerError> {
        Err(HandlerError::runtime("quote feed unavailable"))
    };
    let server = start(Arc::new(operation)).await;
    let res = common::client()
        .post(server.url("/quotes"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "Server: quote feed unavailable\n");
    server.stop().await;
}

#[tokio::test]
async fn test_head_request_has_no_body() {
    let server = start(Arc::new(Echo)).await;
    let res = common::client()
        .head(server.url("/quotes"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.bytes().await.unwrap().is_empty());
    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let server = start(Arc::new(Echo)).await;
    let url = server.url("/health");
    server.stop().await;

    let result = common::client().get(url).send().await;
    assert!(result.is_err());
}
