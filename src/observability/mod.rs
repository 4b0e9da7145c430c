//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! exchange, handler chain, endpoint, http server produce:
//!     → logging.rs (structured log events, exchange_id / endpoint fields)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Exchange ID and request ID flow through log fields
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
