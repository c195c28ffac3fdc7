//! Warden - an inspecting reverse proxy.
//!
//! Warden sits in front of a single upstream and runs every request, and the
//! matching response, through a phased security-inspection engine before
//! relaying traffic. It follows a **hexagonal architecture**: the pipelines in
//! `core` only see the inspection engine and the upstream HTTP client through
//! the traits in `ports`, and concrete implementations live in `adapters`.
//!
//! # Request flow
//! 1. A transaction is opened for the request and finalized on every exit path
//! 2. Ingress feeds connection, URI, headers and query arguments, runs the
//!    request-headers phase, buffers the body (bounded) and runs the request-body phase
//! 3. The inspected request is forwarded to the upstream, once, without retry
//! 4. Egress feeds the response, buffers its body and runs the response phases
//! 5. The response is relayed, or replaced by a diagnostic answer when the
//!    engine interrupted the transaction
//!
//! # Quick Example
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use warden::{HttpClientAdapter, HttpHandler, InspectionPipeline, RuleEngine, config::ServerConfig};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg: ServerConfig = warden::config::loader::load_config("warden.yaml").await?;
//! let engine = Arc::new(RuleEngine::from_config(&cfg.inspection)?);
//! let client = Arc::new(HttpClientAdapter::new(Duration::from_secs(30))?);
//! let pipeline = Arc::new(InspectionPipeline::new(engine, client, &cfg)?);
//! let app = warden::adapters::router(HttpHandler::new(pipeline));
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Error Handling
//! Startup APIs return `eyre::Result<T>` with `WrapErr` context. Request-time
//! failures are typed (`PipelineError`) and never reach the client in detail.
// Re-export public modules with explicit visibility controls
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler, RuleEngine},
    core::InspectionPipeline,
    ports::{http_client::HttpClient, inspection::InspectionEngine},
    utils::GracefulShutdown,
};
