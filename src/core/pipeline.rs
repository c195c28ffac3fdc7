//! Per-request orchestration: ingress, forward, egress, respond, finalize.
use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::body::Body;
use eyre::{Result, WrapErr, eyre};
use hyper::{Request, Response};
use tracing::Instrument;

use crate::{
    config::ServerConfig,
    core::{
        egress::EgressPipeline,
        error::{Halt, PipelineError},
        forwarder::BackendForwarder,
        ingress::IngressPipeline,
        responder,
        transaction::TransactionLifecycle,
    },
    metrics,
    ports::{
        http_client::HttpClient,
        inspection::{ConnectionInfo, InspectionEngine, InspectionTransaction},
    },
    tracing_setup::create_inspection_span,
};

/// Host and port of one end of a proxied exchange
#[derive(Debug, Clone)]
struct Endpoint {
    host: String,
    port: u16,
}

/// Drives every request through the inspection phases around one upstream hop.
///
/// Built once at startup and shared by all connections.
pub struct InspectionPipeline {
    lifecycle: TransactionLifecycle,
    ingress: IngressPipeline,
    forwarder: BackendForwarder,
    egress: EgressPipeline,
    listen: Endpoint,
    upstream: Endpoint,
}

impl InspectionPipeline {
    pub fn new(
        engine: Arc<dyn InspectionEngine>,
        client: Arc<dyn HttpClient>,
        config: &ServerConfig,
    ) -> Result<Self> {
        let listen_addr: SocketAddr = config
            .listen_addr
            .parse()
            .wrap_err_with(|| format!("Invalid listen address: {}", config.listen_addr))?;

        let upstream_url = url::Url::parse(&config.upstream.url)
            .wrap_err_with(|| format!("Invalid upstream URL: {}", config.upstream.url))?;
        let upstream = Endpoint {
            host: upstream_url
                .host_str()
                .ok_or_else(|| eyre!("Upstream URL has no host: {}", config.upstream.url))?
                .to_string(),
            port: upstream_url.port_or_known_default().unwrap_or(80),
        };

        let forwarder = BackendForwarder::new(
            &config.upstream.url,
            &config.effective_public_origin(),
            client,
        )?;

        Ok(Self {
            lifecycle: TransactionLifecycle::new(engine),
            ingress: IngressPipeline::new(config.limits.max_request_body_bytes),
            forwarder,
            egress: EgressPipeline::new(
                config.limits.max_response_body_bytes,
                config.response_header_policy,
            ),
            listen: Endpoint {
                host: listen_addr.ip().to_string(),
                port: listen_addr.port(),
            },
            upstream,
        })
    }

    /// Handle one client request end to end. Never fails: interruptions and
    /// faults become terminal responses.
    pub async fn handle(&self, request: Request<Body>, client_addr: SocketAddr) -> Response<Body> {
        let started = Instant::now();
        let mut active = self.lifecycle.begin();
        let transaction_id = active.id().to_string();
        let span = create_inspection_span(
            request.method().as_str(),
            request.uri().path(),
            &transaction_id,
        );

        async move {
            tracing::info!(
                "Handling {} request to {} from {}",
                request.method(),
                request.uri().path(),
                client_addr
            );

            let response = match self.run(active.transaction(), request, client_addr).await {
                Ok(response) => {
                    metrics::increment_request_total("relayed");
                    response
                }
                Err(Halt::Interrupted {
                    phase,
                    interruption,
                }) => {
                    metrics::increment_interruption(phase, interruption.action().as_str());
                    metrics::increment_request_total("interrupted");
                    responder::respond(&interruption, &transaction_id)
                }
                Err(Halt::Fault(error)) => {
                    metrics::increment_fault(error.kind());
                    metrics::increment_request_total("fault");
                    responder::fault_response(&error, &transaction_id)
                }
            };

            active.end();

            let span = tracing::Span::current();
            span.record("http.status_code", response.status().as_u16());
            span.record("duration_ms", started.elapsed().as_millis() as u64);
            response
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        tx: &mut dyn InspectionTransaction,
        request: Request<Body>,
        client_addr: SocketAddr,
    ) -> Result<Response<Body>, Halt> {
        let inbound = ConnectionInfo::new(
            client_addr.ip().to_string(),
            client_addr.port(),
            self.listen.host.clone(),
            self.listen.port,
        );
        let pending = self.ingress.inspect(tx, request, &inbound).await?;

        let response = self
            .forwarder
            .forward(pending)
            .await
            .map_err(PipelineError::from)?;

        let outbound = ConnectionInfo::new(
            self.upstream.host.clone(),
            self.upstream.port,
            self.listen.host.clone(),
            self.listen.port,
        );
        self.egress.inspect(tx, response, &outbound).await
    }
}
