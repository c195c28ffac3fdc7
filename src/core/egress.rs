//! Response-side inspection.
//!
//! The request has already reached the upstream by the time this runs, so a
//! rejection here cannot undo upstream side effects. Every such rejection is
//! logged at warn level and counted.
use axum::body::Body;
use hyper::{HeaderMap, Response};

use crate::{
    config::ResponseHeaderPolicy,
    core::{
        body_buffer::{BodyBuffer, BodyBufferError},
        error::{Direction, Halt, PipelineError},
        forwarder::strip_hop_by_hop,
        ingress::{for_each_first_value, protocol_name},
    },
    metrics,
    ports::inspection::{ConnectionInfo, InspectionTransaction},
};

/// Copy upstream headers onto the outbound response
pub fn copy_headers(source: &HeaderMap, target: &mut HeaderMap, policy: ResponseHeaderPolicy) {
    match policy {
        ResponseHeaderPolicy::FirstValue => {
            for name in source.keys() {
                if let Some(value) = source.get(name) {
                    target.insert(name.clone(), value.clone());
                }
            }
        }
        ResponseHeaderPolicy::AllValues => {
            for (name, value) in source.iter() {
                target.append(name.clone(), value.clone());
            }
        }
    }
}

/// Runs the response-side phases and builds the relayed response
#[derive(Debug, Clone, Copy)]
pub struct EgressPipeline {
    max_response_body_bytes: usize,
    header_policy: ResponseHeaderPolicy,
}

impl EgressPipeline {
    pub fn new(max_response_body_bytes: usize, header_policy: ResponseHeaderPolicy) -> Self {
        Self {
            max_response_body_bytes,
            header_policy,
        }
    }

    pub async fn inspect(
        &self,
        tx: &mut dyn InspectionTransaction,
        response: Response<Body>,
        connection: &ConnectionInfo,
    ) -> Result<Response<Body>, Halt> {
        let result = self.run(tx, response, connection).await;
        if let Err(halt) = &result {
            metrics::increment_egress_rejection();
            let reason = match halt {
                Halt::Interrupted { interruption, .. } => interruption.to_string(),
                Halt::Fault(e) => e.to_string(),
            };
            tracing::warn!(
                transaction_id = %tx.id(),
                "Response rejected after the upstream already processed the request: {}",
                reason
            );
        }
        result
    }

    async fn run(
        &self,
        tx: &mut dyn InspectionTransaction,
        response: Response<Body>,
        connection: &ConnectionInfo,
    ) -> Result<Response<Body>, Halt> {
        let (mut parts, body) = response.into_parts();

        tx.process_connection(connection)
            .map_err(|e| PipelineError::engine("response_connection", e))?;

        for_each_first_value(&parts.headers, |name, value| {
            tx.add_response_header(name, value)
                .map_err(|e| PipelineError::engine("response_headers", e))
        })?;
        Halt::check(
            "response_headers",
            tx.process_response_headers(parts.status.as_u16(), protocol_name(parts.version)),
        )?;

        let mut buffer = BodyBuffer::new(self.max_response_body_bytes);
        buffer.read_from(body).await.map_err(|e| match e {
            BodyBufferError::TooLarge { limit } => PipelineError::BodyTooLarge {
                direction: Direction::Response,
                limit,
            },
            BodyBufferError::Read(reason) => PipelineError::MalformedResponse(reason),
        })?;
        tracing::debug!(bytes = buffer.len(), "Response body buffered");

        tx.write_response_body(buffer.as_bytes())
            .map_err(|e| PipelineError::engine("response_body", e))?;
        Halt::check("response_body", tx.process_response_body())?;

        let upstream_headers = std::mem::take(&mut parts.headers);
        copy_headers(&upstream_headers, &mut parts.headers, self.header_policy);
        strip_hop_by_hop(&mut parts.headers);

        Ok(Response::from_parts(parts, Body::from(buffer.take())))
    }
}
