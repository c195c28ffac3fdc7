//! Request-side inspection.
use std::collections::HashSet;

use axum::body::Body;
use bytes::Bytes;
use http::request::Parts;
use hyper::{HeaderMap, Request, Version};

use crate::{
    core::{
        body_buffer::{BodyBuffer, BodyBufferError},
        error::{Direction, Halt, PipelineError},
    },
    ports::inspection::{ConnectionInfo, InspectionTransaction},
};

/// A request that passed every ingress phase, ready to be forwarded
#[derive(Debug)]
pub struct PendingRequest {
    pub parts: Parts,
    pub body: Bytes,
}

/// Render a protocol version the way it appears on the request line
pub fn protocol_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// Feed one header per name, using its first value
pub(crate) fn for_each_first_value<F>(headers: &HeaderMap, mut feed: F) -> Result<(), PipelineError>
where
    F: FnMut(&str, &str) -> Result<(), PipelineError>,
{
    for name in headers.keys() {
        if let Some(value) = headers.get(name) {
            let value = String::from_utf8_lossy(value.as_bytes());
            feed(name.as_str(), &value)?;
        }
    }
    Ok(())
}

/// Decoded query arguments, first value per name, in order of appearance
pub fn first_query_arguments(query: &str) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(name, _)| seen.insert(name.to_string()))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect()
}

/// Runs connection, URI, header and body phases for one inbound request
#[derive(Debug, Clone, Copy)]
pub struct IngressPipeline {
    max_request_body_bytes: usize,
}

impl IngressPipeline {
    pub fn new(max_request_body_bytes: usize) -> Self {
        Self {
            max_request_body_bytes,
        }
    }

    pub async fn inspect(
        &self,
        tx: &mut dyn InspectionTransaction,
        request: Request<Body>,
        connection: &ConnectionInfo,
    ) -> Result<PendingRequest, Halt> {
        let (parts, body) = request.into_parts();

        tx.process_connection(connection)
            .map_err(|e| PipelineError::engine("connection", e))?;

        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        tx.process_uri(
            target,
            parts.method.as_str(),
            protocol_name(parts.version),
        )
        .map_err(|e| PipelineError::engine("uri", e))?;

        for_each_first_value(&parts.headers, |name, value| {
            tx.add_request_header(name, value)
                .map_err(|e| PipelineError::engine("request_headers", e))
        })?;

        if let Some(query) = parts.uri.query() {
            for (name, value) in first_query_arguments(query) {
                tracing::debug!(argument = %name, "Request query argument");
                tx.add_query_argument(&name, &value)
                    .map_err(|e| PipelineError::engine("request_headers", e))?;
            }
        }

        Halt::check("request_headers", tx.process_request_headers())?;

        let mut buffer = BodyBuffer::new(self.max_request_body_bytes);
        buffer.read_from(body).await.map_err(|e| match e {
            BodyBufferError::TooLarge { limit } => PipelineError::BodyTooLarge {
                direction: Direction::Request,
                limit,
            },
            BodyBufferError::Read(reason) => PipelineError::MalformedRequest(reason),
        })?;
        tracing::debug!(bytes = buffer.len(), "Request body buffered");

        tx.write_request_body(buffer.as_bytes())
            .map_err(|e| PipelineError::engine("request_body", e))?;
        Halt::check("request_body", tx.process_request_body())?;

        Ok(PendingRequest {
            parts,
            body: buffer.take(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_query_arguments() {
        let args = first_query_arguments("q=%3Cscript%3E&page=2&q=second&empty=");
        assert_eq!(
            args,
            vec![
                ("q".to_string(), "<script>".to_string()),
                ("page".to_string(), "2".to_string()),
                ("empty".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_first_header_value_only() {
        let mut headers = HeaderMap::new();
        headers.append("x-test", "a".parse().unwrap());
        headers.append("x-test", "b".parse().unwrap());
        headers.insert("accept", "*/*".parse().unwrap());

        let mut seen = Vec::new();
        for_each_first_value(&headers, |name, value| {
            seen.push(format!("{name}={value}"));
            Ok(())
        })
        .unwrap();

        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&"x-test=a".to_string()));
        assert!(seen.contains(&"accept=*/*".to_string()));
    }

    #[test]
    fn test_protocol_name() {
        assert_eq!(protocol_name(Version::HTTP_11), "HTTP/1.1");
        assert_eq!(protocol_name(Version::HTTP_2), "HTTP/2.0");
    }
}
