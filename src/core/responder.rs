//! Terminal responses for interrupted or failed transactions.
use axum::body::Body;
use hyper::{Response, StatusCode, header};

use crate::{
    core::error::PipelineError,
    ports::inspection::{Interruption, InterruptionAction},
};

const FALLBACK_STATUS: StatusCode = StatusCode::FORBIDDEN;

/// Diagnostic body sent to the client for an interruption
pub fn interruption_body(interruption: &Interruption) -> String {
    format!("Interruption: {interruption}\n")
}

/// Answer the client with the engine's verdict.
///
/// The status is taken from the interruption; anything that is not a final
/// status (informational codes included) falls back to 403.
pub fn respond(interruption: &Interruption, transaction_id: &str) -> Response<Body> {
    let status = StatusCode::from_u16(interruption.status())
        .ok()
        .filter(|s| !s.is_informational())
        .unwrap_or(FALLBACK_STATUS);

    tracing::warn!(
        transaction_id = %transaction_id,
        status = status.as_u16(),
        action = %interruption.action(),
        rule_id = interruption.rule_id(),
        data = %interruption.data(),
        "Interruption"
    );

    let mut response = Response::new(Body::from(interruption_body(interruption)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );

    if interruption.action() == InterruptionAction::Redirect {
        match header::HeaderValue::from_str(interruption.data()) {
            Ok(location) => {
                headers.insert(header::LOCATION, location);
            }
            Err(e) => tracing::warn!(
                transaction_id = %transaction_id,
                "Redirect target is not a valid Location header: {}",
                e
            ),
        }
    }

    response
}

/// Generic answer for a pipeline fault; details stay in the logs
pub fn fault_response(error: &PipelineError, transaction_id: &str) -> Response<Body> {
    let status = error.status_code();

    tracing::error!(
        transaction_id = %transaction_id,
        status = status.as_u16(),
        kind = error.kind(),
        error = ?error,
        "Request terminated: {}",
        error
    );

    let reason = status.canonical_reason().unwrap_or("Error");
    let mut response = Response::new(Body::from(format!("{reason}\n")));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;
    use crate::ports::http_client::HttpClientError;

    async fn body_string(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_respond_uses_interruption_status() {
        let it = Interruption::new(403, InterruptionAction::Deny, 941100, "XSS attack detected");
        let response = respond(&it, "tx-1");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            body_string(response).await,
            "Interruption: deny 941100 XSS attack detected\n"
        );
    }

    #[tokio::test]
    async fn test_respond_invalid_status_falls_back() {
        let it = Interruption::new(0, InterruptionAction::Drop, 1, "");
        assert_eq!(respond(&it, "tx-2").status(), StatusCode::FORBIDDEN);

        // hyper would turn an informational final status into a 500
        let it = Interruption::new(101, InterruptionAction::Deny, 2, "upgrade");
        assert_eq!(respond(&it, "tx-3").status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_respond_redirect_sets_location() {
        let it = Interruption::new(
            302,
            InterruptionAction::Redirect,
            7,
            "https://example.com/blocked",
        );
        let response = respond(&it, "tx-3");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://example.com/blocked"
        );
    }

    #[tokio::test]
    async fn test_fault_response_hides_details() {
        let err = PipelineError::from(HttpClientError::ConnectionError(
            "connect refused 10.0.0.7:8000".to_string(),
        ));
        let response = fault_response(&err, "tx-4");
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_string(response).await;
        assert_eq!(body, "Bad Gateway\n");
    }
}
