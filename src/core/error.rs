//! Failure taxonomy of the inspection pipeline.
use std::fmt;

use http::StatusCode;
use thiserror::Error;

use crate::ports::{
    http_client::HttpClientError,
    inspection::{InspectionError, Interruption, PhaseResult},
};

/// Which leg of the exchange a body belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Request => f.write_str("request"),
            Direction::Response => f.write_str("response"),
        }
    }
}

/// Any failure that terminates a request without an engine verdict
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    /// A call into the inspection engine failed
    #[error("inspection engine fault during {phase}: {source}")]
    EngineFault {
        phase: &'static str,
        #[source]
        source: InspectionError,
    },

    /// The upstream could not be reached or did not answer
    #[error("upstream fault: {0}")]
    UpstreamFault(#[from] HttpClientError),

    /// A body outgrew its buffering bound
    #[error("{direction} body exceeds the {limit} byte inspection limit")]
    BodyTooLarge { direction: Direction, limit: usize },

    /// The inbound request could not be read or re-framed
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The upstream response could not be read
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
}

impl PipelineError {
    pub fn engine(phase: &'static str, source: InspectionError) -> Self {
        PipelineError::EngineFault { phase, source }
    }

    /// Generic status the client receives for this fault
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::EngineFault { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::UpstreamFault(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::UpstreamFault(_) => StatusCode::BAD_GATEWAY,
            PipelineError::BodyTooLarge {
                direction: Direction::Request,
                ..
            } => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::BodyTooLarge {
                direction: Direction::Response,
                ..
            } => StatusCode::BAD_GATEWAY,
            PipelineError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            PipelineError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::EngineFault { .. } => "engine",
            PipelineError::UpstreamFault(_) => "upstream",
            PipelineError::BodyTooLarge { .. } => "body_too_large",
            PipelineError::MalformedRequest(_) => "malformed_request",
            PipelineError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Why a pipeline stopped before relaying traffic
#[derive(Debug)]
pub enum Halt {
    /// The engine detected a violation
    Interrupted {
        phase: &'static str,
        interruption: Interruption,
    },
    Fault(PipelineError),
}

impl Halt {
    /// Turn the outcome of a phase call into a control-flow decision
    pub fn check(phase: &'static str, result: PhaseResult) -> Result<(), Halt> {
        match result {
            PhaseResult::Continue => Ok(()),
            PhaseResult::Interrupted(interruption) => Err(Halt::Interrupted {
                phase,
                interruption,
            }),
            PhaseResult::EngineError(source) => {
                Err(Halt::Fault(PipelineError::engine(phase, source)))
            }
        }
    }
}

impl From<PipelineError> for Halt {
    fn from(err: PipelineError) -> Self {
        Halt::Fault(err)
    }
}
