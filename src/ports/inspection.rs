//! Inspection engine port.
//!
//! The proxy pipelines talk to the security engine only through the two traits
//! below. An [`InspectionEngine`] is built once at startup from the rule
//! configuration and shared read-only between requests; every request opens its
//! own [`InspectionTransaction`] and feeds it the facts of one request/response
//! cycle, phase by phase.
use std::fmt;

use thiserror::Error;

/// Error raised when a call into the engine itself fails.
///
/// This is distinct from a detected violation, which is reported as an
/// [`Interruption`] inside [`PhaseResult::Interrupted`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InspectionError {
    /// The transaction was already closed
    #[error("transaction {0} is closed")]
    Closed(String),

    /// A phase was driven out of order
    #[error("phase {phase} invoked out of order: {reason}")]
    OutOfOrder { phase: &'static str, reason: String },

    /// Any other engine failure
    #[error("engine failure: {0}")]
    Engine(String),
}

/// Result type alias for engine calls that only feed data
pub type InspectionResult<T> = Result<T, InspectionError>;

/// Verb attached to an interruption by the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionAction {
    Deny,
    Drop,
    Redirect,
    Block,
}

impl InterruptionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptionAction::Deny => "deny",
            InterruptionAction::Drop => "drop",
            InterruptionAction::Redirect => "redirect",
            InterruptionAction::Block => "block",
        }
    }
}

impl fmt::Display for InterruptionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine decision to stop normal processing of a transaction.
///
/// Fields are private so an interruption cannot be altered after the engine
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interruption {
    status: u16,
    action: InterruptionAction,
    rule_id: u32,
    data: String,
}

impl Interruption {
    pub fn new(
        status: u16,
        action: InterruptionAction,
        rule_id: u32,
        data: impl Into<String>,
    ) -> Self {
        Self {
            status,
            action,
            rule_id,
            data: data.into(),
        }
    }

    /// HTTP status code the client should receive
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn action(&self) -> InterruptionAction {
        self.action
    }

    /// Identifier of the rule that triggered the interruption
    pub fn rule_id(&self) -> u32 {
        self.rule_id
    }

    /// Diagnostic payload (rule message, matched data or redirect target)
    pub fn data(&self) -> &str {
        &self.data
    }
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.action, self.rule_id, self.data)
    }
}

/// Outcome of a single inspection phase.
#[must_use = "every phase result has to be checked before the pipeline proceeds"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseResult {
    Continue,
    Interrupted(Interruption),
    EngineError(InspectionError),
}

impl From<InspectionError> for PhaseResult {
    fn from(err: InspectionError) -> Self {
        PhaseResult::EngineError(err)
    }
}

/// Source and destination endpoints of one leg of a proxied exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub source_host: String,
    pub source_port: u16,
    pub destination_host: String,
    pub destination_port: u16,
}

impl ConnectionInfo {
    pub fn new(
        source_host: impl Into<String>,
        source_port: u16,
        destination_host: impl Into<String>,
        destination_port: u16,
    ) -> Self {
        Self {
            source_host: source_host.into(),
            source_port,
            destination_host: destination_host.into(),
            destination_port,
        }
    }

    /// The same endpoints seen from the other direction
    pub fn reversed(&self) -> Self {
        Self {
            source_host: self.destination_host.clone(),
            source_port: self.destination_port,
            destination_host: self.source_host.clone(),
            destination_port: self.source_port,
        }
    }
}

/// InspectionEngine defines the port for the process-wide, read-only engine
pub trait InspectionEngine: Send + Sync + 'static {
    /// Open a fresh transaction for one client request
    fn open_transaction(&self) -> Box<dyn InspectionTransaction>;
}

/// One inspection session tracking a single request/response cycle.
///
/// Data feeding calls return [`InspectionResult`]; phase calls return a
/// [`PhaseResult`]. Implementations must tolerate `process_logging` and `close`
/// after an interruption.
pub trait InspectionTransaction: Send {
    /// Engine assigned transaction identifier
    fn id(&self) -> &str;

    fn process_connection(&mut self, connection: &ConnectionInfo) -> InspectionResult<()>;

    /// Feed the request line: path with query, method and protocol version
    fn process_uri(&mut self, uri: &str, method: &str, protocol: &str) -> InspectionResult<()>;

    fn add_request_header(&mut self, name: &str, value: &str) -> InspectionResult<()>;

    fn add_query_argument(&mut self, name: &str, value: &str) -> InspectionResult<()>;

    fn process_request_headers(&mut self) -> PhaseResult;

    fn write_request_body(&mut self, bytes: &[u8]) -> InspectionResult<()>;

    fn process_request_body(&mut self) -> PhaseResult;

    fn add_response_header(&mut self, name: &str, value: &str) -> InspectionResult<()>;

    fn process_response_headers(&mut self, status: u16, protocol: &str) -> PhaseResult;

    fn write_response_body(&mut self, bytes: &[u8]) -> InspectionResult<()>;

    fn process_response_body(&mut self) -> PhaseResult;

    /// Run the logging phase; never fails from the caller's point of view
    fn process_logging(&mut self);

    /// Release engine-side resources held by this transaction
    fn close(&mut self) -> InspectionResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_reversed() {
        let conn = ConnectionInfo::new("10.0.0.1", 50123, "127.0.0.1", 8080);
        let rev = conn.reversed();
        assert_eq!(rev.source_host, "127.0.0.1");
        assert_eq!(rev.source_port, 8080);
        assert_eq!(rev.destination_host, "10.0.0.1");
        assert_eq!(rev.destination_port, 50123);
    }

    #[test]
    fn test_interruption_display() {
        let it = Interruption::new(403, InterruptionAction::Deny, 941100, "XSS attack detected");
        assert_eq!(it.to_string(), "deny 941100 XSS attack detected");
        assert_eq!(it.status(), 403);
    }

    #[test]
    fn test_engine_error_into_phase_result() {
        let result: PhaseResult = InspectionError::Engine("boom".to_string()).into();
        assert!(matches!(result, PhaseResult::EngineError(_)));
    }
}
