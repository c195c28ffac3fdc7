//! Per-request transaction lifecycle.
//!
//! [`TransactionLifecycle::begin`] opens an engine transaction and wraps it in
//! an [`ActiveTransaction`]. The logging phase and `close` run exactly once, when
//! the guard is ended explicitly or dropped (which also covers a client that
//! disconnects while its request future is pending).
use std::sync::Arc;

use tracing::{debug, warn};

use crate::ports::inspection::{InspectionEngine, InspectionTransaction};

/// Opens transactions against the shared engine
#[derive(Clone)]
pub struct TransactionLifecycle {
    engine: Arc<dyn InspectionEngine>,
}

impl TransactionLifecycle {
    pub fn new(engine: Arc<dyn InspectionEngine>) -> Self {
        Self { engine }
    }

    /// Start the inspection session for one client request
    pub fn begin(&self) -> ActiveTransaction {
        let inner = self.engine.open_transaction();
        let id = inner.id().to_string();
        debug!(transaction_id = %id, "Inspection transaction opened");
        ActiveTransaction {
            inner,
            id,
            finalized: false,
        }
    }
}

/// Scoped handle over an open engine transaction
pub struct ActiveTransaction {
    inner: Box<dyn InspectionTransaction>,
    id: String,
    finalized: bool,
}

impl ActiveTransaction {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transaction(&mut self) -> &mut dyn InspectionTransaction {
        self.inner.as_mut()
    }

    /// Run the logging phase and close the transaction
    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        self.inner.process_logging();
        if let Err(e) = self.inner.close() {
            warn!(transaction_id = %self.id, "Failed to close inspection transaction: {}", e);
        } else {
            debug!(transaction_id = %self.id, "Inspection transaction closed");
        }
    }
}

impl Drop for ActiveTransaction {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::ports::inspection::{
        ConnectionInfo, InspectionError, InspectionResult, PhaseResult,
    };

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        logged: AtomicUsize,
        closed: AtomicUsize,
    }

    struct CountingEngine {
        counters: Arc<Counters>,
        fail_close: bool,
    }

    struct CountingTransaction {
        counters: Arc<Counters>,
        fail_close: bool,
    }

    impl InspectionEngine for CountingEngine {
        fn open_transaction(&self) -> Box<dyn InspectionTransaction> {
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Box::new(CountingTransaction {
                counters: self.counters.clone(),
                fail_close: self.fail_close,
            })
        }
    }

    impl InspectionTransaction for CountingTransaction {
        fn id(&self) -> &str {
            "tx-test"
        }
        fn process_connection(&mut self, _: &ConnectionInfo) -> InspectionResult<()> {
            Ok(())
        }
        fn process_uri(&mut self, _: &str, _: &str, _: &str) -> InspectionResult<()> {
            Ok(())
        }
        fn add_request_header(&mut self, _: &str, _: &str) -> InspectionResult<()> {
            Ok(())
        }
        fn add_query_argument(&mut self, _: &str, _: &str) -> InspectionResult<()> {
            Ok(())
        }
        fn process_request_headers(&mut self) -> PhaseResult {
            PhaseResult::Continue
        }
        fn write_request_body(&mut self, _: &[u8]) -> InspectionResult<()> {
            Ok(())
        }
        fn process_request_body(&mut self) -> PhaseResult {
            PhaseResult::Continue
        }
        fn add_response_header(&mut self, _: &str, _: &str) -> InspectionResult<()> {
            Ok(())
        }
        fn process_response_headers(&mut self, _: u16, _: &str) -> PhaseResult {
            PhaseResult::Continue
        }
        fn write_response_body(&mut self, _: &[u8]) -> InspectionResult<()> {
            Ok(())
        }
        fn process_response_body(&mut self) -> PhaseResult {
            PhaseResult::Continue
        }
        fn process_logging(&mut self) {
            self.counters.logged.fetch_add(1, Ordering::SeqCst);
        }
        fn close(&mut self) -> InspectionResult<()> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(InspectionError::Engine("close failed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn lifecycle(fail_close: bool) -> (TransactionLifecycle, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let engine = CountingEngine {
            counters: counters.clone(),
            fail_close,
        };
        (TransactionLifecycle::new(Arc::new(engine)), counters)
    }

    #[test]
    fn test_end_closes_once() {
        let (lifecycle, counters) = lifecycle(false);
        let tx = lifecycle.begin();
        assert_eq!(tx.id(), "tx-test");
        tx.end();

        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.logged.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_closes_once() {
        let (lifecycle, counters) = lifecycle(false);
        {
            let mut tx = lifecycle.begin();
            let _ = tx.transaction().process_request_headers();
        }
        assert_eq!(counters.logged.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_failure_is_swallowed() {
        let (lifecycle, counters) = lifecycle(true);
        lifecycle.begin().end();
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }
}
