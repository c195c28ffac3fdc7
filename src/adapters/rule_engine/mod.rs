//! Signature-based inspection engine.
//!
//! Rules are regular expressions matched against transaction variables
//! (arguments, URI, headers, bodies) during one of four phases:
//! - `request_headers`
//! - `request_body`
//! - `response_headers`
//! - `response_body`
//!
//! Rules run in load order within a phase. The first matching rule with a
//! disruptive action interrupts the transaction; `pass` rules are recorded in
//! the audit log only.

pub mod rules;
pub mod signatures;
pub mod transaction;

use std::{path::Path, sync::Arc};

use eyre::WrapErr;
pub use rules::{
    RuleAction, RuleDefinition, RuleFile, RuleLoadError, RulePhase, RuleSet, RuleTarget,
};
pub use transaction::RuleTransaction;
use uuid::Uuid;

use crate::{
    config::InspectionConfig,
    ports::inspection::{InspectionEngine, InspectionTransaction},
};

/// Engine holding the compiled rules shared by every transaction
pub struct RuleEngine {
    rules: Arc<RuleSet>,
}

impl RuleEngine {
    /// Compile an explicit list of rules
    pub fn new(definitions: Vec<RuleDefinition>) -> Result<Self, RuleLoadError> {
        Ok(Self {
            rules: Arc::new(RuleSet::compile(definitions)?),
        })
    }

    /// Load the bundled signatures (when enabled) followed by every directive
    /// file, in the configured order
    pub fn from_config(config: &InspectionConfig) -> eyre::Result<Self> {
        let mut definitions = Vec::new();

        if config.builtin_signatures {
            definitions.extend(signatures::builtin_rules());
        }

        for source in &config.directives {
            let rules = rules::load_rule_file(Path::new(source))
                .wrap_err_with(|| format!("Failed to load directives from {source}"))?;
            definitions.extend(rules);
        }

        let engine = Self::new(definitions).wrap_err("Failed to compile inspection rules")?;
        tracing::info!(
            rules = engine.rule_count(),
            builtin = config.builtin_signatures,
            directive_files = config.directives.len(),
            "Inspection engine initialized"
        );
        Ok(engine)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl InspectionEngine for RuleEngine {
    fn open_transaction(&self) -> Box<dyn InspectionTransaction> {
        Box::new(RuleTransaction::new(
            Uuid::new_v4().to_string(),
            Arc::clone(&self.rules),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::ports::inspection::PhaseResult;

    #[test]
    fn test_from_config_builtin_only() {
        let engine = RuleEngine::from_config(&InspectionConfig::default()).unwrap();
        assert_eq!(engine.rule_count(), signatures::builtin_rules().len());
    }

    #[test]
    fn test_from_config_appends_directive_files() {
        let yaml = r#"
rules:
  - id: 100100
    phase: request_headers
    targets: [request_method]
    pattern: "^TRACE$"
    status: 405
    msg: "TRACE not allowed"
"#;
        let mut file = NamedTempFile::with_suffix(".yml").unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = InspectionConfig {
            builtin_signatures: false,
            directives: vec![file.path().to_string_lossy().into_owned()],
        };
        let engine = RuleEngine::from_config(&config).unwrap();
        assert_eq!(engine.rule_count(), 1);

        let mut tx = engine.open_transaction();
        tx.process_uri("/", "TRACE", "HTTP/1.1").unwrap();
        match tx.process_request_headers() {
            PhaseResult::Interrupted(it) => assert_eq!(it.status(), 405),
            other => panic!("expected interruption, got {other:?}"),
        }
    }

    #[test]
    fn test_from_config_rejects_duplicate_of_builtin() {
        let yaml = r#"
rules:
  - id: 941100
    phase: request_headers
    targets: [args]
    pattern: "x"
"#;
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = InspectionConfig {
            builtin_signatures: true,
            directives: vec![file.path().to_string_lossy().into_owned()],
        };
        assert!(RuleEngine::from_config(&config).is_err());
    }

    #[test]
    fn test_transactions_are_independent() {
        let engine = RuleEngine::from_config(&InspectionConfig::default()).unwrap();
        let a = engine.open_transaction();
        let b = engine.open_transaction();
        assert_ne!(a.id(), b.id());
        assert!(Uuid::parse_str(a.id()).is_ok());
    }
}
