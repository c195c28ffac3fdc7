//! Rule definitions and directive file loading.
use std::{collections::HashSet, fmt, path::Path};

use config::{Config, File};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::loader::format_for_path,
    ports::inspection::{Interruption, InterruptionAction},
};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RuleLoadError {
    #[error("failed to read directive source {source_name}: {reason}")]
    Source { source_name: String, reason: String },

    #[error("rule {id} has an invalid pattern: {reason}")]
    InvalidPattern { id: u32, reason: String },

    #[error("rule id {0} is defined more than once")]
    DuplicateId(u32),

    #[error("rule {id} is invalid: {reason}")]
    InvalidRule { id: u32, reason: String },
}

/// Processing phase a rule is evaluated in, in execution order
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RulePhase {
    RequestHeaders,
    RequestBody,
    ResponseHeaders,
    ResponseBody,
}

impl RulePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RulePhase::RequestHeaders => "request_headers",
            RulePhase::RequestBody => "request_body",
            RulePhase::ResponseHeaders => "response_headers",
            RulePhase::ResponseBody => "response_body",
        }
    }
}

impl fmt::Display for RulePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction variable a rule pattern is matched against
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    Args,
    ArgsNames,
    RequestUri,
    RequestMethod,
    RequestHeaders,
    RequestBody,
    ResponseHeaders,
    ResponseBody,
    RemoteAddr,
}

impl RuleTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleTarget::Args => "ARGS",
            RuleTarget::ArgsNames => "ARGS_NAMES",
            RuleTarget::RequestUri => "REQUEST_URI",
            RuleTarget::RequestMethod => "REQUEST_METHOD",
            RuleTarget::RequestHeaders => "REQUEST_HEADERS",
            RuleTarget::RequestBody => "REQUEST_BODY",
            RuleTarget::ResponseHeaders => "RESPONSE_HEADERS",
            RuleTarget::ResponseBody => "RESPONSE_BODY",
            RuleTarget::RemoteAddr => "REMOTE_ADDR",
        }
    }
}

/// What happens when a rule matches
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    #[default]
    Deny,
    Drop,
    Redirect,
    Block,
    /// Record the match and keep evaluating
    Pass,
}

fn default_status() -> u16 {
    403
}

/// A rule as written in a directive file
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RuleDefinition {
    pub id: u32,
    pub phase: RulePhase,
    pub targets: Vec<RuleTarget>,
    /// Regular expression (Rust `regex` syntax)
    pub pattern: String,
    #[serde(default)]
    pub action: RuleAction,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub msg: String,
    /// Location for `redirect` rules
    #[serde(default)]
    pub redirect_to: Option<String>,
}

/// Top-level layout of a directive file
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

/// A validated rule with its pattern compiled
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: u32,
    pub phase: RulePhase,
    pub targets: Vec<RuleTarget>,
    pub pattern: Regex,
    pub action: RuleAction,
    pub status: u16,
    pub msg: String,
    pub redirect_to: Option<String>,
}

impl Rule {
    pub fn compile(definition: RuleDefinition) -> Result<Self, RuleLoadError> {
        let id = definition.id;

        if definition.targets.is_empty() {
            return Err(RuleLoadError::InvalidRule {
                id,
                reason: "at least one target is required".to_string(),
            });
        }
        if !(200..=599).contains(&definition.status) {
            return Err(RuleLoadError::InvalidRule {
                id,
                reason: format!("status {} is not a final HTTP status", definition.status),
            });
        }
        if definition.action == RuleAction::Redirect && definition.redirect_to.is_none() {
            return Err(RuleLoadError::InvalidRule {
                id,
                reason: "redirect rules need redirect_to".to_string(),
            });
        }

        let pattern = Regex::new(&definition.pattern).map_err(|e| RuleLoadError::InvalidPattern {
            id,
            reason: e.to_string(),
        })?;

        Ok(Self {
            id,
            phase: definition.phase,
            targets: definition.targets,
            pattern,
            action: definition.action,
            status: definition.status,
            msg: definition.msg,
            redirect_to: definition.redirect_to,
        })
    }

    /// The interruption raised by this rule, or `None` for `pass` rules
    pub fn interruption(&self) -> Option<Interruption> {
        let action = match self.action {
            RuleAction::Deny => InterruptionAction::Deny,
            RuleAction::Drop => InterruptionAction::Drop,
            RuleAction::Block => InterruptionAction::Block,
            RuleAction::Redirect => InterruptionAction::Redirect,
            RuleAction::Pass => return None,
        };
        let data = match (&self.action, &self.redirect_to) {
            (RuleAction::Redirect, Some(location)) => location.clone(),
            _ => self.msg.clone(),
        };
        Some(Interruption::new(self.status, action, self.id, data))
    }
}

/// Ordered, compiled rule set shared by every transaction
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile definitions in order, rejecting duplicate ids
    pub fn compile(definitions: Vec<RuleDefinition>) -> Result<Self, RuleLoadError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(definitions.len());

        for definition in definitions {
            if !seen.insert(definition.id) {
                return Err(RuleLoadError::DuplicateId(definition.id));
            }
            rules.push(Rule::compile(definition)?);
        }

        Ok(Self { rules })
    }

    /// Rules of one phase, in load order
    pub fn for_phase(&self, phase: RulePhase) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |rule| rule.phase == phase)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Read one directive file (YAML, TOML or JSON by extension)
pub fn load_rule_file(path: &Path) -> Result<Vec<RuleDefinition>, RuleLoadError> {
    let source_name = path.display().to_string();
    let source_error = |reason: String| RuleLoadError::Source {
        source_name: source_name.clone(),
        reason,
    };

    let path_str = path
        .to_str()
        .ok_or_else(|| source_error("path is not valid UTF-8".to_string()))?;

    let file: RuleFile = Config::builder()
        .add_source(File::new(path_str, format_for_path(path)))
        .build()
        .and_then(|settings| settings.try_deserialize())
        .map_err(|e| source_error(e.to_string()))?;

    tracing::debug!(
        source = %source_name,
        rules = file.rules.len(),
        "Loaded directive file"
    );
    Ok(file.rules)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn definition(id: u32, pattern: &str) -> RuleDefinition {
        RuleDefinition {
            id,
            phase: RulePhase::RequestHeaders,
            targets: vec![RuleTarget::Args],
            pattern: pattern.to_string(),
            action: RuleAction::Deny,
            status: 403,
            msg: "test rule".to_string(),
            redirect_to: None,
        }
    }

    #[test]
    fn test_load_yaml_rule_file() {
        let yaml = r#"
rules:
  - id: 100001
    phase: request_headers
    targets: [args, request_uri]
    pattern: "(?i)attack"
    msg: "Attack keyword"
  - id: 100002
    phase: response_body
    targets: [response_body]
    pattern: "secret"
    action: redirect
    status: 302
    redirect_to: "https://example.com/denied"
"#;
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let rules = load_rule_file(file.path()).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].action, RuleAction::Deny);
        assert_eq!(rules[0].status, 403);
        assert_eq!(rules[0].targets, vec![RuleTarget::Args, RuleTarget::RequestUri]);
        assert_eq!(rules[1].phase, RulePhase::ResponseBody);
        assert_eq!(rules[1].action, RuleAction::Redirect);
    }

    #[test]
    fn test_load_toml_rule_file() {
        let toml = r#"
[[rules]]
id = 200001
phase = "request_body"
targets = ["request_body"]
pattern = "DROP TABLE"
action = "drop"
"#;
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        file.write_all(toml.as_bytes()).unwrap();

        let rules = load_rule_file(file.path()).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].action, RuleAction::Drop);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_rule_file(Path::new("/nonexistent/warden/rules.yaml"));
        assert!(matches!(result, Err(RuleLoadError::Source { .. })));
    }

    #[test]
    fn test_compile_rejects_bad_pattern() {
        let result = Rule::compile(definition(1, "(unclosed"));
        assert!(matches!(result, Err(RuleLoadError::InvalidPattern { id: 1, .. })));
    }

    #[test]
    fn test_compile_rejects_redirect_without_target() {
        let mut def = definition(2, "x");
        def.action = RuleAction::Redirect;
        assert!(Rule::compile(def).is_err());
    }

    #[test]
    fn test_compile_rejects_non_final_status() {
        for status in [0, 101, 199, 600, 999] {
            let mut def = definition(3, "x");
            def.status = status;
            assert!(
                matches!(Rule::compile(def), Err(RuleLoadError::InvalidRule { id: 3, .. })),
                "status {status} accepted"
            );
        }

        let mut def = definition(4, "x");
        def.status = 451;
        assert!(Rule::compile(def).is_ok());
    }

    #[test]
    fn test_rule_set_rejects_duplicate_ids() {
        let result = RuleSet::compile(vec![definition(7, "a"), definition(7, "b")]);
        assert!(matches!(result, Err(RuleLoadError::DuplicateId(7))));
    }

    #[test]
    fn test_pass_rule_has_no_interruption() {
        let mut def = definition(3, "x");
        def.action = RuleAction::Pass;
        assert!(Rule::compile(def).unwrap().interruption().is_none());
    }

    #[test]
    fn test_rule_set_phase_order() {
        let mut body_rule = definition(11, "b");
        body_rule.phase = RulePhase::RequestBody;
        let set = RuleSet::compile(vec![definition(10, "a"), body_rule, definition(12, "c")])
            .unwrap();

        let ids: Vec<u32> = set.for_phase(RulePhase::RequestHeaders).map(|r| r.id).collect();
        assert_eq!(ids, vec![10, 12]);
        assert_eq!(set.len(), 3);
    }
}
