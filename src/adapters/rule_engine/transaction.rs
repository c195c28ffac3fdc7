use std::{borrow::Cow, sync::Arc};

use serde::Serialize;
use tracing::{debug, info};

use super::rules::{Rule, RulePhase, RuleSet, RuleTarget};
use crate::ports::inspection::{
    ConnectionInfo, InspectionError, InspectionResult, InspectionTransaction, Interruption,
    PhaseResult,
};

/// Record of one rule that matched during the transaction
#[derive(Debug, Clone, Serialize)]
struct MatchedRule {
    id: u32,
    phase: RulePhase,
    target: String,
    msg: String,
}

/// Everything the transaction has been told so far
#[derive(Debug, Default)]
struct Variables {
    client: Option<ConnectionInfo>,
    uri: String,
    method: String,
    protocol: String,
    request_headers: Vec<(String, String)>,
    args: Vec<(String, String)>,
    request_body: Vec<u8>,
    response_status: u16,
    response_headers: Vec<(String, String)>,
    response_body: Vec<u8>,
}

impl Variables {
    /// Values of one target, labelled the way they are reported in the audit log
    fn collect(&self, target: RuleTarget) -> Vec<(String, Cow<'_, str>)> {
        let label = target.as_str();
        match target {
            RuleTarget::Args => self
                .args
                .iter()
                .map(|(name, value)| (format!("{label}:{name}"), Cow::from(value.as_str())))
                .collect(),
            RuleTarget::ArgsNames => self
                .args
                .iter()
                .map(|(name, _)| (label.to_string(), Cow::from(name.as_str())))
                .collect(),
            RuleTarget::RequestUri => with_decoded(label, &self.uri),
            RuleTarget::RequestMethod => {
                vec![(label.to_string(), Cow::from(self.method.as_str()))]
            }
            RuleTarget::RequestHeaders => headers(label, &self.request_headers),
            RuleTarget::RequestBody => {
                vec![(label.to_string(), String::from_utf8_lossy(&self.request_body))]
            }
            RuleTarget::ResponseHeaders => headers(label, &self.response_headers),
            RuleTarget::ResponseBody => {
                vec![(label.to_string(), String::from_utf8_lossy(&self.response_body))]
            }
            RuleTarget::RemoteAddr => self
                .client
                .iter()
                .map(|c| (label.to_string(), Cow::from(c.source_host.as_str())))
                .collect(),
        }
    }
}

fn headers<'a>(label: &str, headers: &'a [(String, String)]) -> Vec<(String, Cow<'a, str>)> {
    headers
        .iter()
        .map(|(name, value)| (format!("{label}:{name}"), Cow::from(value.as_str())))
        .collect()
}

/// The raw value, plus its percent-decoded form when that differs
fn with_decoded<'a>(label: &str, raw: &'a str) -> Vec<(String, Cow<'a, str>)> {
    let mut values = vec![(label.to_string(), Cow::from(raw))];
    if raw.contains('%')
        && let Ok(decoded) = urlencoding::decode(raw)
        && decoded != raw
    {
        values.push((label.to_string(), Cow::from(decoded.into_owned())));
    }
    values
}

/// Inspection transaction evaluating a shared [`RuleSet`]
pub struct RuleTransaction {
    id: String,
    rules: Arc<RuleSet>,
    vars: Variables,
    last_phase: Option<RulePhase>,
    interruption: Option<Interruption>,
    matched: Vec<MatchedRule>,
    logged: bool,
    closed: bool,
}

impl RuleTransaction {
    pub fn new(id: String, rules: Arc<RuleSet>) -> Self {
        Self {
            id,
            rules,
            vars: Variables::default(),
            last_phase: None,
            interruption: None,
            matched: Vec::new(),
            logged: false,
            closed: false,
        }
    }

    fn ensure_open(&self) -> InspectionResult<()> {
        if self.closed {
            Err(InspectionError::Closed(self.id.clone()))
        } else {
            Ok(())
        }
    }

    /// First target value the rule's pattern matches
    fn first_match(&self, rule: &Rule) -> Option<String> {
        rule.targets.iter().find_map(|target| {
            self.vars
                .collect(*target)
                .into_iter()
                .find(|(_, value)| rule.pattern.is_match(value))
                .map(|(label, _)| label)
        })
    }

    fn evaluate(&mut self, phase: RulePhase) -> PhaseResult {
        if let Err(e) = self.ensure_open() {
            return PhaseResult::EngineError(e);
        }
        if let Some(interruption) = &self.interruption {
            return PhaseResult::Interrupted(interruption.clone());
        }
        if let Some(last) = self.last_phase
            && phase <= last
        {
            return PhaseResult::EngineError(InspectionError::OutOfOrder {
                phase: phase.as_str(),
                reason: format!("{last} already ran"),
            });
        }
        self.last_phase = Some(phase);

        let rules = Arc::clone(&self.rules);
        for rule in rules.for_phase(phase) {
            let Some(target) = self.first_match(rule) else {
                continue;
            };

            debug!(
                transaction_id = %self.id,
                rule_id = rule.id,
                phase = %phase,
                target = %target,
                "Rule matched"
            );
            self.matched.push(MatchedRule {
                id: rule.id,
                phase,
                target,
                msg: rule.msg.clone(),
            });

            if let Some(interruption) = rule.interruption() {
                self.interruption = Some(interruption.clone());
                return PhaseResult::Interrupted(interruption);
            }
        }

        PhaseResult::Continue
    }
}

impl InspectionTransaction for RuleTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    fn process_connection(&mut self, connection: &ConnectionInfo) -> InspectionResult<()> {
        self.ensure_open()?;
        // the first connection seen is the client leg
        if self.vars.client.is_none() {
            self.vars.client = Some(connection.clone());
        }
        Ok(())
    }

    fn process_uri(&mut self, uri: &str, method: &str, protocol: &str) -> InspectionResult<()> {
        self.ensure_open()?;
        self.vars.uri = uri.to_string();
        self.vars.method = method.to_string();
        self.vars.protocol = protocol.to_string();
        Ok(())
    }

    fn add_request_header(&mut self, name: &str, value: &str) -> InspectionResult<()> {
        self.ensure_open()?;
        self.vars
            .request_headers
            .push((name.to_ascii_lowercase(), value.to_string()));
        Ok(())
    }

    fn add_query_argument(&mut self, name: &str, value: &str) -> InspectionResult<()> {
        self.ensure_open()?;
        self.vars.args.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn process_request_headers(&mut self) -> PhaseResult {
        self.evaluate(RulePhase::RequestHeaders)
    }

    fn write_request_body(&mut self, bytes: &[u8]) -> InspectionResult<()> {
        self.ensure_open()?;
        self.vars.request_body.extend_from_slice(bytes);
        Ok(())
    }

    fn process_request_body(&mut self) -> PhaseResult {
        self.evaluate(RulePhase::RequestBody)
    }

    fn add_response_header(&mut self, name: &str, value: &str) -> InspectionResult<()> {
        self.ensure_open()?;
        self.vars
            .response_headers
            .push((name.to_ascii_lowercase(), value.to_string()));
        Ok(())
    }

    fn process_response_headers(&mut self, status: u16, _protocol: &str) -> PhaseResult {
        self.vars.response_status = status;
        self.evaluate(RulePhase::ResponseHeaders)
    }

    fn write_response_body(&mut self, bytes: &[u8]) -> InspectionResult<()> {
        self.ensure_open()?;
        self.vars.response_body.extend_from_slice(bytes);
        Ok(())
    }

    fn process_response_body(&mut self) -> PhaseResult {
        self.evaluate(RulePhase::ResponseBody)
    }

    fn process_logging(&mut self) {
        if self.closed || self.logged {
            return;
        }
        self.logged = true;

        let matched = serde_json::to_string(&self.matched).unwrap_or_default();
        let client = self
            .vars
            .client
            .as_ref()
            .map(|c| format!("{}:{}", c.source_host, c.source_port))
            .unwrap_or_default();

        info!(
            target: "warden::audit",
            transaction_id = %self.id,
            client = %client,
            method = %self.vars.method,
            uri = %self.vars.uri,
            protocol = %self.vars.protocol,
            response_status = self.vars.response_status,
            interrupted = self.interruption.is_some(),
            rule_id = self.interruption.as_ref().map(|i| i.rule_id()),
            matched_rules = %matched,
            "Inspection audit"
        );
    }

    fn close(&mut self) -> InspectionResult<()> {
        self.ensure_open()?;
        self.closed = true;
        self.vars = Variables::default();
        Ok(())
    }
}
