//! Bundled signature set.
//!
//! Ids follow the usual core rule set numbering: 930xxx path traversal,
//! 932xxx command injection, 941xxx XSS, 942xxx SQL injection. Header-phase
//! signatures look at the request line and query arguments; body-phase
//! signatures look at the buffered request body.
use super::rules::{RuleAction, RuleDefinition, RulePhase, RuleTarget};

use RulePhase::{RequestBody, RequestHeaders};
use RuleTarget::{Args, ArgsNames, RequestUri};

struct Signature {
    id: u32,
    phase: RulePhase,
    targets: &'static [RuleTarget],
    pattern: &'static str,
    msg: &'static str,
}

const QUERY: &[RuleTarget] = &[Args, ArgsNames];
const PATH_AND_QUERY: &[RuleTarget] = &[RequestUri, Args];
const BODY: &[RuleTarget] = &[RuleTarget::RequestBody];

static SIGNATURES: &[Signature] = &[
    // Path traversal
    Signature {
        id: 930100,
        phase: RequestHeaders,
        targets: PATH_AND_QUERY,
        pattern: r"(?i)(\.\./|\.\.\\|\.\.%2f|\.\.%5c|%2e%2e(/|\\|%2f|%5c)|%252e%252e|%c0%ae%c0%ae)",
        msg: "Path Traversal Attack (/../)",
    },
    Signature {
        id: 930110,
        phase: RequestHeaders,
        targets: PATH_AND_QUERY,
        pattern: r"(%00|\\x00)",
        msg: "Null byte in request",
    },
    Signature {
        id: 930120,
        phase: RequestHeaders,
        targets: PATH_AND_QUERY,
        pattern: r"(?i)(/etc/(passwd|shadow|group)|\.htaccess|\.htpasswd|\.bash_history|id_[rd]sa|web\.config|win\.ini|boot\.ini|\\windows\\system32)",
        msg: "OS File Access Attempt",
    },
    // Command injection
    Signature {
        id: 932100,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r"(?i)(;|\|\|?|&&|\$\(|`)\s*(cat|ls|id|whoami|uname|wget|curl|nc|ncat|netcat|bash|sh|zsh|rm|chmod|chown|sudo|kill|ping|python|perl|ruby|php)\b",
        msg: "Remote Command Execution: Unix Command Injection",
    },
    Signature {
        id: 932110,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r"(?i)(/bin/(sh|bash|zsh|ksh|csh|dash)|/usr/bin/(python|perl|ruby|php)|cmd\.exe|powershell)",
        msg: "Remote Command Execution: Shell Invocation",
    },
    Signature {
        id: 932120,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r"(\$\{\s*\w|\$(PATH|HOME|USER|SHELL)\b|(?i)%(systemroot|comspec)%)",
        msg: "Remote Command Execution: Environment Access",
    },
    Signature {
        id: 932200,
        phase: RequestBody,
        targets: BODY,
        pattern: r"(?i)((;|\|\||&&|\$\()\s*(cat|whoami|uname|wget|curl|nc|bash|sh|rm)\b|/bin/(sh|bash)|cmd\.exe)",
        msg: "Remote Command Execution in request body",
    },
    // XSS
    Signature {
        id: 941100,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r"(?i)(<script[^>]*>|</script>)",
        msg: "XSS Attack Detected via script tag",
    },
    Signature {
        id: 941110,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r"(?i)<[a-z]+[^>]*\bon\w+\s*=",
        msg: "XSS Filter: Event Handler Attribute",
    },
    Signature {
        id: 941120,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r"(?i)(javascript:\s*\w|data:text/html)",
        msg: "XSS Filter: Script URI",
    },
    Signature {
        id: 941130,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r"(?i)<(iframe|object|embed)[^>]*>",
        msg: "XSS Filter: Embedded Content Tag",
    },
    Signature {
        id: 941140,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r"(?i)\b(eval|alert|expression)\s*\(",
        msg: "XSS Filter: JavaScript Function Call",
    },
    Signature {
        id: 941200,
        phase: RequestBody,
        targets: BODY,
        pattern: r"(?i)(<script[^>]*>|javascript:\s*\w|<(iframe|object|embed)[^>]*>|<[a-z]+[^>]*\bon\w+\s*=)",
        msg: "XSS Attack Detected in request body",
    },
    // SQL injection
    Signature {
        id: 942100,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r"(?i)\bunion\b.*\bselect\b",
        msg: "SQL Injection Attack: UNION SELECT",
    },
    Signature {
        id: 942110,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r#"(?i)(\b(or|and)\b\s+\d+\s*=\s*\d+|'\s*(or|and)\s*'|\bor\b\s+["']\w+["']\s*=\s*["']\w+["'])"#,
        msg: "SQL Injection Attack: Tautology",
    },
    Signature {
        id: 942120,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r"(?i)(;\s*\b(drop|delete|update|insert)\b|\bdrop\b\s+\b(table|database)\b)",
        msg: "SQL Injection Attack: Stacked Query",
    },
    Signature {
        id: 942130,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r"('--|;\s*--)",
        msg: "SQL Injection Attack: Comment Sequence",
    },
    Signature {
        id: 942140,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r"(?i)\b(benchmark|sleep|waitfor\s+delay)\s*\(",
        msg: "SQL Injection Attack: Time-Based Blind",
    },
    Signature {
        id: 942150,
        phase: RequestHeaders,
        targets: QUERY,
        pattern: r"(?i)(\b(exec|execute)\s*\(|\b(xp|sp)_\w+)",
        msg: "SQL Injection Attack: Stored Procedure",
    },
    Signature {
        id: 942200,
        phase: RequestBody,
        targets: BODY,
        pattern: r#"(?i)(\bunion\b.*\bselect\b|'\s*(or|and)\s*'|;\s*\b(drop|delete)\b|\b(benchmark|sleep)\s*\()"#,
        msg: "SQL Injection Attack in request body",
    },
];

/// Definitions for the bundled signatures, all denying with 403
pub fn builtin_rules() -> Vec<RuleDefinition> {
    SIGNATURES
        .iter()
        .map(|sig| RuleDefinition {
            id: sig.id,
            phase: sig.phase,
            targets: sig.targets.to_vec(),
            pattern: sig.pattern.to_string(),
            action: RuleAction::Deny,
            status: 403,
            msg: sig.msg.to_string(),
            redirect_to: None,
        })
        .collect()
}
