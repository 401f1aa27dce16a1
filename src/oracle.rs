//! Client for the external expression-evaluation engine (the oracle).
//!
//! [`HttpOracle`] talks to the engine over synchronous HTTP via `ureq`. Calls
//! are strictly sequential with a fixed pause between them. The [`Oracle`]
//! trait is the seam the pipeline is written against, so tests can swap in an
//! in-process engine.

use std::time::{Duration, Instant};

use miette::Diagnostic;
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::OracleConfig;

/// Bound on nested string-encoded results unwrapped by [`normalize_result`].
const MAX_UNWRAP_DEPTH: usize = 16;

/// Maximum error-body preview kept in diagnostics.
const ERROR_PREVIEW_LEN: usize = 500;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Run-level oracle failures. These abort the pipeline.
#[derive(Debug, Error, Diagnostic)]
pub enum OracleError {
    #[error("evaluation engine unreachable at {url}: {message}")]
    #[diagnostic(
        code(driftmend::oracle::unreachable),
        help(
            "Start the evaluation service or point --oracle-url at it. \
             No record was modified."
        )
    )]
    Unreachable { url: String, message: String },

    #[error("evaluation engine health check at {url} returned HTTP {status}")]
    #[diagnostic(
        code(driftmend::oracle::unhealthy),
        help("The service is up but not ready. Check its logs before re-running.")
    )]
    Unhealthy { url: String, status: u16 },

    #[error("lost connection to the evaluation engine while checking {record}: {message}")]
    #[diagnostic(
        code(driftmend::oracle::connection_lost),
        help(
            "Patches applied before the failure are kept and listed in fix-summary.json. \
             Restore the service and re-run; every record is checked again."
        )
    )]
    ConnectionLost { record: String, message: String },
}

pub type OracleResult<T> = std::result::Result<T, OracleError>;

/// Per-record evaluation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("engine rejected the expression: {message}")]
    Engine { status: Option<u16>, message: String },

    #[error("evaluation timed out: {message}")]
    Timeout { message: String },

    #[error("malformed engine response: {message}")]
    Malformed { message: String },

    #[error("engine unreachable: {message}")]
    Unreachable { message: String },
}

impl EvaluationError {
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Engine { status, .. } => *status,
            _ => None,
        }
    }

    /// Connectivity loss ends the whole run rather than one record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

// ---------------------------------------------------------------------------
// Oracle trait
// ---------------------------------------------------------------------------

/// The evaluation engine as seen by the pipeline.
pub trait Oracle {
    /// Check the engine once before a run.
    fn health(&mut self) -> OracleResult<()>;

    /// Evaluate `expression` against `data`, returning the normalized result.
    fn evaluate(&mut self, expression: &str, data: &Value) -> Result<Value, EvaluationError>;
}

/// Unwrap string-encoded `{"result": ...}` envelopes.
///
/// The engine sometimes double-encodes its answer. Unwrapping repeats until
/// the value no longer changes, so normalizing twice equals normalizing once.
pub fn normalize_result(raw: Value) -> Value {
    let mut current = raw;
    for _ in 0..MAX_UNWRAP_DEPTH {
        let Value::String(text) = &current else {
            break;
        };
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(mut map)) => match map.shift_remove("result") {
                Some(inner) => current = inner,
                None => break,
            },
            _ => break,
        }
    }
    current
}

/// Interpret a decoded success-status response body.
pub fn interpret_response(body: Value, status: u16) -> Result<Value, EvaluationError> {
    let Value::Object(mut map) = body else {
        return Err(EvaluationError::Malformed {
            message: "response body is not a JSON object".into(),
        });
    };
    if let Some(error) = map.get("error").filter(|e| !e.is_null()) {
        return Err(EvaluationError::Engine {
            status: Some(status),
            message: error
                .as_str()
                .map_or_else(|| error.to_string(), str::to_string),
        });
    }
    // An absent result is the engine's way of saying "undefined".
    Ok(normalize_result(map.shift_remove("result").unwrap_or(Value::Null)))
}

fn preview(body: &str) -> String {
    match body.char_indices().nth(ERROR_PREVIEW_LEN) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

/// Extract the `error` message from a failure body, or preview the raw text.
fn failure_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str().map(str::to_string)))
        .unwrap_or_else(|| preview(body))
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Sequential, throttled HTTP client for the evaluation engine.
pub struct HttpOracle {
    agent: ureq::Agent,
    base_url: String,
    delay: Duration,
    last_call: Option<Instant>,
}

impl std::fmt::Debug for HttpOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOracle")
            .field("base_url", &self.base_url)
            .field("delay", &self.delay)
            .finish()
    }
}

impl HttpOracle {
    pub fn new(config: &OracleConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout()).build();
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            delay: config.delay(),
            last_call: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn throttle(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
        self.last_call = Some(Instant::now());
    }

    fn transport_error(transport: &ureq::Transport) -> EvaluationError {
        let io_kind = std::error::Error::source(transport)
            .and_then(|source| source.downcast_ref::<std::io::Error>())
            .map(std::io::Error::kind);
        classify_transport(transport.kind(), io_kind, transport.to_string())
    }
}

/// Map a transport failure onto an [`EvaluationError`].
///
/// Anything that fails while connecting, a connect timeout included, means
/// the engine is gone and ends the run. A timeout on an established
/// connection only costs the record being evaluated.
fn classify_transport(
    kind: ureq::ErrorKind,
    io_kind: Option<std::io::ErrorKind>,
    message: String,
) -> EvaluationError {
    use std::io::ErrorKind as Io;

    match (kind, io_kind) {
        (ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed, _) => {
            EvaluationError::Unreachable { message }
        }
        (_, Some(Io::TimedOut | Io::WouldBlock)) => EvaluationError::Timeout { message },
        _ => EvaluationError::Engine {
            status: None,
            message,
        },
    }
}

impl Oracle for HttpOracle {
    fn health(&mut self) -> OracleResult<()> {
        let url = format!("{}/health", self.base_url);
        match self.agent.get(&url).call() {
            Ok(_) => {
                tracing::debug!(%url, "evaluation engine healthy");
                Ok(())
            }
            Err(ureq::Error::Status(status, _)) => Err(OracleError::Unhealthy { url, status }),
            Err(ureq::Error::Transport(transport)) => Err(OracleError::Unreachable {
                url,
                message: transport.to_string(),
            }),
        }
    }

    fn evaluate(&mut self, expression: &str, data: &Value) -> Result<Value, EvaluationError> {
        self.throttle();
        let url = format!("{}/evaluate", self.base_url);
        let request = json!({ "expression": expression, "data": data });

        match self.agent.post(&url).send_json(request) {
            Ok(response) => {
                let status = response.status();
                let body: Value =
                    response
                        .into_json()
                        .map_err(|e: std::io::Error| EvaluationError::Malformed {
                            message: e.to_string(),
                        })?;
                interpret_response(body, status)
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(EvaluationError::Engine {
                    status: Some(status),
                    message: failure_message(&body),
                })
            }
            Err(ureq::Error::Transport(transport)) => Err(Self::transport_error(&transport)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(normalize_result(json!(5)), json!(5));
        assert_eq!(normalize_result(json!("hello")), json!("hello"));
        assert_eq!(normalize_result(json!({"result": 1})), json!({"result": 1}));
    }

    #[test]
    fn string_encoded_envelope_is_unwrapped() {
        let raw = json!(r#"{"result": [1, 2]}"#);
        assert_eq!(normalize_result(raw), json!([1, 2]));
    }

    #[test]
    fn doubly_encoded_envelope_is_unwrapped_fully() {
        let inner = json!({"result": "x"}).to_string();
        let outer = json!({ "result": inner }).to_string();
        assert_eq!(normalize_result(Value::String(outer)), json!("x"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            json!(r#"{"result": "{\"result\": 3}"}"#),
            json!("{\"other\": 1}"),
            json!("not json"),
            json!(null),
            json!({"a": [1, "b"]}),
        ];
        for raw in samples {
            let once = normalize_result(raw);
            assert_eq!(normalize_result(once.clone()), once);
        }
    }

    #[test]
    fn error_field_becomes_engine_error() {
        let err = interpret_response(json!({"error": "syntax error"}), 200).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::Engine {
                status: Some(200),
                message: "syntax error".into()
            }
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn missing_result_is_null() {
        assert_eq!(interpret_response(json!({}), 200).unwrap(), Value::Null);
        assert!(interpret_response(json!([1]), 200).is_err());
    }

    #[test]
    fn failure_body_message_is_extracted() {
        assert_eq!(failure_message(r#"{"error":"bad"}"#), "bad");
        assert_eq!(failure_message("plain text"), "plain text");
        assert!(failure_message(&"x".repeat(2000)).ends_with("..."));
    }

    #[test]
    fn transport_failures_split_into_fatal_and_per_record() {
        use std::io::ErrorKind as Io;

        let connect_timeout =
            classify_transport(ureq::ErrorKind::ConnectionFailed, Some(Io::TimedOut), "t".into());
        assert!(connect_timeout.is_fatal());
        assert!(classify_transport(ureq::ErrorKind::Dns, None, "dns".into()).is_fatal());

        let read_timeout = classify_transport(ureq::ErrorKind::Io, Some(Io::TimedOut), "t".into());
        assert_eq!(read_timeout, EvaluationError::Timeout { message: "t".into() });
        let would_block = classify_transport(ureq::ErrorKind::Io, Some(Io::WouldBlock), "w".into());
        assert!(matches!(would_block, EvaluationError::Timeout { .. }));

        let reset = classify_transport(ureq::ErrorKind::Io, Some(Io::ConnectionReset), "r".into());
        assert!(matches!(reset, EvaluationError::Engine { status: None, .. }));
        assert!(!reset.is_fatal());
    }

    #[test]
    fn unreachable_engine_fails_health_check() {
        // Port 9 (discard) on localhost is closed in test environments.
        let mut oracle = HttpOracle::new(&OracleConfig {
            base_url: "http://127.0.0.1:9/".into(),
            timeout_secs: 2,
            delay_ms: 0,
        });
        assert_eq!(oracle.base_url(), "http://127.0.0.1:9");
        let err = oracle.health().unwrap_err();
        assert!(matches!(err, OracleError::Unreachable { .. }));
    }
}
