//! What brokerbench prints when a command finishes
//!
//! Results go to stdout: the run summary table, the generate line or the
//! effective TOML. With `--json` they are wrapped in a versioned envelope so a
//! script can tell a finished run from a failed one. Failures always go to
//! stderr, together with the hints from `BenchError::suggestions`.

use libbrokerbench_core::BenchError;
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::Cli;

const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    schema_version: u32,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

/// `code` is the stable `BenchError::error_code`, `details` carries the hints
#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    details: Value,
}

impl From<&BenchError> for ErrorBody {
    fn from(err: &BenchError) -> Self {
        let suggestions = err.suggestions();
        Self {
            code: err.error_code(),
            message: err.to_string(),
            details: if suggestions.is_empty() {
                Value::Null
            } else {
                json!({ "suggestions": suggestions })
            },
        }
    }
}

fn render_json<T: Serialize>(envelope: &Envelope<T>) -> String {
    serde_json::to_string_pretty(envelope)
        .unwrap_or_else(|e| json!({ "ok": false, "error": { "message": e.to_string() } }).to_string())
}

/// Print a command's result. `--json` emits `data` in the envelope; otherwise
/// the pre-rendered `human` text is printed unless `--quiet` is set.
pub fn output_success<T: Serialize>(cli: &Cli, data: T, human: &str) {
    if cli.json {
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            ok: true,
            data: Some(data),
            error: None,
        };
        println!("{}", render_json(&envelope));
    } else if !cli.quiet {
        println!("{}", human);
    }
}

/// Print a failed command to stderr. `--quiet` does not silence this.
pub fn output_error(cli: &Cli, err: &BenchError) {
    if cli.json {
        let envelope: Envelope<()> = Envelope {
            schema_version: SCHEMA_VERSION,
            ok: false,
            data: None,
            error: Some(ErrorBody::from(err)),
        };
        eprintln!("{}", render_json(&envelope));
    } else {
        eprintln!("{}", describe_error(err));
    }
}

fn describe_error(err: &BenchError) -> String {
    let mut text = format!("error: {}", err);
    let suggestions = err.suggestions();
    if !suggestions.is_empty() {
        text.push_str("\n\nSuggestions:");
        for suggestion in suggestions {
            text.push_str("\n  - ");
            text.push_str(suggestion);
        }
    }
    text
}
