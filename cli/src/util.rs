use std::collections::BTreeMap;
use std::sync::Arc;

use scribo_client::config::{session_token_path, user_cache_path};
use scribo_client::{ClientConfig, FileUserCache, ScriboClient, SessionController, SessionPhase, SessionToken};
use scribo_core::error::RemoteError;
use scribo_core::models::User;
use serde::Serialize;
use serde_json::json;

/// Everything a command needs: the HTTP client plus a session controller
/// backed by the on-disk user cache and session token.
pub struct Context {
    pub client: Arc<ScriboClient>,
    pub session: SessionController,
}

impl Context {
    pub fn new(config: &ClientConfig) -> Result<Self, RemoteError> {
        let token = Arc::new(SessionToken::persisted(session_token_path()));
        let client = Arc::new(ScriboClient::new(config, token.clone())?);
        let cache = Arc::new(FileUserCache::new(user_cache_path()));
        let session = SessionController::new(client.clone(), cache, token);
        Ok(Self { client, session })
    }

    /// Resolve the session and insist on a server-confirmed user.
    pub async fn require_user(&self) -> Result<User, i32> {
        let state = self.session.bootstrap().await;
        self.session.settle().await;
        match state.user {
            Some(user) if state.phase == SessionPhase::Verified => Ok(user),
            _ => Err(print_error(
                1,
                "auth_error",
                "Not signed in",
                Some("Run `scribo login` first."),
            )),
        }
    }
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    std::process::exit(print_error(1, "cli_error", message, docs_hint));
}

pub fn exit_usage(message: &str, docs_hint: Option<&str>) -> ! {
    std::process::exit(print_error(4, "usage_error", message, docs_hint));
}

/// Print a structured error to stderr and hand back the exit code.
pub fn print_error(code: i32, kind: &str, message: &str, docs_hint: Option<&str>) -> i32 {
    let mut err = json!({
        "error": kind,
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| err.to_string())
    );
    code
}

/// Map a remote failure to a structured error and exit code.
///
/// Exit codes: 1=client error (4xx), 2=server error (5xx or bad body),
///             3=connection error
pub fn remote_failure(err: &RemoteError) -> i32 {
    let (code, body) = failure_body(err);
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string())
    );
    code
}

fn failure_body(err: &RemoteError) -> (i32, serde_json::Value) {
    match err.status {
        None => (
            3,
            json!({
                "error": "connection_error",
                "message": err.message,
                "docs_hint": "Is the Scribo API running? Check SCRIBO_API_URL."
            }),
        ),
        Some(status @ (401 | 403)) => (
            1,
            json!({
                "error": "api_error",
                "status": status,
                "message": err.message,
                "docs_hint": "Run `scribo login` to start a new session."
            }),
        ),
        Some(status) => (
            if (400..500).contains(&status) { 1 } else { 2 },
            json!({
                "error": "api_error",
                "status": status,
                "message": err.message
            }),
        ),
    }
}

/// Pretty-print `value` to stdout. Returns the exit code.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(out) => {
            println!("{out}");
            0
        }
        Err(e) => print_error(1, "cli_error", &format!("Failed to encode output: {e}"), None),
    }
}

/// Print a successful result or report the failure.
pub fn report<T: Serialize>(result: Result<T, RemoteError>) -> i32 {
    match result {
        Ok(value) => print_json(&value),
        Err(e) => remote_failure(&e),
    }
}

/// Read text from a file (use '-' for stdin).
pub fn read_text(path: &str) -> Result<String, std::io::Error> {
    if path == "-" {
        std::io::read_to_string(std::io::stdin())
    } else {
        std::fs::read_to_string(path)
    }
}

/// Parse repeated `key=value` flags into section metadata.
pub fn parse_metadata(pairs: &[String]) -> Result<BTreeMap<String, String>, String> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(format!("Invalid metadata '{pair}', expected key=value")),
        })
        .collect()
}
