use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use rand::Rng;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum AuthorizeError {
    #[error("authorization callback I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("login timed out after {0:?}")]
    TimedOut(Duration),
    #[error("OAuth state mismatch, possible CSRF attack")]
    StateMismatch,
    #[error("identity provider refused authorization: {0}")]
    Denied(String),
    #[error("no 'code' parameter in callback")]
    MissingCode,
    #[error("invalid callback request: {0}")]
    InvalidCallback(String),
}

/// External authorization-code flow. Whatever it does, it ends with a code
/// the Scribo auth service can exchange for a session.
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    async fn authorize(&self) -> Result<String, AuthorizeError>;
}

/// Browser-based flow with a one-shot callback listener on 127.0.0.1.
#[derive(Debug, Clone)]
pub struct LoopbackFlow {
    authorize_url: String,
    client_id: String,
    scope: String,
    timeout: Duration,
    open_browser: bool,
}

impl LoopbackFlow {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            authorize_url: GOOGLE_AUTHORIZE_URL.to_string(),
            client_id: client_id.into(),
            scope: "openid email profile".to_string(),
            timeout: DEFAULT_LOGIN_TIMEOUT,
            open_browser: true,
        }
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Only print the URL instead of launching a browser.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<url::Url, AuthorizeError> {
        let mut url = url::Url::parse(&self.authorize_url)
            .map_err(|e| AuthorizeError::InvalidCallback(format!("authorize URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.scope)
            .append_pair("state", state);
        Ok(url)
    }
}

#[async_trait]
impl AuthorizationFlow for LoopbackFlow {
    async fn authorize(&self) -> Result<String, AuthorizeError> {
        let state = random_state();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{port}/callback");
        let url = self.authorize_url(&redirect_uri, &state)?;

        eprintln!("Opening browser for authentication...");
        eprintln!("If the browser doesn't open, visit: {url}");
        if self.open_browser {
            if let Err(e) = open::that(url.as_str()) {
                tracing::debug!(error = %e, "Could not launch browser");
            }
        }

        let callback = tokio::time::timeout(self.timeout, wait_for_callback(listener))
            .await
            .map_err(|_| AuthorizeError::TimedOut(self.timeout))??;

        if callback.state.as_deref() != Some(state.as_str()) {
            return Err(AuthorizeError::StateMismatch);
        }
        Ok(callback.code)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Callback {
    code: String,
    state: Option<String>,
}

async fn wait_for_callback(listener: TcpListener) -> Result<Callback, AuthorizeError> {
    let (mut stream, _) = listener.accept().await?;
    let mut buf = vec![0u8; 4096];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let parsed = parse_callback(&request);

    let page = match &parsed {
        Ok(_) => "<h1>Authenticated!</h1><p>You can close this tab.</p>",
        Err(_) => "<h1>Login failed</h1><p>Return to the terminal for details.</p>",
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body>{page}</body></html>"
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;

    parsed
}

/// Parse `GET /callback?code=...&state=... HTTP/1.1`.
fn parse_callback(request: &str) -> Result<Callback, AuthorizeError> {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("");

    let url = url::Url::parse(&format!("http://localhost{path}"))
        .map_err(|e| AuthorizeError::InvalidCallback(e.to_string()))?;

    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    if let Some(error) = param("error") {
        return Err(AuthorizeError::Denied(error));
    }
    let code = param("code")
        .filter(|c| !c.is_empty())
        .ok_or(AuthorizeError::MissingCode)?;
    Ok(Callback {
        code,
        state: param("state"),
    })
}

fn random_state() -> String {
    let bytes: Vec<u8> = (0..32).map(|_| rand::thread_rng().r#gen::<u8>()).collect();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes)
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpStream;

    use super::*;

    #[test]
    fn parses_code_and_state() {
        let cb = parse_callback("GET /callback?code=4%2Fabc&state=xyz HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();
        assert_eq!(
            cb,
            Callback {
                code: "4/abc".into(),
                state: Some("xyz".into())
            }
        );
    }

    #[test]
    fn provider_error_is_denied() {
        let err = parse_callback("GET /callback?error=access_denied HTTP/1.1").unwrap_err();
        assert!(matches!(err, AuthorizeError::Denied(e) if e == "access_denied"));
    }

    #[test]
    fn missing_code_is_rejected() {
        assert!(matches!(
            parse_callback("GET /callback?state=s HTTP/1.1"),
            Err(AuthorizeError::MissingCode)
        ));
    }

    #[test]
    fn authorize_url_carries_parameters() {
        let flow = LoopbackFlow::new("client-1").with_authorize_url("https://idp.example/auth");
        let url = flow
            .authorize_url("http://127.0.0.1:5000/callback", "st")
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".into(), "client-1".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("state".into(), "st".into())));
        assert!(pairs.contains(&("redirect_uri".into(), "http://127.0.0.1:5000/callback".into())));
    }

    #[test]
    fn states_are_unique() {
        assert_ne!(random_state(), random_state());
        assert_eq!(random_state().len(), 43);
    }

    #[tokio::test]
    async fn callback_listener_returns_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /callback?code=c0de&state=s1 HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n")
                .await
                .unwrap();
            let mut page = String::new();
            stream.read_to_string(&mut page).await.unwrap();
            page
        });

        let cb = wait_for_callback(listener).await.unwrap();
        assert_eq!(cb.code, "c0de");
        assert_eq!(cb.state.as_deref(), Some("s1"));
        assert!(browser.await.unwrap().contains("Authenticated!"));
    }
}
