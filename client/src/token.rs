use std::path::PathBuf;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cookie::Cookie;
use cookie::time::{Duration, OffsetDateTime};
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::{Deserialize, Serialize};

use crate::cache::write_private;

/// Name of the session cookie issued by `POST /login`.
pub const AUTH_COOKIE: &str = "auth_token";

/// Presence-only evidence that a remote session may exist.
///
/// The value behind it is opaque: it is never parsed, only forwarded. Its
/// presence means "possibly authenticated", nothing more.
pub trait TokenSignal: Send + Sync {
    fn is_present(&self) -> bool;
    /// The raw value, for handing to a call that must target this session.
    fn current(&self) -> Option<String>;
    /// Forget the token locally, but only if it still is `expected`.
    /// Returns whether it was cleared. Does not talk to the server.
    fn clear_if(&self, expected: &str) -> bool;
}

/// `auth_token=<value>`, as sent in a `Cookie` header.
pub fn cookie_pair(value: &str) -> String {
    format!("{AUTH_COOKIE}={value}")
}

#[derive(Serialize, Deserialize)]
struct StoredToken {
    auth_token: String,
}

/// Holder of the `auth_token` session cookie.
///
/// Captured from `Set-Cookie` on login and replayed as `Cookie` on every
/// request. When built with [`SessionToken::persisted`] the value survives
/// process restarts, which the CLI relies on.
#[derive(Debug, Default)]
pub struct SessionToken {
    value: RwLock<Option<String>>,
    path: Option<PathBuf>,
}

impl SessionToken {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Token backed by `path`; an unreadable or missing file means no token.
    pub fn persisted(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let value = std::fs::read_to_string(&path)
            .ok()
            .and_then(|data| serde_json::from_str::<StoredToken>(&data).ok())
            .map(|stored| stored.auth_token)
            .filter(|v| !v.is_empty());
        Self {
            value: RwLock::new(value),
            path: Some(path),
        }
    }

    /// `Cookie` header value to attach, if a token is held.
    pub fn cookie_header(&self) -> Option<String> {
        self.read().as_deref().map(cookie_pair)
    }

    /// Adopt the session cookie from a response, if it sets one.
    ///
    /// An empty value or `Max-Age=0` is the server expiring the cookie and
    /// clears the token.
    pub fn absorb(&self, headers: &HeaderMap) {
        for header in headers.get_all(SET_COOKIE) {
            let Ok(raw) = header.to_str() else {
                continue;
            };
            if let Some(update) = parse_set_cookie(raw) {
                self.set(update);
            }
        }
    }

    pub fn set(&self, value: Option<String>) {
        let mut held = self.write();
        self.persist(value.as_deref());
        *held = value;
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<String>> {
        self.value.read().unwrap_or_else(PoisonError::into_inner)
    }

    // held across `persist` so the file never disagrees with memory
    fn write(&self) -> RwLockWriteGuard<'_, Option<String>> {
        self.value.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, value: Option<&str>) {
        let Some(path) = &self.path else {
            return;
        };
        let outcome = match value {
            Some(token) => serde_json::to_vec(&StoredToken {
                auth_token: token.to_string(),
            })
            .map_err(std::io::Error::other)
            .and_then(|data| write_private(path, &data)),
            None => match std::fs::remove_file(path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        };
        if let Err(e) = outcome {
            tracing::warn!(error = %e, path = %path.display(), "Failed to persist session token");
        }
    }
}

impl TokenSignal for SessionToken {
    fn is_present(&self) -> bool {
        self.read().is_some()
    }

    fn current(&self) -> Option<String> {
        self.read().clone()
    }

    fn clear_if(&self, expected: &str) -> bool {
        let mut held = self.write();
        if held.as_deref() != Some(expected) {
            return false;
        }
        self.persist(None);
        *held = None;
        true
    }
}

/// `Some(Some(v))` sets the token, `Some(None)` expires it, `None` means the
/// header is about some other cookie (or is not a cookie at all).
fn parse_set_cookie(raw: &str) -> Option<Option<String>> {
    let cookie = Cookie::parse(raw).ok()?;
    if cookie.name() != AUTH_COOKIE {
        return None;
    }
    let value = cookie.value_trimmed();
    let expired = cookie.max_age().is_some_and(|age| age <= Duration::ZERO)
        || cookie
            .expires_datetime()
            .is_some_and(|at| at <= OffsetDateTime::now_utc());
    if value.is_empty() || expired {
        Some(None)
    } else {
        Some(Some(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;
    use crate::cache::tests::scratch_dir;

    fn headers(values: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for v in values {
            map.append(SET_COOKIE, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn parses_auth_cookie() {
        assert_eq!(
            parse_set_cookie("auth_token=abc.def; Path=/; HttpOnly"),
            Some(Some("abc.def".to_string()))
        );
        assert_eq!(parse_set_cookie("theme=dark; Path=/"), None);
    }

    #[test]
    fn expired_cookie_clears() {
        assert_eq!(parse_set_cookie("auth_token=; Max-Age=0"), Some(None));
        assert_eq!(parse_set_cookie("auth_token=x; max-age=0; Path=/"), Some(None));
        assert_eq!(parse_set_cookie("auth_token=x; Max-Age=-1"), Some(None));
    }

    #[test]
    fn past_expires_clears() {
        assert_eq!(
            parse_set_cookie("auth_token=deleted; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT"),
            Some(None)
        );
        assert_eq!(
            parse_set_cookie("auth_token=live; Path=/; Expires=Fri, 01 Jan 2100 00:00:00 GMT"),
            Some(Some("live".to_string()))
        );
    }

    #[test]
    fn quoted_value_is_unwrapped() {
        assert_eq!(
            parse_set_cookie("auth_token=\"q-1\"; HttpOnly"),
            Some(Some("q-1".to_string()))
        );
        assert_eq!(parse_set_cookie("not a cookie"), None);
    }

    #[test]
    fn clear_if_only_clears_matching_value() {
        let path = scratch_dir("token-cas").join("session.json");
        let token = SessionToken::persisted(&path);
        token.set(Some("new".into()));

        assert!(!token.clear_if("old"));
        assert_eq!(token.current().as_deref(), Some("new"));
        assert!(path.exists());

        assert!(token.clear_if("new"));
        assert!(!token.is_present());
        assert!(!path.exists());
    }

    #[test]
    fn absorb_ignores_unrelated_cookies() {
        let token = SessionToken::in_memory();
        token.absorb(&headers(&["theme=dark", "auth_token=t1; HttpOnly"]));
        assert!(token.is_present());
        assert_eq!(token.cookie_header().as_deref(), Some("auth_token=t1"));

        token.absorb(&headers(&["theme=light"]));
        assert!(token.is_present());

        token.absorb(&headers(&["auth_token=; Max-Age=0"]));
        assert!(!token.is_present());
    }

    #[test]
    fn persisted_token_survives_reload() {
        let path = scratch_dir("token").join("session.json");
        let token = SessionToken::persisted(&path);
        assert!(!token.is_present());

        token.set(Some("persist-me".into()));
        let reloaded = SessionToken::persisted(&path);
        assert_eq!(reloaded.cookie_header().as_deref(), Some("auth_token=persist-me"));

        reloaded.set(None);
        assert!(!path.exists());
        assert!(!SessionToken::persisted(&path).is_present());
    }
}
