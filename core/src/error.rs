use thiserror::Error;

/// Failure of a call against the remote Scribo API.
///
/// This is the only error the HTTP layer surfaces. Client errors, server
/// errors, transport failures and undecodable bodies all collapse into it;
/// the error body sent by the server is never parsed. The message is fixed
/// per call (see [`messages`]) so callers can show it as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    /// Fixed human-readable description of the call that failed
    pub message: &'static str,
    /// HTTP status when the server answered, `None` for transport failures
    pub status: Option<u16>,
}

impl RemoteError {
    /// Transport-level failure: no status was received.
    pub fn new(message: &'static str) -> Self {
        Self {
            message,
            status: None,
        }
    }

    pub fn with_status(message: &'static str, status: u16) -> Self {
        Self {
            message,
            status: Some(status),
        }
    }

    /// True when the server was never reached (or its answer never arrived).
    pub fn is_transport(&self) -> bool {
        self.status.is_none()
    }
}

/// Fixed messages used across the client, one per remote call
pub mod messages {
    pub const LOGIN: &str = "Failed to login";
    pub const GET_USER: &str = "Failed to get user data";
    pub const INVALIDATE_USER: &str = "Failed to invalidate user session";
    pub const LIST_DOCUMENTS: &str = "Failed to get documents";
    pub const READ_DOCUMENT: &str = "Failed to get document";
    pub const CREATE_DOCUMENT: &str = "Failed to create document";
    pub const UPDATE_DOCUMENT: &str = "Failed to update document";
    pub const DELETE_DOCUMENT: &str = "Failed to delete document";
    pub const LIST_SECTIONS: &str = "Failed to get sections";
    pub const READ_SECTION: &str = "Failed to get section";
    pub const CREATE_SECTION: &str = "Failed to create section";
    pub const UPDATE_SECTION: &str = "Failed to update section";
    pub const SAVE_SECTION: &str = "Failed to save section";
    pub const DELETE_SECTION: &str = "Failed to delete section";
    pub const GET_MESSAGES: &str = "Failed to get messages";
    pub const SEND_MESSAGE: &str = "Failed to send agent message";
    pub const CLIENT_SETUP: &str = "Failed to build HTTP client";
}

#[cfg(test)]
mod tests {
    use super::{RemoteError, messages};

    #[test]
    fn display_is_the_fixed_message() {
        let err = RemoteError::with_status(messages::SEND_MESSAGE, 502);
        assert_eq!(err.to_string(), "Failed to send agent message");
        assert!(!err.is_transport());
    }

    #[test]
    fn transport_failures_carry_no_status() {
        let err = RemoteError::new(messages::GET_USER);
        assert!(err.is_transport());
        assert_eq!(err.status, None);
    }
}
