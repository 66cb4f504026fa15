use async_trait::async_trait;
use scribo_core::error::RemoteError;
use scribo_core::models::{AgentMessage, LoginProfile, SendMessageRequest, User};

use crate::http::ScriboClient;

/// The remote calls the session controller depends on.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Trade an authorization code for a session and the user's profile.
    async fn exchange_code(&self, code: &str) -> Result<LoginProfile, RemoteError>;
    /// Ask the server who the current session belongs to.
    async fn verify(&self) -> Result<User, RemoteError>;
    /// Tell the server to drop the session identified by `token`.
    async fn invalidate(&self, token: Option<&str>) -> Result<(), RemoteError>;
}

/// The remote calls the messaging controller depends on.
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn messages(
        &self,
        document_id: &str,
        section_id: &str,
    ) -> Result<Vec<AgentMessage>, RemoteError>;

    /// Deliver one user message and return the assistant's reply.
    async fn send_message(&self, request: &SendMessageRequest) -> Result<AgentMessage, RemoteError>;
}

#[async_trait]
impl AuthService for ScriboClient {
    async fn exchange_code(&self, code: &str) -> Result<LoginProfile, RemoteError> {
        self.login(code).await
    }

    async fn verify(&self) -> Result<User, RemoteError> {
        self.get_user().await
    }

    async fn invalidate(&self, token: Option<&str>) -> Result<(), RemoteError> {
        self.invalidate_user(token).await
    }
}

#[async_trait]
impl AgentService for ScriboClient {
    async fn messages(
        &self,
        document_id: &str,
        section_id: &str,
    ) -> Result<Vec<AgentMessage>, RemoteError> {
        self.get_messages(document_id, section_id).await
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<AgentMessage, RemoteError> {
        self.agent_message(request).await
    }
}
