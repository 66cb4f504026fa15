use std::sync::Arc;

use reqwest::header::COOKIE;
use reqwest::{Method, RequestBuilder, Url};
use scribo_core::error::{RemoteError, messages};
use scribo_core::models::{
    AgentMessage, DeleteAck, Document, DocumentEnvelope, DocumentsEnvelope, IdRequest,
    LoginProfile, MessageRequest, MessagesEnvelope, NewDocument, NewSection, ReplyEnvelope,
    Section, SectionEnvelope, SectionsEnvelope, SendMessageRequest, User,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::ClientConfig;
use crate::token::{SessionToken, cookie_pair};

/// Thin wrappers around every Scribo endpoint.
///
/// All of them share one error contract: a non-2xx status, a transport
/// failure or a body that does not decode becomes a [`RemoteError`] carrying
/// a fixed message for that call. Error bodies are never parsed.
#[derive(Debug, Clone)]
pub struct ScriboClient {
    http: reqwest::Client,
    api_url: String,
    auth_url: String,
    token: Arc<SessionToken>,
}

impl ScriboClient {
    pub fn new(config: &ClientConfig, token: Arc<SessionToken>) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to build HTTP client");
                RemoteError::new(messages::CLIENT_SETUP)
            })?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            auth_url: config.auth_url.clone(),
            token,
        })
    }

    pub fn token(&self) -> &Arc<SessionToken> {
        &self.token
    }

    // --- auth -------------------------------------------------------------

    /// `POST /login`. On success the session cookie from the response is
    /// adopted by the client's [`SessionToken`].
    pub async fn login(&self, code: &str) -> Result<LoginProfile, RemoteError> {
        let url = self.url(&self.auth_url, "/login", None, messages::LOGIN)?;
        let resp = self
            .dispatch(
                self.request(Method::POST, url).json(&json!({ "id_token": code })),
                messages::LOGIN,
            )
            .await?;
        self.token.absorb(resp.headers());
        decode(resp, messages::LOGIN).await
    }

    /// `GET /user/getUser`
    pub async fn get_user(&self) -> Result<User, RemoteError> {
        let url = self.url(&self.auth_url, "/user/getUser", None, messages::GET_USER)?;
        self.call(self.request(Method::GET, url), messages::GET_USER)
            .await
    }

    /// `POST /user/invalidateUser` for the session identified by `token`.
    ///
    /// The cookie is passed in rather than read from the client so a caller
    /// can end an old session after a new one was adopted. The response
    /// body, and any cookie it sets, is ignored.
    pub async fn invalidate_user(&self, token: Option<&str>) -> Result<(), RemoteError> {
        let url = self.url(
            &self.auth_url,
            "/user/invalidateUser",
            None,
            messages::INVALIDATE_USER,
        )?;
        let req = self.request_as(Method::POST, url, token.map(cookie_pair));
        self.dispatch(req, messages::INVALIDATE_USER).await?;
        Ok(())
    }

    // --- documents --------------------------------------------------------

    pub async fn list_documents(&self) -> Result<Vec<Document>, RemoteError> {
        let env: DocumentsEnvelope = self
            .api(Method::GET, "/api/documents/getAllDocuments", None::<&()>, messages::LIST_DOCUMENTS)
            .await?;
        Ok(env.documents)
    }

    pub async fn read_document(&self, id: &str) -> Result<Document, RemoteError> {
        let body = IdRequest { id: id.to_string() };
        let env: DocumentEnvelope = self
            .api(Method::POST, "/api/documents/readDocument", Some(&body), messages::READ_DOCUMENT)
            .await?;
        Ok(env.document)
    }

    pub async fn create_document(&self, document: &NewDocument) -> Result<Document, RemoteError> {
        let env: DocumentEnvelope = self
            .api(Method::POST, "/api/documents/createDocument", Some(document), messages::CREATE_DOCUMENT)
            .await?;
        Ok(env.document)
    }

    pub async fn update_document(&self, document: &Document) -> Result<Document, RemoteError> {
        let env: DocumentEnvelope = self
            .api(Method::PUT, "/api/documents/updateDocument", Some(document), messages::UPDATE_DOCUMENT)
            .await?;
        Ok(env.document)
    }

    pub async fn delete_document(&self, id: &str) -> Result<DeleteAck, RemoteError> {
        let url = self.url(
            &self.api_url,
            "/api/documents/deleteDocument",
            Some(id),
            messages::DELETE_DOCUMENT,
        )?;
        self.call(self.request(Method::DELETE, url), messages::DELETE_DOCUMENT)
            .await
    }

    // --- sections ---------------------------------------------------------

    pub async fn list_all_sections(&self) -> Result<Vec<Section>, RemoteError> {
        let env: SectionsEnvelope = self
            .api(Method::GET, "/api/sections/getAllSections", None::<&()>, messages::LIST_SECTIONS)
            .await?;
        Ok(env.sections)
    }

    pub async fn list_sections(&self, document_id: &str) -> Result<Vec<Section>, RemoteError> {
        let body = IdRequest {
            id: document_id.to_string(),
        };
        let env: SectionsEnvelope = self
            .api(
                Method::POST,
                "/api/sections/getSectionsForDocument",
                Some(&body),
                messages::LIST_SECTIONS,
            )
            .await?;
        Ok(env.sections)
    }

    pub async fn read_section(&self, id: &str) -> Result<Section, RemoteError> {
        let body = IdRequest { id: id.to_string() };
        let env: SectionEnvelope = self
            .api(Method::POST, "/api/sections/readSection", Some(&body), messages::READ_SECTION)
            .await?;
        Ok(env.section)
    }

    pub async fn create_section(&self, section: &NewSection) -> Result<Section, RemoteError> {
        let env: SectionEnvelope = self
            .api(Method::POST, "/api/sections/createSection", Some(section), messages::CREATE_SECTION)
            .await?;
        Ok(env.section)
    }

    pub async fn update_section(&self, section: &Section) -> Result<Section, RemoteError> {
        let env: SectionEnvelope = self
            .api(Method::PUT, "/api/sections/updateSection", Some(section), messages::UPDATE_SECTION)
            .await?;
        Ok(env.section)
    }

    /// Save through the agent service, which also refreshes its index of the
    /// section.
    pub async fn save_section(&self, section: &Section) -> Result<Section, RemoteError> {
        let env: SectionEnvelope = self
            .api(Method::POST, "/api/agent/saveSection", Some(section), messages::SAVE_SECTION)
            .await?;
        Ok(env.section)
    }

    pub async fn delete_section(&self, id: &str) -> Result<DeleteAck, RemoteError> {
        let url = self.url(
            &self.api_url,
            "/api/sections/deleteSection",
            Some(id),
            messages::DELETE_SECTION,
        )?;
        self.call(self.request(Method::DELETE, url), messages::DELETE_SECTION)
            .await
    }

    // --- agent ------------------------------------------------------------

    pub async fn get_messages(
        &self,
        document_id: &str,
        section_id: &str,
    ) -> Result<Vec<AgentMessage>, RemoteError> {
        let body = MessageRequest {
            document_id: document_id.to_string(),
            section_id: section_id.to_string(),
        };
        let env: MessagesEnvelope = self
            .api(Method::POST, "/api/agent/getMessagesById", Some(&body), messages::GET_MESSAGES)
            .await?;
        Ok(env.messages)
    }

    pub async fn agent_message(&self, request: &SendMessageRequest) -> Result<AgentMessage, RemoteError> {
        let env: ReplyEnvelope = self
            .api(Method::POST, "/api/agent/message", Some(request), messages::SEND_MESSAGE)
            .await?;
        Ok(env.response)
    }

    // --- plumbing ---------------------------------------------------------

    fn url(
        &self,
        base: &str,
        path: &str,
        segment: Option<&str>,
        message: &'static str,
    ) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&format!("{base}{path}")).map_err(|e| {
            tracing::warn!(error = %e, base, path, "Invalid endpoint URL");
            RemoteError::new(message)
        })?;
        if let Some(segment) = segment {
            url.path_segments_mut()
                .map_err(|()| RemoteError::new(message))?
                .push(segment);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.request_as(method, url, self.token.cookie_header())
    }

    fn request_as(&self, method: Method, url: Url, cookie: Option<String>) -> RequestBuilder {
        let req = self.http.request(method, url);
        match cookie {
            Some(cookie) => req.header(COOKIE, cookie),
            None => req,
        }
    }

    async fn api<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        message: &'static str,
    ) -> Result<T, RemoteError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(&self.api_url, path, None, message)?;
        let mut req = self.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        self.call(req, message).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        message: &'static str,
    ) -> Result<T, RemoteError> {
        let resp = self.dispatch(req, message).await?;
        decode(resp, message).await
    }

    async fn dispatch(
        &self,
        req: RequestBuilder,
        message: &'static str,
    ) -> Result<reqwest::Response, RemoteError> {
        let resp = req.send().await.map_err(|e| {
            tracing::debug!(error = %e, "{message}: transport failure");
            RemoteError::new(message)
        })?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "{message}: non-success status");
            return Err(RemoteError::with_status(message, status.as_u16()));
        }
        Ok(resp)
    }
}

async fn decode<T: DeserializeOwned>(
    resp: reqwest::Response,
    message: &'static str,
) -> Result<T, RemoteError> {
    let status = resp.status().as_u16();
    resp.json::<T>().await.map_err(|e| {
        tracing::debug!(error = %e, "{message}: undecodable response body");
        RemoteError::with_status(message, status)
    })
}
