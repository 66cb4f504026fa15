use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The signed-in user as the client knows it.
///
/// Only ever a cached projection of the remote identity: created on login,
/// overwritten by every successful verification, dropped on logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub picture: String,
}

/// Profile returned by `POST /login` after the authorization code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginProfile {
    pub google_id: String,
    pub email: String,
    pub name: String,
    pub picture: String,
}

impl From<LoginProfile> for User {
    fn from(profile: LoginProfile) -> Self {
        Self {
            id: profile.google_id,
            name: profile.name,
            email: profile.email,
            picture: profile.picture,
        }
    }
}

/// Author of an agent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry of a conversation with the writing assistant.
///
/// `thread_id` is opaque and assigned by the agent service. It is omitted
/// from the wire form when unknown, never sent as an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl AgentMessage {
    pub fn user(content: impl Into<String>, thread_id: Option<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            thread_id,
        }
    }

    pub fn assistant(content: impl Into<String>, thread_id: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            thread_id,
        }
    }
}

/// Body of `POST /api/agent/getMessagesById`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub document_id: String,
    pub section_id: String,
}

/// Body of `POST /api/agent/message`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub document_id: String,
    pub section_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// A document as stored by the remote service. The client only ever holds
/// read-through copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub length: i64,
    pub num_words: i64,
    pub num_sections: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a document (server assigns id and timestamps)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub user_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub length: i64,
    #[serde(default)]
    pub num_words: i64,
    #[serde(default)]
    pub num_sections: i64,
}

impl NewDocument {
    /// An empty document owned by `user_id`.
    pub fn new(user_id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            description: description.into(),
            length: 0,
            num_words: 0,
            num_sections: 0,
        }
    }
}

/// Free-form string metadata on a section. Keys are unique; order carries no
/// meaning, a `BTreeMap` just keeps serialization stable.
pub type SectionMetadata = BTreeMap<String, String>;

/// A section of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub document_id: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    /// `null` on the wire and entries with `null` values both decode as absent
    #[serde(default, deserialize_with = "metadata_lenient")]
    pub metadata: SectionMetadata,
    pub length: i64,
    pub num_words: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Section {
    /// Replace the content and recompute `length` and `num_words` from it.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        let stats = TextStats::of(&self.content);
        self.length = stats.length;
        self.num_words = stats.num_words;
        self
    }
}

/// Payload for creating a section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSection {
    pub document_id: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    #[serde(default, deserialize_with = "metadata_lenient")]
    pub metadata: SectionMetadata,
    pub length: i64,
    pub num_words: i64,
}

impl NewSection {
    /// Build a section payload whose statistics match `content`.
    pub fn new(
        document_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        summary: impl Into<String>,
        metadata: SectionMetadata,
    ) -> Self {
        let content = content.into();
        let stats = TextStats::of(&content);
        Self {
            document_id: document_id.into(),
            title: title.into(),
            content,
            summary: summary.into(),
            metadata,
            length: stats.length,
            num_words: stats.num_words,
        }
    }
}

/// Character and word counts stored alongside section content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStats {
    pub length: i64,
    pub num_words: i64,
}

impl TextStats {
    pub fn of(content: &str) -> Self {
        Self {
            length: saturating_i64(content.chars().count()),
            num_words: saturating_i64(content.split_whitespace().count()),
        }
    }
}

fn saturating_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// `{id}` lookup body shared by the read endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRequest {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentsEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub documents: Vec<Document>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentEnvelope {
    pub document: Document,
}

#[derive(Debug, Deserialize)]
pub struct SectionsEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sections: Vec<Section>,
}

#[derive(Debug, Deserialize)]
pub struct SectionEnvelope {
    pub section: Section,
}

#[derive(Debug, Deserialize)]
pub struct MessagesEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<AgentMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyEnvelope {
    pub response: AgentMessage,
}

/// Acknowledgement returned by the delete endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAck {
    #[serde(default)]
    pub result: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn metadata_lenient<'de, D>(deserializer: D) -> Result<SectionMetadata, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect())
}
