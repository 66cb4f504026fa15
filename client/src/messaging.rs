use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use scribo_core::assist::AssistAction;
use scribo_core::models::{AgentMessage, Role, SendMessageRequest};
use serde::Serialize;
use tokio::sync::watch;

use crate::services::AgentService;

/// Shown when a conversation has no history yet.
pub const GREETING: &str = "Hello! I'm your AI writing assistant. I can help you improve your content, suggest edits, or answer questions about this section or document.";

/// Appended in place of a reply when sending fails.
pub const SEND_FAILURE: &str = "Sorry, I couldn't process your message. Please try again.";

/// Everything a view needs to render one assistant conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadState {
    pub document_id: String,
    pub section_id: String,
    /// Conversation order; never empty
    pub messages: Vec<AgentMessage>,
    /// Pending input text
    pub input: String,
    /// True only while history is being fetched
    pub is_loading: bool,
    /// Active thread id, as last confirmed by the server
    pub thread_id: Option<String>,
    #[serde(skip)]
    greeting_only: bool,
}

impl ThreadState {
    fn fresh(document_id: &str, section_id: &str, is_loading: bool) -> Self {
        Self {
            document_id: document_id.to_string(),
            section_id: section_id.to_string(),
            messages: vec![greeting()],
            input: String::new(),
            is_loading,
            thread_id: None,
            greeting_only: true,
        }
    }

    /// True while the synthetic greeting is the whole conversation.
    pub fn shows_greeting(&self) -> bool {
        self.greeting_only
    }

    fn seed_greeting(&mut self) {
        self.messages = vec![greeting()];
        self.thread_id = None;
        self.greeting_only = true;
    }

    fn push(&mut self, message: AgentMessage) {
        if self.greeting_only {
            self.messages.clear();
            self.greeting_only = false;
        }
        self.messages.push(message);
    }
}

fn greeting() -> AgentMessage {
    AgentMessage::assistant(GREETING, None)
}

/// The server sends `""` for "no thread".
fn thread_of(message: &AgentMessage) -> Option<String> {
    message.thread_id.clone().filter(|id| !id.is_empty())
}

/// Owns the assistant conversation for one `(document, section)` pair.
///
/// User messages are applied optimistically and never rolled back: a failed
/// send leaves the message visible, followed by [`SEND_FAILURE`]. The active
/// thread id only moves when the server confirms a reply.
///
/// Every [`initialize`](Self::initialize) starts a new generation. Responses
/// that belong to an older generation are dropped, so switching sections
/// while a request is in flight cannot leak the old conversation into the
/// new one.
pub struct MessagingController {
    agent: Arc<dyn AgentService>,
    state: watch::Sender<ThreadState>,
    generation: AtomicU64,
}

impl MessagingController {
    pub fn new(agent: Arc<dyn AgentService>) -> Self {
        let (state, _) = watch::channel(ThreadState::fresh("", "", false));
        Self {
            agent,
            state,
            generation: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> ThreadState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ThreadState> {
        self.state.subscribe()
    }

    pub fn messages(&self) -> Vec<AgentMessage> {
        self.state.borrow().messages.clone()
    }

    pub fn input(&self) -> String {
        self.state.borrow().input.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn thread_id(&self) -> Option<String> {
        self.state.borrow().thread_id.clone()
    }

    /// Reset the conversation to `(document_id, section_id)` and load its
    /// history.
    ///
    /// An empty or failed fetch leaves exactly the greeting. Otherwise the
    /// history is adopted and the active thread id is taken from its first
    /// message.
    pub async fn initialize(&self, document_id: &str, section_id: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .send_replace(ThreadState::fresh(document_id, section_id, true));

        let fetched = self.agent.messages(document_id, section_id).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(document_id, section_id, "Discarding stale message history");
            return;
        }

        self.state.send_modify(|state| {
            state.is_loading = false;
            match fetched {
                Ok(history) if !history.is_empty() => {
                    state.thread_id = thread_of(&history[0]);
                    state.messages = history;
                    state.greeting_only = false;
                }
                Ok(_) => state.seed_greeting(),
                Err(e) => {
                    tracing::warn!(error = %e, document_id, section_id, "Failed to fetch messages");
                    state.seed_greeting();
                }
            }
        });
    }

    /// Initialize only if the pair differs from the one currently shown.
    pub async fn switch_to(&self, document_id: &str, section_id: &str) {
        let current = {
            let state = self.state.borrow();
            state.document_id == document_id && state.section_id == section_id
        };
        if current && self.generation.load(Ordering::SeqCst) > 0 {
            return;
        }
        self.initialize(document_id, section_id).await;
    }

    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.state.send_modify(|state| state.input = text);
    }

    /// Send the pending input.
    pub async fn send_input(&self) {
        let text = self.input();
        self.send(&text).await;
    }

    /// Ask the assistant to act on the editor's current selection.
    pub async fn request_assist(&self, action: AssistAction, selection: &str) {
        if let Some(prompt) = action.prompt(selection) {
            self.send(&prompt).await;
        }
    }

    /// Send one user message. Blank text is ignored, and so is anything
    /// sent while the history is still loading: the loaded history would
    /// replace it.
    pub async fn send(&self, text: &str) {
        let content = text.trim();
        if content.is_empty() {
            return;
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let mut request = None;
        self.state.send_if_modified(|state| {
            if state.is_loading {
                return false;
            }
            let message = AgentMessage::user(content, state.thread_id.clone());
            request = Some(SendMessageRequest {
                document_id: state.document_id.clone(),
                section_id: state.section_id.clone(),
                role: Role::User,
                content: message.content.clone(),
                thread_id: message.thread_id.clone(),
            });
            state.push(message);
            state.input.clear();
            true
        });
        let Some(request) = request else {
            tracing::debug!("History still loading, not sending");
            return;
        };

        let outcome = self.agent.send_message(&request).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(
                document_id = %request.document_id,
                section_id = %request.section_id,
                "Reply arrived after the conversation was switched, dropping it"
            );
            return;
        }

        self.state.send_modify(|state| match outcome {
            Ok(reply) => {
                let thread_id = thread_of(&reply);
                let reply = AgentMessage::assistant(reply.content, thread_id);
                state.thread_id = reply.thread_id.clone();
                state.push(reply);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send agent message");
                state.push(AgentMessage::assistant(SEND_FAILURE, None));
            }
        });
    }
}
