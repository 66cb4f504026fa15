//! Client side of the Scribo document service.
//!
//! [`ScriboClient`] wraps every remote endpoint. On top of it sit two
//! independent state controllers: [`SessionController`] reconciles who is
//! signed in, [`MessagingController`] owns the assistant conversation for one
//! `(document, section)` pair. Both publish their state on `tokio::sync::watch`
//! channels so any number of views can follow along.

pub mod cache;
pub mod config;
pub mod http;
pub mod messaging;
pub mod oauth;
pub mod services;
pub mod session;
pub mod token;

pub use cache::{CacheError, FileUserCache, MemoryUserCache, UserCache};
pub use config::ClientConfig;
pub use http::ScriboClient;
pub use messaging::{MessagingController, ThreadState};
pub use oauth::{AuthorizationFlow, AuthorizeError, LoopbackFlow};
pub use services::{AgentService, AuthService};
pub use session::{SessionController, SessionPhase, SessionState};
pub use token::{SessionToken, TokenSignal};
