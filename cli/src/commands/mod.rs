pub mod auth;
pub mod chat;
pub mod document;
pub mod section;
